//! Front end: lexer + recursive-descent parser for the typed-JSON
//! document language.
//!
//! Produces the node tree the engine consumes, recording a source span
//! and the raw expression text for every node. The engine itself never
//! re-reads source text.

use std::rc::Rc;

use crate::error::SyntaxError;
use crate::node::{Document, NodeId, NodeKind, Span};
use crate::schema::Schema;
use crate::value::Value;

/// Document parser. One instance parses one source string into a
/// [`Document`] bound to the given schema.
pub struct Parser<'a> {
    src: &'a str,
    pos: usize,
    line: u32,
    col: u32,
    doc: Document,
}

#[derive(Clone, Copy)]
struct Mark {
    pos: usize,
    line: u32,
    col: u32,
}

impl<'a> Parser<'a> {
    /// Parses a complete document. The root value is wrapped in a
    /// synthetic Typed `":document"` node.
    pub fn parse(
        source: &'a str,
        schema: Rc<Schema>,
        file: Option<&str>,
    ) -> Result<Document, SyntaxError> {
        let mut p = Parser {
            src: source,
            pos: 0,
            line: 1,
            col: 1,
            doc: Document::new(schema, file.map(String::from)),
        };
        p.skip_trivia()?;
        let start = p.mark();
        let child = p.parse_value()?;
        let end = p.mark();
        p.skip_trivia()?;
        if !p.at_end() {
            return Err(p.err_here("unexpected trailing input"));
        }
        let root = p.doc.alloc(
            NodeKind::Typed,
            ":document",
            Span {
                line: start.line,
                col: start.col,
            },
            p.slice(start, end),
        );
        p.doc.adopt(root, child);
        p.doc.set_root(root);
        Ok(p.doc)
    }

    // ── Values ───────────────────────────────────────────────────────────

    fn parse_value(&mut self) -> Result<NodeId, SyntaxError> {
        match self.peek() {
            None => Err(self.err_here("unexpected end of input")),
            Some('"') | Some('\'') => self.parse_string_node(),
            Some('`') => self.parse_template(),
            Some('/') => self.parse_regex(),
            Some('{') => self.parse_object(),
            Some('[') => self.parse_array(),
            Some(c) if c == '-' || c.is_ascii_digit() => self.parse_number(),
            Some(c) if is_ident_start(c) => self.parse_ident_value(),
            Some(c) => Err(self.err_here(format!("unexpected character `{}`", c))),
        }
    }

    fn parse_ident_value(&mut self) -> Result<NodeId, SyntaxError> {
        let start = self.mark();
        let name = self.parse_ident();
        let after_ident = self.mark();
        match name.as_str() {
            "true" | "false" => {
                return Ok(self.primitive(
                    ":boolean",
                    Value::Bool(name == "true"),
                    start,
                    after_ident,
                ))
            }
            "null" => return Ok(self.primitive(":null", Value::Null, start, after_ident)),
            "undefined" => {
                return Ok(self.primitive(":undefined", Value::Undefined, start, after_ident))
            }
            _ => {}
        }
        self.skip_trivia()?;
        if self.peek() == Some('(') {
            return self.parse_class(&name, start);
        }
        if self.peek_str("...") {
            return self.parse_proto(&name, start);
        }
        if self.at_value_start() {
            let child = self.parse_value()?;
            let end = self.mark();
            let node = self.doc.alloc(
                NodeKind::Typed,
                name,
                span_of(start),
                self.slice(start, end),
            );
            self.doc.adopt(node, child);
            return Ok(node);
        }
        // Tag standing alone: implicit undefined payload.
        Ok(self.doc.alloc(
            NodeKind::Typed,
            name,
            span_of(start),
            self.slice(start, after_ident),
        ))
    }

    fn parse_class(&mut self, name: &str, start: Mark) -> Result<NodeId, SyntaxError> {
        let paren = self.mark();
        self.expect('(')?;
        let args = self
            .doc
            .alloc(NodeKind::Array, ":array", span_of(paren), String::new());
        loop {
            self.skip_trivia()?;
            match self.peek() {
                Some(')') => {
                    self.advance();
                    break;
                }
                None => return Err(self.err_here("unclosed argument list")),
                _ => {}
            }
            let arg = self.parse_value()?;
            self.doc.adopt(args, arg);
            self.skip_trivia()?;
            match self.peek() {
                Some(',') => {
                    self.advance();
                }
                Some(')') => {
                    self.advance();
                    break;
                }
                None => return Err(self.err_here("unclosed argument list")),
                _ => return Err(self.err_here("expected `,` or `)` in argument list")),
            }
        }
        let end = self.mark();
        self.doc.set_text(args, self.slice(paren, end));
        let node = self.doc.alloc(
            NodeKind::Class,
            name,
            span_of(start),
            self.slice(start, end),
        );
        self.doc.adopt(node, args);
        Ok(node)
    }

    fn parse_proto(&mut self, name: &str, start: Mark) -> Result<NodeId, SyntaxError> {
        // Consume the `...` marker.
        self.advance();
        self.advance();
        self.advance();
        self.skip_trivia()?;
        if self.peek() != Some('{') {
            return Err(self.err_here("expected `{` after `...` in prototype construction"));
        }
        let obj = self.parse_object()?;
        let end = self.mark();
        let node = self.doc.alloc(
            NodeKind::Proto,
            name,
            span_of(start),
            self.slice(start, end),
        );
        self.doc.adopt(node, obj);
        Ok(node)
    }

    fn parse_array(&mut self) -> Result<NodeId, SyntaxError> {
        let start = self.mark();
        self.expect('[')?;
        let node = self
            .doc
            .alloc(NodeKind::Array, ":array", span_of(start), String::new());
        loop {
            self.skip_trivia()?;
            match self.peek() {
                Some(']') => {
                    self.advance();
                    break;
                }
                None => return Err(self.err_here("unclosed array")),
                _ => {}
            }
            let elem = self.parse_value()?;
            self.doc.adopt(node, elem);
            self.skip_trivia()?;
            match self.peek() {
                Some(',') => {
                    self.advance();
                }
                Some(']') => {
                    self.advance();
                    break;
                }
                None => return Err(self.err_here("unclosed array")),
                _ => return Err(self.err_here("expected `,` or `]` in array")),
            }
        }
        let end = self.mark();
        self.doc.set_text(node, self.slice(start, end));
        Ok(node)
    }

    fn parse_object(&mut self) -> Result<NodeId, SyntaxError> {
        let start = self.mark();
        self.expect('{')?;
        let node = self
            .doc
            .alloc(NodeKind::Object, ":object", span_of(start), String::new());
        loop {
            self.skip_trivia()?;
            match self.peek() {
                Some('}') => {
                    self.advance();
                    break;
                }
                None => return Err(self.err_here("unclosed object")),
                _ => {}
            }
            let pair = self.parse_pair()?;
            self.doc.adopt(node, pair);
            self.skip_trivia()?;
            match self.peek() {
                Some(',') => {
                    self.advance();
                }
                Some('}') => {
                    self.advance();
                    break;
                }
                None => return Err(self.err_here("unclosed object")),
                _ => return Err(self.err_here("expected `,` or `}` in object")),
            }
        }
        let end = self.mark();
        self.doc.set_text(node, self.slice(start, end));
        Ok(node)
    }

    fn parse_pair(&mut self) -> Result<NodeId, SyntaxError> {
        let start = self.mark();
        let key = match self.peek() {
            Some('"') | Some('\'') => self.parse_string()?,
            Some(c) if is_ident_start(c) => self.parse_ident(),
            _ => return Err(self.err_here("expected object key")),
        };
        self.skip_trivia()?;
        self.expect(':')?;
        self.skip_trivia()?;
        let value = self.parse_value()?;
        let end = self.mark();
        let pair = self.doc.alloc(
            NodeKind::Pair,
            ":pair",
            span_of(start),
            self.slice(start, end),
        );
        self.doc.set_key(pair, key);
        self.doc.adopt(pair, value);
        Ok(pair)
    }

    // ── Literals ─────────────────────────────────────────────────────────

    fn parse_string_node(&mut self) -> Result<NodeId, SyntaxError> {
        let start = self.mark();
        let s = self.parse_string()?;
        let end = self.mark();
        Ok(self.primitive(":string", Value::Str(s), start, end))
    }

    fn parse_string(&mut self) -> Result<String, SyntaxError> {
        let quote = match self.peek() {
            Some(q @ ('"' | '\'')) => q,
            _ => return Err(self.err_here("expected string")),
        };
        self.advance();
        let mut result = String::new();
        loop {
            match self.peek() {
                None => return Err(self.err_here("unterminated string")),
                Some(c) if c == quote => {
                    self.advance();
                    break;
                }
                Some('\\') => {
                    self.advance();
                    match self.peek() {
                        Some('n') => result.push('\n'),
                        Some('t') => result.push('\t'),
                        Some('r') => result.push('\r'),
                        Some('b') => result.push('\u{0008}'),
                        Some('f') => result.push('\u{000C}'),
                        Some('\\') => result.push('\\'),
                        Some('/') => result.push('/'),
                        Some('\'') => result.push('\''),
                        Some('"') => result.push('"'),
                        Some('u') => {
                            self.advance();
                            let mut code = 0u32;
                            for _ in 0..4 {
                                let d = self
                                    .peek()
                                    .and_then(|c| c.to_digit(16))
                                    .ok_or_else(|| self.err_here("invalid unicode escape"))?;
                                code = code * 16 + d;
                                self.advance();
                            }
                            let c = char::from_u32(code)
                                .ok_or_else(|| self.err_here("invalid unicode escape"))?;
                            result.push(c);
                            continue;
                        }
                        _ => return Err(self.err_here("invalid escape sequence")),
                    }
                    self.advance();
                }
                Some(c) => {
                    result.push(c);
                    self.advance();
                }
            }
        }
        Ok(result)
    }

    fn parse_template(&mut self) -> Result<NodeId, SyntaxError> {
        let start = self.mark();
        self.advance(); // opening backtick
        let body_start = self.pos;
        loop {
            match self.peek() {
                None => return Err(self.err_here("unterminated template string")),
                Some('`') => break,
                Some(_) => self.advance(),
            }
        }
        let body = self.src[body_start..self.pos].to_string();
        self.advance(); // closing backtick
        let end = self.mark();
        Ok(self.primitive(":template", Value::Template(body), start, end))
    }

    fn parse_regex(&mut self) -> Result<NodeId, SyntaxError> {
        let start = self.mark();
        self.advance(); // opening slash
        let mut in_class = false;
        loop {
            match self.peek() {
                None | Some('\n') => return Err(self.err_here("unterminated regular expression")),
                Some('\\') => {
                    self.advance();
                    if self.peek().is_none() {
                        return Err(self.err_here("unterminated regular expression"));
                    }
                    self.advance();
                }
                Some('[') => {
                    in_class = true;
                    self.advance();
                }
                Some(']') => {
                    in_class = false;
                    self.advance();
                }
                Some('/') if !in_class => {
                    self.advance();
                    break;
                }
                Some(_) => self.advance(),
            }
        }
        while matches!(self.peek(), Some(c) if c.is_ascii_alphabetic()) {
            self.advance();
        }
        let end = self.mark();
        let literal = self.slice(start, end);
        Ok(self.primitive(":regexp", Value::Regex(literal), start, end))
    }

    fn parse_number(&mut self) -> Result<NodeId, SyntaxError> {
        let start = self.mark();
        if self.peek() == Some('-') {
            self.advance();
        }
        if !matches!(self.peek(), Some('0'..='9')) {
            return Err(self.err_here("invalid number"));
        }
        while matches!(self.peek(), Some('0'..='9')) {
            self.advance();
        }
        let mut fractional = false;
        if self.peek() == Some('.') {
            fractional = true;
            self.advance();
            if !matches!(self.peek(), Some('0'..='9')) {
                return Err(self.err_here("invalid number"));
            }
            while matches!(self.peek(), Some('0'..='9')) {
                self.advance();
            }
        }
        if matches!(self.peek(), Some('e') | Some('E')) {
            fractional = true;
            self.advance();
            if matches!(self.peek(), Some('+') | Some('-')) {
                self.advance();
            }
            if !matches!(self.peek(), Some('0'..='9')) {
                return Err(self.err_here("invalid number"));
            }
            while matches!(self.peek(), Some('0'..='9')) {
                self.advance();
            }
        }
        if self.peek() == Some('n') {
            if fractional {
                return Err(self.err_here("invalid big-integer literal"));
            }
            let digits = self.slice(start, self.mark());
            self.advance(); // the `n` suffix
            let end = self.mark();
            let value = digits
                .parse::<i128>()
                .map_err(|_| self.err_at(start, "big-integer literal out of range"))?;
            return Ok(self.primitive(":bigint", Value::BigInt(value), start, end));
        }
        if matches!(self.peek(), Some(c) if is_ident_start(c)) {
            return Err(self.err_here("invalid number"));
        }
        let end = self.mark();
        let text = self.slice(start, end);
        let value = if fractional {
            Value::Num(
                text.parse::<f64>()
                    .map_err(|_| self.err_at(start, "invalid number"))?,
            )
        } else {
            match text.parse::<i64>() {
                Ok(i) => Value::Int(i),
                Err(_) => Value::Num(
                    text.parse::<f64>()
                        .map_err(|_| self.err_at(start, "invalid number"))?,
                ),
            }
        };
        Ok(self.primitive(":number", value, start, end))
    }

    fn parse_ident(&mut self) -> String {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if is_ident_continue(c)) {
            self.advance();
        }
        self.src[start..self.pos].to_string()
    }

    // ── Cursor ───────────────────────────────────────────────────────────

    fn primitive(&mut self, tag: &str, value: Value, start: Mark, end: Mark) -> NodeId {
        let id = self
            .doc
            .alloc(NodeKind::Primitive, tag, span_of(start), self.slice(start, end));
        self.doc.set_literal(id, value);
        id
    }

    fn at_value_start(&self) -> bool {
        match self.peek() {
            Some('"') | Some('\'') | Some('`') | Some('/') | Some('{') | Some('[') | Some('-') => {
                true
            }
            Some(c) => c.is_ascii_digit() || is_ident_start(c),
            None => false,
        }
    }

    fn skip_trivia(&mut self) -> Result<(), SyntaxError> {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => self.advance(),
                Some('/') if self.peek_str("//") => {
                    while !matches!(self.peek(), None | Some('\n')) {
                        self.advance();
                    }
                }
                Some('/') if self.peek_str("/*") => {
                    self.advance();
                    self.advance();
                    loop {
                        if self.at_end() {
                            return Err(self.err_here("unterminated block comment"));
                        }
                        if self.peek_str("*/") {
                            self.advance();
                            self.advance();
                            break;
                        }
                        self.advance();
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn mark(&self) -> Mark {
        Mark {
            pos: self.pos,
            line: self.line,
            col: self.col,
        }
    }

    fn slice(&self, start: Mark, end: Mark) -> String {
        self.src[start.pos..end.pos].to_string()
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn peek_str(&self, s: &str) -> bool {
        self.src[self.pos..].starts_with(s)
    }

    fn advance(&mut self) {
        if let Some(c) = self.peek() {
            self.pos += c.len_utf8();
            if c == '\n' {
                self.line += 1;
                self.col = 1;
            } else {
                self.col += 1;
            }
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn expect(&mut self, expected: char) -> Result<(), SyntaxError> {
        if self.peek() == Some(expected) {
            self.advance();
            Ok(())
        } else {
            Err(self.err_here(format!("expected `{}`", expected)))
        }
    }

    fn err_here(&self, message: impl Into<String>) -> SyntaxError {
        SyntaxError {
            message: message.into(),
            file: self.doc.file().map(String::from),
            line: self.line,
            col: self.col,
        }
    }

    fn err_at(&self, at: Mark, message: impl Into<String>) -> SyntaxError {
        SyntaxError {
            message: message.into(),
            file: self.doc.file().map(String::from),
            line: at.line,
            col: at.col,
        }
    }
}

fn span_of(m: Mark) -> Span {
    Span {
        line: m.line,
        col: m.col,
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '$'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeKind;
    use crate::schema::{create_schema, SchemaOverrides};

    fn parse(source: &str) -> Document {
        Parser::parse(source, create_schema(SchemaOverrides::default()), None).unwrap()
    }

    #[test]
    fn root_is_wrapped_in_document_tag() {
        let d = parse("42");
        let root = d.root();
        assert_eq!(root.kind(), NodeKind::Typed);
        assert_eq!(root.type_name(), ":document");
        let child = root.child(0).unwrap();
        assert_eq!(child.kind(), NodeKind::Primitive);
        assert_eq!(child.raw_value(), Value::Int(42));
    }

    #[test]
    fn primitives_lex_to_their_reserved_tags() {
        for (src, tag, value) in [
            ("\"hi\"", ":string", Value::Str("hi".into())),
            ("'hi'", ":string", Value::Str("hi".into())),
            ("1.5", ":number", Value::Num(1.5)),
            ("-3", ":number", Value::Int(-3)),
            ("12n", ":bigint", Value::BigInt(12)),
            ("true", ":boolean", Value::Bool(true)),
            ("null", ":null", Value::Null),
            ("undefined", ":undefined", Value::Undefined),
            ("`raw ${x}`", ":template", Value::Template("raw ${x}".into())),
            ("/a[/]+/gi", ":regexp", Value::Regex("/a[/]+/gi".into())),
        ] {
            let d = parse(src);
            let node = d.root().child(0).unwrap();
            assert_eq!(node.type_name(), tag, "source: {}", src);
            assert_eq!(node.raw_value(), value, "source: {}", src);
        }
    }

    #[test]
    fn tagged_value_and_bare_tag() {
        let d = parse("int 5");
        let tagged = d.root().child(0).unwrap();
        assert_eq!(tagged.kind(), NodeKind::Typed);
        assert_eq!(tagged.type_name(), "int");
        assert_eq!(tagged.child(0).unwrap().raw_value(), Value::Int(5));

        let d = parse("[int]");
        let bare = d.root().child(0).unwrap().child(0).unwrap();
        assert_eq!(bare.kind(), NodeKind::Typed);
        assert_eq!(bare.type_name(), "int");
        assert!(bare.child(0).is_none());
        assert_eq!(bare.raw_value(), Value::Undefined);
    }

    #[test]
    fn class_construction_builds_synthetic_argument_array() {
        let d = parse("Test(1, \"a\",)");
        let class = d.root().child(0).unwrap();
        assert_eq!(class.kind(), NodeKind::Class);
        assert_eq!(class.type_name(), "Test");
        let args = class.child(0).unwrap();
        assert_eq!(args.kind(), NodeKind::Array);
        assert_eq!(args.type_name(), ":array");
        assert_eq!(
            args.raw_value(),
            Value::Array(vec![Value::Int(1), Value::Str("a".into())])
        );
    }

    #[test]
    fn proto_construction_wraps_an_object() {
        let d = parse("Point... {x: 1, y: 2}");
        let proto = d.root().child(0).unwrap();
        assert_eq!(proto.kind(), NodeKind::Proto);
        assert_eq!(proto.type_name(), "Point");
        let obj = proto.child(0).unwrap();
        assert_eq!(obj.kind(), NodeKind::Object);
        assert_eq!(obj.children().len(), 2);
    }

    #[test]
    fn pairs_record_keys_and_spans() {
        let d = parse("{a: 1,\n  \":weird\": 2}");
        let obj = d.root().child(0).unwrap();
        let pairs = obj.children();
        assert_eq!(pairs[0].key().as_deref(), Some("a"));
        assert_eq!(pairs[1].key().as_deref(), Some(":weird"));
        assert_eq!(pairs[1].span().line, 2);
        assert_eq!(pairs[1].span().col, 3);
        assert_eq!(pairs[1].text(), "\":weird\": 2");
    }

    #[test]
    fn comments_and_trailing_commas() {
        let d = parse("// leading\n[1, /* two */ 2, 3,]");
        let arr = d.root().child(0).unwrap();
        assert_eq!(
            arr.raw_value(),
            Value::Array(vec![Value::Int(1), Value::Int(2), Value::Int(3)])
        );
    }

    #[test]
    fn expression_text_matches_source() {
        let d = parse("{a: maybe oneOf [bigint, number]}");
        let pair = d.root().child(0).unwrap().child(0).unwrap();
        assert_eq!(pair.text(), "a: maybe oneOf [bigint, number]");
        let tagged = pair.child(0).unwrap();
        assert_eq!(tagged.text(), "maybe oneOf [bigint, number]");
    }

    #[test]
    fn syntax_errors_carry_location() {
        let err = Parser::parse(
            "{a 1}",
            create_schema(SchemaOverrides::default()),
            Some("bad.tj"),
        )
        .unwrap_err();
        assert_eq!(err.file.as_deref(), Some("bad.tj"));
        assert_eq!(err.line, 1);
        assert!(err.to_string().starts_with("bad.tj:1,"));
    }

    #[test]
    fn trailing_input_is_rejected() {
        let err = Parser::parse("1 2", create_schema(SchemaOverrides::default()), None)
            .unwrap_err()
            .to_string();
        // `1 2` is a complete number followed by a second value.
        assert!(err.contains("unexpected trailing input"), "{}", err);
    }

    #[test]
    fn big_integer_literal_rejects_fractions() {
        let err = Parser::parse("1.5n", create_schema(SchemaOverrides::default()), None);
        assert!(err.is_err());
    }
}
