//! Value-node tree: arena-backed document representation with lazy,
//! memoized value materialization and registry-driven traversals.
//!
//! Nodes live in an arena owned by a [`Document`]; [`NodeId`]s are stable
//! across retag splices, so a parent's child slot can be swapped without
//! invalidating other references.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::error::SemanticError;
use crate::schema::Schema;
use crate::value::Value;

/// Engine-internal type tags are prefixed with `:` and never collide
/// with user-declared names.
pub fn is_reserved_tag(name: &str) -> bool {
    name.starts_with(':')
}

/// Stable index of a node inside its document's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

impl NodeId {
    fn idx(self) -> usize {
        self.0 as usize
    }
}

/// The six value-node kinds plus the object-entry Pair node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Primitive,
    Typed,
    Proto,
    Class,
    Array,
    Object,
    Pair,
}

/// Source position, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub line: u32,
    pub col: u32,
}

#[derive(Debug)]
struct NodeData {
    kind: NodeKind,
    type_name: String,
    /// Payload of a Primitive node.
    literal: Option<Value>,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
    /// Defined only for Pair nodes.
    key: Option<String>,
    span: Span,
    text: String,
    /// `None` means "not yet computed", distinct from a computed
    /// `Value::Undefined`. Errors are never cached.
    cache: Option<Value>,
}

/// One parsed document: the node arena, its root, and the schema the
/// document is processed under.
#[derive(Debug)]
pub struct Document {
    nodes: RefCell<Vec<NodeData>>,
    root: NodeId,
    schema: Rc<Schema>,
    file: Option<String>,
}

impl Document {
    pub(crate) fn new(schema: Rc<Schema>, file: Option<String>) -> Document {
        Document {
            nodes: RefCell::new(Vec::new()),
            root: NodeId(0),
            schema,
            file,
        }
    }

    pub(crate) fn alloc(
        &self,
        kind: NodeKind,
        type_name: impl Into<String>,
        span: Span,
        text: impl Into<String>,
    ) -> NodeId {
        let mut nodes = self.nodes.borrow_mut();
        let id = NodeId(nodes.len() as u32);
        nodes.push(NodeData {
            kind,
            type_name: type_name.into(),
            literal: None,
            children: Vec::new(),
            parent: None,
            key: None,
            span,
            text: text.into(),
            cache: None,
        });
        id
    }

    pub(crate) fn set_literal(&self, id: NodeId, value: Value) {
        self.nodes.borrow_mut()[id.idx()].literal = Some(value);
    }

    pub(crate) fn set_key(&self, id: NodeId, key: String) {
        self.nodes.borrow_mut()[id.idx()].key = Some(key);
    }

    pub(crate) fn set_text(&self, id: NodeId, text: String) {
        self.nodes.borrow_mut()[id.idx()].text = text;
    }

    /// Appends `child` to `parent`'s children and links its parent slot.
    pub(crate) fn adopt(&self, parent: NodeId, child: NodeId) {
        let mut nodes = self.nodes.borrow_mut();
        nodes[parent.idx()].children.push(child);
        nodes[child.idx()].parent = Some(parent);
    }

    pub(crate) fn set_root(&mut self, id: NodeId) {
        self.root = id;
    }

    pub fn root(&self) -> NodeRef<'_> {
        NodeRef {
            doc: self,
            id: self.root,
        }
    }

    pub fn node(&self, id: NodeId) -> NodeRef<'_> {
        NodeRef { doc: self, id }
    }

    pub fn schema(&self) -> &Rc<Schema> {
        &self.schema
    }

    pub fn file(&self) -> Option<&str> {
        self.file.as_deref()
    }

    /// Runs every registered preprocessor once per node, post-order.
    pub fn preprocess(&self) {
        self.root().preprocess();
    }

    /// Validates the whole tree, post-order, failing on the first
    /// top-level node error.
    pub fn validate(&self) -> Result<(), SemanticError> {
        self.root().validate()
    }
}

/// Lightweight handle to one node of a [`Document`].
#[derive(Clone, Copy)]
pub struct NodeRef<'a> {
    doc: &'a Document,
    id: NodeId,
}

impl<'a> NodeRef<'a> {
    fn with<R>(&self, f: impl FnOnce(&NodeData) -> R) -> R {
        let nodes = self.doc.nodes.borrow();
        f(&nodes[self.id.idx()])
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> NodeKind {
        self.with(|n| n.kind)
    }

    pub fn type_name(&self) -> String {
        self.with(|n| n.type_name.clone())
    }

    pub fn key(&self) -> Option<String> {
        self.with(|n| n.key.clone())
    }

    pub fn span(&self) -> Span {
        self.with(|n| n.span)
    }

    /// Raw source text of this node's expression.
    pub fn text(&self) -> String {
        self.with(|n| n.text.clone())
    }

    pub fn schema(&self) -> &'a Rc<Schema> {
        self.doc.schema()
    }

    pub fn document(&self) -> &'a Document {
        self.doc
    }

    pub fn children(&self) -> Vec<NodeRef<'a>> {
        let ids = self.with(|n| n.children.clone());
        ids.into_iter()
            .map(|id| NodeRef { doc: self.doc, id })
            .collect()
    }

    pub fn child(&self, i: usize) -> Option<NodeRef<'a>> {
        let id = self.with(|n| n.children.get(i).copied());
        id.map(|id| NodeRef { doc: self.doc, id })
    }

    pub fn parent(&self) -> Option<NodeRef<'a>> {
        let id = self.with(|n| n.parent);
        id.map(|id| NodeRef { doc: self.doc, id })
    }

    /// Proper ancestors, outermost first.
    pub fn ancestors(&self) -> Vec<NodeRef<'a>> {
        let mut out = Vec::new();
        let mut cur = self.parent();
        while let Some(n) = cur {
            out.push(n);
            cur = n.parent();
        }
        out.reverse();
        out
    }

    /// The node carrying this node's payload: a Typed node's single
    /// child (`None` when the tag stands alone), the node itself
    /// otherwise.
    pub fn payload(&self) -> Option<NodeRef<'a>> {
        match self.kind() {
            NodeKind::Typed => self.child(0),
            _ => Some(*self),
        }
    }

    /// Value built purely from child structure; never consults the
    /// registry.
    pub fn raw_value(&self) -> Value {
        match self.kind() {
            NodeKind::Primitive => self.with(|n| n.literal.clone()).unwrap_or(Value::Undefined),
            NodeKind::Typed | NodeKind::Proto | NodeKind::Class | NodeKind::Pair => self
                .child(0)
                .map(|c| c.raw_value())
                .unwrap_or(Value::Undefined),
            NodeKind::Array => {
                Value::Array(self.children().iter().map(|c| c.raw_value()).collect())
            }
            NodeKind::Object => {
                let mut map = IndexMap::new();
                for pair in self.children() {
                    if let Some(k) = pair.key() {
                        map.insert(k, pair.raw_value());
                    }
                }
                Value::Object(map)
            }
        }
    }

    /// Registry-driven, memoized materialization. The deserializer for a
    /// node runs at most once; a deserializer error is not cached and is
    /// retried on the next access.
    pub fn value(&self) -> Result<Value, SemanticError> {
        if let Some(v) = self.with(|n| n.cache.clone()) {
            return Ok(v);
        }
        let v = self.compute_value()?;
        self.doc.nodes.borrow_mut()[self.id.idx()].cache = Some(v.clone());
        Ok(v)
    }

    fn compute_value(&self) -> Result<Value, SemanticError> {
        match self.kind() {
            NodeKind::Pair => match self.child(0) {
                Some(c) => c.value(),
                None => Ok(Value::Undefined),
            },
            NodeKind::Array => {
                let mut out = Vec::new();
                for c in self.children() {
                    out.push(c.value()?);
                }
                Ok(Value::Array(out))
            }
            NodeKind::Object => {
                let mut map = IndexMap::new();
                for pair in self.children() {
                    if let Some(k) = pair.key() {
                        map.insert(k, pair.value()?);
                    }
                }
                Ok(Value::Object(map))
            }
            NodeKind::Primitive | NodeKind::Typed | NodeKind::Proto | NodeKind::Class => {
                let t = self.type_name();
                let des = {
                    let s = self.schema();
                    s.deserializers
                        .get(&t)
                        .cloned()
                        .or_else(|| s.deserializers.get("*").cloned())
                };
                match des {
                    Some(f) => f(*self),
                    None => Ok(self.raw_value()),
                }
            }
        }
    }

    /// Post-order validation. A node is "known" when any registry table
    /// matches its tag (wildcards count, except for reserved tags);
    /// otherwise it fails with an unknown-type error. The matching
    /// validator, or the wildcard one, is then invoked.
    pub fn validate(&self) -> Result<(), SemanticError> {
        for c in self.children() {
            c.validate()?;
        }
        let t = self.type_name();
        let reserved = is_reserved_tag(&t);
        let validator = {
            let s = self.schema();
            let known = s.validators.contains_key(&t)
                || s.deserializers.contains_key(&t)
                || s.classes.contains_key(&t)
                || s.prototypes.contains_key(&t)
                || (!reserved
                    && (s.validators.contains_key("*") || s.deserializers.contains_key("*")));
            if !known && !reserved {
                return Err(self.error(format!("unknown type `{}`", t)));
            }
            s.validators.get(&t).cloned().or_else(|| {
                if reserved {
                    None
                } else {
                    s.validators.get("*").cloned()
                }
            })
        };
        if let Some(v) = validator {
            if let Some(err) = v(*self) {
                return Err(err);
            }
        }
        Ok(())
    }

    /// Post-order preprocessing pass; side effects only.
    pub fn preprocess(&self) {
        for c in self.children() {
            c.preprocess();
        }
        let t = self.type_name();
        let reserved = is_reserved_tag(&t);
        let pre = {
            let s = self.schema();
            s.preprocessors.get(&t).cloned().or_else(|| {
                if reserved {
                    None
                } else {
                    s.preprocessors.get("*").cloned()
                }
            })
        };
        if let Some(p) = pre {
            p(*self);
        }
    }

    /// Reassigns this node's type tag. A Typed node replaces its tag in
    /// place; any other node is spliced under a synthetic Typed wrapper
    /// occupying the exact child slot the node previously held
    /// (structural promotion). Sibling order is preserved.
    pub fn set_type_name(&self, name: &str) {
        if self.kind() == NodeKind::Typed {
            self.doc.nodes.borrow_mut()[self.id.idx()].type_name = name.to_string();
            return;
        }
        let (parent, span, text) = self.with(|n| (n.parent, n.span, n.text.clone()));
        let wrapper = self.doc.alloc(NodeKind::Typed, name, span, text);
        let mut nodes = self.doc.nodes.borrow_mut();
        nodes[wrapper.idx()].children.push(self.id);
        nodes[wrapper.idx()].parent = parent;
        nodes[self.id.idx()].parent = Some(wrapper);
        if let Some(p) = parent {
            if let Some(slot) = nodes[p.idx()]
                .children
                .iter_mut()
                .find(|c| **c == self.id)
            {
                *slot = wrapper;
            }
        }
    }

    /// Semantic error at this node, with full expression context.
    pub fn error(&self, message: impl Into<String>) -> SemanticError {
        SemanticError {
            message: message.into(),
            file: self.doc.file.clone(),
            line: self.span().line,
            col: self.span().col,
            expression: self.text(),
            simplified: false,
        }
    }

    /// Semantic error at this node in simplified (location-only) form.
    pub fn simple_error(&self, message: impl Into<String>) -> SemanticError {
        SemanticError {
            simplified: true,
            ..self.error(message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;
    use crate::schema::{create_schema, deserializer_fn, validator_fn, SchemaOverrides};
    use std::cell::Cell;

    fn doc(source: &str) -> Document {
        Parser::parse(source, create_schema(SchemaOverrides::default()), None).unwrap()
    }

    #[test]
    fn raw_value_never_consults_the_registry() {
        let d = doc("int 5");
        assert_eq!(d.root().raw_value(), Value::Int(5));
        // The `int` deserializer was never invoked; no cache exists yet.
        let tagged = d.root().child(0).unwrap();
        assert_eq!(tagged.type_name(), "int");
        assert_eq!(tagged.raw_value(), Value::Int(5));
    }

    #[test]
    fn value_is_cached_and_deserializer_runs_once() {
        let calls = Rc::new(Cell::new(0usize));
        let counter = calls.clone();
        let mut overrides = SchemaOverrides::default();
        overrides.deserializers.insert(
            "probe".into(),
            deserializer_fn(move |n| {
                counter.set(counter.get() + 1);
                Ok(n.raw_value())
            }),
        );
        overrides
            .validators
            .insert("probe".into(), validator_fn(|_| None));
        let schema = create_schema(overrides);
        let d = Parser::parse("probe 41", schema, None).unwrap();
        let tagged = d.root().child(0).unwrap();
        assert_eq!(tagged.value().unwrap(), Value::Int(41));
        assert_eq!(tagged.value().unwrap(), Value::Int(41));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn deserializer_errors_are_not_cached() {
        let calls = Rc::new(Cell::new(0usize));
        let counter = calls.clone();
        let mut overrides = SchemaOverrides::default();
        overrides.deserializers.insert(
            "broken".into(),
            deserializer_fn(move |n| {
                counter.set(counter.get() + 1);
                Err(n.error("always fails"))
            }),
        );
        let schema = create_schema(overrides);
        let d = Parser::parse("broken 1", schema, None).unwrap();
        let tagged = d.root().child(0).unwrap();
        assert!(tagged.value().is_err());
        assert!(tagged.value().is_err());
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn object_value_later_duplicate_keys_overwrite() {
        let d = doc("{a: 1, b: 2, a: 3}");
        let obj = d.root().child(0).unwrap();
        match obj.value().unwrap() {
            Value::Object(map) => {
                let entries: Vec<_> = map.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
                assert_eq!(
                    entries,
                    vec![
                        ("a".to_string(), Value::Int(3)),
                        ("b".to_string(), Value::Int(2)),
                    ]
                );
            }
            other => panic!("expected object, got {:?}", other),
        }
    }

    #[test]
    fn retag_wraps_and_preserves_sibling_order() {
        let d = doc("[1, 2, 3]");
        let arr = d.root().child(0).unwrap();
        let middle = arr.child(1).unwrap();
        middle.set_type_name("int");
        let kids = arr.children();
        assert_eq!(kids.len(), 3);
        assert_eq!(kids[0].kind(), NodeKind::Primitive);
        assert_eq!(kids[1].kind(), NodeKind::Typed);
        assert_eq!(kids[1].type_name(), "int");
        assert_eq!(kids[1].child(0).unwrap().id(), middle.id());
        assert_eq!(kids[2].kind(), NodeKind::Primitive);
        assert_eq!(middle.parent().unwrap().id(), kids[1].id());
    }

    #[test]
    fn retag_on_typed_node_replaces_tag_in_place() {
        let d = doc("int 5");
        let tagged = d.root().child(0).unwrap();
        let id_before = tagged.id();
        tagged.set_type_name("float");
        assert_eq!(tagged.type_name(), "float");
        assert_eq!(tagged.id(), id_before);
        assert_eq!(d.root().child(0).unwrap().id(), id_before);
    }

    #[test]
    fn ancestors_are_outermost_first() {
        let d = doc("{a: [1]}");
        let obj = d.root().child(0).unwrap();
        let pair = obj.child(0).unwrap();
        let arr = pair.child(0).unwrap();
        let one = arr.child(0).unwrap();
        let chain: Vec<_> = one.ancestors().iter().map(|n| n.kind()).collect();
        assert_eq!(
            chain,
            vec![
                NodeKind::Typed, // :document wrapper
                NodeKind::Object,
                NodeKind::Pair,
                NodeKind::Array,
            ]
        );
    }

    #[test]
    fn unknown_type_fails_validation() {
        let d = doc("Mystery 1");
        let err = d.validate().unwrap_err();
        assert!(err.message.contains("unknown type `Mystery`"), "{}", err);
    }
}
