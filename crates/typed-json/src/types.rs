//! Type algebra: the closed set of composable type descriptors used
//! while interpreting schema documents.
//!
//! Each descriptor is pure data exposing a human-readable `signature`,
//! a `validate` pass and a `deserialize` pass. All registry access goes
//! through the node's document schema, which for generated entries is
//! the assembled target schema; that is what permits forward and
//! mutual references between names declared in one schema document.

use indexmap::IndexMap;

use crate::error::SemanticError;
use crate::node::{is_reserved_tag, NodeKind, NodeRef};
use crate::value::{Instance, Value};

/// Distinguishes tuple signatures from constructor argument lists in
/// diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixedLabel {
    Array,
    Arguments,
}

impl FixedLabel {
    fn noun(self) -> &'static str {
        match self {
            FixedLabel::Array => "array",
            FixedLabel::Arguments => "arguments",
        }
    }

    fn slot(self) -> &'static str {
        match self {
            FixedLabel::Array => "element",
            FixedLabel::Arguments => "argument",
        }
    }
}

/// One type descriptor.
#[derive(Debug, Clone)]
pub enum TypeExpr {
    /// Exactly one constant value.
    Literal(Value),
    /// `null`/`undefined` short-circuit, otherwise the inner type.
    Maybe(Box<TypeExpr>),
    /// Dynamically sized homogeneous array.
    ArrayOf(Box<TypeExpr>),
    /// Positional tuple; also models constructor argument lists.
    ArrayFixed {
        types: Vec<TypeExpr>,
        label: FixedLabel,
    },
    /// Structural object; `fields: None` accepts any object.
    TObject {
        fields: Option<IndexMap<String, TypeExpr>>,
        /// Declared via `proto {...}`; routed to the prototypes table.
        proto: bool,
    },
    /// Ordered-alternative union.
    OneOf {
        types: Vec<TypeExpr>,
        /// Declaration key shared by the alternatives, when one exists.
        namespace: Option<String>,
    },
    /// Reference to a base-schema (built-in or user-registered) type.
    Terminal(String),
    /// Reference to a name declared in the same schema document,
    /// resolved through the target schema at run time.
    Alias { from: String, to: String },
    /// Nominal class constructor type.
    Class {
        name: String,
        args: Option<Box<TypeExpr>>,
    },
}

impl TypeExpr {
    pub fn is_maybe(&self) -> bool {
        matches!(self, TypeExpr::Maybe(_))
    }

    /// Human-readable structural descriptor, used in diagnostics.
    pub fn signature(&self) -> String {
        match self {
            TypeExpr::Literal(v) => v.to_string(),
            TypeExpr::Maybe(t) => format!("maybe {}", t.signature()),
            TypeExpr::ArrayOf(t) => format!("{}[]", t.signature()),
            TypeExpr::ArrayFixed { types, label } => {
                let inner = types
                    .iter()
                    .map(TypeExpr::signature)
                    .collect::<Vec<_>>()
                    .join(", ");
                match label {
                    FixedLabel::Array => format!("[{}]", inner),
                    FixedLabel::Arguments => format!("({})", inner),
                }
            }
            TypeExpr::TObject { fields: None, .. } => "object".to_string(),
            TypeExpr::TObject {
                fields: Some(fields),
                ..
            } => {
                let inner = fields
                    .iter()
                    .map(|(k, t)| format!("{}: {}", k, t.signature()))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{{{}}}", inner)
            }
            TypeExpr::OneOf { types, .. } => types
                .iter()
                .map(TypeExpr::signature)
                .collect::<Vec<_>>()
                .join(" | "),
            TypeExpr::Terminal(name) => name.clone(),
            TypeExpr::Alias { to, .. } => to.clone(),
            TypeExpr::Class { name, args } => match args {
                Some(a) => format!("{}{}", name, a.signature()),
                None => format!("{}()", name),
            },
        }
    }

    /// Validates `node` against this type. Returns `None` on success.
    ///
    /// Composite variants never stop at the first failure inside their
    /// own level: every failing sub-key is collected and reported in one
    /// composed error carrying this type's signature.
    pub fn validate(&self, node: NodeRef<'_>) -> Option<SemanticError> {
        match self {
            TypeExpr::Literal(expected) => {
                if node.raw_value().loose_eq(expected) {
                    None
                } else {
                    Some(node.error(format!("expected {}", self.signature())))
                }
            }

            TypeExpr::Maybe(inner) => match node.raw_value() {
                Value::Null | Value::Undefined => None,
                _ => inner.validate(node),
            },

            TypeExpr::ArrayOf(inner) => {
                let arr = match structural(node, NodeKind::Array) {
                    Ok(arr) => arr,
                    Err(at) => {
                        return Some(
                            at.error(format!("expected array of type `{}`", self.signature())),
                        )
                    }
                };
                let mut parts = Vec::new();
                for (i, elem) in arr.children().iter().enumerate() {
                    match inner.validate(*elem) {
                        None => promote(*elem, inner),
                        Some(e) => parts.push((i.to_string(), e.simplified().to_string())),
                    }
                }
                if parts.is_empty() {
                    None
                } else {
                    Some(composed_error(node, "array", &self.signature(), &parts))
                }
            }

            TypeExpr::ArrayFixed { types, label } => {
                let arr = match structural(node, NodeKind::Array) {
                    Ok(arr) => arr,
                    Err(at) => {
                        return Some(at.error(format!(
                            "expected {} of type `{}`",
                            label.noun(),
                            self.signature()
                        )))
                    }
                };
                let elems = arr.children();
                let mut parts = Vec::new();
                for (i, t) in types.iter().enumerate() {
                    match elems.get(i) {
                        Some(elem) => match t.validate(*elem) {
                            None => promote(*elem, t),
                            Some(e) => parts.push((i.to_string(), e.simplified().to_string())),
                        },
                        None => {
                            if !t.is_maybe() {
                                parts.push((i.to_string(), format!("missing {} {}", label.slot(), i)));
                            }
                        }
                    }
                }
                if elems.len() > types.len() {
                    parts.push((
                        types.len().to_string(),
                        format!(
                            "length mismatch: expected {}, got {}",
                            types.len(),
                            elems.len()
                        ),
                    ));
                }
                if parts.is_empty() {
                    None
                } else {
                    Some(composed_error(node, label.noun(), &self.signature(), &parts))
                }
            }

            TypeExpr::TObject { fields, proto } => {
                if *proto {
                    if let Some(fields) = fields {
                        return proto_validate(&construction_name(node), fields, node);
                    }
                }
                let obj = match structural(node, NodeKind::Object) {
                    Ok(obj) => obj,
                    Err(at) => {
                        return Some(
                            at.error(format!("expected object of type `{}`", self.signature())),
                        )
                    }
                };
                let Some(fields) = fields else {
                    return None;
                };
                let pairs = index_pairs(obj);
                let mut parts = Vec::new();
                for (key, t) in fields {
                    match pairs.get(key).and_then(|p| p.child(0)) {
                        Some(vnode) => match t.validate(vnode) {
                            None => promote(vnode, t),
                            Some(e) => parts.push((key.clone(), e.simplified().to_string())),
                        },
                        None => {
                            if !t.is_maybe() {
                                parts.push((key.clone(), format!("missing field `{}`", key)));
                            }
                        }
                    }
                }
                for key in pairs.keys() {
                    if !fields.contains_key(key) {
                        parts.push((key.clone(), format!("unknown field `{}`", key)));
                    }
                }
                if parts.is_empty() {
                    None
                } else {
                    Some(composed_error(node, "object", &self.signature(), &parts))
                }
            }

            TypeExpr::OneOf { types, .. } => {
                let mut parts = Vec::new();
                for t in types {
                    match t.validate(node) {
                        None => {
                            promote(node, t);
                            return None;
                        }
                        Some(e) => parts.push((t.signature(), e.simplified().to_string())),
                    }
                }
                Some(composed_error(node, "union", &self.signature(), &parts))
            }

            TypeExpr::Terminal(name) => {
                let target = match terminal_target(name, node) {
                    Ok(t) => t,
                    Err(e) => return Some(e),
                };
                let schema = node.schema();
                if let Some(v) = schema.validators.get(name) {
                    return v(target);
                }
                if let Some(def) = schema.classes.get(name) {
                    let class = TypeExpr::Class {
                        name: name.clone(),
                        args: def.args.clone().map(Box::new),
                    };
                    return class.validate(target);
                }
                if let Some(proto) = schema.prototypes.get(name) {
                    return proto_validate(name, &proto.fields, target);
                }
                if schema.deserializers.contains_key(name) {
                    return None;
                }
                Some(node.error(format!("unknown type `{}`", name)))
            }

            TypeExpr::Alias { from, to } => {
                let schema = node.schema();
                if schema.is_user_supplied(from) {
                    if let Some(v) = schema.validators.get(from) {
                        return v(node);
                    }
                }
                TypeExpr::Terminal(to.clone()).validate(node)
            }

            TypeExpr::Class { name, args } => {
                let target = match class_target(name, node) {
                    Ok(t) => t,
                    Err(e) => return Some(e),
                };
                if !node.schema().classes.contains_key(name) {
                    return Some(node.error(format!("unknown class `{}`", name)));
                }
                let Some(args_node) = target.child(0) else {
                    return Some(target.error(format!("expected `{}` construction", self.signature())));
                };
                let signature = match args {
                    Some(a) => (**a).clone(),
                    None => TypeExpr::ArrayFixed {
                        types: Vec::new(),
                        label: FixedLabel::Arguments,
                    },
                };
                signature.validate(args_node)
            }
        }
    }

    /// Materializes `node` through this type.
    pub fn deserialize(&self, node: NodeRef<'_>) -> Result<Value, SemanticError> {
        match self {
            TypeExpr::Literal(v) => Ok(v.clone()),

            TypeExpr::Maybe(inner) => match node.raw_value() {
                Value::Null => Ok(Value::Null),
                Value::Undefined => Ok(Value::Undefined),
                _ => inner.deserialize(node),
            },

            TypeExpr::ArrayOf(inner) => {
                let arr = structural(node, NodeKind::Array).map_err(|at| {
                    at.error(format!("expected array of type `{}`", self.signature()))
                })?;
                let mut out = Vec::new();
                for elem in arr.children() {
                    out.push(inner.deserialize(elem)?);
                }
                Ok(Value::Array(out))
            }

            TypeExpr::ArrayFixed { types, label } => {
                let arr = structural(node, NodeKind::Array).map_err(|at| {
                    at.error(format!(
                        "expected {} of type `{}`",
                        label.noun(),
                        self.signature()
                    ))
                })?;
                let mut out = Vec::new();
                for (i, t) in types.iter().enumerate() {
                    match arr.child(i) {
                        Some(elem) => out.push(t.deserialize(elem)?),
                        None if t.is_maybe() => out.push(Value::Undefined),
                        None => {
                            return Err(arr.error(format!("missing {} {}", label.slot(), i)));
                        }
                    }
                }
                Ok(Value::Array(out))
            }

            TypeExpr::TObject { fields, proto } => {
                if *proto {
                    if let Some(fields) = fields {
                        return proto_deserialize(&construction_name(node), fields, node);
                    }
                }
                let obj = structural(node, NodeKind::Object).map_err(|at| {
                    at.error(format!("expected object of type `{}`", self.signature()))
                })?;
                match fields {
                    None => obj.value(),
                    Some(fields) => {
                        let pairs = index_pairs(obj);
                        let mut out = IndexMap::new();
                        for (key, t) in fields {
                            match pairs.get(key).and_then(|p| p.child(0)) {
                                Some(vnode) => {
                                    out.insert(key.clone(), t.deserialize(vnode)?);
                                }
                                None if t.is_maybe() => {}
                                None => {
                                    return Err(
                                        obj.error(format!("missing field `{}`", key))
                                    );
                                }
                            }
                        }
                        Ok(Value::Object(out))
                    }
                }
            }

            TypeExpr::OneOf { types, namespace } => {
                if let Some(ns) = namespace {
                    let schema = node.schema();
                    if schema.is_user_supplied(ns) {
                        if let Some(d) = schema.deserializers.get(ns) {
                            return d(node);
                        }
                    }
                }
                // The same ordered try that validation performed decides
                // which deserializer runs; no backtracking once chosen.
                let mut parts = Vec::new();
                for t in types {
                    match t.validate(node) {
                        None => return t.deserialize(node),
                        Some(e) => parts.push((t.signature(), e.simplified().to_string())),
                    }
                }
                Err(composed_error(node, "union", &self.signature(), &parts))
            }

            TypeExpr::Terminal(name) => {
                let target = terminal_target(name, node)?;
                let schema = node.schema();
                if let Some(d) = schema.deserializers.get(name) {
                    return d(target);
                }
                if let Some(def) = schema.classes.get(name) {
                    let class = TypeExpr::Class {
                        name: name.clone(),
                        args: def.args.clone().map(Box::new),
                    };
                    return class.deserialize(target);
                }
                if let Some(proto) = schema.prototypes.get(name) {
                    return proto_deserialize(name, &proto.fields, target);
                }
                Ok(target.raw_value())
            }

            TypeExpr::Alias { from, to } => {
                let schema = node.schema();
                if schema.is_user_supplied(from) {
                    if let Some(d) = schema.deserializers.get(from) {
                        return d(node);
                    }
                }
                TypeExpr::Terminal(to.clone()).deserialize(node)
            }

            TypeExpr::Class { name, args } => {
                let target = class_target(name, node)?;
                let schema = node.schema();
                let def = schema
                    .classes
                    .get(name)
                    .ok_or_else(|| node.error(format!("unknown class `{}`", name)))?;
                let args_node = target
                    .child(0)
                    .ok_or_else(|| target.error(format!("expected `{}` construction", name)))?;
                let mut arguments = Vec::new();
                if let Some(signature) = args {
                    if let TypeExpr::ArrayFixed { types, .. } = &**signature {
                        for (i, t) in types.iter().enumerate() {
                            match args_node.child(i) {
                                Some(elem) => arguments.push(t.deserialize(elem)?),
                                None if t.is_maybe() => arguments.push(Value::Undefined),
                                None => {
                                    return Err(
                                        args_node.error(format!("missing argument {}", i))
                                    );
                                }
                            }
                        }
                    } else if let Value::Array(vals) = signature.deserialize(args_node)? {
                        arguments = vals;
                    }
                }
                let construct = def.construct.clone();
                construct(target, arguments)
            }
        }
    }
}

/// Validates a `Name... {...}` construction against a prototype
/// template. Template fields whose type is a literal act as defaults
/// and may be omitted.
pub(crate) fn proto_validate(
    name: &str,
    fields: &IndexMap<String, TypeExpr>,
    node: NodeRef<'_>,
) -> Option<SemanticError> {
    let obj = match proto_body(name, node) {
        Ok(obj) => obj,
        Err(e) => return Some(e),
    };
    let signature = proto_signature(name, fields);
    let pairs = index_pairs(obj);
    let mut parts = Vec::new();
    for (key, t) in fields {
        match pairs.get(key).and_then(|p| p.child(0)) {
            Some(vnode) => match t.validate(vnode) {
                None => promote(vnode, t),
                Some(e) => parts.push((key.clone(), e.simplified().to_string())),
            },
            None => {
                if !t.is_maybe() && !matches!(t, TypeExpr::Literal(_)) {
                    parts.push((key.clone(), format!("missing field `{}`", key)));
                }
            }
        }
    }
    for key in pairs.keys() {
        if !fields.contains_key(key) {
            parts.push((key.clone(), format!("unknown field `{}`", key)));
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(composed_error(node, "prototype", &signature, &parts))
    }
}

/// Deserializes a `Name... {...}` construction: the document's fields
/// merge onto the template shape, literal template fields fill in as
/// defaults, and the result is a tagged instance.
pub(crate) fn proto_deserialize(
    name: &str,
    fields: &IndexMap<String, TypeExpr>,
    node: NodeRef<'_>,
) -> Result<Value, SemanticError> {
    let obj = proto_body(name, node)?;
    let pairs = index_pairs(obj);
    let mut merged = IndexMap::new();
    for (key, t) in fields {
        match pairs.get(key).and_then(|p| p.child(0)) {
            Some(vnode) => {
                merged.insert(key.clone(), t.deserialize(vnode)?);
            }
            None => {
                if let TypeExpr::Literal(default) = t {
                    merged.insert(key.clone(), default.clone());
                }
            }
        }
    }
    Ok(Value::Instance(Box::new(Instance {
        class: name.to_string(),
        value: Value::Object(merged),
    })))
}

/// Nominal tag a prototype construction is reported under: the node's
/// own tag when it has a user-visible one.
fn construction_name(node: NodeRef<'_>) -> String {
    let tag = node.type_name();
    if is_reserved_tag(&tag) {
        "proto".to_string()
    } else {
        tag
    }
}

fn proto_body<'a>(name: &str, node: NodeRef<'a>) -> Result<NodeRef<'a>, SemanticError> {
    let target = match node.kind() {
        NodeKind::Proto => node.child(0),
        NodeKind::Typed => node.child(0).filter(|c| c.kind() == NodeKind::Object),
        NodeKind::Object => Some(node),
        _ => None,
    };
    target.ok_or_else(|| node.error(format!("expected `{}... {{...}}` construction", name)))
}

fn proto_signature(name: &str, fields: &IndexMap<String, TypeExpr>) -> String {
    let inner = fields
        .iter()
        .map(|(k, t)| format!("{}: {}", k, t.signature()))
        .collect::<Vec<_>>()
        .join(", ");
    format!("{}... {{{}}}", name, inner)
}

/// Structural promotion: give an untagged member node the registry name
/// of the terminal type it validated against, so later lazy
/// materialization dispatches the matching deserializer.
fn promote(node: NodeRef<'_>, t: &TypeExpr) {
    match t {
        TypeExpr::Maybe(inner) => promote(node, inner),
        TypeExpr::Terminal(name) | TypeExpr::Alias { to: name, .. } => {
            let tag = node.type_name();
            if is_reserved_tag(&tag) && tag != ":document" {
                node.set_type_name(name);
            }
        }
        _ => {}
    }
}

/// Unwraps Typed envelopes down to the structural node and checks its
/// kind. On mismatch returns the node the diagnostic should point at.
fn structural<'a>(node: NodeRef<'a>, want: NodeKind) -> Result<NodeRef<'a>, NodeRef<'a>> {
    let mut cur = node;
    while cur.kind() == NodeKind::Typed {
        match cur.child(0) {
            Some(c) => cur = c,
            None => return Err(cur),
        }
    }
    if cur.kind() == want {
        Ok(cur)
    } else {
        Err(cur)
    }
}

/// Resolves the node a terminal reference dispatches on: the node
/// itself when untagged or tagged with the terminal's own name,
/// otherwise one Typed envelope is transparently unwrapped. A remaining
/// foreign tag is a mismatch.
fn terminal_target<'a>(name: &str, node: NodeRef<'a>) -> Result<NodeRef<'a>, SemanticError> {
    let tag = node.type_name();
    if is_reserved_tag(&tag) || tag == name {
        return Ok(node);
    }
    if node.kind() == NodeKind::Typed {
        if let Some(child) = node.child(0) {
            let ctag = child.type_name();
            if is_reserved_tag(&ctag) || ctag == name {
                return Ok(child);
            }
            return Err(child.error(format!("expected `{}`, found `{}`", name, ctag)));
        }
    }
    Err(node.error(format!("expected `{}`, found `{}`", name, tag)))
}

/// Resolves the Class construction node a nominal type dispatches on.
fn class_target<'a>(name: &str, node: NodeRef<'a>) -> Result<NodeRef<'a>, SemanticError> {
    let target = match node.kind() {
        NodeKind::Class => Some(node),
        NodeKind::Typed => node.child(0).filter(|c| c.kind() == NodeKind::Class),
        _ => None,
    };
    let target =
        target.ok_or_else(|| node.error(format!("expected `{}(...)` construction", name)))?;
    if target.type_name() != name {
        return Err(target.error(format!(
            "expected `{}(...)` construction, found `{}`",
            name,
            target.type_name()
        )));
    }
    Ok(target)
}

/// Pair children of an object node, keyed by field name; later
/// duplicates overwrite earlier ones.
fn index_pairs(obj: NodeRef<'_>) -> IndexMap<String, NodeRef<'_>> {
    let mut map = IndexMap::new();
    for pair in obj.children() {
        if let Some(k) = pair.key() {
            map.insert(k, pair);
        }
    }
    map
}

/// One composed error enumerating every failing sub-key with its
/// simplified message, plus the composite's signature.
fn composed_error(
    node: NodeRef<'_>,
    what: &str,
    signature: &str,
    parts: &[(String, String)],
) -> SemanticError {
    let mut message = format!("invalid {} of type `{}`", what, signature);
    for (key, sub) in parts {
        message.push_str(&format!("; {}: {}", key, sub));
    }
    node.error(message)
}
