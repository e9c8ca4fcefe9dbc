//! Schema bootstrap: the meta-schema under which schema documents are
//! parsed with the ordinary node/value machinery.
//!
//! Its deserializers emit type-algebra objects instead of plain values;
//! the `schema` deserializer assembles those into a new registry. Built
//! fresh per `parse_schema` call: the hooks capture the per-call
//! known-types set and the caller's base schema.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::error::SemanticError;
use crate::node::{is_reserved_tag, NodeKind, NodeRef};
use crate::schema::{
    deserializer_fn, preprocessor_fn, validator_fn, ClassDef, ProtoDef, Schema, ValidateFn,
};
use crate::types::{proto_deserialize, proto_validate, FixedLabel, TypeExpr};
use crate::value::Value;

type Known = Rc<RefCell<HashSet<String>>>;

/// Builds the meta-schema that turns a schema document into a
/// [`Schema`], layered over `base` (whose user-supplied entries always
/// win over generated ones).
pub fn bootstrap_schema(base: Rc<Schema>) -> Rc<Schema> {
    let known: Known = Rc::new(RefCell::new(HashSet::new()));
    let mut s = Schema::default();

    install_preprocessors(&mut s, &known);
    install_validators(&mut s, &known, &base);
    install_deserializers(&mut s, &known, &base);

    Rc::new(s)
}

// ── Structural helpers ───────────────────────────────────────────────────

/// Key of the nearest enclosing Pair: the namespace a declaration is
/// made under, used to name anonymous nested types.
fn namespace_of(node: NodeRef<'_>) -> Option<String> {
    let mut cur = node.parent();
    while let Some(n) = cur {
        if n.kind() == NodeKind::Pair {
            return n.key();
        }
        cur = n.parent();
    }
    None
}

/// True for a Pair declared directly inside the `schema {...}` body.
fn is_top_level_decl(pair: NodeRef<'_>) -> bool {
    let Some(obj) = pair.parent() else {
        return false;
    };
    if obj.kind() != NodeKind::Object {
        return false;
    }
    matches!(
        obj.parent(),
        Some(p) if p.kind() == NodeKind::Typed && p.type_name() == "schema"
    )
}

/// `class`/`proto` declarations are permitted only at the schema's top
/// level or as direct members of a top-level `oneOf`.
fn placement_error(node: NodeRef<'_>, what: &str) -> Option<SemanticError> {
    let misplaced = || {
        Some(node.error(format!(
            "`{}` declarations are only permitted at the top level of a schema",
            what
        )))
    };
    let Some(parent) = node.parent() else {
        return misplaced();
    };
    let pair = match parent.kind() {
        NodeKind::Pair => parent,
        NodeKind::Array => {
            let Some(union) = parent
                .parent()
                .filter(|u| u.kind() == NodeKind::Typed && u.type_name() == "oneOf")
            else {
                return misplaced();
            };
            match union.parent() {
                Some(p) if p.kind() == NodeKind::Pair => p,
                _ => return misplaced(),
            }
        }
        _ => return misplaced(),
    };
    if !is_top_level_decl(pair) {
        return misplaced();
    }
    match pair.key() {
        Some(key) if is_reserved_tag(&key) => Some(node.error(format!(
            "`{}` cannot be declared under reserved name `{}`",
            what, key
        ))),
        Some(_) => None,
        None => misplaced(),
    }
}

/// Child node's value must be a type-algebra object.
fn child_type(node: NodeRef<'_>) -> Result<TypeExpr, SemanticError> {
    let Some(child) = node.payload() else {
        return Err(node.error(format!("`{}` requires an inner type", node.type_name())));
    };
    type_of(child)
}

/// Shapes a deserialized schema-document value into a type descriptor.
/// A bare array literal in type position is a positional tuple; a bare
/// object literal is a structural object.
fn coerce_type(value: &Value) -> Option<TypeExpr> {
    match value {
        Value::Type(t) => Some((**t).clone()),
        Value::Array(items) => {
            let mut types = Vec::new();
            for item in items {
                types.push(coerce_type(item)?);
            }
            Some(TypeExpr::ArrayFixed {
                types,
                label: FixedLabel::Array,
            })
        }
        Value::Object(map) => {
            let mut fields = IndexMap::new();
            for (key, item) in map {
                fields.insert(key.clone(), coerce_type(item)?);
            }
            Some(TypeExpr::TObject {
                fields: Some(fields),
                proto: false,
            })
        }
        _ => None,
    }
}

fn type_of(node: NodeRef<'_>) -> Result<TypeExpr, SemanticError> {
    let value = node.value()?;
    coerce_type(&value).ok_or_else(|| {
        node.error(format!(
            "expected a type expression, found {}",
            value.kind_name()
        ))
    })
}

// ── Preprocessors ────────────────────────────────────────────────────────

fn install_preprocessors(s: &mut Schema, known: &Known) {
    // Record every top-level declared key before validation runs, so
    // forward and mutual references resolve.
    let k = known.clone();
    s.preprocessors.insert(
        ":pair".to_string(),
        preprocessor_fn(move |n| {
            if is_top_level_decl(n) {
                if let Some(key) = n.key() {
                    k.borrow_mut().insert(key);
                }
            }
        }),
    );
}

// ── Validators (authoring rules) ─────────────────────────────────────────

fn install_validators(s: &mut Schema, known: &Known, base: &Rc<Schema>) {
    s.validators.insert(
        ":document".to_string(),
        validator_fn(|n| match n.payload() {
            Some(c) if c.kind() == NodeKind::Typed && c.type_name() == "schema" => None,
            Some(c) => {
                Some(c.error("schema document root must be a single `schema {...}` clause"))
            }
            None => Some(n.error("schema document root must be a single `schema {...}` clause")),
        }),
    );

    s.validators.insert(
        "schema".to_string(),
        validator_fn(|n| {
            for a in n.ancestors() {
                if a.kind() == NodeKind::Typed && a.type_name() == "schema" {
                    return Some(n.error("`schema` blocks cannot nest"));
                }
            }
            match n.payload() {
                Some(c) if c.kind() == NodeKind::Object => None,
                _ => Some(n.error("`schema` requires an object body")),
            }
        }),
    );

    s.validators.insert(
        "maybe".to_string(),
        validator_fn(|n| match n.payload() {
            Some(_) => None,
            None => Some(n.error("`maybe` requires an inner type")),
        }),
    );

    s.validators.insert(
        "arrayOf".to_string(),
        validator_fn(|n| match n.payload() {
            Some(_) => None,
            None => Some(n.error("`arrayOf` requires an element type")),
        }),
    );

    s.validators.insert(
        "oneOf".to_string(),
        validator_fn(|n| match n.payload() {
            Some(c) if c.kind() == NodeKind::Array && !c.children().is_empty() => None,
            _ => Some(n.error("`oneOf` requires a non-empty array of alternatives")),
        }),
    );

    s.validators.insert(
        "object".to_string(),
        validator_fn(|n| match n.payload() {
            None => None,
            Some(c) if c.kind() == NodeKind::Object => None,
            Some(c) => Some(c.error("`object` requires an object body")),
        }),
    );

    s.validators.insert(
        "class".to_string(),
        validator_fn(|n| {
            if let Some(e) = placement_error(n, "class") {
                return Some(e);
            }
            match n.payload() {
                None => None,
                Some(c) if c.kind() == NodeKind::Array => None,
                Some(c) => Some(c.error("`class` takes an array of argument types")),
            }
        }),
    );

    s.validators.insert(
        "proto".to_string(),
        validator_fn(|n| {
            if let Some(e) = placement_error(n, "proto") {
                return Some(e);
            }
            match n.payload() {
                Some(c) if c.kind() == NodeKind::Object => None,
                _ => Some(n.error("`proto` requires an object body")),
            }
        }),
    );

    // Every other non-reserved tag is a reference to a declared or
    // base-schema type; reject unresolvable names during validation.
    let k = known.clone();
    let b = base.clone();
    s.validators.insert(
        "*".to_string(),
        validator_fn(move |n| {
            let t = n.type_name();
            if k.borrow().contains(&t) || b.contains_type(&t) {
                None
            } else {
                Some(n.error(format!("unknown type `{}`", t)))
            }
        }),
    );
}

// ── Deserializers (type-algebra emission) ────────────────────────────────

fn install_deserializers(s: &mut Schema, known: &Known, base: &Rc<Schema>) {
    s.deserializers.insert(
        ":document".to_string(),
        deserializer_fn(|n| match n.payload() {
            Some(c) => c.value(),
            None => Err(n.error("schema document root must be a single `schema {...}` clause")),
        }),
    );

    s.deserializers.insert(
        "maybe".to_string(),
        deserializer_fn(|n| {
            let inner = child_type(n)?;
            Ok(Value::Type(Rc::new(TypeExpr::Maybe(Box::new(inner)))))
        }),
    );

    s.deserializers.insert(
        "arrayOf".to_string(),
        deserializer_fn(|n| {
            let inner = child_type(n)?;
            Ok(Value::Type(Rc::new(TypeExpr::ArrayOf(Box::new(inner)))))
        }),
    );

    s.deserializers.insert(
        "oneOf".to_string(),
        deserializer_fn(|n| {
            let Some(arr) = n.payload().filter(|c| c.kind() == NodeKind::Array) else {
                return Err(n.error("`oneOf` requires a non-empty array of alternatives"));
            };
            let mut types = Vec::new();
            for elem in arr.children() {
                types.push(type_of(elem)?);
            }
            Ok(Value::Type(Rc::new(TypeExpr::OneOf {
                types,
                namespace: namespace_of(n),
            })))
        }),
    );

    s.deserializers.insert(
        "class".to_string(),
        deserializer_fn(|n| {
            let name = namespace_of(n)
                .ok_or_else(|| n.error("`class` declarations require a declaration key"))?;
            let args = match n.payload() {
                Some(arr) => {
                    let mut types = Vec::new();
                    for elem in arr.children() {
                        types.push(type_of(elem)?);
                    }
                    Some(Box::new(TypeExpr::ArrayFixed {
                        types,
                        label: FixedLabel::Arguments,
                    }))
                }
                None => None,
            };
            Ok(Value::Type(Rc::new(TypeExpr::Class { name, args })))
        }),
    );

    s.deserializers.insert(
        "proto".to_string(),
        deserializer_fn(|n| {
            let fields = object_fields(n, "proto")?;
            Ok(Value::Type(Rc::new(TypeExpr::TObject {
                fields: Some(fields),
                proto: true,
            })))
        }),
    );

    s.deserializers.insert(
        "object".to_string(),
        deserializer_fn(|n| {
            let fields = match n.payload() {
                None => None,
                Some(_) => Some(object_fields(n, "object")?),
            };
            Ok(Value::Type(Rc::new(TypeExpr::TObject {
                fields,
                proto: false,
            })))
        }),
    );

    // Primitive nodes become literal constants; any other unmatched tag
    // is a reference to a declared or base-schema name.
    let k = known.clone();
    let b = base.clone();
    s.deserializers.insert(
        "*".to_string(),
        deserializer_fn(move |n| {
            if n.kind() == NodeKind::Primitive {
                return Ok(Value::Type(Rc::new(TypeExpr::Literal(n.raw_value()))));
            }
            let t = n.type_name();
            if b.contains_type(&t) {
                Ok(Value::Type(Rc::new(TypeExpr::Terminal(t))))
            } else if k.borrow().contains(&t) {
                let from = namespace_of(n).unwrap_or_else(|| t.clone());
                Ok(Value::Type(Rc::new(TypeExpr::Alias { from, to: t })))
            } else {
                Err(n.error(format!("unknown type `{}`", t)))
            }
        }),
    );

    let assemble_base = base.clone();
    s.deserializers.insert(
        "schema".to_string(),
        deserializer_fn(move |n| {
            let Some(obj) = n.payload().filter(|c| c.kind() == NodeKind::Object) else {
                return Err(n.error("`schema` requires an object body"));
            };
            let decls = match obj.value()? {
                Value::Object(map) => map,
                _ => return Err(obj.error("`schema` requires an object body")),
            };
            let mut out = (*assemble_base).clone();
            for (name, decl) in decls {
                let Some(texpr) = coerce_type(&decl) else {
                    return Err(
                        obj.error(format!("declaration `{}` is not a type expression", name))
                    );
                };
                if let TypeExpr::Alias { to, .. } = &texpr {
                    if *to == name {
                        return Err(obj.error(format!("alias `{}` refers to itself", name)));
                    }
                }
                install_generated(&mut out, &assemble_base, &name, Rc::new(texpr));
            }
            Ok(Value::Schema(Rc::new(out)))
        }),
    );
}

/// Merges one declared type into the output registry. Explicit
/// user-supplied overrides from the base schema always win over
/// generated entries; class declarations compose with a user validator
/// (argument checking first).
fn install_generated(out: &mut Schema, base: &Rc<Schema>, name: &str, texpr: Rc<TypeExpr>) {
    let user_validator: Option<ValidateFn> = if base.is_user_supplied(name) {
        base.validators.get(name).cloned()
    } else {
        None
    };
    let user_deserializer = base.is_user_supplied(name) && base.deserializers.contains_key(name);

    match &*texpr {
        TypeExpr::Class {
            name: class_name,
            args,
        } => {
            if !base.is_user_supplied(class_name) {
                out.classes.insert(
                    class_name.clone(),
                    ClassDef::plain(class_name, args.as_deref().cloned()),
                );
            }
        }
        // Class/proto members of a top-level union still claim their
        // nominal table slots; dispatch stays with the union entry.
        TypeExpr::OneOf { types, .. } => {
            for member in types {
                match member {
                    TypeExpr::Class {
                        name: class_name,
                        args,
                    } => {
                        if !base.is_user_supplied(class_name) {
                            out.classes.insert(
                                class_name.clone(),
                                ClassDef::plain(class_name, args.as_deref().cloned()),
                            );
                        }
                    }
                    TypeExpr::TObject {
                        proto: true,
                        fields: Some(member_fields),
                    } => {
                        if !base.is_user_supplied(name) {
                            out.prototypes.insert(
                                name.to_string(),
                                ProtoDef {
                                    fields: member_fields.clone(),
                                },
                            );
                        }
                    }
                    _ => {}
                }
            }
        }
        TypeExpr::TObject {
            proto: true,
            fields: Some(fields),
        } => {
            if !base.is_user_supplied(name) {
                out.prototypes.insert(
                    name.to_string(),
                    ProtoDef {
                        fields: fields.clone(),
                    },
                );
            }
            if user_validator.is_none() {
                let proto_name = name.to_string();
                let proto_fields = fields.clone();
                out.validators.insert(
                    name.to_string(),
                    validator_fn(move |n| proto_validate(&proto_name, &proto_fields, n)),
                );
            }
            if !user_deserializer {
                let proto_name = name.to_string();
                let proto_fields = fields.clone();
                out.deserializers.insert(
                    name.to_string(),
                    deserializer_fn(move |n| proto_deserialize(&proto_name, &proto_fields, n)),
                );
            }
            return;
        }
        _ => {}
    }

    let validator_expr = texpr.clone();
    if matches!(&*texpr, TypeExpr::Class { .. }) {
        // Argument-signature checking always runs; a user validator for
        // the class name runs after it.
        out.validators.insert(
            name.to_string(),
            validator_fn(move |n| {
                validator_expr
                    .validate(n)
                    .or_else(|| user_validator.as_ref().and_then(|f| f(n)))
            }),
        );
    } else if user_validator.is_none() {
        out.validators.insert(
            name.to_string(),
            validator_fn(move |n| validator_expr.validate(n)),
        );
    }

    if !user_deserializer {
        let deserializer_expr = texpr;
        out.deserializers.insert(
            name.to_string(),
            deserializer_fn(move |n| deserializer_expr.deserialize(n)),
        );
    }
}

/// Collects an object body's pairs into a field → type map.
fn object_fields(
    n: NodeRef<'_>,
    what: &str,
) -> Result<IndexMap<String, TypeExpr>, SemanticError> {
    let Some(obj) = n.payload().filter(|c| c.kind() == NodeKind::Object) else {
        return Err(n.error(format!("`{}` requires an object body", what)));
    };
    let mut fields = IndexMap::new();
    for pair in obj.children() {
        let Some(key) = pair.key() else { continue };
        let Some(vnode) = pair.child(0) else { continue };
        fields.insert(key, type_of(vnode)?);
    }
    Ok(fields)
}
