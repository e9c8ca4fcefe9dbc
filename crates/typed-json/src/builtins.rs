//! Built-in registry entries: primitive kind checks, table-driven
//! bounded-integer and float validators, binary-array validators, the
//! primitive-tag deserializers, and the standard nominal classes.

use std::rc::Rc;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::SemanticError;
use crate::node::{NodeKind, NodeRef};
use crate::schema::{
    constructor_fn, deserializer_fn, validator_fn, ClassDef, ConstructFn, Schema,
};
use crate::types::{FixedLabel, TypeExpr};
use crate::value::{Instance, Value};

/// Bounded integer types: name, lower bound, upper bound.
const INT_RANGES: &[(&str, i128, i128)] = &[
    ("int8", -128, 127),
    ("uint8", 0, 255),
    ("int16", -32_768, 32_767),
    ("uint16", 0, 65_535),
    ("int32", -2_147_483_648, 2_147_483_647),
    ("uint32", 0, 4_294_967_295),
    ("int64", i64::MIN as i128, i64::MAX as i128),
    ("uint64", 0, u64::MAX as i128),
];

/// Fixed-width numeric array types and their element validators.
const BINARY_ARRAYS: &[(&str, &str)] = &[
    ("Int8Array", "int8"),
    ("Uint8Array", "uint8"),
    ("Int16Array", "int16"),
    ("Uint16Array", "uint16"),
    ("Int32Array", "int32"),
    ("Uint32Array", "uint32"),
    ("Float32Array", "float32"),
    ("Float64Array", "float64"),
];

fn bigint_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[-+]?\d+$").unwrap())
}

// ── Raw-value checks ─────────────────────────────────────────────────────

/// 64-bit integer types additionally accept an arbitrary-precision raw
/// value.
fn int_range_check(name: &str, lo: i128, hi: i128, allow_big: bool, v: &Value) -> Option<String> {
    let n = match v {
        Value::Int(i) => *i as i128,
        Value::Num(f) => {
            if f.fract() != 0.0 {
                return Some(format!("expected integral number for `{}`", name));
            }
            *f as i128
        }
        Value::BigInt(b) if allow_big => *b,
        _ => return Some(format!("expected number for `{}`", name)),
    };
    if n < lo || n > hi {
        return Some(format!("value {} out of `{}` range [{}, {}]", v, name, lo, hi));
    }
    None
}

fn float32_check(v: &Value) -> Option<String> {
    match v.as_f64() {
        Some(n) if n.is_finite() && n.abs() <= f32::MAX as f64 => None,
        Some(n) => Some(format!("value {} out of `float32` range", n)),
        None => Some("expected number for `float32`".to_string()),
    }
}

fn float64_check(v: &Value) -> Option<String> {
    match v.as_f64() {
        Some(_) => None,
        None => Some("expected number for `float64`".to_string()),
    }
}

fn element_check(elem_ty: &str, v: &Value) -> Option<String> {
    match elem_ty {
        "float32" => float32_check(v),
        "float64" => float64_check(v),
        _ => INT_RANGES
            .iter()
            .find(|(name, _, _)| *name == elem_ty)
            .and_then(|(name, lo, hi)| {
                int_range_check(name, *lo, *hi, name.ends_with("64"), v)
            }),
    }
}

fn is_bigint_raw(v: &Value) -> bool {
    match v {
        Value::BigInt(_) | Value::Int(_) => true,
        Value::Str(s) => bigint_pattern().is_match(s),
        _ => false,
    }
}

/// Single primitive-kind check against the raw value's host
/// representation.
fn kind_check(tag: &str, v: &Value) -> Option<String> {
    let ok = match tag {
        "string" => matches!(v, Value::Str(_)),
        "boolean" => matches!(v, Value::Bool(_)),
        "object" => matches!(v, Value::Object(_)),
        "array" => matches!(v, Value::Array(_)),
        "undefined" => matches!(v, Value::Undefined),
        "null" => matches!(v, Value::Null),
        "number" | "float" => v.is_numeric(),
        "int" => v.is_numeric() && v.is_integral(),
        "bigint" => is_bigint_raw(v),
        _ => false,
    };
    if ok {
        None
    } else {
        Some(format!("expected {}", tag))
    }
}

// ── Deserializer shapes ──────────────────────────────────────────────────

fn to_int(node: NodeRef<'_>) -> Result<Value, SemanticError> {
    match node.raw_value() {
        Value::Int(i) => Ok(Value::Int(i)),
        Value::Num(n) if n.fract() == 0.0 => Ok(Value::Int(n as i64)),
        Value::BigInt(b) => i64::try_from(b)
            .map(Value::Int)
            .map_err(|_| node.error("integer out of range")),
        _ => Err(node.error("expected integer")),
    }
}

fn to_bigint(node: NodeRef<'_>) -> Result<Value, SemanticError> {
    match node.raw_value() {
        Value::BigInt(b) => Ok(Value::BigInt(b)),
        Value::Int(i) => Ok(Value::BigInt(i as i128)),
        Value::Num(n) if n.fract() == 0.0 => Ok(Value::BigInt(n as i128)),
        Value::Str(s) if bigint_pattern().is_match(&s) => s
            .trim_start_matches('+')
            .parse::<i128>()
            .map(Value::BigInt)
            .map_err(|_| node.error("big integer out of range")),
        _ => Err(node.error("expected bigint")),
    }
}

fn to_float(node: NodeRef<'_>) -> Result<Value, SemanticError> {
    node.raw_value()
        .as_f64()
        .map(Value::Num)
        .ok_or_else(|| node.error("expected number"))
}

/// For binary arrays the Class form `Uint8Array([1, 2])` carries its
/// payload as a single array argument; the tagged form `Uint8Array [1, 2]`
/// carries it directly.
fn binary_payload(node: NodeRef<'_>) -> Value {
    if node.kind() == NodeKind::Class {
        if let Value::Array(args) = node.raw_value() {
            if args.len() == 1 && matches!(args[0], Value::Array(_)) {
                return args[0].clone();
            }
            return Value::Array(args);
        }
    }
    node.raw_value()
}

fn binary_validate(name: &str, elem_ty: &str, node: NodeRef<'_>) -> Option<SemanticError> {
    let Value::Array(elems) = binary_payload(node) else {
        return Some(node.error(format!("expected array for `{}`", name)));
    };
    let mut message = None::<String>;
    for (i, v) in elems.iter().enumerate() {
        if let Some(sub) = element_check(elem_ty, v) {
            let msg = message.get_or_insert_with(|| {
                format!("invalid `{}` of element type `{}`", name, elem_ty)
            });
            msg.push_str(&format!("; {}: {}", i, sub));
        }
    }
    message.map(|m| node.error(m))
}

fn binary_deserialize(name: &str, elem_ty: &str, node: NodeRef<'_>) -> Result<Value, SemanticError> {
    let Value::Array(elems) = binary_payload(node) else {
        return Err(node.error(format!("expected array for `{}`", name)));
    };
    if name == "Uint8Array" {
        let mut bytes = Vec::with_capacity(elems.len());
        for v in &elems {
            match v.as_f64() {
                Some(n) if n.fract() == 0.0 && (0.0..=255.0).contains(&n) => bytes.push(n as u8),
                _ => return Err(node.error("expected array of bytes for `Uint8Array`")),
            }
        }
        return Ok(Value::Bytes(bytes));
    }
    let float = matches!(elem_ty, "float32" | "float64");
    let mut out = Vec::with_capacity(elems.len());
    for v in &elems {
        let n = v
            .as_f64()
            .ok_or_else(|| node.error(format!("expected number elements for `{}`", name)))?;
        out.push(if float { Value::Num(n) } else { Value::Int(n as i64) });
    }
    Ok(Value::Instance(Box::new(Instance {
        class: name.to_string(),
        value: Value::Array(out),
    })))
}

// ── Installation ─────────────────────────────────────────────────────────

fn install_class(schema: &mut Schema, name: &str, args: Option<TypeExpr>, construct: ConstructFn) {
    schema
        .classes
        .insert(name.to_string(), ClassDef { args: args.clone(), construct });
    let texpr = Rc::new(TypeExpr::Class {
        name: name.to_string(),
        args: args.map(Box::new),
    });
    let v = texpr.clone();
    schema
        .validators
        .insert(name.to_string(), validator_fn(move |n| v.validate(n)));
    schema
        .deserializers
        .insert(name.to_string(), deserializer_fn(move |n| texpr.deserialize(n)));
}

fn one_arg(args: Vec<Value>) -> Value {
    args.into_iter().next().unwrap_or(Value::Undefined)
}

/// Installs every built-in entry into a fresh registry.
pub(crate) fn install(schema: &mut Schema) {
    // Bounded integers.
    for (name, lo, hi) in INT_RANGES {
        let allow_big = name.ends_with("64");
        schema.validators.insert(
            name.to_string(),
            validator_fn(move |n| {
                int_range_check(name, *lo, *hi, allow_big, &n.raw_value()).map(|m| n.error(m))
            }),
        );
        schema.deserializers.insert(
            name.to_string(),
            deserializer_fn(move |n| {
                if allow_big {
                    if let Value::BigInt(b) = n.raw_value() {
                        return Ok(Value::BigInt(b));
                    }
                }
                to_int(n)
            }),
        );
    }

    schema.validators.insert(
        "float32".to_string(),
        validator_fn(|n| float32_check(&n.raw_value()).map(|m| n.error(m))),
    );
    schema.validators.insert(
        "float64".to_string(),
        validator_fn(|n| float64_check(&n.raw_value()).map(|m| n.error(m))),
    );
    schema
        .deserializers
        .insert("float32".to_string(), deserializer_fn(to_float));
    schema
        .deserializers
        .insert("float64".to_string(), deserializer_fn(to_float));

    // Primitive kind checks.
    for tag in [
        "string",
        "boolean",
        "object",
        "array",
        "undefined",
        "null",
        "number",
        "int",
        "float",
        "bigint",
    ] {
        schema.validators.insert(
            tag.to_string(),
            validator_fn(move |n| kind_check(tag, &n.raw_value()).map(|m| n.error(m))),
        );
    }

    // Primitive materializers.
    schema
        .deserializers
        .insert("int".to_string(), deserializer_fn(to_int));
    schema
        .deserializers
        .insert("float".to_string(), deserializer_fn(to_float));
    schema.deserializers.insert(
        "number".to_string(),
        deserializer_fn(|n| match n.raw_value() {
            v @ (Value::Int(_) | Value::Num(_)) => Ok(v),
            _ => Err(n.error("expected number")),
        }),
    );
    schema.deserializers.insert(
        "string".to_string(),
        deserializer_fn(|n| match n.raw_value() {
            Value::Str(s) => Ok(Value::Str(s)),
            _ => Err(n.error("expected string")),
        }),
    );
    schema.deserializers.insert(
        "boolean".to_string(),
        deserializer_fn(|n| match n.raw_value() {
            Value::Bool(b) => Ok(Value::Bool(b)),
            _ => Err(n.error("expected boolean")),
        }),
    );
    schema
        .deserializers
        .insert("bigint".to_string(), deserializer_fn(to_bigint));
    schema.deserializers.insert(
        "null".to_string(),
        deserializer_fn(|n| match n.raw_value() {
            Value::Null => Ok(Value::Null),
            _ => Err(n.error("expected null")),
        }),
    );
    schema.deserializers.insert(
        "undefined".to_string(),
        deserializer_fn(|n| match n.raw_value() {
            Value::Undefined => Ok(Value::Undefined),
            _ => Err(n.error("expected undefined")),
        }),
    );

    // Document root passthrough; schema documents may override it.
    schema.deserializers.insert(
        ":document".to_string(),
        deserializer_fn(|n| match n.payload() {
            Some(c) => c.value(),
            None => Ok(Value::Undefined),
        }),
    );

    // Binary arrays: registry entries plus nominal class membership.
    for (name, elem_ty) in BINARY_ARRAYS {
        schema.validators.insert(
            name.to_string(),
            validator_fn(move |n| binary_validate(name, elem_ty, n)),
        );
        schema.deserializers.insert(
            name.to_string(),
            deserializer_fn(move |n| binary_deserialize(name, elem_ty, n)),
        );
        schema.classes.insert(
            name.to_string(),
            ClassDef {
                args: None,
                construct: constructor_fn(move |n, _args| binary_deserialize(name, elem_ty, n)),
            },
        );
    }

    // Standard nominal classes.
    install_class(
        schema,
        "date",
        Some(TypeExpr::ArrayFixed {
            types: vec![TypeExpr::Terminal("string".to_string())],
            label: FixedLabel::Arguments,
        }),
        constructor_fn(|_n, args| {
            Ok(Value::Instance(Box::new(Instance {
                class: "date".to_string(),
                value: one_arg(args),
            })))
        }),
    );
    install_class(
        schema,
        "map",
        Some(TypeExpr::ArrayFixed {
            types: vec![TypeExpr::Maybe(Box::new(TypeExpr::Terminal(
                "object".to_string(),
            )))],
            label: FixedLabel::Arguments,
        }),
        constructor_fn(|_n, args| {
            let entries = match one_arg(args) {
                Value::Object(map) => Value::Object(map),
                _ => Value::Object(Default::default()),
            };
            Ok(Value::Instance(Box::new(Instance {
                class: "map".to_string(),
                value: entries,
            })))
        }),
    );
    install_class(
        schema,
        "set",
        Some(TypeExpr::ArrayFixed {
            types: vec![TypeExpr::Maybe(Box::new(TypeExpr::Terminal(
                "array".to_string(),
            )))],
            label: FixedLabel::Arguments,
        }),
        constructor_fn(|_n, args| {
            let items = match one_arg(args) {
                Value::Array(items) => Value::Array(items),
                _ => Value::Array(Vec::new()),
            };
            Ok(Value::Instance(Box::new(Instance {
                class: "set".to_string(),
                value: items,
            })))
        }),
    );
}
