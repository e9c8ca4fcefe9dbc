//! [`Value`] — the host value type for parsed documents.
//!
//! Covers every representation the document language can materialize:
//! JSON-like primitives, `undefined`, big integers, regular expressions,
//! raw template strings, binary data, ordered objects, nominal instances,
//! and the engine-internal type-algebra and schema results.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::schema::Schema;
use crate::types::TypeExpr;

/// Universal host value.
///
/// Big integers are two's-complement `i128`; integral number literals
/// materialize as `Int`, all other numbers as `Num`.
#[derive(Debug, Clone)]
pub enum Value {
    /// `undefined` (distinct from `null`).
    Undefined,
    /// `null`.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Safe integer (fits in i64).
    Int(i64),
    /// Floating-point number.
    Num(f64),
    /// Arbitrary-precision integer (two's complement).
    BigInt(i128),
    /// String.
    Str(String),
    /// Regular-expression literal, as written (`/pat/flags`).
    Regex(String),
    /// Raw template string.
    Template(String),
    /// Binary data.
    Bytes(Vec<u8>),
    /// Ordered sequence.
    Array(Vec<Value>),
    /// Ordered key-value mapping.
    Object(IndexMap<String, Value>),
    /// Result of a nominal construction.
    Instance(Box<Instance>),
    /// Type-algebra object; produced only while interpreting a schema document.
    Type(Rc<TypeExpr>),
    /// Assembled schema registry; the value of a `schema {...}` clause.
    Schema(Rc<Schema>),
}

/// Nominal construction result: the declared class tag plus the
/// constructed payload (argument list or merged field mapping).
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    pub class: String,
    pub value: Value,
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) => true,
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Num(a), Value::Num(b)) => a == b,
            (Value::BigInt(a), Value::BigInt(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Regex(a), Value::Regex(b)) => a == b,
            (Value::Template(a), Value::Template(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::Instance(a), Value::Instance(b)) => a == b,
            (Value::Type(a), Value::Type(b)) => Rc::ptr_eq(a, b),
            (Value::Schema(a), Value::Schema(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Value {
    /// Host kind name, as used in diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) | Value::Num(_) => "number",
            Value::BigInt(_) => "bigint",
            Value::Str(_) => "string",
            Value::Regex(_) => "regexp",
            Value::Template(_) => "template",
            Value::Bytes(_) => "bytes",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Instance(_) => "instance",
            Value::Type(_) => "type",
            Value::Schema(_) => "schema",
        }
    }

    /// Numeric view spanning `Int` and `Num`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Num(n) => Some(*n),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Num(_))
    }

    /// True for `Int`, `BigInt`, and `Num` with no fractional part.
    pub fn is_integral(&self) -> bool {
        match self {
            Value::Int(_) | Value::BigInt(_) => true,
            Value::Num(n) => n.fract() == 0.0,
            _ => false,
        }
    }

    /// Value equality that compares numbers across `Int`/`Num`/`BigInt`.
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Num(b)) | (Value::Num(b), Value::Int(a)) => *a as f64 == *b,
            (Value::Int(a), Value::BigInt(b)) | (Value::BigInt(b), Value::Int(a)) => {
                *a as i128 == *b
            }
            _ => self == other,
        }
    }
}

impl fmt::Display for Value {
    /// Literal-style rendering, used in type signatures and diagnostics.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Num(n) => write!(f, "{}", n),
            Value::BigInt(i) => write!(f, "{}n", i),
            Value::Str(s) => write!(f, "{:?}", s),
            Value::Regex(r) => write!(f, "{}", r),
            Value::Template(t) => write!(f, "`{}`", t),
            Value::Bytes(b) => write!(f, "bytes[{}]", b.len()),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, v) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "]")
            }
            Value::Object(map) => {
                write!(f, "{{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
            Value::Instance(inst) => write!(f, "{}({})", inst.class, inst.value),
            Value::Type(t) => write!(f, "{}", t.signature()),
            Value::Schema(_) => write!(f, "schema"),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else if let Some(u) = n.as_u64() {
                    Value::BigInt(u as i128)
                } else {
                    Value::Num(n.as_f64().unwrap_or(0.0))
                }
            }
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Array(arr) => {
                Value::Array(arr.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(obj) => {
                Value::Object(obj.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<Value> for serde_json::Value {
    /// Lossy conversion: `undefined` becomes `null`, regexes and
    /// templates become strings, binary data becomes a number array,
    /// instances become `{class, value}` objects, and engine-internal
    /// values become `null`.
    fn from(v: Value) -> Self {
        match v {
            Value::Undefined | Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::Int(i) => serde_json::json!(i),
            Value::Num(n) => serde_json::Number::from_f64(n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::BigInt(i) => {
                if let Ok(small) = i64::try_from(i) {
                    serde_json::json!(small)
                } else {
                    serde_json::Value::String(i.to_string())
                }
            }
            Value::Str(s) | Value::Regex(s) | Value::Template(s) => serde_json::Value::String(s),
            Value::Bytes(b) => {
                serde_json::Value::Array(b.into_iter().map(|x| serde_json::json!(x)).collect())
            }
            Value::Array(arr) => {
                serde_json::Value::Array(arr.into_iter().map(serde_json::Value::from).collect())
            }
            Value::Object(map) => serde_json::Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k, serde_json::Value::from(v)))
                    .collect(),
            ),
            Value::Instance(inst) => serde_json::json!({
                "class": inst.class,
                "value": serde_json::Value::from(inst.value),
            }),
            Value::Type(_) | Value::Schema(_) => serde_json::Value::Null,
        }
    }
}
