//! Schema registry: the five extensible, string-keyed dispatch tables
//! consulted by every node of one document.
//!
//! Each table honors a reserved `"*"` wildcard key. A schema is built
//! once, by [`create_schema`] or the bootstrap, and is read-only for
//! the lifetime of the documents processed under it.

use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::builtins;
use crate::error::SemanticError;
use crate::node::NodeRef;
use crate::types::TypeExpr;
use crate::value::{Instance, Value};

/// Deserializer hook: node to final materialized value.
pub type DeserializeFn = Rc<dyn Fn(NodeRef<'_>) -> Result<Value, SemanticError>>;

/// Validator hook: returns `None` when the node is acceptable.
pub type ValidateFn = Rc<dyn Fn(NodeRef<'_>) -> Option<SemanticError>>;

/// Preprocessor hook: runs once per node before validation, for side
/// effects only.
pub type PreprocessFn = Rc<dyn Fn(NodeRef<'_>)>;

/// Class constructor: builds the final instance from the validated,
/// deserialized argument list.
pub type ConstructFn = Rc<dyn Fn(NodeRef<'_>, Vec<Value>) -> Result<Value, SemanticError>>;

/// Wraps a closure as a [`DeserializeFn`] table entry.
pub fn deserializer_fn(
    f: impl Fn(NodeRef<'_>) -> Result<Value, SemanticError> + 'static,
) -> DeserializeFn {
    Rc::new(f)
}

/// Wraps a closure as a [`ValidateFn`] table entry.
pub fn validator_fn(f: impl Fn(NodeRef<'_>) -> Option<SemanticError> + 'static) -> ValidateFn {
    Rc::new(f)
}

/// Wraps a closure as a [`PreprocessFn`] table entry.
pub fn preprocessor_fn(f: impl Fn(NodeRef<'_>) + 'static) -> PreprocessFn {
    Rc::new(f)
}

/// Wraps a closure as a [`ConstructFn`].
pub fn constructor_fn(
    f: impl Fn(NodeRef<'_>, Vec<Value>) -> Result<Value, SemanticError> + 'static,
) -> ConstructFn {
    Rc::new(f)
}

/// Constructor contract of a nominal class.
#[derive(Clone)]
pub struct ClassDef {
    /// Positional argument signature (an `ArrayFixed`); `None` means
    /// zero arguments.
    pub args: Option<TypeExpr>,
    pub construct: ConstructFn,
}

impl ClassDef {
    /// Class whose constructor produces a tagged [`Instance`] holding
    /// the argument list.
    pub fn plain(name: &str, args: Option<TypeExpr>) -> ClassDef {
        let class = name.to_string();
        ClassDef {
            args,
            construct: constructor_fn(move |_node, arguments| {
                Ok(Value::Instance(Box::new(Instance {
                    class: class.clone(),
                    value: Value::Array(arguments),
                })))
            }),
        }
    }
}

impl fmt::Debug for ClassDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassDef").field("args", &self.args).finish()
    }
}

/// Prototype template: field name to declared type, in declaration
/// order. A document's `Name... {...}` object merges onto this shape.
#[derive(Clone, Debug, Default)]
pub struct ProtoDef {
    pub fields: IndexMap<String, TypeExpr>,
}

/// The registry. All five tables are open and string-keyed; `"*"` in
/// any of them acts as the fallback for names without a specific entry.
#[derive(Clone, Default)]
pub struct Schema {
    pub classes: IndexMap<String, ClassDef>,
    pub prototypes: IndexMap<String, ProtoDef>,
    pub deserializers: IndexMap<String, DeserializeFn>,
    pub validators: IndexMap<String, ValidateFn>,
    pub preprocessors: IndexMap<String, PreprocessFn>,
    user_supplied: HashSet<String>,
}

impl Schema {
    /// True when `name` was supplied by the caller as an override rather
    /// than generated from a schema document or installed as a built-in.
    pub fn is_user_supplied(&self, name: &str) -> bool {
        self.user_supplied.contains(name)
    }

    pub(crate) fn mark_user_supplied(&mut self, name: &str) {
        self.user_supplied.insert(name.to_string());
    }

    /// True when `name` has an exact entry in any of the
    /// classes/prototypes/deserializers/validators tables.
    pub fn contains_type(&self, name: &str) -> bool {
        self.classes.contains_key(name)
            || self.prototypes.contains_key(name)
            || self.deserializers.contains_key(name)
            || self.validators.contains_key(name)
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("classes", &self.classes.keys().collect::<Vec<_>>())
            .field("prototypes", &self.prototypes.keys().collect::<Vec<_>>())
            .field(
                "deserializers",
                &self.deserializers.keys().collect::<Vec<_>>(),
            )
            .field("validators", &self.validators.keys().collect::<Vec<_>>())
            .field(
                "preprocessors",
                &self.preprocessors.keys().collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Caller-supplied registry entries, merged over the built-ins by
/// [`create_schema`]. Override functions must be reentrant-safe and
/// must not retain per-call state.
#[derive(Clone, Default)]
pub struct SchemaOverrides {
    pub classes: IndexMap<String, ClassDef>,
    pub prototypes: IndexMap<String, ProtoDef>,
    pub deserializers: IndexMap<String, DeserializeFn>,
    pub validators: IndexMap<String, ValidateFn>,
    pub preprocessors: IndexMap<String, PreprocessFn>,
}

/// Builds a fresh registry: the built-in primitive, bounded-integer and
/// binary-array entries plus the standard nominal classes, merged with
/// `overrides` (overrides win and are remembered as user-supplied).
pub fn create_schema(overrides: SchemaOverrides) -> Rc<Schema> {
    let mut schema = Schema::default();
    builtins::install(&mut schema);
    for (k, v) in overrides.classes {
        schema.mark_user_supplied(&k);
        schema.classes.insert(k, v);
    }
    for (k, v) in overrides.prototypes {
        schema.mark_user_supplied(&k);
        schema.prototypes.insert(k, v);
    }
    for (k, v) in overrides.deserializers {
        schema.mark_user_supplied(&k);
        schema.deserializers.insert(k, v);
    }
    for (k, v) in overrides.validators {
        schema.mark_user_supplied(&k);
        schema.validators.insert(k, v);
    }
    for (k, v) in overrides.preprocessors {
        schema.mark_user_supplied(&k);
        schema.preprocessors.insert(k, v);
    }
    Rc::new(schema)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_schema_carries_builtins() {
        let s = create_schema(SchemaOverrides::default());
        for name in ["int8", "uint64", "float32", "string", "bigint"] {
            assert!(s.validators.contains_key(name), "missing validator {}", name);
        }
        for name in ["int", "float", "bigint", ":document"] {
            assert!(
                s.deserializers.contains_key(name),
                "missing deserializer {}",
                name
            );
        }
        for name in ["date", "map", "set", "Uint8Array"] {
            assert!(s.classes.contains_key(name), "missing class {}", name);
        }
        assert!(!s.is_user_supplied("int8"));
    }

    #[test]
    fn overrides_replace_builtins_and_are_marked() {
        let mut overrides = SchemaOverrides::default();
        overrides.deserializers.insert(
            "int".into(),
            deserializer_fn(|_| Ok(Value::Str("custom".into()))),
        );
        let s = create_schema(overrides);
        assert!(s.is_user_supplied("int"));
        assert!(!s.is_user_supplied("float"));
    }
}
