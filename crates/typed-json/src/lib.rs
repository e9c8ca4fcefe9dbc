//! typed-json — schema validation and value materialization for a typed
//! superset of JSON.
//!
//! # Overview
//!
//! Documents are JSON-like values where any value may carry an inline
//! type tag (`int 5`, `bigint "123"`, `Point... {x: 1}`, `date("...")`).
//! A schema is itself a document: it is parsed with the same node/value
//! machinery under a bootstrap meta-schema whose deserializers emit
//! type-algebra objects, assembled into a new registry.
//!
//! The pipeline for every entry point is: parse the source into a node
//! tree, run the preprocessing pass, validate the whole tree eagerly,
//! then read the root's lazily-materialized value.
//!
//! # Example
//!
//! ```
//! use typed_json::{parse_schema, parse_with_schema, Value};
//!
//! let schema = parse_schema(r#"schema { X: maybe oneOf [bigint, number] }"#).unwrap();
//! assert_eq!(
//!     parse_with_schema(r#"X bigint "123""#, &schema, None).unwrap(),
//!     Value::BigInt(123),
//! );
//! assert_eq!(
//!     parse_with_schema("X null", &schema, None).unwrap(),
//!     Value::Null,
//! );
//! ```

pub mod bootstrap;
pub mod builtins;
pub mod error;
pub mod node;
pub mod parser;
pub mod schema;
pub mod types;
pub mod value;

pub use bootstrap::bootstrap_schema;
pub use error::{Error, SemanticError, SyntaxError};
pub use node::{Document, NodeId, NodeKind, NodeRef, Span};
pub use parser::Parser;
pub use schema::{
    constructor_fn, create_schema, deserializer_fn, preprocessor_fn, validator_fn, ClassDef,
    ConstructFn, DeserializeFn, PreprocessFn, ProtoDef, Schema, SchemaOverrides, ValidateFn,
};
pub use types::{FixedLabel, TypeExpr};
pub use value::{Instance, Value};

use std::rc::Rc;

/// Parses a document under the default schema and returns the root
/// value.
pub fn parse(source: &str) -> Result<Value, Error> {
    parse_with_schema(source, &create_schema(SchemaOverrides::default()), None)
}

/// Parses a document under `schema`: builds the tree, preprocesses,
/// validates, and forces the root value. The first syntax or semantic
/// error aborts the call.
pub fn parse_with_schema(
    source: &str,
    schema: &Rc<Schema>,
    file: Option<&str>,
) -> Result<Value, Error> {
    let doc = Parser::parse(source, Rc::clone(schema), file)?;
    doc.preprocess();
    doc.validate()?;
    Ok(doc.root().value()?)
}

/// Parses a schema document under the bootstrap meta-schema layered
/// over the default schema; the returned value is the new registry.
pub fn parse_schema(source: &str) -> Result<Rc<Schema>, Error> {
    parse_schema_with(source, &create_schema(SchemaOverrides::default()), None)
}

/// Like [`parse_schema`], with an explicit base schema whose
/// user-supplied entries take precedence over generated ones.
pub fn parse_schema_with(
    source: &str,
    base: &Rc<Schema>,
    file: Option<&str>,
) -> Result<Rc<Schema>, Error> {
    let boot = bootstrap_schema(Rc::clone(base));
    match parse_with_schema(source, &boot, file)? {
        Value::Schema(s) => Ok(s),
        other => Err(Error::Semantic(SemanticError {
            message: format!(
                "schema document did not produce a schema (got {})",
                other.kind_name()
            ),
            file: file.map(String::from),
            line: 1,
            col: 1,
            expression: String::new(),
            simplified: true,
        })),
    }
}
