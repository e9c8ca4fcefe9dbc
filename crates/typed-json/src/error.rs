//! Error types and diagnostic message formatting.
//!
//! Semantic diagnostics render as
//! `` `<file:>line,col: error in expression `<text>`: <message>` ``, or in
//! simplified (location-only) form when nested inside a composed parent
//! error.

use std::fmt;

use thiserror::Error;

/// Top-level crate error: a fatal front-end syntax error or a semantic
/// error raised during validation/deserialization.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum Error {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
    #[error(transparent)]
    Semantic(#[from] SemanticError),
}

/// Front-end error: source location plus the raw parser message.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntaxError {
    pub message: String,
    pub file: Option<String>,
    pub line: u32,
    pub col: u32,
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(file) = &self.file {
            write!(f, "{}:", file)?;
        }
        write!(f, "{},{}: {}", self.line, self.col, self.message)
    }
}

impl std::error::Error for SyntaxError {}

/// Semantic error carrying the offending node's location and expression
/// text for context.
#[derive(Debug, Clone, PartialEq)]
pub struct SemanticError {
    pub message: String,
    pub file: Option<String>,
    pub line: u32,
    pub col: u32,
    /// Raw source text of the offending expression.
    pub expression: String,
    /// Location-only rendering, used when this error is embedded in a
    /// composed parent error.
    pub simplified: bool,
}

impl SemanticError {
    /// Copy of this error in location-only form.
    pub fn simplified(&self) -> SemanticError {
        SemanticError {
            simplified: true,
            ..self.clone()
        }
    }
}

impl fmt::Display for SemanticError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(file) = &self.file {
            write!(f, "{}:", file)?;
        }
        write!(f, "{},{}: ", self.line, self.col)?;
        if self.simplified {
            write!(f, "{}", self.message)
        } else {
            write!(
                f,
                "error in expression `{}`: {}",
                self.expression, self.message
            )
        }
    }
}

impl std::error::Error for SemanticError {}
