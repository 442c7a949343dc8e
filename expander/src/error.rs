use std::ops::Range;

use docweave::parser::{ParseError, TemplateError};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExpandError {
    #[error("model not found for '{path}'")]
    ModelNotFound { path: String },

    #[error("'{path}': {type_name} has no property '{property}'")]
    PropertyNotFound {
        path: String,
        property: String,
        type_name: String,
    },

    #[error(
        "'{path}': cannot read '{property}' from a collection; iterate it with {{{{#...}}}} first"
    )]
    CollectionWithoutLoop { path: String, property: String },

    #[error("'{path}' reaches {depth} scope(s) up, but only {available} are open")]
    ScopeDepth {
        path: String,
        depth: usize,
        available: usize,
    },

    #[error("'{path}': expected {expected}, got {got}")]
    TypeMismatch {
        path: String,
        expected: String,
        got: String,
    },

    #[error("formatter '{formatter}' cannot format a {type_name}")]
    FormatterNotApplicable { formatter: String, type_name: String },

    #[error("formatter '{formatter}': {message}")]
    FormatterArgument { formatter: String, message: String },

    #[error("expression '{expression}': {message}")]
    Expression { expression: String, message: String },

    #[error("division by zero")]
    DivisionByZero,

    #[error(transparent)]
    Template(#[from] TemplateError),
}

impl ExpandError {
    /// Structural errors abort processing in every mode.
    pub fn is_structural(&self) -> bool {
        matches!(self, ExpandError::Template(_))
    }

    pub fn type_mismatch(path: &str, expected: &str, got: &str) -> Self {
        ExpandError::TypeMismatch {
            path: path.to_string(),
            expected: expected.to_string(),
            got: got.to_string(),
        }
    }
}

/// An expansion error or warning enriched with source location information.
#[derive(Debug, Clone, Error)]
#[error("{error}")]
pub struct DiagnosticError {
    pub error: ExpandError,
    pub span: Option<Range<usize>>,
    pub source_id: usize,
    pub is_warning: bool,
    pub notes: Vec<String>,
}

impl DiagnosticError {
    pub fn new(error: ExpandError, span: Option<Range<usize>>, source_id: usize) -> Self {
        DiagnosticError {
            error,
            span,
            source_id,
            is_warning: false,
            notes: Vec::new(),
        }
    }

    /// Downgrade to a warning: the error was handled by the processing mode.
    pub fn into_warning(mut self) -> Self {
        self.is_warning = true;
        self
    }
}

impl From<ExpandError> for DiagnosticError {
    fn from(error: ExpandError) -> Self {
        DiagnosticError::new(error, None, 0)
    }
}

impl From<ParseError> for DiagnosticError {
    fn from(err: ParseError) -> Self {
        DiagnosticError {
            error: ExpandError::Template(err.error),
            span: Some(err.span),
            source_id: err.file_id,
            is_warning: false,
            notes: err.notes,
        }
    }
}
