use std::ops::Range;

use codespan_reporting::diagnostic::{Diagnostic, Label, Severity};
use thiserror::Error;

/// Problems with the template itself. These are always fatal, whatever
/// processing mode is in effect.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TemplateError {
    #[error("invalid markup '{text}': {reason}")]
    Syntax { text: String, reason: String },

    #[error("unknown inline keyword '{0}'")]
    UnknownKeyword(String),

    #[error("unclosed block(s): {}", .0.join(", "))]
    Unclosed(Vec<String>),

    #[error("'{marker}' has no matching block start")]
    MissingStart { marker: String },

    #[error("'{close}' does not close '{open}'")]
    MismatchedClose { open: String, close: String },

    #[error("'{marker}' is only valid directly inside a collection block")]
    SeparatorOutsideLoop { marker: String },

    #[error("'{marker}' is only valid directly inside a switch block")]
    CaseOutsideSwitch { marker: String },

    #[error("'{marker}' is only valid inside a condition")]
    ElseOutsideCondition { marker: String },

    #[error("'{marker}' {reason}")]
    MisplacedMarker { marker: String, reason: String },

    #[error("insertion point {anchor}: {reason}")]
    InsertionPoint { anchor: String, reason: String },
}

impl TemplateError {
    pub fn syntax(text: impl Into<String>, reason: impl Into<String>) -> Self {
        TemplateError::Syntax {
            text: text.into(),
            reason: reason.into(),
        }
    }
}

/// A template error with source location information.
#[derive(Debug, Clone, Error)]
#[error("{error}")]
pub struct ParseError {
    pub error: TemplateError,
    pub span: Range<usize>,
    pub file_id: usize,
    pub severity: Severity,
    pub notes: Vec<String>,
}

impl ParseError {
    pub fn new(error: TemplateError, span: Option<Range<usize>>, file_id: usize) -> Self {
        ParseError {
            error,
            span: span.unwrap_or(0..0),
            file_id,
            severity: Severity::Error,
            notes: Vec::new(),
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn message(&self) -> String {
        self.error.to_string()
    }

    /// Convert to a codespan-reporting Diagnostic for display.
    pub fn to_diagnostic(&self) -> Diagnostic<usize> {
        Diagnostic::new(self.severity)
            .with_message(self.message())
            .with_labels(vec![Label::primary(self.file_id, self.span.clone())])
            .with_notes(self.notes.clone())
    }
}
