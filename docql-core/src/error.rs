//! Error types for docql-core.
//!
//! Compilation never touches a backend, so the only failures here are parse
//! errors in the extended-JSON text and argument errors in the assembled
//! command. Both carry a single human-readable sentence.

use thiserror::Error;

/// `'filter' field must be of BSON type object.`
pub const FILTER_NOT_OBJECT: &str = "'filter' field must be of BSON type object.";

/// `'limit' field must be numeric.`
pub const LIMIT_NOT_NUMERIC: &str = "'limit' field must be numeric.";

/// `Pipeline stage is not a valid JSON object.`
pub const INVALID_PIPELINE_STAGE: &str = "Pipeline stage is not a valid JSON object.";

/// Message for a field name that the command kind does not define.
pub fn unrecognized_field(field: &str) -> String {
    format!("Unrecognized field '{}'.", field)
}

/// Message for a field holding the wrong runtime type.
pub fn wrong_bson_type(field: &str, expected: &str) -> String {
    format!("'{}' field must be of BSON type {}.", field, expected)
}

/// Reported category of a compilation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Malformed extended-JSON text.
    Syntax,
    /// Top level is not a brace/bracket-delimited structure where one is required.
    NotJsonStructure,
    /// A field name the command kind does not define.
    UnrecognizedField,
    /// A field present with the wrong runtime type.
    WrongBsonType,
    /// A pipeline stage that is not a standalone JSON object.
    InvalidPipelineStage,
    /// A required field is absent or blank.
    MissingField,
    /// Right type, unacceptable value (bad enum, empty list).
    InvalidValue,
    /// A placeholder whose key has no binding.
    UnboundPlaceholder,
}

impl ErrorCategory {
    /// Parse errors come from the grammar; everything else is an argument error.
    pub fn is_parse_error(&self) -> bool {
        matches!(self, ErrorCategory::Syntax | ErrorCategory::NotJsonStructure)
    }
}

/// Compilation error
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct CompileError {
    pub category: ErrorCategory,
    /// Offending field, when the error is attributable to one.
    pub field: Option<String>,
    pub message: String,
}

impl CompileError {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            field: None,
            message: message.into(),
        }
    }

    pub fn syntax(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Syntax, message)
    }

    pub fn for_field(
        category: ErrorCategory,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category,
            field: Some(field.into()),
            message: message.into(),
        }
    }

    /// Attach a field name, keeping an existing one.
    pub fn in_field(mut self, field: &str) -> Self {
        if self.field.is_none() {
            self.field = Some(field.to_string());
        }
        self
    }

    pub fn is_parse_error(&self) -> bool {
        self.category.is_parse_error()
    }
}

/// Result type for compilation
pub type CompileResult<T> = Result<T, CompileError>;
