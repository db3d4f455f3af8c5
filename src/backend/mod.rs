//! Backend collaborator contract.
//!
//! The compiler never talks to a database itself. Execution paths hand an
//! assembled command document to a [`CommandBackend`] and receive either a
//! raw reply document or a raw [`BackendError`], which is then translated
//! into a readable error.

pub mod filter;
pub mod memory;
pub mod pipeline;
pub mod validate;

pub use memory::InMemoryBackend;

use docql_core::Document;
use thiserror::Error;

/// Server error codes the translator and the in-memory backend agree on.
pub mod codes {
    pub const BAD_VALUE: i32 = 2;
    pub const FAILED_TO_PARSE: i32 = 9;
    pub const UNAUTHORIZED: i32 = 13;
    pub const TYPE_MISMATCH: i32 = 14;
    pub const AUTHENTICATION_FAILED: i32 = 18;
    pub const MAX_TIME_MS_EXPIRED: i32 = 50;
    pub const COMMAND_NOT_FOUND: i32 = 59;
    pub const INVALID_LIMIT: i32 = 15958;
    pub const STAGE_NOT_SINGLE_FIELD: i32 = 40323;
    pub const UNRECOGNIZED_STAGE: i32 = 40324;
    pub const UNKNOWN_FIELD: i32 = 40415;
    pub const INVALID_REGEX: i32 = 51091;
}

/// Raw failure signal from a backend.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    #[error(
        "Command failed with error {code} ({code_name}): '{message}'. The full response is {{\"ok\": 0.0, \"errmsg\": \"{message}\", \"code\": {code}, \"codeName\": \"{code_name}\"}}"
    )]
    Command {
        code: i32,
        code_name: String,
        message: String,
    },

    #[error("{message}")]
    Security { code: i32, message: String },

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Connection error: {0}")]
    Connection(String),
}

pub type BackendResult<T> = Result<T, BackendError>;

impl BackendError {
    pub fn command(code: i32, code_name: &str, message: impl Into<String>) -> Self {
        BackendError::Command {
            code,
            code_name: code_name.to_string(),
            message: message.into(),
        }
    }

    pub fn bad_value(message: impl Into<String>) -> Self {
        Self::command(codes::BAD_VALUE, "BadValue", message)
    }

    pub fn failed_to_parse(message: impl Into<String>) -> Self {
        Self::command(codes::FAILED_TO_PARSE, "FailedToParse", message)
    }

    pub fn code(&self) -> Option<i32> {
        match self {
            BackendError::Command { code, .. } | BackendError::Security { code, .. } => {
                Some(*code)
            }
            _ => None,
        }
    }

    /// True for a read/list permission denial.
    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            BackendError::Command { code: codes::UNAUTHORIZED, .. }
        ) || matches!(self, BackendError::Command { code_name, .. } if code_name == "Unauthorized")
    }
}

/// Execution collaborator for assembled commands.
#[async_trait::async_trait]
pub trait CommandBackend: Send + Sync {
    /// Run one command document and return the raw reply.
    async fn run_command(&self, command: &Document) -> BackendResult<Document>;

    /// Names of the collections in the configured database.
    async fn list_collections(&self) -> BackendResult<Vec<String>>;

    /// Up to `size` documents from a collection.
    async fn sample(&self, collection: &str, size: usize) -> BackendResult<Vec<Document>>;

    /// Connectivity and credential check.
    async fn ping(&self) -> BackendResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_error_display_carries_noise() {
        let err = BackendError::bad_value("unknown top level operator: $is");
        let text = err.to_string();
        assert!(text.starts_with("Command failed with error 2 (BadValue)"));
        assert!(text.contains("The full response is"));
        assert_eq!(err.code(), Some(2));
    }

    #[test]
    fn test_unauthorized_detection() {
        assert!(BackendError::command(13, "Unauthorized", "not authorized").is_unauthorized());
        assert!(!BackendError::Timeout("ping".to_string()).is_unauthorized());
    }
}
