use docql_core::CompileError;
use thiserror::Error;

/// User-facing error taxonomy. Each variant carries exactly one sentence.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReadableError {
    #[error("{0}")]
    Argument(String),

    #[error("{0}")]
    Permission(String),

    #[error("{0}")]
    Timeout(String),

    #[error("{0}")]
    Authentication(String),

    #[error("{0}")]
    Parse(String),

    #[error("{0}")]
    Execution(String),
}

pub type ReadableResult<T> = Result<T, ReadableError>;

impl ReadableError {
    /// Stable title shown above the message.
    pub fn title(&self) -> &'static str {
        match self {
            ReadableError::Argument(_) => "Argument error",
            ReadableError::Permission(_) => "Permission error",
            ReadableError::Timeout(_) => "Timeout error",
            ReadableError::Authentication(_) => "Authentication error",
            ReadableError::Parse(_) => "Parse error",
            ReadableError::Execution(_) => "Query execution error",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ReadableError::Argument(msg)
            | ReadableError::Permission(msg)
            | ReadableError::Timeout(msg)
            | ReadableError::Authentication(msg)
            | ReadableError::Parse(msg)
            | ReadableError::Execution(msg) => msg,
        }
    }
}

impl serde::Serialize for ReadableError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl From<CompileError> for ReadableError {
    fn from(err: CompileError) -> Self {
        if err.is_parse_error() {
            ReadableError::Parse(err.message)
        } else {
            ReadableError::Argument(err.message)
        }
    }
}
