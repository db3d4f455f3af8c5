pub mod backend;
pub mod config;
pub mod datasource;
pub mod error;
pub mod executor;
pub mod structure;
pub mod translator;

pub use backend::{BackendError, BackendResult, CommandBackend, InMemoryBackend};
pub use config::Settings;
pub use datasource::{test_datasource, validate_datasource, DatasourceConfig, DatasourceTestResult, SslMode};
pub use error::{ReadableError, ReadableResult};
pub use executor::{ExecutionOutcome, Executor, RequestAudit};
pub use structure::{get_structure, DatasourceStructure};
pub use translator::translate;
