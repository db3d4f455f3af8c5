//! # docql-core
//!
//! Parameterized document-store query compiler.
//!
//! This crate turns a templated command (a raw body or discrete form fields
//! containing `{{placeholders}}`) plus a map of bound raw values into a typed
//! command document. It performs no I/O and holds no shared state, so a
//! single [`QueryCompiler`] can be used from any number of threads.
//!
//! ## Pipeline
//!
//! 1. [`template::scan`] finds placeholders and their quote context.
//! 2. [`classifier::classify`] infers the type of each bound value.
//! 3. [`template::substitute`] writes the values into the text.
//! 4. [`extjson`] parses the result into [`Value`] trees.
//! 5. [`command::Dispatcher`] assembles the [`Command`] for the kind.
//!
//! ## Example
//!
//! ```
//! use docql_core::{Bindings, CommandKind, CommandRequest, QueryCompiler};
//!
//! let request = CommandRequest::new(CommandKind::Find)
//!     .with("collection", "users")
//!     .with("filter", "{ age: { $gte: {{minAge}} } }");
//! let mut bindings = Bindings::new();
//! bindings.insert("minAge".to_string(), "30".to_string());
//!
//! let compiled = QueryCompiler::new().compile(&request, &bindings).unwrap();
//! assert_eq!(
//!     compiled.document().to_string(),
//!     r#"{"find": "users", "filter": {"age": {"$gte": 30}}, "limit": 10, "batchSize": 10}"#
//! );
//! ```

pub mod classifier;
pub mod command;
pub mod compiler;
pub mod error;
pub mod extjson;
pub mod template;
pub mod value;

pub use classifier::{classify, DataType};
pub use command::{Command, CommandKind, FormField, FormFields, LimitPolicy};
pub use compiler::{CommandRequest, CompiledCommand, QueryCompiler};
pub use error::{CompileError, CompileResult, ErrorCategory};
pub use template::{Bindings, Delimiters, ParameterTrace, SubstitutionMode, TraceEntry};
pub use value::{Document, ObjectId, Timestamp, Value};
