//! Placeholder scanning and substitution.

pub mod scanner;
pub mod substitution;

pub use scanner::{scan, Delimiters, PlaceholderOccurrence};
pub use substitution::{
    substitute, Bindings, ParameterTrace, Substitution, SubstitutionMode, TraceEntry,
};
