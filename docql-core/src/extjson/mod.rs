//! Extended-JSON normalizer.
//!
//! Accepts a JSON superset (unquoted keys, single-quoted strings, trailing
//! commas, typed-literal wrappers) and produces canonical [`Value`] trees.

pub mod lexer;
pub mod literals;
mod parser;

pub use parser::{Parser, MAX_NESTING_DEPTH};

use crate::error::{CompileError, CompileResult, ErrorCategory};
use crate::value::{Document, Value};
use lexer::Token;

/// How content after the first complete top-level value is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trailing {
    /// Ignored (logged at debug level).
    Ignore,
    /// Rejected as a syntax error.
    Reject,
}

/// Parse any value, ignoring trailing content.
pub fn parse_value(text: &str) -> CompileResult<Value> {
    parse_with(text, Trailing::Ignore)
}

/// Parse any value and require that nothing follows it.
pub fn parse_strict(text: &str) -> CompileResult<Value> {
    parse_with(text, Trailing::Reject)
}

/// Parse a top-level object, ignoring trailing content.
pub fn parse_document(text: &str) -> CompileResult<Document> {
    if !text.trim_start().starts_with('{') {
        return Err(CompileError::new(
            ErrorCategory::NotJsonStructure,
            "Input is not a valid JSON object.",
        ));
    }
    match parse_value(text)? {
        Value::Document(doc) => Ok(doc),
        _ => Err(CompileError::new(
            ErrorCategory::NotJsonStructure,
            "Input is not a valid JSON object.",
        )),
    }
}

pub fn parse_with(text: &str, trailing: Trailing) -> CompileResult<Value> {
    let mut parser = Parser::new(text);
    let value = parser.parse_value()?;

    if !parser.at_end() {
        match trailing {
            Trailing::Ignore => {
                tracing::debug!(
                    position = parser.current_position(),
                    "Ignoring content after complete value"
                );
            }
            Trailing::Reject => {
                let err = match parser.current_token() {
                    Token::Invalid(_) | Token::Eof => parser.unexpected(),
                    _ => CompileError::syntax(format!(
                        "Invalid JSON input. Unexpected content after position {}: '{}'.",
                        parser.current_position(),
                        parser.remaining().trim_end()
                    )),
                };
                return Err(err);
            }
        }
    }

    Ok(value)
}
