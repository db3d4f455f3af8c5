//! Raw-value type classification.
//!
//! Rules are tried in order and the first match wins, so a value such as
//! `[1]` is BSON even though it contains a number.

use crate::extjson::{self, literals};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

static INTEGER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-?[0-9]+$").unwrap());

static FLOAT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[+-]?[0-9]+\.[0-9]+(?:[eE][+-]?[0-9]+)?$").unwrap());

/// Inferred type of a bound raw value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DataType {
    String,
    Integer,
    Float,
    Bson,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::String => "STRING",
            DataType::Integer => "INTEGER",
            DataType::Float => "FLOAT",
            DataType::Bson => "BSON",
        };
        f.write_str(name)
    }
}

type Rule = (DataType, fn(&str) -> bool);

/// Classification precedence. STRING is the fallback and has no rule.
const RULES: &[Rule] = &[
    (DataType::Bson, is_bson),
    (DataType::Integer, is_integer),
    (DataType::Float, is_float),
];

/// Classify a raw value. Pure and deterministic.
pub fn classify(raw: &str) -> DataType {
    let trimmed = raw.trim();
    RULES
        .iter()
        .find(|(_, matches)| matches(trimmed))
        .map(|(data_type, _)| *data_type)
        .unwrap_or(DataType::String)
}

/// A BSON value must have a BSON shape and parse as exactly one complete
/// value. Anything else is quoted as a string when substituted.
fn is_bson(value: &str) -> bool {
    let shaped = (value.starts_with('{') && value.ends_with('}'))
        || (value.starts_with('[') && value.ends_with(']'))
        || literals::is_wrapper_literal(value)
        || literals::is_quoted_wrapper_literal(value);
    shaped && extjson::parse_strict(value).is_ok()
}

fn is_integer(value: &str) -> bool {
    INTEGER.is_match(value) && value.parse::<i64>().is_ok()
}

fn is_float(value: &str) -> bool {
    FLOAT.is_match(value)
}
