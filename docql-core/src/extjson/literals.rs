//! Typed-literal wrappers: `ObjectId(..)`, `ISODate(..)`, `NumberLong(..)` and friends.

use crate::value::{ObjectId, Timestamp, Value};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;

/// Whole-string match for a wrapper call, e.g. `ObjectId("..")` or `new Date(0)`.
static WRAPPER_LITERAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?s)^(?:new\s+Date|new\s+ISODate|ISODate|ObjectId|NumberLong|NumberInt|NumberDecimal|Timestamp)\s*\(.*\)$",
    )
    .unwrap()
});

/// True if the trimmed text is a typed-literal wrapper call.
pub fn is_wrapper_literal(text: &str) -> bool {
    WRAPPER_LITERAL.is_match(text.trim())
}

/// True if the text is a wrapper call enclosed in one matching pair of quotes.
pub fn is_quoted_wrapper_literal(text: &str) -> bool {
    unquote(text).is_some_and(is_wrapper_literal)
}

/// Strips one pair of matching outer quotes.
pub fn unquote(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    let first = trimmed.chars().next()?;
    if trimmed.len() >= 2 && (first == '"' || first == '\'') && trimmed.ends_with(first) {
        Some(&trimmed[1..trimmed.len() - 1])
    } else {
        None
    }
}

/// Names accepted after `new`.
pub fn is_constructor_name(name: &str) -> bool {
    matches!(name, "Date" | "ISODate")
}

/// Build the typed value for a wrapper call from its parsed arguments.
pub fn construct(name: &str, args: &[Value]) -> Result<Value, String> {
    match name {
        "ObjectId" => object_id(args),
        "ISODate" | "Date" => date(name, args),
        "NumberLong" => number_long(args),
        "NumberInt" => number_int(args),
        "NumberDecimal" => number_decimal(args),
        "Timestamp" => timestamp(args),
        other => Err(format!("Unknown type constructor '{}'.", other)),
    }
}

fn single_arg<'a>(name: &str, args: &'a [Value]) -> Result<&'a Value, String> {
    match args {
        [arg] => Ok(arg),
        _ => Err(format!("{} expects exactly one argument.", name)),
    }
}

fn object_id(args: &[Value]) -> Result<Value, String> {
    let hex = single_arg("ObjectId", args)?
        .as_str()
        .ok_or_else(|| "ObjectId expects a string argument.".to_string())?;
    ObjectId::parse_str(hex)
        .map(Value::ObjectId)
        .ok_or_else(|| format!("Invalid ObjectId '{}': expected 24 hex characters.", hex))
}

fn date(name: &str, args: &[Value]) -> Result<Value, String> {
    match single_arg(name, args)? {
        Value::String(text) => parse_datetime(text)
            .map(Value::DateTime)
            .ok_or_else(|| format!("Invalid date '{}'.", text)),
        other => other
            .as_i64()
            .map(Value::DateTime)
            .ok_or_else(|| format!("{} expects a date string or epoch milliseconds.", name)),
    }
}

fn number_long(args: &[Value]) -> Result<Value, String> {
    let parsed = match single_arg("NumberLong", args)? {
        Value::String(text) => text.trim().parse::<i64>().ok(),
        Value::Double(_) => None,
        other => other.as_i64(),
    };
    parsed
        .map(Value::Int64)
        .ok_or_else(|| "NumberLong expects a 64-bit integer.".to_string())
}

fn number_int(args: &[Value]) -> Result<Value, String> {
    let parsed = match single_arg("NumberInt", args)? {
        Value::String(text) => text.trim().parse::<i32>().ok(),
        Value::Double(_) => None,
        other => other.as_i64().and_then(|n| i32::try_from(n).ok()),
    };
    parsed
        .map(Value::Int32)
        .ok_or_else(|| "NumberInt expects a 32-bit integer.".to_string())
}

fn number_decimal(args: &[Value]) -> Result<Value, String> {
    let digits = match single_arg("NumberDecimal", args)? {
        Value::String(text) => text.trim().to_string(),
        Value::Int32(n) => n.to_string(),
        Value::Int64(n) => n.to_string(),
        Value::Double(f) => f.to_string(),
        _ => return Err("NumberDecimal expects a numeric string.".to_string()),
    };
    if digits.parse::<f64>().is_ok() {
        Ok(Value::Decimal(digits))
    } else {
        Err(format!("Invalid decimal '{}'.", digits))
    }
}

fn timestamp(args: &[Value]) -> Result<Value, String> {
    let part = |value: &Value| value.as_i64().and_then(|n| u32::try_from(n).ok());
    match args {
        [time, increment] => match (part(time), part(increment)) {
            (Some(time), Some(increment)) => Ok(Value::Timestamp(Timestamp { time, increment })),
            _ => Err("Timestamp expects two unsigned 32-bit integers.".to_string()),
        },
        _ => Err("Timestamp expects exactly two arguments.".to_string()),
    }
}

/// Parse an ISO-8601 date or datetime into epoch milliseconds.
///
/// Accepts RFC 3339, datetimes without offset (taken as UTC), and bare dates
/// (midnight UTC).
pub fn parse_datetime(text: &str) -> Option<i64> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.timestamp_millis());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%.f%z"] {
        if let Ok(dt) = DateTime::parse_from_str(text, format) {
            return Some(dt.timestamp_millis());
        }
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc().timestamp_millis());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc().timestamp_millis())
}
