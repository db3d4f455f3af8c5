//! Server-side command field validation with server-style error messages.

use super::{codes, BackendError, BackendResult};
use docql_core::{Document, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expected {
    String,
    Object,
    Array,
    Number,
    Bool,
    ObjectOrArray,
    Any,
}

impl Expected {
    fn accepts(&self, value: &Value) -> bool {
        match self {
            Expected::String => matches!(value, Value::String(_)),
            Expected::Object => matches!(value, Value::Document(_)),
            Expected::Array => matches!(value, Value::Array(_)),
            Expected::Number => value.is_number(),
            Expected::Bool => matches!(value, Value::Bool(_)) || value.is_number(),
            Expected::ObjectOrArray => {
                matches!(value, Value::Document(_) | Value::Array(_))
            }
            Expected::Any => true,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Expected::String => "string",
            Expected::Object => "object",
            Expected::Array => "array",
            Expected::Number => "number",
            Expected::Bool => "bool",
            Expected::ObjectOrArray => "object",
            Expected::Any => "any",
        }
    }
}

/// Fields accepted by every command.
const GENERIC_FIELDS: &[(&str, Expected)] = &[
    ("$db", Expected::String),
    ("comment", Expected::Any),
    ("maxTimeMS", Expected::Number),
    ("lsid", Expected::Object),
    ("readConcern", Expected::Object),
    ("writeConcern", Expected::Object),
];

fn command_fields(name: &str) -> Option<&'static [(&'static str, Expected)]> {
    use Expected::*;
    let fields: &'static [(&'static str, Expected)] = match name {
        "find" => &[
            ("find", String),
            ("filter", Object),
            ("sort", Object),
            ("projection", Object),
            ("skip", Number),
            ("limit", Number),
            ("batchSize", Number),
            ("singleBatch", Bool),
            ("hint", Any),
        ],
        "insert" => &[
            ("insert", String),
            ("documents", Array),
            ("ordered", Bool),
            ("bypassDocumentValidation", Bool),
        ],
        "update" => &[
            ("update", String),
            ("updates", Array),
            ("ordered", Bool),
            ("bypassDocumentValidation", Bool),
        ],
        "delete" => &[("delete", String), ("deletes", Array), ("ordered", Bool)],
        "count" => &[
            ("count", String),
            ("query", Object),
            ("limit", Number),
            ("skip", Number),
            ("hint", Any),
        ],
        "distinct" => &[("distinct", String), ("key", String), ("query", Object)],
        "aggregate" => &[
            ("aggregate", String),
            ("pipeline", Array),
            ("cursor", Object),
            ("explain", Bool),
            ("allowDiskUse", Bool),
        ],
        "findAndModify" => &[
            ("findAndModify", String),
            ("query", Object),
            ("sort", Object),
            ("update", ObjectOrArray),
            ("remove", Bool),
            ("new", Bool),
            ("fields", Object),
        ],
        "ping" => &[("ping", Any)],
        "listCollections" => &[
            ("listCollections", Any),
            ("filter", Object),
            ("nameOnly", Bool),
        ],
        _ => return None,
    };
    Some(fields)
}

/// Canonical command name, matching `findandmodify` case-insensitively.
pub fn command_name(command: &Document) -> BackendResult<&'static str> {
    let first = command.first_key().unwrap_or_default();
    const NAMES: [&str; 10] = [
        "find",
        "insert",
        "update",
        "delete",
        "count",
        "distinct",
        "aggregate",
        "findAndModify",
        "ping",
        "listCollections",
    ];
    NAMES
        .into_iter()
        .find(|name| *name == first || (*name == "findAndModify" && first.eq_ignore_ascii_case(name)))
        .ok_or_else(|| {
            BackendError::command(
                codes::COMMAND_NOT_FOUND,
                "CommandNotFound",
                format!("no such command: '{}'", first),
            )
        })
}

/// Check field names and types the way the server does before executing.
pub fn validate(name: &str, command: &Document) -> BackendResult<()> {
    let Some(fields) = command_fields(name) else {
        return Ok(());
    };

    for (index, (field, value)) in command.iter().enumerate() {
        let field_name = if index == 0 { name } else { field.as_str() };
        let expected = fields
            .iter()
            .chain(GENERIC_FIELDS.iter())
            .find(|(known, _)| *known == field_name)
            .map(|(_, expected)| *expected);

        let Some(expected) = expected else {
            return Err(BackendError::command(
                codes::UNKNOWN_FIELD,
                "Location40415",
                format!("BSON field '{}.{}' is an unknown field.", name, field),
            ));
        };

        if expected.accepts(value) {
            continue;
        }
        if expected == Expected::Number {
            return Err(BackendError::failed_to_parse(format!(
                "Failed to parse: {}: {}. '{}' field must be numeric.",
                field,
                shell_format(value),
                field
            )));
        }
        return Err(BackendError::command(
            codes::TYPE_MISMATCH,
            "TypeMismatch",
            format!(
                "BSON field '{}.{}' is the wrong type '{}', expected type '{}'",
                name,
                field,
                value.bson_type(),
                expected.name()
            ),
        ));
    }

    Ok(())
}

/// Server-log rendering: `{ a: 1 }`, `[ 10 ]`, `"x"`.
pub fn shell_format(value: &Value) -> String {
    match value {
        Value::Document(doc) if doc.is_empty() => "{}".to_string(),
        Value::Document(doc) => {
            let inner: Vec<String> = doc
                .iter()
                .map(|(k, v)| format!("{}: {}", k, shell_format(v)))
                .collect();
            format!("{{ {} }}", inner.join(", "))
        }
        Value::Array(items) if items.is_empty() => "[]".to_string(),
        Value::Array(items) => {
            let inner: Vec<String> = items.iter().map(shell_format).collect();
            format!("[ {} ]", inner.join(", "))
        }
        other => other.to_string(),
    }
}
