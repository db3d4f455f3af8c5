//! Assembly of typed [`Command`] values from substituted field texts.

use super::{Command, CommandKind, FormField, LimitPolicy};
use crate::error::{
    unrecognized_field, wrong_bson_type, CompileError, CompileResult, ErrorCategory,
    INVALID_PIPELINE_STAGE,
};
use crate::extjson;
use crate::value::{Document, Value};

/// Assembles commands for each kind.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    default_find_limit: i64,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(10)
    }
}

/// Field texts after substitution, keyed by resolved field.
type Fields = [(FormField, String)];

impl Dispatcher {
    pub fn new(default_find_limit: i64) -> Self {
        Self { default_find_limit }
    }

    /// Map a supplied field name onto a field the kind defines.
    pub fn resolve_field(kind: CommandKind, name: &str) -> CompileResult<FormField> {
        FormField::from_name(name)
            .filter(|field| kind.allows(*field))
            .ok_or_else(|| {
                CompileError::for_field(
                    ErrorCategory::UnrecognizedField,
                    name,
                    unrecognized_field(name),
                )
            })
    }

    pub fn assemble(&self, kind: CommandKind, fields: &Fields) -> CompileResult<Command> {
        for (field, _) in fields {
            if !kind.allows(*field) {
                return Err(CompileError::for_field(
                    ErrorCategory::UnrecognizedField,
                    field.as_str(),
                    unrecognized_field(field.as_str()),
                ));
            }
        }
        for field in kind.required_fields() {
            if text(fields, *field).is_none() {
                return Err(CompileError::for_field(
                    ErrorCategory::MissingField,
                    field.as_str(),
                    format!("'{}' field is required.", field),
                ));
            }
        }

        let command = match kind {
            CommandKind::Find => Command::Find {
                collection: collection(fields)?,
                filter: object_or_empty(fields, FormField::Filter)?,
                sort: object(fields, FormField::Sort)?,
                projection: object(fields, FormField::Projection)?,
                skip: number(fields, FormField::Skip)?,
                limit: number(fields, FormField::Limit)?.unwrap_or(self.default_find_limit),
            },
            CommandKind::Insert => Command::Insert {
                collection: collection(fields)?,
                documents: documents(fields)?,
            },
            CommandKind::Update => Command::Update {
                collection: collection(fields)?,
                filter: object_or_empty(fields, FormField::Filter)?,
                update: object_or_empty(fields, FormField::Update)?,
                limit: limit_policy(fields)?,
            },
            CommandKind::Delete => Command::Delete {
                collection: collection(fields)?,
                filter: object_or_empty(fields, FormField::Filter)?,
                limit: limit_policy(fields)?,
            },
            CommandKind::Count => Command::Count {
                collection: collection(fields)?,
                filter: object_or_empty(fields, FormField::Filter)?,
            },
            CommandKind::Distinct => Command::Distinct {
                collection: collection(fields)?,
                key: text(fields, FormField::Key).unwrap_or_default().to_string(),
                filter: object_or_empty(fields, FormField::Filter)?,
            },
            CommandKind::Aggregate => Command::Aggregate {
                collection: collection(fields)?,
                pipeline: pipeline(fields)?,
                limit: number(fields, FormField::Limit)?,
            },
            CommandKind::FindAndModify => Command::FindAndModify { body: body(fields)? },
            CommandKind::Raw => Command::Raw { body: body(fields)? },
        };

        tracing::debug!(kind = %kind, "Assembled command");
        Ok(command)
    }
}

/// Trimmed, non-blank text of a field.
fn text(fields: &Fields, field: FormField) -> Option<&str> {
    fields
        .iter()
        .find(|(f, _)| *f == field)
        .map(|(_, t)| t.trim())
        .filter(|t| !t.is_empty())
}

fn collection(fields: &Fields) -> CompileResult<String> {
    Ok(text(fields, FormField::Collection)
        .unwrap_or_default()
        .to_string())
}

fn object(fields: &Fields, field: FormField) -> CompileResult<Option<Document>> {
    let Some(raw) = text(fields, field) else {
        return Ok(None);
    };
    match extjson::parse_value(raw).map_err(|e| e.in_field(field.as_str()))? {
        Value::Document(doc) => Ok(Some(doc)),
        _ => Err(CompileError::for_field(
            ErrorCategory::WrongBsonType,
            field.as_str(),
            wrong_bson_type(field.as_str(), "object"),
        )),
    }
}

fn object_or_empty(fields: &Fields, field: FormField) -> CompileResult<Document> {
    Ok(object(fields, field)?.unwrap_or_default())
}

fn number(fields: &Fields, field: FormField) -> CompileResult<Option<i64>> {
    let Some(raw) = text(fields, field) else {
        return Ok(None);
    };
    let parsed = match raw.parse::<i64>() {
        Ok(n) => Some(n),
        Err(_) => extjson::parse_strict(raw)
            .ok()
            .filter(Value::is_number)
            .and_then(|value| value.as_i64()),
    };
    parsed.map(Some).ok_or_else(|| {
        CompileError::for_field(
            ErrorCategory::WrongBsonType,
            field.as_str(),
            format!("'{}' field must be numeric.", field),
        )
    })
}

fn limit_policy(fields: &Fields) -> CompileResult<LimitPolicy> {
    match text(fields, FormField::Limit) {
        None => Ok(LimitPolicy::default()),
        Some(raw) if raw.eq_ignore_ascii_case("single") => Ok(LimitPolicy::Single),
        Some(raw) if raw.eq_ignore_ascii_case("all") => Ok(LimitPolicy::All),
        Some(_) => Err(CompileError::for_field(
            ErrorCategory::InvalidValue,
            "limit",
            "'limit' field must be either SINGLE or ALL.",
        )),
    }
}

/// One object or a non-empty array of objects.
fn documents(fields: &Fields) -> CompileResult<Vec<Document>> {
    let raw = text(fields, FormField::Documents).unwrap_or_default();
    let wrong_type = || {
        CompileError::for_field(
            ErrorCategory::WrongBsonType,
            "documents",
            wrong_bson_type("documents", "array"),
        )
    };

    match extjson::parse_value(raw).map_err(|e| e.in_field("documents"))? {
        Value::Document(doc) => Ok(vec![doc]),
        Value::Array(items) if items.is_empty() => Err(CompileError::for_field(
            ErrorCategory::InvalidValue,
            "documents",
            "'documents' field must contain at least one document.",
        )),
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Document(doc) => Ok(doc),
                _ => Err(wrong_type()),
            })
            .collect(),
        _ => Err(wrong_type()),
    }
}

/// Pipeline text must be strictly an array of objects or a single object.
fn pipeline(fields: &Fields) -> CompileResult<Vec<Document>> {
    let raw = text(fields, FormField::Pipeline).unwrap_or_default();
    let invalid = || {
        CompileError::for_field(
            ErrorCategory::InvalidPipelineStage,
            "pipeline",
            INVALID_PIPELINE_STAGE,
        )
    };

    match extjson::parse_strict(raw).map_err(|_| invalid())? {
        Value::Document(stage) => Ok(vec![stage]),
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Document(stage) => Ok(stage),
                _ => Err(invalid()),
            })
            .collect(),
        _ => Err(invalid()),
    }
}

fn body(fields: &Fields) -> CompileResult<Document> {
    let raw = text(fields, FormField::Body).unwrap_or_default();
    extjson::parse_document(raw).map_err(|e| e.in_field("body"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FILTER_NOT_OBJECT, LIMIT_NOT_NUMERIC};

    fn fields(pairs: &[(FormField, &str)]) -> Vec<(FormField, String)> {
        pairs.iter().map(|(f, t)| (*f, t.to_string())).collect()
    }

    fn assemble(kind: CommandKind, pairs: &[(FormField, &str)]) -> CompileResult<Command> {
        Dispatcher::default().assemble(kind, &fields(pairs))
    }

    #[test]
    fn test_find_defaults() {
        let command = assemble(CommandKind::Find, &[(FormField::Collection, "users")]).unwrap();
        assert_eq!(
            command.to_document().to_string(),
            r#"{"find": "users", "filter": {}, "limit": 10, "batchSize": 10}"#
        );
    }

    #[test]
    fn test_find_all_fields() {
        let command = assemble(
            CommandKind::Find,
            &[
                (FormField::Collection, "users"),
                (FormField::Filter, "{age: {$gte: 30}}"),
                (FormField::Sort, "{id: 1}"),
                (FormField::Projection, "{name: 1}"),
                (FormField::Skip, "1"),
                (FormField::Limit, "5"),
            ],
        )
        .unwrap();
        assert_eq!(
            command.to_document().to_string(),
            r#"{"find": "users", "filter": {"age": {"$gte": 30}}, "sort": {"id": 1}, "skip": 1, "limit": 5, "batchSize": 5, "projection": {"name": 1}}"#
        );
    }

    #[test]
    fn test_filter_wrong_type() {
        let err = assemble(
            CommandKind::Find,
            &[(FormField::Collection, "users"), (FormField::Filter, "\"abc\"")],
        )
        .unwrap_err();
        assert_eq!(err.message, FILTER_NOT_OBJECT);
        assert_eq!(err.category, ErrorCategory::WrongBsonType);
    }

    #[test]
    fn test_limit_not_numeric() {
        let err = assemble(
            CommandKind::Find,
            &[(FormField::Collection, "users"), (FormField::Limit, "[10]")],
        )
        .unwrap_err();
        assert_eq!(err.message, LIMIT_NOT_NUMERIC);
    }

    #[test]
    fn test_unrecognized_field() {
        let err = Dispatcher::resolve_field(CommandKind::Find, "limitx").unwrap_err();
        assert_eq!(err.message, "Unrecognized field 'limitx'.");

        let err = assemble(
            CommandKind::Count,
            &[(FormField::Collection, "users"), (FormField::Sort, "{}")],
        )
        .unwrap_err();
        assert_eq!(err.message, "Unrecognized field 'sort'.");
    }

    #[test]
    fn test_missing_required_field() {
        let err = assemble(CommandKind::Delete, &[(FormField::Collection, "users")]).unwrap_err();
        assert_eq!(err.category, ErrorCategory::MissingField);
        assert_eq!(err.message, "'filter' field is required.");
    }

    #[test]
    fn test_limit_policy() {
        let command = assemble(
            CommandKind::Delete,
            &[
                (FormField::Collection, "users"),
                (FormField::Filter, "{}"),
                (FormField::Limit, "all"),
            ],
        )
        .unwrap();
        assert!(matches!(command, Command::Delete { limit: LimitPolicy::All, .. }));

        let err = assemble(
            CommandKind::Update,
            &[
                (FormField::Collection, "users"),
                (FormField::Filter, "{}"),
                (FormField::Update, "{$set: {a: 1}}"),
                (FormField::Limit, "some"),
            ],
        )
        .unwrap_err();
        assert_eq!(err.message, "'limit' field must be either SINGLE or ALL.");
    }

    #[test]
    fn test_update_tolerates_trailing_brace() {
        let command = assemble(
            CommandKind::Update,
            &[
                (FormField::Collection, "users"),
                (FormField::Filter, "{ name: \"Alden Cantrell\" }"),
                (FormField::Update, "{ $set: { age: 31 }}}"),
            ],
        )
        .unwrap();
        assert_eq!(
            command.to_document().to_string(),
            r#"{"update": "users", "updates": [{"q": {"name": "Alden Cantrell"}, "u": {"$set": {"age": 31}}, "multi": false}]}"#
        );
    }

    #[test]
    fn test_insert_single_object_becomes_array() {
        let command = assemble(
            CommandKind::Insert,
            &[
                (FormField::Collection, "users"),
                (FormField::Documents, "{name: 'Zed'}"),
            ],
        )
        .unwrap();
        assert_eq!(
            command.to_document().to_string(),
            r#"{"insert": "users", "documents": [{"name": "Zed"}]}"#
        );

        let err = assemble(
            CommandKind::Insert,
            &[(FormField::Collection, "users"), (FormField::Documents, "[1]")],
        )
        .unwrap_err();
        assert_eq!(err.category, ErrorCategory::WrongBsonType);
    }

    #[test]
    fn test_pipeline_trailing_garbage() {
        let err = assemble(
            CommandKind::Aggregate,
            &[
                (FormField::Collection, "users"),
                (FormField::Pipeline, "{$sort :{ _id : 1 }}abcd"),
            ],
        )
        .unwrap_err();
        assert_eq!(err.message, INVALID_PIPELINE_STAGE);
        assert!(!err.is_parse_error());
    }

    #[test]
    fn test_pipeline_non_object_stage() {
        let err = assemble(
            CommandKind::Aggregate,
            &[(FormField::Collection, "users"), (FormField::Pipeline, "[{$match: {}}, 3]")],
        )
        .unwrap_err();
        assert_eq!(err.message, INVALID_PIPELINE_STAGE);
    }

    #[test]
    fn test_distinct_and_count() {
        let command = assemble(
            CommandKind::Distinct,
            &[(FormField::Collection, "users"), (FormField::Key, " name ")],
        )
        .unwrap();
        assert_eq!(
            command.to_document().to_string(),
            r#"{"distinct": "users", "key": "name", "query": {}}"#
        );

        let command = assemble(CommandKind::Count, &[(FormField::Collection, "users")]).unwrap();
        assert_eq!(
            command.to_document().to_string(),
            r#"{"count": "users", "query": {}}"#
        );
    }

    #[test]
    fn test_raw_body_must_be_object() {
        let err = assemble(CommandKind::Raw, &[(FormField::Body, "[1]")]).unwrap_err();
        assert!(err.is_parse_error());
        assert_eq!(err.field.as_deref(), Some("body"));
    }
}
