//! Aggregation stages plus the sort/projection helpers shared with `find`.

use super::{codes, filter, BackendError, BackendResult};
use docql_core::{Document, Value};
use std::cmp::Ordering;

/// Run a pipeline over a collection snapshot.
pub fn run(mut docs: Vec<Document>, pipeline: &[Value]) -> BackendResult<Vec<Document>> {
    for stage in pipeline {
        let stage = stage.as_document().ok_or_else(|| {
            BackendError::command(
                codes::TYPE_MISMATCH,
                "TypeMismatch",
                "Each element of the 'pipeline' array must be an object",
            )
        })?;
        if stage.len() != 1 {
            return Err(BackendError::command(
                codes::STAGE_NOT_SINGLE_FIELD,
                "Location40323",
                "A pipeline stage specification object must contain exactly one field.",
            ));
        }
        let Some((name, spec)) = stage.iter().next() else {
            continue;
        };

        docs = match name.as_str() {
            "$match" => {
                let condition = spec
                    .as_document()
                    .ok_or_else(|| BackendError::failed_to_parse("$match argument must be an object"))?;
                filter::check(condition)?;
                docs.into_iter()
                    .filter(|doc| filter::matches(doc, condition))
                    .collect()
            }
            "$sort" => {
                let order = spec.as_document().ok_or_else(|| {
                    BackendError::command(15973, "Location15973", "the $sort key specification must be an object")
                })?;
                sort_documents(&mut docs, order);
                docs
            }
            "$skip" => {
                let n = non_negative(spec, "$skip")?;
                docs.into_iter().skip(n).collect()
            }
            "$limit" => {
                let n = spec.as_i64().filter(|n| *n > 0).ok_or_else(|| {
                    BackendError::command(codes::INVALID_LIMIT, "Location15958", "the limit must be positive")
                })?;
                docs.truncate(n as usize);
                docs
            }
            "$project" => {
                let spec = spec.as_document().ok_or_else(|| {
                    BackendError::command(15969, "Location15969", "$project specification must be an object")
                })?;
                docs.iter().map(|doc| project(doc, spec)).collect()
            }
            "$count" => {
                let field = spec
                    .as_str()
                    .filter(|s| !s.is_empty() && !s.starts_with('$'))
                    .ok_or_else(|| {
                        BackendError::command(40156, "Location40156", "the count field must be a non-empty string")
                    })?;
                if docs.is_empty() {
                    Vec::new()
                } else {
                    vec![Document::new().with(field, Value::from_i64(docs.len() as i64))]
                }
            }
            other => {
                return Err(BackendError::command(
                    codes::UNRECOGNIZED_STAGE,
                    "Location40324",
                    format!("Unrecognized pipeline stage name: '{}'", other),
                ))
            }
        };
    }
    Ok(docs)
}

fn non_negative(spec: &Value, stage: &str) -> BackendResult<usize> {
    spec.as_i64()
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| BackendError::bad_value(format!("invalid argument to {} stage", stage)))
}

/// Stable multi-key sort; missing fields sort as null.
pub fn sort_documents(docs: &mut [Document], order: &Document) {
    docs.sort_by(|a, b| {
        for (path, direction) in order.iter() {
            let left = a.get_path(path).unwrap_or(&Value::Null);
            let right = b.get_path(path).unwrap_or(&Value::Null);
            let ord = left.total_cmp(right);
            let ord = if direction.as_f64().unwrap_or(1.0) < 0.0 {
                ord.reverse()
            } else {
                ord
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        other => other.as_f64().map(|n| n != 0.0).unwrap_or(true),
    }
}

/// Inclusion or exclusion projection over top-level fields. `_id` is kept
/// unless excluded explicitly.
pub fn project(doc: &Document, spec: &Document) -> Document {
    let inclusion = spec
        .iter()
        .any(|(field, value)| field != "_id" && is_truthy(value));
    let keep_id = spec.get("_id").map(is_truthy).unwrap_or(true);

    doc.iter()
        .filter(|(field, _)| {
            if field.as_str() == "_id" {
                return keep_id;
            }
            match spec.get(field) {
                Some(value) => is_truthy(value) == inclusion,
                None => !inclusion,
            }
        })
        .map(|(field, value)| (field.clone(), value.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use docql_core::extjson::{parse_document, parse_value};

    fn users() -> Vec<Document> {
        vec![
            parse_document("{_id: 1, name: 'Cierra Vega', age: 20}").unwrap(),
            parse_document("{_id: 2, name: 'Alden Cantrell', age: 30}").unwrap(),
            parse_document("{_id: 3, name: 'Kierra Gentry', age: 40}").unwrap(),
        ]
    }

    fn stages(text: &str) -> Vec<Value> {
        match parse_value(text).unwrap() {
            Value::Array(items) => items,
            other => vec![other],
        }
    }

    #[test]
    fn test_match_sort_limit() {
        let out = run(
            users(),
            &stages("[{$match: {age: {$gte: 30}}}, {$sort: {age: -1}}, {$limit: 1}]"),
        )
        .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].get_str("name"), Some("Kierra Gentry"));
    }

    #[test]
    fn test_project_and_count() {
        let out = run(users(), &stages("[{$project: {name: 1, _id: 0}}]")).unwrap();
        assert_eq!(out[0].to_string(), r#"{"name": "Cierra Vega"}"#);

        let out = run(users(), &stages("[{$skip: 1}, {$count: 'total'}]")).unwrap();
        assert_eq!(out[0].get("total"), Some(&Value::Int32(2)));
    }

    #[test]
    fn test_exclusion_projection() {
        let out = project(&users()[0], &parse_document("{age: 0}").unwrap());
        assert_eq!(out.to_string(), r#"{"_id": 1, "name": "Cierra Vega"}"#);
    }

    #[test]
    fn test_unrecognized_stage() {
        let err = run(users(), &stages("[{$frobnicate: {}}]")).unwrap_err();
        assert_eq!(err.code(), Some(codes::UNRECOGNIZED_STAGE));
    }

    #[test]
    fn test_limit_must_be_positive() {
        assert!(run(users(), &stages("[{$limit: 0}]")).is_err());
    }
}
