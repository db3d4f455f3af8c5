//! Query filter evaluation for the in-memory backend.

use super::{codes, BackendError, BackendResult};
use docql_core::{Document, Value};
use regex::{Regex, RegexBuilder};
use std::cmp::Ordering;

const LOGICAL: [&str; 3] = ["$and", "$or", "$nor"];
const FIELD_OPERATORS: [&str; 11] = [
    "$eq", "$ne", "$gt", "$gte", "$lt", "$lte", "$in", "$nin", "$exists", "$regex", "$options",
];

/// Reject filters the server would refuse, before any document is examined.
pub fn check(filter: &Document) -> BackendResult<()> {
    for (key, value) in filter.iter() {
        if key.starts_with('$') {
            if !LOGICAL.contains(&key.as_str()) {
                return Err(BackendError::bad_value(format!(
                    "unknown top level operator: {}. If you have a field name that starts with a '$' symbol, consider using $getField or $setField.",
                    key
                )));
            }
            let clauses = value
                .as_array()
                .filter(|items| !items.is_empty())
                .ok_or_else(|| {
                    BackendError::bad_value(format!("{} must be a nonempty array", key))
                })?;
            for clause in clauses {
                let clause = clause.as_document().ok_or_else(|| {
                    BackendError::bad_value(format!("{} argument's entries must be objects", key))
                })?;
                check(clause)?;
            }
        } else if let Some(ops) = operator_document(value) {
            check_operators(ops)?;
        }
    }
    Ok(())
}

fn check_operators(ops: &Document) -> BackendResult<()> {
    for (op, arg) in ops.iter() {
        if !FIELD_OPERATORS.contains(&op.as_str()) {
            return Err(BackendError::bad_value(format!("unknown operator: {}", op)));
        }
        match op.as_str() {
            "$in" | "$nin" if arg.as_array().is_none() => {
                return Err(BackendError::bad_value(format!("{} needs an array", op)));
            }
            "$regex" => {
                build_regex(arg, ops.get("$options"))?;
            }
            _ => {}
        }
    }
    Ok(())
}

/// A sub-document is an operator expression when its first key starts with `$`.
fn operator_document(value: &Value) -> Option<&Document> {
    value
        .as_document()
        .filter(|doc| doc.first_key().is_some_and(|k| k.starts_with('$')))
}

fn build_regex(pattern: &Value, options: Option<&Value>) -> BackendResult<Regex> {
    let pattern = pattern
        .as_str()
        .ok_or_else(|| BackendError::bad_value("$regex has to be a string"))?;
    let options = options.and_then(Value::as_str).unwrap_or_default();
    RegexBuilder::new(pattern)
        .case_insensitive(options.contains('i'))
        .multi_line(options.contains('m'))
        .dot_matches_new_line(options.contains('s'))
        .ignore_whitespace(options.contains('x'))
        .build()
        .map_err(|e| {
            BackendError::command(
                codes::INVALID_REGEX,
                "Location51091",
                format!("Regular expression is invalid: {}", e),
            )
        })
}

/// Evaluate a filter that has already passed [`check`].
pub fn matches(doc: &Document, filter: &Document) -> bool {
    filter.iter().all(|(key, condition)| match key.as_str() {
        "$and" => clauses(condition).all(|c| matches(doc, c)),
        "$or" => clauses(condition).any(|c| matches(doc, c)),
        "$nor" => !clauses(condition).any(|c| matches(doc, c)),
        path => {
            let actual = doc.get_path(path);
            match operator_document(condition) {
                Some(ops) => ops
                    .iter()
                    .all(|(op, arg)| apply_operator(actual, op, arg, ops)),
                None => equals(actual, condition),
            }
        }
    })
}

fn clauses(value: &Value) -> impl Iterator<Item = &Document> {
    value
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(Value::as_document)
}

/// Equality with array fields matching on any element.
fn equals(actual: Option<&Value>, expected: &Value) -> bool {
    match actual {
        None => matches!(expected, Value::Null),
        Some(value) if value.loose_eq(expected) => true,
        Some(Value::Array(items)) => items.iter().any(|item| item.loose_eq(expected)),
        Some(_) => false,
    }
}

fn compare_any(actual: Option<&Value>, arg: &Value, accept: fn(Ordering) -> bool) -> bool {
    let test = |value: &Value| value.compare(arg).is_some_and(accept);
    match actual {
        None => false,
        Some(Value::Array(items)) if !matches!(arg, Value::Array(_)) => items.iter().any(test),
        Some(value) => test(value),
    }
}

fn apply_operator(actual: Option<&Value>, op: &str, arg: &Value, ops: &Document) -> bool {
    match op {
        "$eq" => equals(actual, arg),
        "$ne" => !equals(actual, arg),
        "$gt" => compare_any(actual, arg, Ordering::is_gt),
        "$gte" => compare_any(actual, arg, Ordering::is_ge),
        "$lt" => compare_any(actual, arg, Ordering::is_lt),
        "$lte" => compare_any(actual, arg, Ordering::is_le),
        "$in" => arg
            .as_array()
            .is_some_and(|items| items.iter().any(|item| equals(actual, item))),
        "$nin" => arg
            .as_array()
            .is_some_and(|items| !items.iter().any(|item| equals(actual, item))),
        "$exists" => {
            let wanted = arg.as_bool().unwrap_or_else(|| arg.as_i64() != Some(0));
            actual.is_some() == wanted
        }
        "$regex" => match build_regex(arg, ops.get("$options")) {
            Ok(re) => match actual {
                Some(Value::String(s)) => re.is_match(s),
                Some(Value::Array(items)) => items
                    .iter()
                    .any(|item| item.as_str().is_some_and(|s| re.is_match(s))),
                _ => false,
            },
            Err(_) => false,
        },
        "$options" => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docql_core::extjson::parse_document;

    fn doc(text: &str) -> Document {
        parse_document(text).unwrap()
    }

    #[test]
    fn test_comparison_operators() {
        let person = doc("{name: 'Alden Cantrell', age: 30, tags: ['a', 'b']}");
        assert!(matches(&person, &doc("{age: {$gte: 30}}")));
        assert!(!matches(&person, &doc("{age: {$gt: 30}}")));
        assert!(matches(&person, &doc("{age: {$gt: 20, $lt: 40}}")));
        assert!(matches(&person, &doc("{age: NumberLong(30)}")));
        assert!(matches(&person, &doc("{tags: 'b'}")));
        assert!(matches(&person, &doc("{name: {$in: ['x', 'Alden Cantrell']}}")));
        assert!(matches(&person, &doc("{missing: {$exists: false}}")));
        assert!(matches(&person, &doc("{missing: null}")));
        assert!(!matches(&person, &doc("{age: {$gte: '30'}}")));
    }

    #[test]
    fn test_logical_and_regex() {
        let person = doc("{name: 'Kierra Gentry', gender: 'F', age: 40}");
        assert!(matches(&person, &doc("{$or: [{age: 1}, {gender: 'F'}]}")));
        assert!(!matches(&person, &doc("{$nor: [{gender: 'F'}]}")));
        assert!(matches(&person, &doc("{name: {$regex: '^kier', $options: 'i'}}")));
    }

    #[test]
    fn test_unknown_top_level_operator() {
        let err = check(&doc("{$is: {}}")).unwrap_err();
        match err {
            BackendError::Command { code, message, .. } => {
                assert_eq!(code, 2);
                assert!(message.starts_with("unknown top level operator: $is."));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_field_operator_and_bad_logical() {
        assert!(check(&doc("{age: {$near: 1}}")).is_err());
        assert!(check(&doc("{$and: []}")).is_err());
        assert!(check(&doc("{name: {$regex: '('}}")).is_err());
    }
}
