//! End-to-end execution tests against the seeded in-memory backend

mod common;

use common::{bindings, create_executor, create_seeded_backend};
use docql::{InMemoryBackend, ReadableError};
use docql_core::error::{FILTER_NOT_OBJECT, INVALID_PIPELINE_STAGE};
use docql_core::{Bindings, CommandKind, CommandRequest, Value};
use std::time::Duration;

fn find(filter: &str) -> CommandRequest {
    CommandRequest::new(CommandKind::Find)
        .with("collection", "users")
        .with("filter", filter)
}

#[tokio::test]
async fn test_raw_find_with_range_filter() {
    let (executor, _) = create_executor(create_seeded_backend());
    let request =
        CommandRequest::raw(r#"{find:"users", filter:{age:{$gte:30}}, sort:{id:1}, limit:10}"#);

    let outcome = executor.execute(&request, &Bindings::new()).await.unwrap();
    assert!(outcome.success);
    let body = outcome.body.unwrap();
    assert_eq!(body.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_unknown_top_level_operator() {
    let (executor, _) = create_executor(create_seeded_backend());
    let request = CommandRequest::raw(r#"{find:"users", filter:{$is:{}}, limit:10}"#);

    let outcome = executor.execute(&request, &Bindings::new()).await.unwrap();
    assert!(!outcome.success);
    assert_eq!(
        outcome.readable_error,
        Some(ReadableError::Argument(
            "unknown top level operator: $is".to_string()
        ))
    );
}

#[tokio::test]
async fn test_pipeline_with_trailing_garbage() {
    let (executor, _) = create_executor(create_seeded_backend());
    let request = CommandRequest::new(CommandKind::Aggregate)
        .with("collection", "users")
        .with("pipeline", "{$sort:{_id:1}}abcd");

    let err = executor
        .execute(&request, &Bindings::new())
        .await
        .unwrap_err();
    assert_eq!(err, ReadableError::Argument(INVALID_PIPELINE_STAGE.to_string()));
}

#[tokio::test]
async fn test_count_and_distinct() {
    let (executor, _) = create_executor(create_seeded_backend());

    let count = CommandRequest::new(CommandKind::Count)
        .with("collection", "users")
        .with("filter", "{}");
    let outcome = executor.execute(&count, &Bindings::new()).await.unwrap();
    assert_eq!(outcome.body.unwrap()["n"], 3);

    let distinct = CommandRequest::new(CommandKind::Distinct)
        .with("collection", "users")
        .with("key", "name");
    let outcome = executor.execute(&distinct, &Bindings::new()).await.unwrap();
    let body = outcome.body.unwrap();
    assert_eq!(body["values"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_delete_single_and_all() {
    let (executor, backend) = create_executor(create_seeded_backend());

    let single = CommandRequest::new(CommandKind::Delete)
        .with("collection", "users")
        .with("filter", r#"{ gender: "F" }"#)
        .with("limit", "SINGLE");
    executor.execute(&single, &Bindings::new()).await.unwrap();
    assert_eq!(backend.documents("users").await.len(), 2);

    let (executor, backend) = create_executor(create_seeded_backend());
    let all = CommandRequest::new(CommandKind::Delete)
        .with("collection", "users")
        .with("filter", r#"{ gender: "F" }"#)
        .with("limit", "all");
    let outcome = executor.execute(&all, &Bindings::new()).await.unwrap();
    assert_eq!(outcome.body.unwrap()["n"], 2);
    assert_eq!(backend.documents("users").await.len(), 1);
}

#[tokio::test]
async fn test_update_single_and_all() {
    let update = |limit: &str| {
        CommandRequest::new(CommandKind::Update)
            .with("collection", "users")
            .with("filter", r#"{ gender: "F" }"#)
            .with("update", "{ $set: { updatedByCommand: true } }")
            .with("limit", limit)
    };

    let (executor, _) = create_executor(create_seeded_backend());
    let outcome = executor
        .execute(&update("SINGLE"), &Bindings::new())
        .await
        .unwrap();
    assert_eq!(outcome.body.unwrap()["nModified"], 1);

    let (executor, backend) = create_executor(create_seeded_backend());
    let outcome = executor
        .execute(&update("ALL"), &Bindings::new())
        .await
        .unwrap();
    assert_eq!(outcome.body.unwrap()["nModified"], 2);
    let flagged = backend
        .documents("users")
        .await
        .iter()
        .filter(|doc| doc.get("updatedByCommand") == Some(&Value::Bool(true)))
        .count();
    assert_eq!(flagged, 2);
}

#[tokio::test]
async fn test_whole_quote_placeholder_receives_object() {
    let (executor, _) = create_executor(create_seeded_backend());
    let request = find(r#""{{Input1.text}}""#);
    let outcome = executor
        .execute(&request, &bindings(&[("Input1.text", "{ age: { $lt: 25 } }")]))
        .await
        .unwrap();

    let body = outcome.body.unwrap();
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["name"], "Cierra Vega");
    assert_eq!(outcome.request.parameters.len(), 1);
}

#[tokio::test]
async fn test_string_binding_as_filter_is_rejected() {
    let (executor, _) = create_executor(create_seeded_backend());
    let err = executor
        .execute(&find("{{q}}"), &bindings(&[("q", "abc")]))
        .await
        .unwrap_err();
    assert_eq!(err, ReadableError::Argument(FILTER_NOT_OBJECT.to_string()));
}

#[tokio::test]
async fn test_backend_field_errors_are_readable() {
    let (executor, _) = create_executor(create_seeded_backend());
    let cases = [
        (r#"{find: "users", limitx: 10}"#, "Unrecognized field 'limitx'."),
        (r#"{find: "users", limit: [10]}"#, "'limit' field must be numeric."),
        (r#"{find: "users", filter: "abc"}"#, FILTER_NOT_OBJECT),
    ];

    for (body, expected) in cases {
        let outcome = executor
            .execute(&CommandRequest::raw(body), &Bindings::new())
            .await
            .unwrap();
        assert_eq!(
            outcome.readable_error,
            Some(ReadableError::Argument(expected.to_string())),
            "body: {}",
            body
        );
        assert!(outcome.original_error.is_some());
    }
}

#[tokio::test]
async fn test_typed_literals_round_trip_through_insert() {
    let (executor, backend) = create_executor(create_seeded_backend());
    let insert = CommandRequest::new(CommandKind::Insert)
        .with("collection", "users")
        .with(
            "documents",
            r#"{ _id: {{id}}, name: "Nova", joined: ISODate("2020-02-02"), score: NumberDecimal("9.5") }"#,
        );
    let outcome = executor
        .execute(
            &insert,
            &bindings(&[("id", "ObjectId(\"5f1b2c3d4e5f6a7b8c9d0e1f\")")]),
        )
        .await
        .unwrap();
    assert_eq!(outcome.body.unwrap()["n"], 1);
    assert_eq!(backend.documents("users").await.len(), 4);

    let outcome = executor
        .execute(
            &find(r#"{ _id: "{{id}}" }"#),
            &bindings(&[("id", "ObjectId('5f1b2c3d4e5f6a7b8c9d0e1f')")]),
        )
        .await
        .unwrap();
    let body = outcome.body.unwrap();
    assert_eq!(body[0]["_id"], "5f1b2c3d4e5f6a7b8c9d0e1f");
    assert_eq!(body[0]["joined"], "2020-02-02T00:00:00Z");
}

#[tokio::test]
async fn test_permission_and_timeout_outcomes() {
    let (executor, _) = create_executor(create_seeded_backend().deny_reads());
    let outcome = executor.execute(&find("{}"), &Bindings::new()).await.unwrap();
    assert_eq!(outcome.title.as_deref(), Some("Permission error"));

    let slow = create_seeded_backend().with_latency(Duration::from_millis(200));
    let (executor, _) = create_executor(slow);
    let executor = executor.with_timeout(Duration::from_millis(20));
    let outcome = executor.execute(&find("{}"), &Bindings::new()).await.unwrap();
    assert!(matches!(outcome.readable_error, Some(ReadableError::Timeout(_))));
}

#[test]
fn test_authentication_outcome_blocking() {
    let (executor, _) =
        create_executor(InMemoryBackend::new("test").reject_credentials("reader"));
    let outcome =
        tokio_test::block_on(executor.execute(&find("{}"), &Bindings::new())).unwrap();
    assert_eq!(
        outcome.readable_error,
        Some(ReadableError::Authentication(
            "Exception authenticating MongoCredential.".to_string()
        ))
    );
}
