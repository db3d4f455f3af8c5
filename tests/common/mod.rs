//! Common test utilities for compiler and execution tests
//!
//! Provides shared helper functions for:
//! - Seeding the in-memory backend with the users fixture
//! - Building executors and bindings

#![allow(dead_code)]

use docql::{Executor, InMemoryBackend};
use docql_core::extjson::parse_document;
use docql_core::{Bindings, Document};
use std::sync::Arc;

pub fn users() -> Vec<Document> {
    [
        r#"{
            name: "Cierra Vega", gender: "F", age: 20,
            luckyNumber: NumberLong(15), dob: ISODate("2018-12-31T00:00:00Z"),
            netWorth: NumberDecimal("123456.789012"), aLong: NumberLong(9000000000000000000),
            ts: Timestamp(1421006159, 4), updatedByCommand: false
        }"#,
        r#"{
            name: "Alden Cantrell", gender: "M", age: 30,
            luckyNumber: NumberLong(15), dob: ISODate("2019-01-01T00:00:00Z"),
            netWorth: NumberDecimal("123456.789012"), aLong: NumberLong(9000000000000000000),
            ts: Timestamp(1421006159, 4), updatedByCommand: false
        }"#,
        r#"{
            name: "Kierra Gentry", gender: "F", age: 40,
            luckyNumber: NumberLong(18), dob: ISODate("2018-11-01T00:00:00Z"),
            netWorth: NumberDecimal("123456.789012"), aLong: NumberLong(9000000000000000000),
            ts: Timestamp(1421006159, 4), updatedByCommand: false
        }"#,
    ]
    .iter()
    .map(|text| parse_document(text).expect("fixture parses"))
    .collect()
}

pub fn create_seeded_backend() -> InMemoryBackend {
    InMemoryBackend::new("test").with_collection("users", users())
}

pub fn create_executor(backend: InMemoryBackend) -> (Executor<InMemoryBackend>, Arc<InMemoryBackend>) {
    let backend = Arc::new(backend);
    (Executor::new(backend.clone()), backend)
}

pub fn bindings(pairs: &[(&str, &str)]) -> Bindings {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
