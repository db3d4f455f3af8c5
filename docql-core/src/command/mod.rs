//! Command kinds, form fields and canonical command assembly.

pub mod dispatcher;
pub mod fields;
pub mod kind;

pub use dispatcher::Dispatcher;
pub use fields::{FormField, FormFields};
pub use kind::CommandKind;

use crate::value::{Document, Value};
use serde::{Deserialize, Serialize};

/// Update/delete cardinality.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LimitPolicy {
    #[default]
    Single,
    All,
}

/// An assembled command, carrying only the fields its kind defines.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Find {
        collection: String,
        filter: Document,
        sort: Option<Document>,
        projection: Option<Document>,
        skip: Option<i64>,
        limit: i64,
    },
    Insert {
        collection: String,
        documents: Vec<Document>,
    },
    Update {
        collection: String,
        filter: Document,
        update: Document,
        limit: LimitPolicy,
    },
    Delete {
        collection: String,
        filter: Document,
        limit: LimitPolicy,
    },
    Count {
        collection: String,
        filter: Document,
    },
    Distinct {
        collection: String,
        key: String,
        filter: Document,
    },
    Aggregate {
        collection: String,
        pipeline: Vec<Document>,
        limit: Option<i64>,
    },
    FindAndModify {
        body: Document,
    },
    Raw {
        body: Document,
    },
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::Find { .. } => CommandKind::Find,
            Command::Insert { .. } => CommandKind::Insert,
            Command::Update { .. } => CommandKind::Update,
            Command::Delete { .. } => CommandKind::Delete,
            Command::Count { .. } => CommandKind::Count,
            Command::Distinct { .. } => CommandKind::Distinct,
            Command::Aggregate { .. } => CommandKind::Aggregate,
            Command::FindAndModify { .. } => CommandKind::FindAndModify,
            Command::Raw { .. } => CommandKind::Raw,
        }
    }

    /// Target collection; for body commands, the value of the first field.
    pub fn collection(&self) -> Option<&str> {
        match self {
            Command::Find { collection, .. }
            | Command::Insert { collection, .. }
            | Command::Update { collection, .. }
            | Command::Delete { collection, .. }
            | Command::Count { collection, .. }
            | Command::Distinct { collection, .. }
            | Command::Aggregate { collection, .. } => Some(collection),
            Command::FindAndModify { body } | Command::Raw { body } => {
                body.first_key().and_then(|key| body.get_str(key))
            }
        }
    }

    /// Wire shape of the command.
    pub fn to_document(&self) -> Document {
        match self {
            Command::Find {
                collection,
                filter,
                sort,
                projection,
                skip,
                limit,
            } => {
                let mut doc = Document::new()
                    .with("find", collection.as_str())
                    .with("filter", filter.clone());
                if let Some(sort) = sort {
                    doc.insert("sort", sort.clone());
                }
                if let Some(skip) = skip {
                    doc.insert("skip", Value::from_i64(*skip));
                }
                doc.insert("limit", Value::from_i64(*limit));
                doc.insert("batchSize", Value::from_i64(*limit));
                if let Some(projection) = projection {
                    doc.insert("projection", projection.clone());
                }
                doc
            }
            Command::Insert {
                collection,
                documents,
            } => Document::new().with("insert", collection.as_str()).with(
                "documents",
                documents
                    .iter()
                    .cloned()
                    .map(Value::Document)
                    .collect::<Vec<_>>(),
            ),
            Command::Update {
                collection,
                filter,
                update,
                limit,
            } => {
                let statement = Document::new()
                    .with("q", filter.clone())
                    .with("u", update.clone())
                    .with("multi", *limit == LimitPolicy::All);
                Document::new()
                    .with("update", collection.as_str())
                    .with("updates", vec![Value::Document(statement)])
            }
            Command::Delete {
                collection,
                filter,
                limit,
            } => {
                let statement = Document::new().with("q", filter.clone()).with(
                    "limit",
                    match limit {
                        LimitPolicy::Single => 1,
                        LimitPolicy::All => 0,
                    },
                );
                Document::new()
                    .with("delete", collection.as_str())
                    .with("deletes", vec![Value::Document(statement)])
            }
            Command::Count { collection, filter } => Document::new()
                .with("count", collection.as_str())
                .with("query", filter.clone()),
            Command::Distinct {
                collection,
                key,
                filter,
            } => Document::new()
                .with("distinct", collection.as_str())
                .with("key", key.as_str())
                .with("query", filter.clone()),
            Command::Aggregate {
                collection,
                pipeline,
                limit,
            } => {
                let mut stages: Vec<Value> =
                    pipeline.iter().cloned().map(Value::Document).collect();
                if let Some(limit) = limit {
                    stages.push(Value::Document(
                        Document::new().with("$limit", Value::from_i64(*limit)),
                    ));
                }
                Document::new()
                    .with("aggregate", collection.as_str())
                    .with("pipeline", stages)
                    .with("cursor", Document::new())
            }
            Command::FindAndModify { body } | Command::Raw { body } => body.clone(),
        }
    }
}
