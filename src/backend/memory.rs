//! In-memory reference backend.
//!
//! Replies follow the server's command reply shapes closely enough that the
//! executor, translator and introspector can be exercised without a live
//! server. Fault injection covers denied reads, rejected credentials and
//! slow responses.

use super::validate::{command_name, validate};
use super::{codes, filter, pipeline, BackendError, BackendResult, CommandBackend};
use docql_core::{Document, ObjectId, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Default)]
struct Faults {
    deny_reads: bool,
    rejected_user: Option<String>,
    latency: Option<Duration>,
}

/// A single-database backend holding collections in memory.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    database: String,
    collections: RwLock<BTreeMap<String, Vec<Document>>>,
    faults: Faults,
}

impl InMemoryBackend {
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            ..Self::default()
        }
    }

    /// Add a collection with documents. Documents without `_id` get one.
    pub fn with_collection(mut self, name: &str, docs: Vec<Document>) -> Self {
        let docs = docs.into_iter().map(with_object_id).collect();
        self.collections.get_mut().insert(name.to_string(), docs);
        self
    }

    /// Every command fails with an authorization error.
    pub fn deny_reads(mut self) -> Self {
        self.faults.deny_reads = true;
        self
    }

    /// Every command fails authentication for `user`.
    pub fn reject_credentials(mut self, user: &str) -> Self {
        self.faults.rejected_user = Some(user.to_string());
        self
    }

    /// Delay every call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.faults.latency = Some(latency);
        self
    }

    /// Snapshot of a collection's documents.
    pub async fn documents(&self, collection: &str) -> Vec<Document> {
        self.collections
            .read()
            .await
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    async fn preflight(&self, command: &str) -> BackendResult<()> {
        if let Some(latency) = self.faults.latency {
            tokio::time::sleep(latency).await;
        }
        if let Some(user) = &self.faults.rejected_user {
            return Err(BackendError::Security {
                code: codes::AUTHENTICATION_FAILED,
                message: format!(
                    "Exception authenticating MongoCredential{{mechanism=SCRAM-SHA-1, userName='{}', source='admin', password=<hidden>, mechanismProperties=<hidden>}}",
                    user
                ),
            });
        }
        if self.faults.deny_reads {
            return Err(BackendError::command(
                codes::UNAUTHORIZED,
                "Unauthorized",
                format!(
                    "not authorized on {} to execute command {{ {}: 1 }}",
                    self.database, command
                ),
            ));
        }
        Ok(())
    }

    fn namespace(&self, collection: &str) -> String {
        format!("{}.{}", self.database, collection)
    }

    fn cursor_reply(&self, collection: &str, batch: Vec<Document>) -> Document {
        let cursor = Document::new()
            .with(
                "firstBatch",
                batch.into_iter().map(Value::Document).collect::<Vec<_>>(),
            )
            .with("id", Value::Int64(0))
            .with("ns", self.namespace(collection));
        Document::new()
            .with("cursor", cursor)
            .with("ok", Value::Double(1.0))
    }

    async fn find(&self, command: &Document) -> BackendResult<Document> {
        let collection = target(command, "find");
        let query = command.get_document("filter").cloned().unwrap_or_default();
        filter::check(&query)?;

        let mut docs: Vec<Document> = self
            .documents(&collection)
            .await
            .into_iter()
            .filter(|doc| filter::matches(doc, &query))
            .collect();

        if let Some(order) = command.get_document("sort") {
            pipeline::sort_documents(&mut docs, order);
        }
        let skip = count_arg(command, "skip")?;
        let limit = command
            .get("limit")
            .and_then(Value::as_i64)
            .map(|n| n.unsigned_abs() as usize)
            .filter(|n| *n > 0);

        let mut batch: Vec<Document> = docs.into_iter().skip(skip).collect();
        if let Some(limit) = limit {
            batch.truncate(limit);
        }
        if let Some(projection) = command.get_document("projection") {
            batch = batch
                .iter()
                .map(|doc| pipeline::project(doc, projection))
                .collect();
        }

        Ok(self.cursor_reply(&collection, batch))
    }

    async fn insert(&self, command: &Document) -> BackendResult<Document> {
        let collection = target(command, "insert");
        let documents = command
            .get("documents")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut inserted = Vec::with_capacity(documents.len());
        for doc in documents {
            match doc {
                Value::Document(doc) => inserted.push(with_object_id(doc)),
                _ => {
                    return Err(BackendError::command(
                        codes::TYPE_MISMATCH,
                        "TypeMismatch",
                        "BSON field 'insert.documents' is the wrong type, expected type 'object'",
                    ))
                }
            }
        }

        let n = inserted.len();
        self.collections
            .write()
            .await
            .entry(collection)
            .or_default()
            .extend(inserted);

        Ok(Document::new()
            .with("n", Value::from_i64(n as i64))
            .with("ok", Value::Double(1.0)))
    }

    async fn update(&self, command: &Document) -> BackendResult<Document> {
        let collection = target(command, "update");
        let statements = statements(command, "updates")?;
        let mut matched = 0i64;
        let mut modified = 0i64;

        let mut collections = self.collections.write().await;
        let docs = collections.entry(collection).or_default();

        for statement in &statements {
            let query = statement.get_document("q").cloned().unwrap_or_default();
            let change = statement.get_document("u").cloned().unwrap_or_default();
            let multi = statement.get("multi").and_then(Value::as_bool).unwrap_or(false);
            filter::check(&query)?;

            for doc in docs.iter_mut() {
                if !filter::matches(doc, &query) {
                    continue;
                }
                let updated = apply_update(doc, &change)?;
                matched += 1;
                if updated != *doc {
                    *doc = updated;
                    modified += 1;
                }
                if !multi {
                    break;
                }
            }
        }

        Ok(Document::new()
            .with("n", Value::from_i64(matched))
            .with("nModified", Value::from_i64(modified))
            .with("ok", Value::Double(1.0)))
    }

    async fn delete(&self, command: &Document) -> BackendResult<Document> {
        let collection = target(command, "delete");
        let statements = statements(command, "deletes")?;
        let mut removed = 0i64;

        let mut collections = self.collections.write().await;
        let docs = collections.entry(collection).or_default();

        for statement in &statements {
            let query = statement.get_document("q").cloned().unwrap_or_default();
            filter::check(&query)?;
            let single = match statement.get("limit").and_then(Value::as_i64) {
                Some(0) => false,
                Some(1) => true,
                _ => {
                    return Err(BackendError::failed_to_parse(
                        "The limit field in delete objects must be 0 or 1.",
                    ))
                }
            };

            if single {
                if let Some(index) = docs.iter().position(|doc| filter::matches(doc, &query)) {
                    docs.remove(index);
                    removed += 1;
                }
            } else {
                let before = docs.len();
                docs.retain(|doc| !filter::matches(doc, &query));
                removed += (before - docs.len()) as i64;
            }
        }

        Ok(Document::new()
            .with("n", Value::from_i64(removed))
            .with("ok", Value::Double(1.0)))
    }

    async fn count(&self, command: &Document) -> BackendResult<Document> {
        let collection = target(command, "count");
        let query = command.get_document("query").cloned().unwrap_or_default();
        filter::check(&query)?;

        let skip = count_arg(command, "skip")?;
        let limit = count_arg(command, "limit")?;
        let mut n = self
            .documents(&collection)
            .await
            .iter()
            .filter(|doc| filter::matches(doc, &query))
            .count()
            .saturating_sub(skip);
        if limit > 0 {
            n = n.min(limit);
        }

        Ok(Document::new()
            .with("n", Value::from_i64(n as i64))
            .with("ok", Value::Double(1.0)))
    }

    async fn distinct(&self, command: &Document) -> BackendResult<Document> {
        let collection = target(command, "distinct");
        let key = command.get_str("key").unwrap_or_default().to_string();
        let query = command.get_document("query").cloned().unwrap_or_default();
        filter::check(&query)?;

        let mut values: Vec<Value> = Vec::new();
        for doc in self.documents(&collection).await {
            if !filter::matches(&doc, &query) {
                continue;
            }
            let found = match doc.get_path(&key) {
                Some(Value::Array(items)) => items.clone(),
                Some(value) => vec![value.clone()],
                None => continue,
            };
            for value in found {
                if !values.iter().any(|seen| seen.loose_eq(&value)) {
                    values.push(value);
                }
            }
        }

        Ok(Document::new()
            .with("values", values)
            .with("ok", Value::Double(1.0)))
    }

    async fn aggregate(&self, command: &Document) -> BackendResult<Document> {
        let collection = target(command, "aggregate");
        let stages = command
            .get("pipeline")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let batch = pipeline::run(self.documents(&collection).await, &stages)?;
        Ok(self.cursor_reply(&collection, batch))
    }

    async fn find_and_modify(&self, command: &Document) -> BackendResult<Document> {
        let collection = target(command, "findAndModify");
        let query = command.get_document("query").cloned().unwrap_or_default();
        filter::check(&query)?;
        let remove = command.get("remove").and_then(Value::as_bool).unwrap_or(false);
        let change = command.get_document("update");
        let return_new = command.get("new").and_then(Value::as_bool).unwrap_or(false);

        if remove == change.is_some() {
            return Err(BackendError::failed_to_parse(
                "Either an update or remove=true must be specified",
            ));
        }

        let mut collections = self.collections.write().await;
        let docs = collections.entry(collection).or_default();

        let mut candidates: Vec<usize> = (0..docs.len())
            .filter(|i| filter::matches(&docs[*i], &query))
            .collect();
        if let Some(order) = command.get_document("sort") {
            let mut keyed: Vec<Document> = candidates.iter().map(|i| docs[*i].clone()).collect();
            pipeline::sort_documents(&mut keyed, order);
            candidates = keyed
                .first()
                .and_then(|first| docs.iter().position(|doc| doc == first))
                .into_iter()
                .collect();
        }

        let (found, value) = match candidates.first().copied() {
            None => (false, Value::Null),
            Some(index) if remove => (true, Value::Document(docs.remove(index))),
            Some(index) => {
                let before = docs[index].clone();
                let after = apply_update(&before, change.unwrap_or(&Document::new()))?;
                docs[index] = after.clone();
                (true, Value::Document(if return_new { after } else { before }))
            }
        };

        let value = match (value, command.get_document("fields")) {
            (Value::Document(doc), Some(fields)) => Value::Document(pipeline::project(&doc, fields)),
            (value, _) => value,
        };
        let last_error = Document::new()
            .with("n", if found { 1 } else { 0 })
            .with("updatedExisting", found && !remove);

        Ok(Document::new()
            .with("lastErrorObject", last_error)
            .with("value", value)
            .with("ok", Value::Double(1.0)))
    }

    async fn list_collections_reply(&self) -> BackendResult<Document> {
        let batch = self
            .list_collections()
            .await?
            .into_iter()
            .map(|name| Document::new().with("name", name).with("type", "collection"))
            .collect();
        Ok(self.cursor_reply("$cmd.listCollections", batch))
    }
}

#[async_trait::async_trait]
impl CommandBackend for InMemoryBackend {
    async fn run_command(&self, command: &Document) -> BackendResult<Document> {
        let name = command_name(command)?;
        self.preflight(name).await?;
        validate(name, command)?;

        match name {
            "find" => self.find(command).await,
            "insert" => self.insert(command).await,
            "update" => self.update(command).await,
            "delete" => self.delete(command).await,
            "count" => self.count(command).await,
            "distinct" => self.distinct(command).await,
            "aggregate" => self.aggregate(command).await,
            "findAndModify" => self.find_and_modify(command).await,
            "listCollections" => self.list_collections_reply().await,
            _ => Ok(Document::new().with("ok", Value::Double(1.0))),
        }
    }

    async fn list_collections(&self) -> BackendResult<Vec<String>> {
        self.preflight("listCollections").await?;
        Ok(self.collections.read().await.keys().cloned().collect())
    }

    async fn sample(&self, collection: &str, size: usize) -> BackendResult<Vec<Document>> {
        self.preflight("find").await?;
        let mut docs = self.documents(collection).await;
        docs.truncate(size);
        Ok(docs)
    }

    async fn ping(&self) -> BackendResult<()> {
        self.preflight("ping").await
    }
}

/// Collection named by the command's first field.
fn target(command: &Document, name: &str) -> String {
    command
        .get(name)
        .or_else(|| command.iter().next().map(|(_, v)| v))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn count_arg(command: &Document, field: &str) -> BackendResult<usize> {
    match command.get(field) {
        None => Ok(0),
        Some(value) => value
            .as_i64()
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| BackendError::bad_value(format!("{} value must be non-negative", field))),
    }
}

fn statements(command: &Document, field: &str) -> BackendResult<Vec<Document>> {
    command
        .get(field)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
        .into_iter()
        .map(|item| match item {
            Value::Document(doc) => Ok(doc),
            other => Err(BackendError::command(
                codes::TYPE_MISMATCH,
                "TypeMismatch",
                format!(
                    "BSON field '{}' is the wrong type '{}', expected type 'object'",
                    field,
                    other.bson_type()
                ),
            )),
        })
        .collect()
}

fn with_object_id(mut doc: Document) -> Document {
    if doc.contains_key("_id") {
        return doc;
    }
    let mut with_id = Document::new().with("_id", Value::ObjectId(generate_object_id()));
    for (key, value) in std::mem::take(&mut doc) {
        with_id.insert(key, value);
    }
    with_id
}

/// Four bytes of seconds since the epoch followed by eight random bytes.
fn generate_object_id() -> ObjectId {
    let mut bytes = [0u8; 12];
    let seconds = chrono::Utc::now().timestamp() as u32;
    bytes[..4].copy_from_slice(&seconds.to_be_bytes());
    bytes[4..].copy_from_slice(&rand::random::<[u8; 8]>());
    ObjectId::from_bytes(bytes)
}

/// Apply an operator update (`$set`, `$unset`, `$inc`, `$push`) or a
/// replacement document. `_id` is preserved by replacements.
fn apply_update(doc: &Document, change: &Document) -> BackendResult<Document> {
    let is_operator = change.first_key().is_some_and(|k| k.starts_with('$'));
    if !is_operator {
        let mut replaced = Document::new();
        if let Some(id) = doc.get("_id") {
            replaced.insert("_id", id.clone());
        }
        for (key, value) in change.iter() {
            if key != "_id" {
                replaced.insert(key.clone(), value.clone());
            }
        }
        return Ok(replaced);
    }

    let mut updated = doc.clone();
    for (op, spec) in change.iter() {
        let fields = spec.as_document().ok_or_else(|| {
            BackendError::failed_to_parse(format!(
                "Modifiers operate on fields but we found type {} instead.",
                spec.bson_type()
            ))
        })?;
        for (path, arg) in fields.iter() {
            match op.as_str() {
                "$set" => set_path(&mut updated, path, arg.clone()),
                "$unset" => unset_path(&mut updated, path),
                "$inc" => {
                    let current = updated.get_path(path).cloned().unwrap_or(Value::Int32(0));
                    let sum = add_numbers(&current, arg).ok_or_else(|| {
                        BackendError::command(
                            codes::TYPE_MISMATCH,
                            "TypeMismatch",
                            format!("Cannot apply $inc to a value of non-numeric type. {{_id: {}}} has the field '{}' of non-numeric type {}", updated.get("_id").map(|v| v.to_string()).unwrap_or_default(), path, current.bson_type()),
                        )
                    })?;
                    set_path(&mut updated, path, sum);
                }
                "$push" => {
                    let mut items = match updated.get_path(path) {
                        None => Vec::new(),
                        Some(Value::Array(items)) => items.clone(),
                        Some(other) => {
                            return Err(BackendError::bad_value(format!(
                                "The field '{}' must be an array but is of type {}",
                                path,
                                other.bson_type()
                            )))
                        }
                    };
                    items.push(arg.clone());
                    set_path(&mut updated, path, Value::Array(items));
                }
                other => {
                    return Err(BackendError::failed_to_parse(format!(
                        "Unknown modifier: {}. Expected a valid update modifier or pipeline-style update specified as an array",
                        other
                    )))
                }
            }
        }
    }
    Ok(updated)
}

fn add_numbers(current: &Value, delta: &Value) -> Option<Value> {
    match (current, delta) {
        (Value::Int32(a), Value::Int32(b)) => Some(
            a.checked_add(*b)
                .map(Value::Int32)
                .unwrap_or(Value::Int64(*a as i64 + *b as i64)),
        ),
        (Value::Int32(_) | Value::Int64(_), Value::Int32(_) | Value::Int64(_)) => {
            Some(Value::Int64(current.as_i64()?.checked_add(delta.as_i64()?)?))
        }
        _ if current.is_number() && delta.is_number() => {
            Some(Value::Double(current.as_f64()? + delta.as_f64()?))
        }
        _ => None,
    }
}

fn set_path(doc: &mut Document, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            doc.insert(path, value);
        }
        Some((head, rest)) => {
            if !matches!(doc.get(head), Some(Value::Document(_))) {
                doc.insert(head, Document::new());
            }
            if let Some(Value::Document(child)) = doc.get_mut(head) {
                set_path(child, rest, value);
            }
        }
    }
}

fn unset_path(doc: &mut Document, path: &str) {
    match path.split_once('.') {
        None => {
            doc.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Value::Document(child)) = doc.get_mut(head) {
                unset_path(child, rest);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docql_core::extjson::parse_document;

    fn backend() -> InMemoryBackend {
        InMemoryBackend::new("test").with_collection(
            "users",
            vec![
                parse_document("{name: 'Cierra Vega', gender: 'F', age: 20}").unwrap(),
                parse_document("{name: 'Alden Cantrell', gender: 'M', age: 30}").unwrap(),
                parse_document("{name: 'Kierra Gentry', gender: 'F', age: 40}").unwrap(),
            ],
        )
    }

    async fn run(backend: &InMemoryBackend, text: &str) -> BackendResult<Document> {
        backend.run_command(&parse_document(text).unwrap()).await
    }

    #[tokio::test]
    async fn test_generated_ids_come_first() {
        let docs = backend().documents("users").await;
        assert_eq!(docs[0].first_key(), Some("_id"));
        assert!(matches!(docs[0].get("_id"), Some(Value::ObjectId(_))));
    }

    #[tokio::test]
    async fn test_find_with_sort_skip_limit() {
        let backend = backend();
        let reply = run(
            &backend,
            "{find: 'users', filter: {}, sort: {age: -1}, skip: 1, limit: 1, projection: {name: 1, _id: 0}}",
        )
        .await
        .unwrap();
        let batch = reply.get_path("cursor.firstBatch").unwrap();
        assert_eq!(batch.to_string(), r#"[{"name": "Alden Cantrell"}]"#);
    }

    #[tokio::test]
    async fn test_update_operators() {
        let backend = backend();
        let reply = run(
            &backend,
            "{update: 'users', updates: [{q: {gender: 'F'}, u: {$inc: {age: 1}, $push: {tags: 'x'}}, multi: true}]}",
        )
        .await
        .unwrap();
        assert_eq!(reply.get("nModified"), Some(&Value::Int32(2)));

        let docs = backend.documents("users").await;
        assert_eq!(docs[0].get("age"), Some(&Value::Int32(21)));
        assert_eq!(docs[2].get_path("tags.0"), Some(&Value::from("x")));
    }

    #[tokio::test]
    async fn test_unchanged_update_not_counted() {
        let backend = backend();
        let reply = run(
            &backend,
            "{update: 'users', updates: [{q: {age: 30}, u: {$set: {age: 30}}, multi: false}]}",
        )
        .await
        .unwrap();
        assert_eq!(reply.get("n"), Some(&Value::Int32(1)));
        assert_eq!(reply.get("nModified"), Some(&Value::Int32(0)));
    }

    #[tokio::test]
    async fn test_replacement_keeps_id() {
        let backend = backend();
        let id = backend.documents("users").await[1].get("_id").cloned();
        run(
            &backend,
            "{update: 'users', updates: [{q: {age: 30}, u: {name: 'Replaced'}, multi: false}]}",
        )
        .await
        .unwrap();
        let docs = backend.documents("users").await;
        assert_eq!(docs[1].get("_id").cloned(), id);
        assert_eq!(docs[1].len(), 2);
    }

    #[tokio::test]
    async fn test_find_and_modify_returns_new() {
        let backend = backend();
        let reply = run(
            &backend,
            "{findAndModify: 'users', query: {age: {$gt: 25}}, sort: {age: -1}, update: {$set: {vip: true}}, new: true}",
        )
        .await
        .unwrap();
        assert_eq!(
            reply.get_path("value.name"),
            Some(&Value::from("Kierra Gentry"))
        );
        assert_eq!(reply.get_path("value.vip"), Some(&Value::Bool(true)));
        assert_eq!(reply.get_path("lastErrorObject.n"), Some(&Value::Int32(1)));
    }

    #[tokio::test]
    async fn test_faults() {
        let denied = backend().deny_reads();
        let err = denied.list_collections().await.unwrap_err();
        assert!(err.is_unauthorized());

        let rejected = backend().reject_credentials("admin");
        assert!(matches!(
            rejected.ping().await,
            Err(BackendError::Security { code: 18, .. })
        ));
    }

    #[tokio::test]
    async fn test_unknown_command() {
        let err = run(&backend(), "{shutdown: 1}").await.unwrap_err();
        assert_eq!(err.code(), Some(codes::COMMAND_NOT_FOUND));
    }

    #[test]
    fn test_inc_overflow_widens() {
        assert_eq!(
            add_numbers(&Value::Int32(i32::MAX), &Value::Int32(1)),
            Some(Value::Int64(i32::MAX as i64 + 1))
        );
        assert_eq!(add_numbers(&Value::from("a"), &Value::Int32(1)), None);
    }
}
