//! Database structure introspection: sampled column schemas plus canned
//! command templates for every collection.

use crate::backend::{BackendError, CommandBackend};
use crate::error::{ReadableError, ReadableResult};
use crate::translator;
use docql_core::command::Dispatcher;
use docql_core::{
    CommandKind, CommandRequest, CompileResult, Document, ObjectId, QueryCompiler, Timestamp, Value,
};
use serde::Serialize;

pub const DEFAULT_SAMPLE_SIZE: usize = 10;

pub const READ_PERMISSION_REQUIRED: &str =
    "Failed to get database structure. Please provide read permission on the database to fix this.";

const ID_FIELD: &str = "_id";
const MIXED_TYPE: &str = "Object";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasourceStructure {
    pub tables: Vec<Table>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Table {
    pub name: String,
    pub columns: Vec<Column>,
    pub keys: Vec<Key>,
    pub templates: Vec<Template>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub is_primary: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Key {
    pub name: String,
    pub columns: Vec<String>,
}

/// A ready-to-run example command: the assembled body text plus the
/// form-field request that produces it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Template {
    pub title: String,
    pub body: String,
    pub request: CommandRequest,
}

/// Sample every collection and describe it. Any listing or sampling failure
/// aborts the whole call.
pub async fn get_structure<B: CommandBackend + ?Sized>(
    backend: &B,
    sample_size: usize,
) -> ReadableResult<DatasourceStructure> {
    let names = backend.list_collections().await.map_err(structure_error)?;
    let compiler = QueryCompiler::new();

    let mut tables = Vec::with_capacity(names.len());
    for name in names {
        let sample = backend
            .sample(&name, sample_size)
            .await
            .map_err(structure_error)?;
        tables.push(describe(&compiler, &name, &sample)?);
    }

    tracing::info!(tables = tables.len(), "Fetched datasource structure");
    Ok(DatasourceStructure { tables })
}

fn structure_error(err: BackendError) -> ReadableError {
    if err.is_unauthorized() {
        ReadableError::Permission(READ_PERMISSION_REQUIRED.to_string())
    } else {
        translator::translate(&err)
    }
}

/// Describe one collection from its sample.
pub fn describe(
    compiler: &QueryCompiler,
    name: &str,
    sample: &[Document],
) -> ReadableResult<Table> {
    let columns = infer_columns(sample);
    let keys = columns
        .iter()
        .filter(|column| column.is_primary)
        .map(|column| Key {
            name: "primary key".to_string(),
            columns: vec![column.name.clone()],
        })
        .collect();
    let templates = templates(compiler, name, &columns, sample.first())?;

    Ok(Table {
        name: name.to_string(),
        columns,
        keys,
        templates,
    })
}

/// Union of sampled keys in first-seen order. Disagreeing types collapse to
/// `Object`; nulls do not count as a type.
pub fn infer_columns(sample: &[Document]) -> Vec<Column> {
    let mut columns: Vec<(String, Option<&'static str>)> = Vec::new();

    for doc in sample {
        for (key, value) in doc.iter() {
            let index = match columns.iter().position(|(name, _)| name == key) {
                Some(index) => index,
                None => {
                    columns.push((key.clone(), None));
                    columns.len() - 1
                }
            };
            let seen = &mut columns[index].1;
            if matches!(value, Value::Null) {
                continue;
            }
            let type_name = value.type_name();
            *seen = match *seen {
                None => Some(type_name),
                Some(existing) if existing == type_name => Some(existing),
                Some(_) => Some(MIXED_TYPE),
            };
        }
    }

    columns
        .into_iter()
        .map(|(name, type_name)| {
            let type_name = type_name.unwrap_or("Null");
            Column {
                is_primary: name == ID_FIELD && type_name == "ObjectId",
                name,
                type_name: type_name.to_string(),
            }
        })
        .collect()
}

/// First non-`_id` String column, else first non-`_id` column, else `_id`.
fn representative(columns: &[Column]) -> Option<&Column> {
    columns
        .iter()
        .find(|c| c.name != ID_FIELD && c.type_name == "String")
        .or_else(|| columns.iter().find(|c| c.name != ID_FIELD))
        .or_else(|| columns.iter().find(|c| c.name == ID_FIELD))
}

/// Example value for a column type in insert templates.
fn placeholder_value(type_name: &str) -> Value {
    match type_name {
        "Integer" => Value::Int32(1),
        "Long" => Value::Int64(1),
        "Double" => Value::Double(1.0),
        "BigDecimal" => Value::Decimal("1".to_string()),
        // 2019-07-01T00:00:00Z
        "Date" => Value::DateTime(1_561_939_200_000),
        "ObjectId" => Value::ObjectId(ObjectId::from_bytes([0; 12])),
        "Timestamp" => Value::Timestamp(Timestamp {
            time: 1,
            increment: 1,
        }),
        "Boolean" => Value::Bool(true),
        "Array" => Value::Array(vec![Value::Int32(1), Value::Int32(2), Value::Int32(3)]),
        "Object" => Value::Document(Document::new()),
        "Null" => Value::Null,
        _ => Value::from("new value"),
    }
}

/// Template field texts are rendered from documents and assembled without
/// placeholder substitution, so sampled data is never read as a template.
fn templates(
    compiler: &QueryCompiler,
    collection: &str,
    columns: &[Column],
    first: Option<&Document>,
) -> ReadableResult<Vec<Template>> {
    let sample_value = |field: &str| first.and_then(|doc| doc.get(field)).cloned();

    let filter = representative(columns)
        .and_then(|column| {
            sample_value(&column.name).map(|value| Document::new().with(column.name.as_str(), value))
        })
        .unwrap_or_default();
    let by_id = sample_value(ID_FIELD)
        .map(|id| Document::new().with(ID_FIELD, id))
        .unwrap_or_default();
    let set_field = representative(columns)
        .map(|column| column.name.clone())
        .unwrap_or_else(|| "field".to_string());
    let insert: Document = columns
        .iter()
        .filter(|column| column.name != ID_FIELD)
        .map(|column| (column.name.clone(), placeholder_value(&column.type_name)))
        .collect();
    let by_id_ascending = Document::new().with(ID_FIELD, 1);
    let update = Document::new().with(
        "$set",
        Document::new().with(set_field.as_str(), "new value"),
    );
    let pipeline = Value::Array(vec![
        Document::new().with("$match", filter.clone()).into(),
        Document::new().with("$sort", by_id_ascending.clone()).into(),
    ]);

    let requests = vec![
        (
            "Find",
            CommandRequest::new(CommandKind::Find)
                .with("collection", collection)
                .with("filter", filter.to_string())
                .with("sort", by_id_ascending.to_string())
                .with("limit", "10"),
        ),
        (
            "Find by ID",
            CommandRequest::new(CommandKind::Find)
                .with("collection", collection)
                .with("filter", by_id.to_string()),
        ),
        (
            "Insert",
            CommandRequest::new(CommandKind::Insert)
                .with("collection", collection)
                .with("documents", Value::Array(vec![insert.into()]).to_string()),
        ),
        (
            "Update",
            CommandRequest::new(CommandKind::Update)
                .with("collection", collection)
                .with("filter", by_id.to_string())
                .with("update", update.to_string())
                .with("limit", "SINGLE"),
        ),
        (
            "Delete",
            CommandRequest::new(CommandKind::Delete)
                .with("collection", collection)
                .with("filter", by_id.to_string())
                .with("limit", "SINGLE"),
        ),
        (
            "Count",
            CommandRequest::new(CommandKind::Count)
                .with("collection", collection)
                .with("filter", filter.to_string()),
        ),
        (
            "Distinct",
            CommandRequest::new(CommandKind::Distinct)
                .with("collection", collection)
                .with("key", set_field.as_str())
                .with("filter", "{}"),
        ),
        (
            "Aggregate",
            CommandRequest::new(CommandKind::Aggregate)
                .with("collection", collection)
                .with("pipeline", pipeline.to_string())
                .with("limit", "10"),
        ),
    ];

    let dispatcher = Dispatcher::new(compiler.default_find_limit);
    requests
        .into_iter()
        .map(|(title, request)| {
            let body = assemble(&dispatcher, &request)?.to_string();
            Ok(Template {
                title: title.to_string(),
                body,
                request,
            })
        })
        .collect()
}

fn assemble(dispatcher: &Dispatcher, request: &CommandRequest) -> CompileResult<Document> {
    let fields = request
        .fields
        .iter()
        .map(|(name, text)| Ok((Dispatcher::resolve_field(request.kind, name)?, text.to_string())))
        .collect::<CompileResult<Vec<_>>>()?;
    Ok(dispatcher.assemble(request.kind, &fields)?.to_document())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryBackend;
    use docql_core::extjson::parse_document;

    fn sample() -> Vec<Document> {
        vec![
            parse_document(
                "{_id: ObjectId('5f1b2c3d4e5f6a7b8c9d0e1f'), age: 20, name: 'Cierra Vega', dob: ISODate('2018-12-31T00:00:00Z')}",
            )
            .unwrap(),
            parse_document("{_id: ObjectId('5f1b2c3d4e5f6a7b8c9d0e20'), age: 'thirty', name: null}").unwrap(),
        ]
    }

    #[test]
    fn test_columns_union_and_types() {
        let columns = infer_columns(&sample());
        let summary: Vec<(&str, &str, bool)> = columns
            .iter()
            .map(|c| (c.name.as_str(), c.type_name.as_str(), c.is_primary))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("_id", "ObjectId", true),
                ("age", "Object", false),
                ("name", "String", false),
                ("dob", "Date", false),
            ]
        );
    }

    #[test]
    fn test_templates_compile_in_order() {
        let table = describe(&QueryCompiler::new(), "users", &sample()).unwrap();
        let titles: Vec<&str> = table.templates.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(
            titles,
            vec!["Find", "Find by ID", "Insert", "Update", "Delete", "Count", "Distinct", "Aggregate"]
        );
        assert_eq!(
            table.templates[0].body,
            r#"{"find": "users", "filter": {"name": "Cierra Vega"}, "sort": {"_id": 1}, "limit": 10, "batchSize": 10}"#
        );
        assert!(table.templates[1]
            .body
            .contains(r#"ObjectId("5f1b2c3d4e5f6a7b8c9d0e1f")"#));
        assert!(!table.templates[2].body.contains("_id"));
        assert_eq!(table.keys.len(), 1);
    }

    #[test]
    fn test_sampled_text_is_not_a_template() {
        let sample = vec![Document::new()
            .with("name", "Hello {{world}}")
            .with("we\"ird", 1)
            .with("it's", "O'Brien")];
        let table = describe(&QueryCompiler::new(), "odd", &sample).unwrap();

        assert_eq!(
            table.templates[0].body,
            r#"{"find": "odd", "filter": {"name": "Hello {{world}}"}, "sort": {"_id": 1}, "limit": 10, "batchSize": 10}"#
        );
        let insert = &table.templates[2].body;
        assert!(insert.contains(r#""we\"ird": 1"#), "{}", insert);
        assert!(insert.contains(r#""it's": "new value""#), "{}", insert);
    }

    #[test]
    fn test_empty_collection() {
        let table = describe(&QueryCompiler::new(), "empty", &[]).unwrap();
        assert!(table.columns.is_empty());
        assert_eq!(table.templates.len(), 8);
    }

    #[tokio::test]
    async fn test_denied_listing() {
        let backend = InMemoryBackend::new("test")
            .with_collection("users", sample())
            .deny_reads();
        let err = get_structure(&backend, DEFAULT_SAMPLE_SIZE).await.unwrap_err();
        assert_eq!(err, ReadableError::Permission(READ_PERMISSION_REQUIRED.to_string()));
    }
}
