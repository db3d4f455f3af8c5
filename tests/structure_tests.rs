//! Structure introspection and datasource test-path coverage

mod common;

use common::{create_executor, create_seeded_backend};
use docql::datasource::{DATABASE_NAME_MISSING, SSL_CONFIGURATION_MISSING};
use docql::structure::READ_PERMISSION_REQUIRED;
use docql::{get_structure, test_datasource, DatasourceConfig, ReadableError, Settings};
use docql_core::Bindings;
use std::io::Write;
use std::time::Duration;

#[tokio::test]
async fn test_structure_of_users() {
    let backend = create_seeded_backend();
    let structure = get_structure(&backend, 10).await.unwrap();

    assert_eq!(structure.tables.len(), 1);
    let table = &structure.tables[0];
    assert_eq!(table.name, "users");

    let columns: Vec<(&str, &str)> = table
        .columns
        .iter()
        .map(|c| (c.name.as_str(), c.type_name.as_str()))
        .collect();
    assert_eq!(
        columns,
        vec![
            ("_id", "ObjectId"),
            ("name", "String"),
            ("gender", "String"),
            ("age", "Integer"),
            ("luckyNumber", "Long"),
            ("dob", "Date"),
            ("netWorth", "BigDecimal"),
            ("aLong", "Long"),
            ("ts", "Timestamp"),
            ("updatedByCommand", "Boolean"),
        ]
    );
    assert!(table.columns[0].is_primary);
    assert_eq!(table.keys[0].columns, vec!["_id".to_string()]);
}

#[tokio::test]
async fn test_every_template_runs() {
    let backend = create_seeded_backend();
    let structure = get_structure(&backend, 10).await.unwrap();
    let (executor, _) = create_executor(backend);

    for template in &structure.tables[0].templates {
        let outcome = executor
            .execute(&template.request, &Bindings::new())
            .await
            .unwrap();
        assert!(outcome.success, "template '{}' failed: {:?}", template.title, outcome.readable_error);
    }
}

#[tokio::test]
async fn test_structure_requires_read_permission() {
    let err = get_structure(&create_seeded_backend().deny_reads(), 10)
        .await
        .unwrap_err();
    assert_eq!(err, ReadableError::Permission(READ_PERMISSION_REQUIRED.to_string()));
}

#[tokio::test]
async fn test_structure_serializes_column_types() {
    let structure = get_structure(&create_seeded_backend(), 1).await.unwrap();
    let json = serde_json::to_value(&structure).unwrap();
    assert_eq!(json["tables"][0]["columns"][0]["type"], "ObjectId");
    assert_eq!(json["tables"][0]["columns"][0]["isPrimary"], true);
    assert_eq!(json["tables"][0]["templates"][0]["request"]["kind"], "FIND");
}

#[tokio::test]
async fn test_datasource_paths() {
    let backend = create_seeded_backend();

    let invalid = DatasourceConfig {
        database: String::new(),
        ssl: None,
    };
    let result = test_datasource(&backend, &invalid, Duration::from_secs(1)).await;
    assert!(!result.success);
    assert_eq!(
        result.invalids,
        vec![
            SSL_CONFIGURATION_MISSING.to_string(),
            DATABASE_NAME_MISSING.to_string()
        ]
    );

    let result = test_datasource(&backend, &DatasourceConfig::default(), Duration::from_secs(1)).await;
    assert!(result.success);
}

#[test]
fn test_settings_file_drives_compiler() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("docql.toml");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(
        file,
        "[compiler]\ndefault_find_limit = 25\n\n[structure]\nsample_size = 3\n"
    )
    .unwrap();

    let settings = Settings::load(Some(&path)).unwrap();
    assert_eq!(settings.structure.sample_size, 3);
    assert_eq!(settings.compiler().default_find_limit, 25);
}
