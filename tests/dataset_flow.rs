use std::sync::Arc;

use serde_json::{json, Map, Value};
use sqlx::sqlite::SqlitePool;
use syntra_datacore::{
    ConnectorRegistry, CoreConfig, DataSourceError, DatasetOrchestrator, DatasetStatus,
    DatasetStore, QueryExecutor, QueryRequest,
};

const CSV_PAYLOAD: &[u8] = b"id,name,score\n1,Alice,9.5\n2,Bob,7\n";

async fn setup() -> (DatasetOrchestrator, QueryExecutor, DatasetStore) {
    let config = CoreConfig::default();
    let store = DatasetStore::connect(&config.metadata_db_url).await.unwrap();
    let registry = Arc::new(ConnectorRegistry::new());
    let orchestrator = DatasetOrchestrator::new(store.clone(), Arc::clone(&registry), &config);
    let executor = QueryExecutor::new(store.clone(), registry, &config);
    (orchestrator, executor, store)
}

#[tokio::test]
async fn csv_upload_registers_ready_with_inferred_schema() {
    let (orchestrator, executor, store) = setup().await;

    let summary = orchestrator
        .register_dataset("ws", "people", "csv", json!({}), Some(CSV_PAYLOAD))
        .await
        .unwrap();

    assert_eq!(summary.status, DatasetStatus::Ready);
    assert_eq!(summary.row_count, Some(2));

    let schema = summary.schema.unwrap();
    let table = schema.first_table().unwrap();
    assert_eq!(table.name, "people");
    let types: Vec<&str> = table
        .columns
        .iter()
        .map(|c| c.canonical_type.as_str())
        .collect();
    assert_eq!(types, vec!["integer", "string", "decimal"]);

    // One table record per discovered table.
    let tables = store.tables_for(summary.id).await.unwrap();
    assert_eq!(tables.len(), 1);

    // Queries are served from the retained sample without touching disk.
    let result = executor
        .query_dataset(summary.id, &QueryRequest::default())
        .await
        .unwrap();
    assert_eq!(result.total_rows, 2);
    assert!(!result.synthetic);
    assert_eq!(result.rows[0]["name"], Value::String("Alice".into()));
}

#[tokio::test]
async fn csv_pagination_and_filters_apply_to_cached_samples() {
    let (orchestrator, executor, _) = setup().await;
    let summary = orchestrator
        .register_dataset("ws", "people", "csv", json!({}), Some(CSV_PAYLOAD))
        .await
        .unwrap();

    let paged = executor
        .query_dataset(
            summary.id,
            &QueryRequest {
                limit: Some(1),
                offset: 1,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(paged.total_rows, 1);
    assert_eq!(paged.rows[0]["name"], Value::String("Bob".into()));

    let mut filters = Map::new();
    filters.insert("name".to_string(), json!("Alice"));
    let filtered = executor
        .query_dataset(
            summary.id,
            &QueryRequest {
                filters,
                columns: vec!["id".to_string(), "name".to_string()],
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(filtered.total_rows, 1);
    assert_eq!(filtered.rows[0].len(), 2);
    assert!(filtered.rows[0].get("score").is_none());
}

#[tokio::test]
async fn malformed_csv_is_a_terminal_error() {
    let (orchestrator, executor, _) = setup().await;
    let summary = orchestrator
        .register_dataset("ws", "broken", "csv", json!({}), Some(b"" as &[u8]))
        .await
        .unwrap();

    assert_eq!(summary.status, DatasetStatus::Error);
    assert!(summary.error_message.is_some());
    assert!(summary.schema.is_none());

    // Queries fail fast with the stored message, no connector involved.
    let err = executor
        .query_dataset(summary.id, &QueryRequest::default())
        .await
        .unwrap_err();
    assert!(matches!(err, DataSourceError::QueryExecutionFailed(_)));
}

#[tokio::test]
async fn empty_database_registers_as_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.db");
    std::fs::File::create(&path).unwrap();

    let (orchestrator, _, _) = setup().await;
    let summary = orchestrator
        .register_dataset(
            "ws",
            "empty",
            "sqlite",
            json!({"path": path.to_str().unwrap()}),
            None,
        )
        .await
        .unwrap();

    // The source answered, so this is not a deferred-discovery case.
    assert_eq!(summary.status, DatasetStatus::Error);
    assert!(summary
        .error_message
        .as_deref()
        .unwrap()
        .contains("no tables"));
}

#[tokio::test]
async fn workbook_upload_is_not_fed_to_the_csv_parser() {
    let (orchestrator, _, store) = setup().await;

    // Zip magic bytes stand in for a real .xlsx payload; if they reached the
    // CSV parser the record would land in Error with a parse message.
    let summary = orchestrator
        .register_dataset("ws", "book", "excel", json!({}), Some(b"PK\x03\x04garbage" as &[u8]))
        .await
        .unwrap();

    assert_eq!(summary.status, DatasetStatus::Ready);
    assert!(summary.error_message.is_none());

    let dataset = store.get_dataset(summary.id).await.unwrap();
    assert!(dataset.schema.unwrap().is_placeholder());
    assert!(dataset.sample_rows.is_none());
}

#[tokio::test]
async fn live_sqlite_source_round_trips_through_the_executor() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("warehouse.db");
    let url = format!("sqlite://{}?mode=rwc", path.display());
    let pool = SqlitePool::connect(&url).await.unwrap();
    sqlx::query("CREATE TABLE orders (id INTEGER PRIMARY KEY, customer TEXT, total REAL)")
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query(
        "INSERT INTO orders (customer, total) VALUES \
         ('Alice', 10.5), ('Bob', 20.0), ('Cara', 5.25)",
    )
    .execute(&pool)
    .await
    .unwrap();
    pool.close().await;

    let (orchestrator, executor, _) = setup().await;
    let summary = orchestrator
        .register_dataset(
            "ws",
            "warehouse",
            "sqlite",
            json!({"path": path.to_str().unwrap()}),
            None,
        )
        .await
        .unwrap();
    assert_eq!(summary.status, DatasetStatus::Ready);
    let schema = summary.schema.unwrap();
    assert_eq!(schema.tables[0].name, "orders");
    assert_eq!(schema.tables[0].row_count, 3);

    let result = executor
        .query_dataset(
            summary.id,
            &QueryRequest {
                limit: Some(2),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(result.total_rows, 2);
    assert!(!result.synthetic);
    // Backend-native column types flatten to string in responses.
    assert!(result
        .columns
        .iter()
        .all(|c| c.canonical_type.as_str() == "string"));

    let mut filters = Map::new();
    filters.insert("customer".to_string(), json!("Bob"));
    let filtered = executor
        .query_dataset(
            summary.id,
            &QueryRequest {
                filters,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(filtered.total_rows, 1);
    assert_eq!(filtered.rows[0]["total"], json!(20.0));
}

#[tokio::test]
async fn unreachable_live_source_defers_then_records_error() {
    let (orchestrator, executor, store) = setup().await;

    // Registration survives an unreachable source: placeholder schema,
    // discovery deferred to first query.
    let summary = orchestrator
        .register_dataset(
            "ws",
            "remote",
            "postgresql",
            json!({"host": "127.0.0.1", "port": 1, "database": "x"}),
            None,
        )
        .await
        .unwrap();
    assert_eq!(summary.status, DatasetStatus::Ready);
    assert!(summary.schema.unwrap().is_placeholder());

    // First query attempts discovery, fails, and records the error.
    let err = executor
        .query_dataset(summary.id, &QueryRequest::default())
        .await
        .unwrap_err();
    assert!(matches!(err, DataSourceError::ConnectionFailed(_)));
    let dataset = store.get_dataset(summary.id).await.unwrap();
    assert_eq!(dataset.status, DatasetStatus::Error);
    let stored_message = dataset.error_message.unwrap();

    // Second query fails fast with the stored message.
    let err = executor
        .query_dataset(summary.id, &QueryRequest::default())
        .await
        .unwrap_err();
    match err {
        DataSourceError::QueryExecutionFailed(message) => {
            assert_eq!(message, stored_message)
        }
        other => panic!("expected fail-fast error, got {other:?}"),
    }
}

#[tokio::test]
async fn declared_stub_serves_clearly_flagged_synthetic_rows() {
    let (orchestrator, executor, store) = setup().await;
    let summary = orchestrator
        .register_dataset(
            "ws",
            "lake",
            "databricks",
            json!({"server_hostname": "h", "http_path": "p", "access_token": "t"}),
            None,
        )
        .await
        .unwrap();
    assert_eq!(summary.status, DatasetStatus::Ready);

    // With only a placeholder schema there is nothing to conform to.
    let empty = executor
        .query_dataset(summary.id, &QueryRequest::default())
        .await
        .unwrap();
    assert!(empty.synthetic);
    assert_eq!(empty.total_rows, 0);

    // Once a schema is known, synthetic rows conform to it and the hard
    // cap applies regardless of the requested limit.
    let schema = syntra_datacore::CanonicalSchema::new(vec![
        syntra_datacore::TableSchema::new(
            "events".to_string(),
            vec![
                syntra_datacore::ColumnSchema {
                    name: "id".into(),
                    canonical_type: syntra_datacore::CanonicalType::Integer,
                    nullable: false,
                    description: None,
                },
                syntra_datacore::ColumnSchema {
                    name: "label".into(),
                    canonical_type: syntra_datacore::CanonicalType::String,
                    nullable: false,
                    description: None,
                },
            ],
            0,
        ),
    ]);
    store
        .set_schema(summary.id, &schema, DatasetStatus::Ready)
        .await
        .unwrap();

    let capped = executor
        .query_dataset(
            summary.id,
            &QueryRequest {
                limit: Some(5000),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(capped.synthetic);
    assert_eq!(capped.total_rows, 1000);
    assert!(capped.rows[0]["id"].is_i64() || capped.rows[0]["id"].is_u64());
    assert!(capped.rows[0]["label"].is_string());
}

#[tokio::test]
async fn unknown_connector_tags_are_rejected_before_any_record_exists() {
    let (orchestrator, _, store) = setup().await;
    let err = orchestrator
        .register_dataset("ws", "nope", "mongodb", json!({}), None)
        .await
        .unwrap_err();
    assert!(matches!(err, DataSourceError::UnsupportedConnectorType(_)));
    assert!(store.list_datasets("ws").await.unwrap().is_empty());
}

#[tokio::test]
async fn invalid_configuration_is_rejected_before_any_record_exists() {
    let (orchestrator, _, store) = setup().await;
    let err = orchestrator
        .register_dataset("ws", "nodb", "sqlite", json!({}), None)
        .await
        .unwrap_err();
    assert!(matches!(err, DataSourceError::InvalidConfiguration(_)));
    assert!(store.list_datasets("ws").await.unwrap().is_empty());
}

#[tokio::test]
async fn delete_removes_the_dataset_and_its_tables() {
    let (orchestrator, _, store) = setup().await;
    let summary = orchestrator
        .register_dataset("ws", "people", "csv", json!({}), Some(CSV_PAYLOAD))
        .await
        .unwrap();
    assert_eq!(store.tables_for(summary.id).await.unwrap().len(), 1);

    orchestrator.delete_dataset(summary.id).await.unwrap();
    assert!(store.tables_for(summary.id).await.unwrap().is_empty());
    assert!(matches!(
        orchestrator.get_dataset(summary.id).await.unwrap_err(),
        DataSourceError::DatasetNotFound(_)
    ));
}

#[tokio::test]
async fn refresh_bumps_timestamps_for_file_datasets() {
    let (orchestrator, _, _) = setup().await;
    let summary = orchestrator
        .register_dataset("ws", "people", "csv", json!({}), Some(CSV_PAYLOAD))
        .await
        .unwrap();

    let before = orchestrator.get_dataset(summary.id).await.unwrap();
    assert!(before.last_refresh.is_none());

    let refreshed = orchestrator.refresh_dataset(summary.id).await.unwrap();
    assert_eq!(refreshed.status, DatasetStatus::Ready);
    let after = orchestrator.get_dataset(summary.id).await.unwrap();
    assert!(after.last_refresh.is_some());
    // File payloads are not re-fetched; the parsed schema stays put.
    assert_eq!(after.schema, before.schema);
}

#[tokio::test]
async fn connector_catalog_is_exposed_for_callers() {
    let (orchestrator, _, _) = setup().await;
    let catalog = orchestrator.list_supported_connectors();
    assert_eq!(catalog.len(), 14);
    let csv = catalog
        .iter()
        .find(|r| r.connector_type.as_str() == "csv")
        .unwrap();
    assert!(csv.required.contains(&"path"));
}
