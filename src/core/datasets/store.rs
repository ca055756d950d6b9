use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row as SqlxRow;
use tracing::info;
use uuid::Uuid;

use crate::error::DataSourceError;
use crate::models::{
    CanonicalSchema, Dataset, DatasetStatus, TableRecord,
};

const MIGRATIONS: &str = r#"
CREATE TABLE IF NOT EXISTS datasets (
    id TEXT PRIMARY KEY,
    workspace_id TEXT NOT NULL,
    name TEXT NOT NULL,
    connector_type TEXT NOT NULL,
    connector_config TEXT NOT NULL,
    status TEXT NOT NULL,
    schema_json TEXT,
    sample_rows TEXT,
    row_count INTEGER,
    file_size INTEGER,
    error_message TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    last_refresh TEXT
);
CREATE INDEX IF NOT EXISTS idx_datasets_workspace ON datasets(workspace_id);

CREATE TABLE IF NOT EXISTS dataset_tables (
    id TEXT PRIMARY KEY,
    dataset_id TEXT NOT NULL REFERENCES datasets(id),
    name TEXT NOT NULL,
    display_name TEXT NOT NULL,
    description TEXT,
    columns TEXT NOT NULL,
    row_count INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE(dataset_id, name)
);
"#;

/// Durable home for dataset and table records. Every mutation is a single
/// statement (or a single transaction for the cascade delete), so
/// concurrent writers settle last-writer-wins without partial states.
#[derive(Clone)]
pub struct DatasetStore {
    pool: SqlitePool,
}

impl DatasetStore {
    pub async fn connect(url: &str) -> Result<Self, DataSourceError> {
        // One connection for in-memory metadata, otherwise pooled
        // connections each see a distinct empty database.
        let max = if url.contains(":memory:") { 1 } else { 4 };
        let normalized = if url.starts_with("sqlite:") && !url.contains(":memory:")
            && !url.contains("mode=")
        {
            let separator = if url.contains('?') { "&" } else { "?" };
            format!("{}{}mode=rwc", url, separator)
        } else {
            url.to_string()
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(max)
            .connect(&normalized)
            .await?;
        sqlx::raw_sql(MIGRATIONS).execute(&pool).await?;
        info!("dataset store ready");
        Ok(Self { pool })
    }

    pub async fn insert_dataset(&self, dataset: &Dataset) -> Result<(), DataSourceError> {
        sqlx::query(
            "INSERT INTO datasets (id, workspace_id, name, connector_type, \
             connector_config, status, schema_json, sample_rows, row_count, \
             file_size, error_message, created_at, updated_at, last_refresh) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(dataset.id.to_string())
        .bind(&dataset.workspace_id)
        .bind(&dataset.name)
        .bind(dataset.connector_type.as_str())
        .bind(serde_json::to_string(&dataset.connector_config)?)
        .bind(dataset.status.as_str())
        .bind(
            dataset
                .schema
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
        )
        .bind(
            dataset
                .sample_rows
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
        )
        .bind(dataset.row_count)
        .bind(dataset.file_size)
        .bind(&dataset.error_message)
        .bind(dataset.created_at)
        .bind(dataset.updated_at)
        .bind(dataset.last_refresh)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_dataset(&self, id: Uuid) -> Result<Dataset, DataSourceError> {
        let row = sqlx::query("SELECT * FROM datasets WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(DataSourceError::DatasetNotFound(id))?;
        row_to_dataset(&row)
    }

    pub async fn list_datasets(
        &self,
        workspace_id: &str,
    ) -> Result<Vec<Dataset>, DataSourceError> {
        let rows = sqlx::query(
            "SELECT * FROM datasets WHERE workspace_id = ? ORDER BY created_at",
        )
        .bind(workspace_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_dataset).collect()
    }

    /// Transition status and error message together in one statement.
    pub async fn set_status(
        &self,
        id: Uuid,
        status: DatasetStatus,
        error_message: Option<&str>,
    ) -> Result<(), DataSourceError> {
        sqlx::query(
            "UPDATE datasets SET status = ?, error_message = ?, updated_at = ? \
             WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(error_message)
        .bind(Utc::now())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Persist a schema (and clear any stale error) in one statement.
    pub async fn set_schema(
        &self,
        id: Uuid,
        schema: &CanonicalSchema,
        status: DatasetStatus,
    ) -> Result<(), DataSourceError> {
        sqlx::query(
            "UPDATE datasets SET schema_json = ?, status = ?, error_message = NULL, \
             updated_at = ? WHERE id = ?",
        )
        .bind(serde_json::to_string(schema)?)
        .bind(status.as_str())
        .bind(Utc::now())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_sample_rows(
        &self,
        id: Uuid,
        sample_rows: &[serde_json::Map<String, serde_json::Value>],
        row_count: i64,
        file_size: Option<i64>,
    ) -> Result<(), DataSourceError> {
        sqlx::query(
            "UPDATE datasets SET sample_rows = ?, row_count = ?, file_size = ?, \
             updated_at = ? WHERE id = ?",
        )
        .bind(serde_json::to_string(sample_rows)?)
        .bind(row_count)
        .bind(file_size)
        .bind(Utc::now())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn touch_refresh(&self, id: Uuid) -> Result<(), DataSourceError> {
        let now = Utc::now();
        sqlx::query(
            "UPDATE datasets SET last_refresh = ?, updated_at = ? WHERE id = ?",
        )
        .bind(now)
        .bind(now)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Insert a discovered table, skipping duplicates by (dataset, name).
    pub async fn upsert_table(&self, table: &TableRecord) -> Result<(), DataSourceError> {
        sqlx::query(
            "INSERT OR IGNORE INTO dataset_tables \
             (id, dataset_id, name, display_name, description, columns, \
              row_count, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(table.id.to_string())
        .bind(table.dataset_id.to_string())
        .bind(&table.name)
        .bind(&table.display_name)
        .bind(&table.description)
        .bind(serde_json::to_string(&table.columns)?)
        .bind(table.row_count)
        .bind(table.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn tables_for(
        &self,
        dataset_id: Uuid,
    ) -> Result<Vec<TableRecord>, DataSourceError> {
        let rows = sqlx::query(
            "SELECT * FROM dataset_tables WHERE dataset_id = ? ORDER BY name",
        )
        .bind(dataset_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_table).collect()
    }

    /// Remove a dataset and its table records in one transaction.
    pub async fn delete_dataset(&self, id: Uuid) -> Result<(), DataSourceError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM dataset_tables WHERE dataset_id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM datasets WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        if result.rows_affected() == 0 {
            return Err(DataSourceError::DatasetNotFound(id));
        }
        Ok(())
    }
}

fn row_to_dataset(row: &SqliteRow) -> Result<Dataset, DataSourceError> {
    let id: String = row.get("id");
    let connector_type: String = row.get("connector_type");
    let status: String = row.get("status");
    let config: String = row.get("connector_config");
    let schema_json: Option<String> = row.get("schema_json");
    let sample_rows: Option<String> = row.get("sample_rows");

    Ok(Dataset {
        id: parse_uuid(&id)?,
        workspace_id: row.get("workspace_id"),
        name: row.get("name"),
        connector_type: connector_type.parse()?,
        connector_config: serde_json::from_str(&config)?,
        status: status.parse()?,
        schema: schema_json
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?,
        sample_rows: sample_rows
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?,
        row_count: row.get("row_count"),
        file_size: row.get("file_size"),
        error_message: row.get("error_message"),
        created_at: row.get::<DateTime<Utc>, _>("created_at"),
        updated_at: row.get::<DateTime<Utc>, _>("updated_at"),
        last_refresh: row.get::<Option<DateTime<Utc>>, _>("last_refresh"),
    })
}

fn row_to_table(row: &SqliteRow) -> Result<TableRecord, DataSourceError> {
    let id: String = row.get("id");
    let dataset_id: String = row.get("dataset_id");
    let columns: String = row.get("columns");

    Ok(TableRecord {
        id: parse_uuid(&id)?,
        dataset_id: parse_uuid(&dataset_id)?,
        name: row.get("name"),
        display_name: row.get("display_name"),
        description: row.get("description"),
        columns: serde_json::from_str(&columns)?,
        row_count: row.get("row_count"),
        created_at: row.get::<DateTime<Utc>, _>("created_at"),
    })
}

fn parse_uuid(raw: &str) -> Result<Uuid, DataSourceError> {
    Uuid::parse_str(raw)
        .map_err(|e| DataSourceError::Storage(sqlx::Error::Decode(e.to_string().into())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ColumnSchema, ConnectorType, TableSchema};
    use serde_json::json;

    async fn memory_store() -> DatasetStore {
        DatasetStore::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn round_trips_a_dataset_record() {
        let store = memory_store().await;
        let dataset = Dataset::new(
            "ws-1",
            "orders",
            ConnectorType::Postgres,
            json!({"host": "db", "database": "sales"}),
        );
        store.insert_dataset(&dataset).await.unwrap();

        let loaded = store.get_dataset(dataset.id).await.unwrap();
        assert_eq!(loaded.name, "orders");
        assert_eq!(loaded.connector_type, ConnectorType::Postgres);
        assert_eq!(loaded.status, DatasetStatus::Pending);
        assert_eq!(loaded.connector_config["database"], "sales");
    }

    #[tokio::test]
    async fn missing_dataset_is_not_found() {
        let store = memory_store().await;
        let err = store.get_dataset(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, DataSourceError::DatasetNotFound(_)));
    }

    #[tokio::test]
    async fn schema_update_clears_stale_errors() {
        let store = memory_store().await;
        let dataset = Dataset::new("ws", "d", ConnectorType::Sqlite, json!({}));
        store.insert_dataset(&dataset).await.unwrap();
        store
            .set_status(dataset.id, DatasetStatus::Error, Some("boom"))
            .await
            .unwrap();

        let schema = CanonicalSchema::new(vec![TableSchema::new(
            "t".to_string(),
            vec![ColumnSchema {
                name: "c".into(),
                canonical_type: crate::models::CanonicalType::Integer,
                nullable: false,
                description: None,
            }],
            1,
        )]);
        store
            .set_schema(dataset.id, &schema, DatasetStatus::Ready)
            .await
            .unwrap();

        let loaded = store.get_dataset(dataset.id).await.unwrap();
        assert_eq!(loaded.status, DatasetStatus::Ready);
        assert!(loaded.error_message.is_none());
        assert!(loaded.has_cached_schema());
    }

    #[tokio::test]
    async fn duplicate_tables_are_skipped() {
        let store = memory_store().await;
        let dataset = Dataset::new("ws", "d", ConnectorType::Sqlite, json!({}));
        store.insert_dataset(&dataset).await.unwrap();

        let mut record = TableRecord {
            id: Uuid::new_v4(),
            dataset_id: dataset.id,
            name: "orders".into(),
            display_name: "Orders".into(),
            description: None,
            columns: vec![],
            row_count: 3,
            created_at: Utc::now(),
        };
        store.upsert_table(&record).await.unwrap();
        record.id = Uuid::new_v4();
        store.upsert_table(&record).await.unwrap();

        let tables = store.tables_for(dataset.id).await.unwrap();
        assert_eq!(tables.len(), 1);
    }

    #[tokio::test]
    async fn delete_cascades_to_table_records() {
        let store = memory_store().await;
        let dataset = Dataset::new("ws", "d", ConnectorType::Sqlite, json!({}));
        store.insert_dataset(&dataset).await.unwrap();
        store
            .upsert_table(&TableRecord {
                id: Uuid::new_v4(),
                dataset_id: dataset.id,
                name: "t".into(),
                display_name: "T".into(),
                description: None,
                columns: vec![],
                row_count: 0,
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        store.delete_dataset(dataset.id).await.unwrap();
        assert!(store.tables_for(dataset.id).await.unwrap().is_empty());
        assert!(matches!(
            store.get_dataset(dataset.id).await.unwrap_err(),
            DataSourceError::DatasetNotFound(_)
        ));
    }

    #[tokio::test]
    async fn list_is_scoped_to_the_workspace() {
        let store = memory_store().await;
        store
            .insert_dataset(&Dataset::new("a", "one", ConnectorType::Csv, json!({})))
            .await
            .unwrap();
        store
            .insert_dataset(&Dataset::new("b", "two", ConnectorType::Csv, json!({})))
            .await
            .unwrap();

        let listed = store.list_datasets("a").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "one");
    }
}
