use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row as SqlxRow, TypeInfo};

use super::base::{quote_ident, DataSourceConnector};
use super::inference::canonical_from_native;
use super::postgres::paginate_limit_offset;
use crate::error::DataSourceError;
use crate::models::{CanonicalSchema, ColumnSchema, QueryColumn, QueryResult, TableSchema};

#[derive(Debug)]
pub struct SqliteConnector {
    connection_string: String,
}

impl SqliteConnector {
    pub fn new(config: &Value) -> Result<Self, DataSourceError> {
        let connection_string = if let Some(url) = config.get("url").and_then(|v| v.as_str()) {
            url.to_string()
        } else {
            let path = config
                .get("path")
                .and_then(|v| v.as_str())
                .ok_or_else(|| {
                    DataSourceError::InvalidConfiguration("missing database path".into())
                })?;
            format!("sqlite://{}", path)
        };

        Ok(Self { connection_string })
    }

    async fn connect(&self) -> Result<SqlitePool, DataSourceError> {
        // One connection for in-memory databases, otherwise each pooled
        // connection would see its own empty database.
        let max = if self.connection_string.contains(":memory:") {
            1
        } else {
            2
        };
        SqlitePoolOptions::new()
            .max_connections(max)
            .acquire_timeout(std::time::Duration::from_secs(10))
            .connect(&self.connection_string)
            .await
            .map_err(|e| DataSourceError::ConnectionFailed(e.to_string()))
    }
}

#[async_trait]
impl DataSourceConnector for SqliteConnector {
    async fn test_connection(&self) -> (bool, String) {
        match self.connect().await {
            Ok(pool) => {
                let probe = sqlx::query("SELECT 1").fetch_one(&pool).await;
                pool.close().await;
                match probe {
                    Ok(_) => (true, "connection successful".into()),
                    Err(e) => (false, e.to_string()),
                }
            }
            Err(e) => (false, e.to_string()),
        }
    }

    async fn fetch_schema(
        &self,
        table_filter: Option<&[String]>,
        table_limit: usize,
    ) -> Result<CanonicalSchema, DataSourceError> {
        let pool = self.connect().await?;

        let table_rows = sqlx::query(
            "SELECT name FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' \
             ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .map_err(|e| DataSourceError::SchemaInferenceFailed(e.to_string()))?;

        let mut names: Vec<String> = table_rows
            .iter()
            .map(|r| r.get::<String, _>(0))
            .collect();
        if let Some(filter) = table_filter {
            names.retain(|n| filter.iter().any(|f| f == n));
        }
        names.truncate(table_limit);

        let mut tables = Vec::with_capacity(names.len());
        for name in names {
            let column_rows =
                sqlx::query(&format!("PRAGMA table_info({})", quote_ident(&name)))
                    .fetch_all(&pool)
                    .await
                    .map_err(|e| DataSourceError::SchemaInferenceFailed(e.to_string()))?;

            let columns = column_rows
                .iter()
                .map(|r| {
                    let native: String = r.get("type");
                    let notnull: i64 = r.get("notnull");
                    ColumnSchema {
                        name: r.get("name"),
                        canonical_type: canonical_from_native(&native),
                        nullable: notnull == 0,
                        description: None,
                    }
                })
                .collect();

            let count_row =
                sqlx::query(&format!("SELECT COUNT(*) FROM {}", quote_ident(&name)))
                    .fetch_one(&pool)
                    .await
                    .map_err(|e| DataSourceError::SchemaInferenceFailed(e.to_string()))?;
            let row_count: i64 = count_row.get(0);

            tables.push(TableSchema::new(name, columns, row_count));
        }

        pool.close().await;
        Ok(CanonicalSchema::new(tables))
    }

    async fn execute_query(
        &self,
        query: &str,
        limit: usize,
        offset: usize,
    ) -> Result<QueryResult, DataSourceError> {
        let pool = self.connect().await?;
        let statement = paginate_limit_offset(query, limit, offset);

        let started = std::time::Instant::now();
        let rows = sqlx::query(&statement)
            .fetch_all(&pool)
            .await
            .map_err(|e| DataSourceError::QueryExecutionFailed(e.to_string()))?;
        pool.close().await;

        Ok(rows_to_result(&rows, started.elapsed().as_millis() as u64))
    }

    async fn get_sample_data(
        &self,
        table: &str,
        limit: usize,
    ) -> Result<QueryResult, DataSourceError> {
        let statement = format!("SELECT * FROM {} LIMIT {}", quote_ident(table), limit);
        self.execute_query(&statement, limit, 0).await
    }
}

fn rows_to_result(rows: &[SqliteRow], execution_time_ms: u64) -> QueryResult {
    let columns: Vec<QueryColumn> = rows
        .first()
        .map(|row| {
            row.columns()
                .iter()
                .map(|c| QueryColumn::new(c.name(), canonical_from_native(c.type_info().name())))
                .collect()
        })
        .unwrap_or_default();

    let data: Vec<Map<String, Value>> = rows
        .iter()
        .map(|row| {
            let mut object = Map::new();
            for (i, col) in row.columns().iter().enumerate() {
                object.insert(col.name().to_string(), sqlite_value(row, i));
            }
            object
        })
        .collect();

    let total_rows = data.len();
    QueryResult {
        rows: data,
        columns,
        total_rows,
        execution_time_ms,
        synthetic: false,
    }
}

fn sqlite_value(row: &SqliteRow, index: usize) -> Value {
    if let Ok(v) = row.try_get::<Option<i64>, _>(index) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(index) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<String>, _>(index) {
        return v.map(Value::String).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<bool>, _>(index) {
        return v.map(Value::Bool).unwrap_or(Value::Null);
    }
    Value::Null
}
