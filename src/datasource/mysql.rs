use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::mysql::{MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::{Column, Row as SqlxRow, TypeInfo};
use tracing::debug;

use super::base::{mask_connection_string, DataSourceConnector};
use super::inference::canonical_from_native;
use super::postgres::paginate_limit_offset;
use crate::error::DataSourceError;
use crate::models::{CanonicalSchema, ColumnSchema, QueryColumn, QueryResult, TableSchema};

/// MySQL connector, also serving MariaDB (wire-compatible).
#[derive(Debug)]
pub struct MySqlConnector {
    connection_string: String,
    database: String,
}

impl MySqlConnector {
    pub fn new(config: &Value) -> Result<Self, DataSourceError> {
        let database = config
            .get("database")
            .and_then(|v| v.as_str())
            .ok_or_else(|| DataSourceError::InvalidConfiguration("missing database name".into()))?
            .to_string();

        let connection_string = if let Some(url) = config.get("url").and_then(|v| v.as_str()) {
            url.to_string()
        } else {
            let host = config
                .get("host")
                .and_then(|v| v.as_str())
                .unwrap_or("localhost");
            let port = config.get("port").and_then(|v| v.as_u64()).unwrap_or(3306);
            let username = config
                .get("username")
                .and_then(|v| v.as_str())
                .unwrap_or("root");
            let password = config.get("password").and_then(|v| v.as_str()).unwrap_or("");

            let user = urlencoding::encode(username);
            if password.is_empty() {
                format!("mysql://{}@{}:{}/{}", user, host, port, database)
            } else {
                format!(
                    "mysql://{}:{}@{}:{}/{}",
                    user,
                    urlencoding::encode(password),
                    host,
                    port,
                    database
                )
            }
        };

        debug!(
            url = %mask_connection_string(&connection_string),
            "mysql connector configured"
        );

        Ok(Self {
            connection_string,
            database,
        })
    }

    async fn connect(&self) -> Result<MySqlPool, DataSourceError> {
        MySqlPoolOptions::new()
            .max_connections(2)
            .acquire_timeout(std::time::Duration::from_secs(10))
            .connect(&self.connection_string)
            .await
            .map_err(|e| DataSourceError::ConnectionFailed(e.to_string()))
    }
}

fn quote_mysql(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

#[async_trait]
impl DataSourceConnector for MySqlConnector {
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
            "SELECT table_name FROM information_schema.tables \
             WHERE table_schema = ? AND table_type = 'BASE TABLE' \
             ORDER BY table_name",
        )
        .bind(&self.database)
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
            let column_rows = sqlx::query(
                "SELECT column_name, data_type, is_nullable \
                 FROM information_schema.columns \
                 WHERE table_schema = ? AND table_name = ? \
                 ORDER BY ordinal_position",
            )
            .bind(&self.database)
            .bind(&name)
            .fetch_all(&pool)
            .await
            .map_err(|e| DataSourceError::SchemaInferenceFailed(e.to_string()))?;

            let columns = column_rows
                .iter()
                .map(|r| {
                    let native: String = r.get(1);
                    let nullable: String = r.get(2);
                    ColumnSchema {
                        name: r.get(0),
                        canonical_type: canonical_from_native(&native),
                        nullable: nullable.eq_ignore_ascii_case("yes"),
                        description: None,
                    }
                })
                .collect();

            let count_row =
                sqlx::query(&format!("SELECT COUNT(*) FROM {}", quote_mysql(&name)))
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
        let statement = format!("SELECT * FROM {} LIMIT {}", quote_mysql(table), limit);
        self.execute_query(&statement, limit, 0).await
    }
}

fn rows_to_result(rows: &[MySqlRow], execution_time_ms: u64) -> QueryResult {
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
                object.insert(col.name().to_string(), mysql_value(row, i));
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

fn mysql_value(row: &MySqlRow, index: usize) -> Value {
    if let Ok(v) = row.try_get::<Option<String>, _>(index) {
        return v.map(Value::String).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<i64>, _>(index) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<u64>, _>(index) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<i32>, _>(index) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(index) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<bool>, _>(index) {
        return v.map(Value::Bool).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<chrono::NaiveDateTime>, _>(index) {
        return v
            .map(|d| Value::String(d.to_string()))
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<chrono::NaiveDate>, _>(index) {
        return v
            .map(|d| Value::String(d.to_string()))
            .unwrap_or(Value::Null);
    }
    Value::Null
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builds_url_with_defaults() {
        let c = MySqlConnector::new(&json!({"database": "shop"})).unwrap();
        assert_eq!(c.connection_string, "mysql://root@localhost:3306/shop");
    }

    #[test]
    fn explicit_url_wins() {
        let c = MySqlConnector::new(&json!({
            "url": "mysql://u:p@h:3307/d",
            "database": "d"
        }))
        .unwrap();
        assert_eq!(c.connection_string, "mysql://u:p@h:3307/d");
    }

    #[test]
    fn backtick_quoting_doubles_embedded_backticks() {
        assert_eq!(quote_mysql("orders"), "`orders`");
        assert_eq!(quote_mysql("odd`name"), "`odd``name`");
    }
}
