use async_trait::async_trait;
use serde_json::{Map, Value};
use tiberius::{AuthMethod, Client, Config, EncryptionLevel, Row as TdsRow};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::debug;

use super::base::DataSourceConnector;
use super::inference::canonical_from_native;
use crate::error::DataSourceError;
use crate::models::{
    CanonicalSchema, CanonicalType, ColumnSchema, QueryColumn, QueryResult, TableSchema,
};

#[derive(Debug)]
pub struct SqlServerConnector {
    config: Config,
    server: String,
    schema: String,
}

impl SqlServerConnector {
    pub fn new(config: &Value) -> Result<Self, DataSourceError> {
        let host = config
            .get("host")
            .and_then(|v| v.as_str())
            .unwrap_or("localhost");
        let port = config.get("port").and_then(|v| v.as_u64()).unwrap_or(1433) as u16;
        let database = config
            .get("database")
            .and_then(|v| v.as_str())
            .ok_or_else(|| DataSourceError::InvalidConfiguration("missing database name".into()))?;
        let username = config
            .get("username")
            .and_then(|v| v.as_str())
            .unwrap_or("sa");
        let password = config.get("password").and_then(|v| v.as_str()).unwrap_or("");
        let schema = config
            .get("schema")
            .and_then(|v| v.as_str())
            .unwrap_or("dbo")
            .to_string();

        let mut tds_config = Config::new();
        tds_config.host(host);
        tds_config.port(port);
        tds_config.database(database);
        tds_config.authentication(AuthMethod::sql_server(username, password));

        if config
            .get("trust_server_certificate")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
        {
            tds_config.trust_cert();
        }
        if !config
            .get("encrypt")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
        {
            tds_config.encryption(EncryptionLevel::Off);
        }

        let server = format!("{}:{}", host, port);
        debug!(server = %server, schema = %schema, "sql server connector configured");

        Ok(Self {
            config: tds_config,
            server,
            schema,
        })
    }

    async fn connect(&self) -> Result<Client<Compat<TcpStream>>, DataSourceError> {
        let tcp = TcpStream::connect(&self.server)
            .await
            .map_err(|e| DataSourceError::ConnectionFailed(e.to_string()))?;
        tcp.set_nodelay(true)
            .map_err(|e| DataSourceError::ConnectionFailed(e.to_string()))?;
        Client::connect(self.config.clone(), tcp.compat_write())
            .await
            .map_err(|e| DataSourceError::ConnectionFailed(e.to_string()))
    }

    fn qualified(&self, table: &str) -> String {
        format!("{}.{}", bracket(&self.schema), bracket(table))
    }
}

fn bracket(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

/// Append `OFFSET m ROWS FETCH NEXT n ROWS ONLY` unless the statement
/// already paginates itself. The clause needs an ORDER BY; inject a
/// constant ordering when the caller did not provide one.
pub(crate) fn paginate_fetch_next(query: &str, limit: usize, offset: usize) -> String {
    let trimmed = query.trim().trim_end_matches(';');
    let lowered = trimmed.to_lowercase();
    if lowered.contains("fetch next") || lowered.contains(" top ") || lowered.contains(" top(") {
        return trimmed.to_string();
    }
    let ordered = if lowered.contains("order by") {
        trimmed.to_string()
    } else {
        format!("{} ORDER BY (SELECT NULL)", trimmed)
    };
    format!(
        "{} OFFSET {} ROWS FETCH NEXT {} ROWS ONLY",
        ordered, offset, limit
    )
}

#[async_trait]
impl DataSourceConnector for SqlServerConnector {
    async fn test_connection(&self) -> (bool, String) {
        match self.connect().await {
            Ok(mut client) => match client.query("SELECT 1", &[]).await {
                Ok(stream) => match stream.into_results().await {
                    Ok(_) => (true, "connection successful".into()),
                    Err(e) => (false, e.to_string()),
                },
                Err(e) => (false, e.to_string()),
            },
            Err(e) => (false, e.to_string()),
        }
    }

    async fn fetch_schema(
        &self,
        table_filter: Option<&[String]>,
        table_limit: usize,
    ) -> Result<CanonicalSchema, DataSourceError> {
        let mut client = self.connect().await?;

        let stream = client
            .query(
                "SELECT TABLE_NAME FROM INFORMATION_SCHEMA.TABLES \
                 WHERE TABLE_SCHEMA = @P1 AND TABLE_TYPE = 'BASE TABLE' \
                 ORDER BY TABLE_NAME",
                &[&self.schema.as_str()],
            )
            .await
            .map_err(|e| DataSourceError::SchemaInferenceFailed(e.to_string()))?;
        let results = stream
            .into_results()
            .await
            .map_err(|e| DataSourceError::SchemaInferenceFailed(e.to_string()))?;

        let mut names: Vec<String> = results
            .into_iter()
            .flatten()
            .filter_map(|row| {
                row.try_get::<&str, _>(0)
                    .ok()
                    .flatten()
                    .map(|s| s.to_string())
            })
            .collect();
        if let Some(filter) = table_filter {
            names.retain(|n| filter.iter().any(|f| f == n));
        }
        names.truncate(table_limit);

        let mut tables = Vec::with_capacity(names.len());
        for name in names {
            let stream = client
                .query(
                    "SELECT COLUMN_NAME, DATA_TYPE, IS_NULLABLE \
                     FROM INFORMATION_SCHEMA.COLUMNS \
                     WHERE TABLE_SCHEMA = @P1 AND TABLE_NAME = @P2 \
                     ORDER BY ORDINAL_POSITION",
                    &[&self.schema.as_str(), &name.as_str()],
                )
                .await
                .map_err(|e| DataSourceError::SchemaInferenceFailed(e.to_string()))?;
            let column_sets = stream
                .into_results()
                .await
                .map_err(|e| DataSourceError::SchemaInferenceFailed(e.to_string()))?;

            let columns: Vec<ColumnSchema> = column_sets
                .into_iter()
                .flatten()
                .filter_map(|row| {
                    let column = row.try_get::<&str, _>(0).ok().flatten()?.to_string();
                    let native = row.try_get::<&str, _>(1).ok().flatten()?.to_string();
                    let nullable = row
                        .try_get::<&str, _>(2)
                        .ok()
                        .flatten()
                        .map(|v| v.eq_ignore_ascii_case("yes"))
                        .unwrap_or(true);
                    Some(ColumnSchema {
                        name: column,
                        canonical_type: canonical_from_native(&native),
                        nullable,
                        description: None,
                    })
                })
                .collect();

            let stream = client
                .query(
                    format!("SELECT COUNT_BIG(*) FROM {}", self.qualified(&name)),
                    &[],
                )
                .await
                .map_err(|e| DataSourceError::SchemaInferenceFailed(e.to_string()))?;
            let count_sets = stream
                .into_results()
                .await
                .map_err(|e| DataSourceError::SchemaInferenceFailed(e.to_string()))?;
            let row_count = count_sets
                .into_iter()
                .flatten()
                .next()
                .and_then(|row| row.try_get::<i64, _>(0).ok().flatten())
                .unwrap_or(0);

            tables.push(TableSchema::new(
                format!("{}.{}", self.schema, name),
                columns,
                row_count,
            ));
        }

        Ok(CanonicalSchema::new(tables))
    }

    async fn execute_query(
        &self,
        query: &str,
        limit: usize,
        offset: usize,
    ) -> Result<QueryResult, DataSourceError> {
        let mut client = self.connect().await?;
        let statement = paginate_fetch_next(query, limit, offset);

        let started = std::time::Instant::now();
        let stream = client
            .query(statement, &[])
            .await
            .map_err(|e| DataSourceError::QueryExecutionFailed(e.to_string()))?;
        let results = stream
            .into_results()
            .await
            .map_err(|e| DataSourceError::QueryExecutionFailed(e.to_string()))?;
        let elapsed = started.elapsed().as_millis() as u64;

        let rows: Vec<TdsRow> = results.into_iter().flatten().collect();
        Ok(rows_to_result(&rows, elapsed))
    }

    async fn get_sample_data(
        &self,
        table: &str,
        limit: usize,
    ) -> Result<QueryResult, DataSourceError> {
        let statement = format!("SELECT TOP {} * FROM {}", limit, self.qualified(table));
        self.execute_query(&statement, limit, 0).await
    }
}

fn rows_to_result(rows: &[TdsRow], execution_time_ms: u64) -> QueryResult {
    let columns: Vec<QueryColumn> = rows
        .first()
        .map(|row| {
            row.columns()
                .iter()
                .map(|c| QueryColumn::new(c.name(), CanonicalType::String))
                .collect()
        })
        .unwrap_or_default();

    let data: Vec<Map<String, Value>> = rows
        .iter()
        .map(|row| {
            let mut object = Map::new();
            for (i, col) in row.columns().iter().enumerate() {
                object.insert(col.name().to_string(), tds_value(row, i));
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

// try_get keeps a mismatched decode from panicking mid-row.
fn tds_value(row: &TdsRow, index: usize) -> Value {
    if let Ok(Some(v)) = row.try_get::<&str, _>(index) {
        return Value::String(v.to_string());
    }
    if let Ok(Some(v)) = row.try_get::<i64, _>(index) {
        return Value::from(v);
    }
    if let Ok(Some(v)) = row.try_get::<i32, _>(index) {
        return Value::from(v);
    }
    if let Ok(Some(v)) = row.try_get::<f64, _>(index) {
        return Value::from(v);
    }
    if let Ok(Some(v)) = row.try_get::<bool, _>(index) {
        return Value::Bool(v);
    }
    if let Ok(Some(v)) = row.try_get::<chrono::NaiveDateTime, _>(index) {
        return Value::String(v.to_string());
    }
    Value::Null
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_database_is_a_configuration_error() {
        let err = SqlServerConnector::new(&json!({"host": "x"})).unwrap_err();
        assert!(matches!(err, DataSourceError::InvalidConfiguration(_)));
    }

    #[test]
    fn pagination_injects_order_by_when_absent() {
        assert_eq!(
            paginate_fetch_next("SELECT * FROM t", 100, 0),
            "SELECT * FROM t ORDER BY (SELECT NULL) OFFSET 0 ROWS FETCH NEXT 100 ROWS ONLY"
        );
        assert_eq!(
            paginate_fetch_next("SELECT * FROM t ORDER BY id", 10, 20),
            "SELECT * FROM t ORDER BY id OFFSET 20 ROWS FETCH NEXT 10 ROWS ONLY"
        );
    }

    #[test]
    fn pagination_is_idempotent() {
        let already = "SELECT TOP 5 * FROM t";
        assert_eq!(paginate_fetch_next(already, 100, 0), already);
        let fetched = "SELECT * FROM t ORDER BY id OFFSET 0 ROWS FETCH NEXT 5 ROWS ONLY";
        assert_eq!(paginate_fetch_next(fetched, 100, 0), fetched);
    }

    #[test]
    fn bracket_quoting_doubles_closing_brackets() {
        assert_eq!(bracket("orders"), "[orders]");
        assert_eq!(bracket("odd]name"), "[odd]]name]");
    }
}
