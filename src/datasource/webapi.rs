use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use serde_json::{Map, Value};
use tracing::debug;

use super::base::DataSourceConnector;
use super::inference::infer_column_type;
use crate::error::DataSourceError;
use crate::models::{
    CanonicalSchema, ColumnSchema, QueryColumn, QueryResult, TableSchema,
};

const ROW_CONTAINER_KEYS: &[&str] = &["data", "results", "items", "rows", "value"];

/// JSON-over-HTTP source. The endpoint is expected to return an array of
/// objects, either at the top level or under a conventional container key.
#[derive(Debug)]
pub struct WebApiConnector {
    url: String,
    headers: HeaderMap,
    data_path: Option<String>,
    table_name: String,
    timeout: Duration,
}

impl WebApiConnector {
    pub fn new(config: &Value) -> Result<Self, DataSourceError> {
        let url = config
            .get("url")
            .and_then(|v| v.as_str())
            .ok_or_else(|| DataSourceError::InvalidConfiguration("missing url".into()))?
            .to_string();

        let mut headers = HeaderMap::new();
        if let Some(extra) = config.get("headers").and_then(|v| v.as_object()) {
            for (name, value) in extra {
                let value = value.as_str().unwrap_or_default();
                let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                    DataSourceError::InvalidConfiguration(format!("bad header name: {}", e))
                })?;
                let value = HeaderValue::from_str(value).map_err(|e| {
                    DataSourceError::InvalidConfiguration(format!("bad header value: {}", e))
                })?;
                headers.insert(name, value);
            }
        }

        match config.get("auth_type").and_then(|v| v.as_str()) {
            Some("bearer") => {
                let token = config
                    .get("token")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| {
                        DataSourceError::InvalidConfiguration("bearer auth needs a token".into())
                    })?;
                headers.insert(
                    AUTHORIZATION,
                    HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|e| {
                        DataSourceError::InvalidConfiguration(e.to_string())
                    })?,
                );
            }
            Some("basic") => {
                let username = config
                    .get("username")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default();
                let password = config
                    .get("password")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default();
                let encoded = base64::engine::general_purpose::STANDARD
                    .encode(format!("{}:{}", username, password));
                headers.insert(
                    AUTHORIZATION,
                    HeaderValue::from_str(&format!("Basic {}", encoded)).map_err(|e| {
                        DataSourceError::InvalidConfiguration(e.to_string())
                    })?,
                );
            }
            Some("api_key") => {
                let key = config
                    .get("api_key")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| {
                        DataSourceError::InvalidConfiguration("api_key auth needs a key".into())
                    })?;
                let header_name = config
                    .get("api_key_header")
                    .and_then(|v| v.as_str())
                    .unwrap_or("X-API-Key");
                let name = HeaderName::from_bytes(header_name.as_bytes()).map_err(|e| {
                    DataSourceError::InvalidConfiguration(e.to_string())
                })?;
                headers.insert(
                    name,
                    HeaderValue::from_str(key)
                        .map_err(|e| DataSourceError::InvalidConfiguration(e.to_string()))?,
                );
            }
            _ => {}
        }

        let timeout = Duration::from_secs(
            config
                .get("timeout_secs")
                .and_then(|v| v.as_u64())
                .unwrap_or(30),
        );
        let table_name = config
            .get("table_name")
            .and_then(|v| v.as_str())
            .unwrap_or("data")
            .to_string();

        debug!(url = %url, "web api connector configured");

        Ok(Self {
            url,
            headers,
            data_path: config
                .get("data_path")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string()),
            table_name,
            timeout,
        })
    }

    fn client(&self) -> Result<reqwest::Client, DataSourceError> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .default_headers(self.headers.clone())
            .build()
            .map_err(|e| DataSourceError::ConnectionFailed(e.to_string()))
    }

    async fn fetch_rows(&self) -> Result<Vec<Map<String, Value>>, DataSourceError> {
        let response = self
            .client()?
            .get(&self.url)
            .send()
            .await
            .map_err(|e| DataSourceError::ConnectionFailed(e.to_string()))?;
        if !response.status().is_success() {
            return Err(DataSourceError::QueryExecutionFailed(format!(
                "endpoint returned {}",
                response.status()
            )));
        }
        let body: Value = response
            .json()
            .await
            .map_err(|e| DataSourceError::ParseFailed(e.to_string()))?;
        extract_rows(&body, self.data_path.as_deref())
    }
}

/// Pull the row array out of a response body, honoring an explicit dotted
/// path first and the conventional container keys after.
pub(crate) fn extract_rows(
    body: &Value,
    data_path: Option<&str>,
) -> Result<Vec<Map<String, Value>>, DataSourceError> {
    let target = match data_path {
        Some(path) => {
            let mut cursor = body;
            for segment in path.split('.') {
                cursor = cursor.get(segment).ok_or_else(|| {
                    DataSourceError::ParseFailed(format!("data path '{}' not found", path))
                })?;
            }
            cursor
        }
        None => {
            if body.is_array() {
                body
            } else {
                ROW_CONTAINER_KEYS
                    .iter()
                    .find_map(|key| body.get(*key).filter(|v| v.is_array()))
                    .ok_or_else(|| {
                        DataSourceError::ParseFailed(
                            "response carries no row array".into(),
                        )
                    })?
            }
        }
    };

    let items = target.as_array().ok_or_else(|| {
        DataSourceError::ParseFailed("row container is not an array".into())
    })?;
    Ok(items
        .iter()
        .filter_map(|item| item.as_object().cloned())
        .collect())
}

/// Infer a table schema from JSON rows by stringifying each column's values
/// and running them through the sample classifier.
pub(crate) fn schema_from_rows(
    table_name: &str,
    rows: &[Map<String, Value>],
) -> TableSchema {
    let mut column_order: Vec<String> = Vec::new();
    for row in rows {
        for key in row.keys() {
            if !column_order.iter().any(|c| c == key) {
                column_order.push(key.clone());
            }
        }
    }

    let columns = column_order
        .iter()
        .map(|name| {
            let values: Vec<String> = rows
                .iter()
                .filter_map(|row| row.get(name))
                .filter(|v| !v.is_null())
                .map(json_to_sample)
                .collect();
            let nullable = rows
                .iter()
                .any(|row| row.get(name).map(|v| v.is_null()).unwrap_or(true));
            ColumnSchema {
                name: name.clone(),
                canonical_type: infer_column_type(&values),
                nullable,
                description: None,
            }
        })
        .collect();

    TableSchema::new(table_name.to_string(), columns, rows.len() as i64)
}

fn json_to_sample(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl DataSourceConnector for WebApiConnector {
    async fn test_connection(&self) -> (bool, String) {
        match self.fetch_rows().await {
            Ok(rows) => (true, format!("endpoint returned {} rows", rows.len())),
            Err(e) => (false, e.to_string()),
        }
    }

    async fn fetch_schema(
        &self,
        _table_filter: Option<&[String]>,
        _table_limit: usize,
    ) -> Result<CanonicalSchema, DataSourceError> {
        let rows = self.fetch_rows().await?;
        if rows.is_empty() {
            return Err(DataSourceError::SchemaInferenceFailed(
                "endpoint returned no rows to infer from".into(),
            ));
        }
        Ok(CanonicalSchema::new(vec![schema_from_rows(
            &self.table_name,
            &rows,
        )]))
    }

    async fn execute_query(
        &self,
        _query: &str,
        limit: usize,
        offset: usize,
    ) -> Result<QueryResult, DataSourceError> {
        let started = std::time::Instant::now();
        let all = self.fetch_rows().await?;
        let table = schema_from_rows(&self.table_name, &all);
        let rows: Vec<Map<String, Value>> =
            all.into_iter().skip(offset).take(limit).collect();
        let total_rows = rows.len();
        Ok(QueryResult {
            rows,
            columns: table
                .columns
                .iter()
                .map(|c| QueryColumn::new(&c.name, c.canonical_type))
                .collect(),
            total_rows,
            execution_time_ms: started.elapsed().as_millis() as u64,
            synthetic: false,
        })
    }

    async fn get_sample_data(
        &self,
        _table: &str,
        limit: usize,
    ) -> Result<QueryResult, DataSourceError> {
        self.execute_query("", limit, 0).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CanonicalType;
    use serde_json::json;

    #[test]
    fn missing_url_is_a_configuration_error() {
        let err = WebApiConnector::new(&json!({})).unwrap_err();
        assert!(matches!(err, DataSourceError::InvalidConfiguration(_)));
    }

    #[test]
    fn bearer_auth_requires_a_token() {
        let err = WebApiConnector::new(&json!({
            "url": "https://api.example.com/v1/orders",
            "auth_type": "bearer"
        }))
        .unwrap_err();
        assert!(matches!(err, DataSourceError::InvalidConfiguration(_)));
    }

    #[test]
    fn rows_extracted_from_top_level_array_and_containers() {
        let top = json!([{"a": 1}, {"a": 2}]);
        assert_eq!(extract_rows(&top, None).unwrap().len(), 2);

        let nested = json!({"results": [{"a": 1}]});
        assert_eq!(extract_rows(&nested, None).unwrap().len(), 1);

        let pathed = json!({"payload": {"items": [{"a": 1}]}});
        assert_eq!(
            extract_rows(&pathed, Some("payload.items")).unwrap().len(),
            1
        );

        let none = json!({"message": "ok"});
        assert!(extract_rows(&none, None).is_err());
    }

    #[test]
    fn schema_inferred_from_json_rows() {
        let rows = extract_rows(
            &json!([
                {"id": 1, "name": "Alice", "active": true, "rate": 9.5},
                {"id": 2, "name": "Bob", "active": false, "rate": null}
            ]),
            None,
        )
        .unwrap();
        let table = schema_from_rows("orders", &rows);
        assert_eq!(table.row_count, 2);

        let by_name = |n: &str| {
            table
                .columns
                .iter()
                .find(|c| c.name == n)
                .unwrap()
                .clone()
        };
        assert_eq!(by_name("id").canonical_type, CanonicalType::Integer);
        assert_eq!(by_name("name").canonical_type, CanonicalType::String);
        assert_eq!(by_name("active").canonical_type, CanonicalType::Boolean);
        assert_eq!(by_name("rate").canonical_type, CanonicalType::Decimal);
        assert!(by_name("rate").nullable);
        assert!(!by_name("id").nullable);
    }
}
