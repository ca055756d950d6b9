use async_trait::async_trait;
use chrono::{Duration, Utc};
use rand::Rng;
use serde_json::{Map, Value};

use super::base::DataSourceConnector;
use crate::error::DataSourceError;
use crate::models::{CanonicalSchema, CanonicalType, QueryResult, TableSchema};

/// Stand-in for backends whose drivers are not wired up. Registration
/// succeeds (placeholder schema, discovery deferred), every live operation
/// fails the same way, and queries are served synthetically upstream.
#[derive(Debug)]
pub struct UnimplementedConnector {
    kind: &'static str,
}

impl UnimplementedConnector {
    pub fn new(kind: &'static str) -> Self {
        Self { kind }
    }

    fn unavailable(&self) -> DataSourceError {
        DataSourceError::ConnectionFailed(format!(
            "{} driver is not available in this build",
            self.kind
        ))
    }
}

#[async_trait]
impl DataSourceConnector for UnimplementedConnector {
    async fn test_connection(&self) -> (bool, String) {
        (
            false,
            format!("{} driver is not available in this build", self.kind),
        )
    }

    async fn fetch_schema(
        &self,
        _table_filter: Option<&[String]>,
        _table_limit: usize,
    ) -> Result<CanonicalSchema, DataSourceError> {
        Err(self.unavailable())
    }

    async fn execute_query(
        &self,
        _query: &str,
        _limit: usize,
        _offset: usize,
    ) -> Result<QueryResult, DataSourceError> {
        Err(self.unavailable())
    }

    async fn get_sample_data(
        &self,
        _table: &str,
        _limit: usize,
    ) -> Result<QueryResult, DataSourceError> {
        Err(self.unavailable())
    }

    fn supports_live_query(&self) -> bool {
        false
    }
}

/// Generate schema-conformant random rows for a table. Callers must flag
/// the output as synthetic so it can never pass for real data.
pub fn synthetic_rows(table: &TableSchema, limit: usize) -> Vec<Map<String, Value>> {
    let mut rng = rand::thread_rng();
    let now = Utc::now();

    (0..limit)
        .map(|i| {
            let mut row = Map::new();
            for column in &table.columns {
                let value = match column.canonical_type {
                    CanonicalType::Integer => Value::from(rng.gen_range(1..=1000)),
                    CanonicalType::Decimal => {
                        let v: f64 = rng.gen_range(1.0..1000.0);
                        Value::from((v * 100.0).round() / 100.0)
                    }
                    CanonicalType::Boolean => Value::Bool(rng.gen_bool(0.5)),
                    CanonicalType::Date => {
                        let days = rng.gen_range(0..365);
                        Value::String(
                            (now - Duration::days(days)).format("%Y-%m-%d").to_string(),
                        )
                    }
                    CanonicalType::DateTime => {
                        let minutes = rng.gen_range(0..525_600);
                        Value::String(
                            (now - Duration::minutes(minutes))
                                .format("%Y-%m-%d %H:%M:%S")
                                .to_string(),
                        )
                    }
                    CanonicalType::String => {
                        Value::String(format!("{} {}", column.name, i + 1))
                    }
                };
                row.insert(column.name.clone(), value);
            }
            row
        })
        .collect()
}
