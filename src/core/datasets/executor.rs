use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::info;
use uuid::Uuid;

use super::schema_cache::SchemaCache;
use super::store::DatasetStore;
use crate::config::{CoreConfig, DEFAULT_QUERY_LIMIT};
use crate::datasource::stub::synthetic_rows;
use crate::datasource::ConnectorRegistry;
use crate::error::DataSourceError;
use crate::models::{
    CanonicalType, ConnectorType, Dataset, QueryColumn, QueryRequest, QueryResult,
    TableSchema,
};

/// Read-only query path. Routing order: error datasets fail fast, cached
/// file samples are served from the store, live sources get a bounded
/// backend query, declared stubs get clearly-flagged synthetic rows. The
/// executor never mutates a dataset; `ensure_schema` owns that.
#[derive(Clone)]
pub struct QueryExecutor {
    store: DatasetStore,
    registry: Arc<ConnectorRegistry>,
    schema_cache: SchemaCache,
    max_rows: usize,
}

impl QueryExecutor {
    pub fn new(store: DatasetStore, registry: Arc<ConnectorRegistry>, config: &CoreConfig) -> Self {
        let schema_cache = SchemaCache::new(
            store.clone(),
            Arc::clone(&registry),
            config.schema_table_cap,
        );
        Self {
            store,
            registry,
            schema_cache,
            max_rows: config.max_query_rows,
        }
    }

    pub async fn query_dataset(
        &self,
        id: Uuid,
        request: &QueryRequest,
    ) -> Result<QueryResult, DataSourceError> {
        let dataset = self.store.get_dataset(id).await?;

        if dataset.status == crate::models::DatasetStatus::Error {
            let message = dataset
                .error_message
                .clone()
                .unwrap_or_else(|| "dataset is in an error state".to_string());
            return Err(DataSourceError::QueryExecutionFailed(message));
        }

        let limit = request
            .limit
            .unwrap_or(DEFAULT_QUERY_LIMIT)
            .min(self.max_rows);
        info!(dataset_id = %id, limit, offset = request.offset, "querying dataset");

        if dataset.connector_type.is_file() {
            if let Some(samples) = &dataset.sample_rows {
                return Ok(serve_cached_rows(&dataset, samples, request, limit));
            }
        }

        if dataset.connector_type.is_declared_stub() {
            return self.serve_synthetic(&dataset, request, limit);
        }

        self.serve_live(&dataset, request, limit).await
    }

    async fn serve_live(
        &self,
        dataset: &Dataset,
        request: &QueryRequest,
        limit: usize,
    ) -> Result<QueryResult, DataSourceError> {
        let schema = self.schema_cache.ensure_schema(dataset, false).await?;
        let table = pick_table(&schema.tables, request.table_name.as_deref())?;

        let connector = self
            .registry
            .create(dataset.connector_type, &dataset.connector_config)?;

        if dataset.connector_type.uses_sql() {
            let statement = build_select(
                dataset.connector_type,
                &table.name,
                &request.columns,
                &request.filters,
            );
            let mut result = connector
                .execute_query(&statement, limit, request.offset)
                .await?;
            // Native backend types flatten to string at the response
            // boundary; the schema keeps the canonical mapping.
            for column in &mut result.columns {
                column.canonical_type = CanonicalType::String;
            }
            Ok(result)
        } else {
            connector.execute_query("", limit, request.offset).await
        }
    }

    fn serve_synthetic(
        &self,
        dataset: &Dataset,
        request: &QueryRequest,
        limit: usize,
    ) -> Result<QueryResult, DataSourceError> {
        let schema = match &dataset.schema {
            Some(schema) if schema.is_cached() => schema.clone(),
            // Placeholder or absent schema means there is nothing to
            // conform to; an empty but honestly-flagged result.
            _ => {
                return Ok(QueryResult {
                    synthetic: true,
                    ..QueryResult::empty()
                })
            }
        };
        let table = pick_table(&schema.tables, request.table_name.as_deref())?;

        let rows = synthetic_rows(table, limit);
        let columns = table
            .columns
            .iter()
            .map(|c| QueryColumn::new(&c.name, c.canonical_type))
            .collect();
        let total_rows = rows.len();
        Ok(QueryResult {
            rows,
            columns,
            total_rows,
            execution_time_ms: 0,
            synthetic: true,
        })
    }
}

/// Serve a file-backed dataset from its retained sample rows: filters,
/// projection, then pagination, all in memory.
fn serve_cached_rows(
    dataset: &Dataset,
    samples: &[Map<String, Value>],
    request: &QueryRequest,
    limit: usize,
) -> QueryResult {
    let filtered: Vec<&Map<String, Value>> = samples
        .iter()
        .filter(|row| {
            request
                .filters
                .iter()
                .all(|(k, expected)| row.get(k) == Some(expected))
        })
        .collect();

    let rows: Vec<Map<String, Value>> = filtered
        .into_iter()
        .skip(request.offset)
        .take(limit)
        .map(|row| project_row(row, &request.columns))
        .collect();

    let columns: Vec<QueryColumn> = dataset
        .schema
        .as_ref()
        .and_then(|s| s.first_table())
        .map(|t| {
            t.columns
                .iter()
                .filter(|c| request.columns.is_empty() || request.columns.contains(&c.name))
                .map(|c| QueryColumn::new(&c.name, c.canonical_type))
                .collect()
        })
        .unwrap_or_default();

    let total_rows = rows.len();
    QueryResult {
        rows,
        columns,
        total_rows,
        execution_time_ms: 0,
        synthetic: false,
    }
}

fn project_row(row: &Map<String, Value>, columns: &[String]) -> Map<String, Value> {
    if columns.is_empty() {
        return row.clone();
    }
    columns
        .iter()
        .filter_map(|name| row.get(name).map(|v| (name.clone(), v.clone())))
        .collect()
}

/// Resolve the target table: the requested name (matching either the raw
/// or display name) or the schema's first table.
fn pick_table<'a>(
    tables: &'a [TableSchema],
    requested: Option<&str>,
) -> Result<&'a TableSchema, DataSourceError> {
    match requested {
        Some(name) => tables
            .iter()
            .find(|t| t.name == name || t.display_name == name)
            .ok_or_else(|| {
                DataSourceError::QueryExecutionFailed(format!("table '{}' not found", name))
            }),
        None => tables.first().ok_or_else(|| {
            DataSourceError::QueryExecutionFailed("dataset has no tables".into())
        }),
    }
}

/// Build a bounded SELECT in the backend's identifier dialect. Filters are
/// equality-only; string literals are single-quote escaped.
fn build_select(
    kind: ConnectorType,
    table: &str,
    columns: &[String],
    filters: &Map<String, Value>,
) -> String {
    let projection = if columns.is_empty() {
        "*".to_string()
    } else {
        columns
            .iter()
            .map(|c| quote_path(kind, c))
            .collect::<Vec<_>>()
            .join(", ")
    };

    let mut statement = format!("SELECT {} FROM {}", projection, quote_path(kind, table));

    if !filters.is_empty() {
        let predicates: Vec<String> = filters
            .iter()
            .map(|(column, value)| match value {
                Value::Null => format!("{} IS NULL", quote_path(kind, column)),
                other => format!("{} = {}", quote_path(kind, column), literal(other)),
            })
            .collect();
        statement.push_str(" WHERE ");
        statement.push_str(&predicates.join(" AND "));
    }

    statement
}

/// Quote each dot-separated segment in the backend's dialect.
fn quote_path(kind: ConnectorType, name: &str) -> String {
    name.split('.')
        .map(|segment| match kind {
            ConnectorType::MySql | ConnectorType::MariaDb => {
                format!("`{}`", segment.replace('`', "``"))
            }
            ConnectorType::SqlServer => format!("[{}]", segment.replace(']', "]]")),
            _ => format!("\"{}\"", segment.replace('"', "\"\"")),
        })
        .collect::<Vec<_>>()
        .join(".")
}

fn literal(value: &Value) -> String {
    match value {
        Value::String(s) => format!("'{}'", s.replace('\'', "''")),
        Value::Bool(true) => "1".to_string(),
        Value::Bool(false) => "0".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn select_covers_projection_filters_and_dialects() {
        let mut filters = Map::new();
        filters.insert("region".to_string(), json!("west"));
        filters.insert("active".to_string(), json!(true));

        let pg = build_select(
            ConnectorType::Postgres,
            "public.orders",
            &["id".to_string(), "total".to_string()],
            &filters,
        );
        assert_eq!(
            pg,
            "SELECT \"id\", \"total\" FROM \"public\".\"orders\" \
             WHERE \"active\" = 1 AND \"region\" = 'west'"
        );

        let my = build_select(ConnectorType::MySql, "orders", &[], &Map::new());
        assert_eq!(my, "SELECT * FROM `orders`");

        let ms = build_select(ConnectorType::SqlServer, "dbo.orders", &[], &Map::new());
        assert_eq!(ms, "SELECT * FROM [dbo].[orders]");
    }

    #[test]
    fn string_literals_are_escaped() {
        assert_eq!(literal(&json!("O'Brien")), "'O''Brien'");
        assert_eq!(literal(&json!(42)), "42");
        assert_eq!(literal(&json!(false)), "0");
    }

    #[test]
    fn null_filters_become_is_null() {
        let mut filters = Map::new();
        filters.insert("deleted_at".to_string(), Value::Null);
        let sql = build_select(ConnectorType::Sqlite, "t", &[], &filters);
        assert_eq!(sql, "SELECT * FROM \"t\" WHERE \"deleted_at\" IS NULL");
    }

    #[test]
    fn table_pick_prefers_requested_then_first() {
        let tables = vec![
            TableSchema::new("public.orders".to_string(), vec![], 0),
            TableSchema::new("public.items".to_string(), vec![], 0),
        ];
        assert_eq!(pick_table(&tables, None).unwrap().name, "public.orders");
        assert_eq!(
            pick_table(&tables, Some("public.items")).unwrap().name,
            "public.items"
        );
        // Display names resolve too.
        assert_eq!(
            pick_table(&tables, Some("Items")).unwrap().name,
            "public.items"
        );
        assert!(pick_table(&tables, Some("missing")).is_err());
        assert!(pick_table(&[], None).is_err());
    }

    #[test]
    fn projection_keeps_only_requested_columns() {
        let mut row = Map::new();
        row.insert("a".to_string(), json!(1));
        row.insert("b".to_string(), json!(2));
        let projected = project_row(&row, &["b".to_string()]);
        assert_eq!(projected.len(), 1);
        assert_eq!(projected["b"], json!(2));
        assert_eq!(project_row(&row, &[]).len(), 2);
    }
}
