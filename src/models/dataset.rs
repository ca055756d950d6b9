use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::DataSourceError;
use crate::models::schema::CanonicalSchema;

/// Supported data-source connector families. The set is fixed at compile
/// time; wire tags are resolved through `FromStr`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectorType {
    #[serde(rename = "postgresql")]
    Postgres,
    #[serde(rename = "mysql")]
    MySql,
    #[serde(rename = "mariadb")]
    MariaDb,
    #[serde(rename = "sqlite")]
    Sqlite,
    #[serde(rename = "sqlserver")]
    SqlServer,
    #[serde(rename = "csv")]
    Csv,
    #[serde(rename = "excel")]
    Excel,
    #[serde(rename = "web_api")]
    WebApi,
    #[serde(rename = "odata")]
    OData,
    #[serde(rename = "odbc")]
    Odbc,
    #[serde(rename = "jdbc")]
    Jdbc,
    #[serde(rename = "spark")]
    Spark,
    #[serde(rename = "databricks")]
    Databricks,
    #[serde(rename = "teradata")]
    Teradata,
}

impl ConnectorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectorType::Postgres => "postgresql",
            ConnectorType::MySql => "mysql",
            ConnectorType::MariaDb => "mariadb",
            ConnectorType::Sqlite => "sqlite",
            ConnectorType::SqlServer => "sqlserver",
            ConnectorType::Csv => "csv",
            ConnectorType::Excel => "excel",
            ConnectorType::WebApi => "web_api",
            ConnectorType::OData => "odata",
            ConnectorType::Odbc => "odbc",
            ConnectorType::Jdbc => "jdbc",
            ConnectorType::Spark => "spark",
            ConnectorType::Databricks => "databricks",
            ConnectorType::Teradata => "teradata",
        }
    }

    pub fn all() -> &'static [ConnectorType] {
        &[
            ConnectorType::Postgres,
            ConnectorType::MySql,
            ConnectorType::MariaDb,
            ConnectorType::Sqlite,
            ConnectorType::SqlServer,
            ConnectorType::Csv,
            ConnectorType::Excel,
            ConnectorType::WebApi,
            ConnectorType::OData,
            ConnectorType::Odbc,
            ConnectorType::Jdbc,
            ConnectorType::Spark,
            ConnectorType::Databricks,
            ConnectorType::Teradata,
        ]
    }

    /// File-backed sources are parsed locally; queries against them never
    /// hit the network.
    pub fn is_file(&self) -> bool {
        matches!(self, ConnectorType::Csv | ConnectorType::Excel)
    }

    /// Connectors whose bounded queries are SQL built by the executor.
    pub fn uses_sql(&self) -> bool {
        matches!(
            self,
            ConnectorType::Postgres
                | ConnectorType::MySql
                | ConnectorType::MariaDb
                | ConnectorType::Sqlite
                | ConnectorType::SqlServer
        )
    }

    /// Variants whose drivers are not available in this runtime. They are
    /// registered so the registry can describe them, and queries against
    /// them are served by the clearly-flagged synthetic path.
    pub fn is_declared_stub(&self) -> bool {
        matches!(
            self,
            ConnectorType::OData
                | ConnectorType::Odbc
                | ConnectorType::Jdbc
                | ConnectorType::Spark
                | ConnectorType::Databricks
                | ConnectorType::Teradata
        )
    }
}

impl FromStr for ConnectorType {
    type Err = DataSourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgresql" | "postgres" => Ok(ConnectorType::Postgres),
            "mysql" => Ok(ConnectorType::MySql),
            "mariadb" => Ok(ConnectorType::MariaDb),
            "sqlite" => Ok(ConnectorType::Sqlite),
            "sqlserver" | "sql_server" | "mssql" => Ok(ConnectorType::SqlServer),
            "csv" | "text_csv" => Ok(ConnectorType::Csv),
            "excel" | "xlsx" => Ok(ConnectorType::Excel),
            "web_api" | "rest_api" | "web" => Ok(ConnectorType::WebApi),
            "odata" => Ok(ConnectorType::OData),
            "odbc" => Ok(ConnectorType::Odbc),
            "jdbc" => Ok(ConnectorType::Jdbc),
            "spark" => Ok(ConnectorType::Spark),
            "databricks" | "azure_databricks" => Ok(ConnectorType::Databricks),
            "teradata" => Ok(ConnectorType::Teradata),
            other => Err(DataSourceError::UnsupportedConnectorType(other.to_string())),
        }
    }
}

impl std::fmt::Display for ConnectorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetStatus {
    Pending,
    Processing,
    Ready,
    Error,
    Refreshing,
}

impl DatasetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetStatus::Pending => "pending",
            DatasetStatus::Processing => "processing",
            DatasetStatus::Ready => "ready",
            DatasetStatus::Error => "error",
            DatasetStatus::Refreshing => "refreshing",
        }
    }
}

impl FromStr for DatasetStatus {
    type Err = DataSourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DatasetStatus::Pending),
            "processing" => Ok(DatasetStatus::Processing),
            "ready" => Ok(DatasetStatus::Ready),
            "error" => Ok(DatasetStatus::Error),
            "refreshing" => Ok(DatasetStatus::Refreshing),
            other => Err(DataSourceError::Storage(sqlx::Error::Decode(
                format!("unknown dataset status `{other}`").into(),
            ))),
        }
    }
}

/// Ownership root for a registered external source. Mutated only by the
/// orchestrator and `ensure_schema`; the query executor reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    pub id: Uuid,
    pub workspace_id: String,
    pub name: String,
    pub connector_type: ConnectorType,
    /// Opaque, backend-specific configuration. Held in trust for the
    /// caller; never logged.
    pub connector_config: Value,
    pub status: DatasetStatus,
    pub schema: Option<CanonicalSchema>,
    /// Bounded preview rows, kept only for file-backed sources.
    pub sample_rows: Option<Vec<Map<String, Value>>>,
    pub row_count: Option<i64>,
    pub file_size: Option<i64>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_refresh: Option<DateTime<Utc>>,
}

impl Dataset {
    pub fn new(
        workspace_id: impl Into<String>,
        name: impl Into<String>,
        connector_type: ConnectorType,
        connector_config: Value,
    ) -> Self {
        let now = Utc::now();
        Dataset {
            id: Uuid::new_v4(),
            workspace_id: workspace_id.into(),
            name: name.into(),
            connector_type,
            connector_config,
            status: DatasetStatus::Pending,
            schema: None,
            sample_rows: None,
            row_count: None,
            file_size: None,
            error_message: None,
            created_at: now,
            updated_at: now,
            last_refresh: None,
        }
    }

    /// True when a non-empty, non-placeholder schema has been persisted —
    /// the condition under which `ensure_schema` is a no-op.
    pub fn has_cached_schema(&self) -> bool {
        self.schema.as_ref().map(|s| s.is_cached()).unwrap_or(false)
    }

    pub fn summary(&self) -> DatasetSummary {
        DatasetSummary {
            id: self.id,
            name: self.name.clone(),
            connector_type: self.connector_type,
            status: self.status,
            schema: self.schema.clone(),
            row_count: self.row_count,
            error_message: self.error_message.clone(),
        }
    }
}

/// Child record for each table discovered in a dataset's source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableRecord {
    pub id: Uuid,
    pub dataset_id: Uuid,
    pub name: String,
    pub display_name: String,
    pub description: Option<String>,
    pub columns: Vec<crate::models::schema::ColumnSchema>,
    pub row_count: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub id: Uuid,
    pub name: String,
    pub connector_type: ConnectorType,
    pub status: DatasetStatus,
    pub schema: Option<CanonicalSchema>,
    pub row_count: Option<i64>,
    pub error_message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connector_tag_parsing_accepts_aliases() {
        assert_eq!(
            "postgres".parse::<ConnectorType>().unwrap(),
            ConnectorType::Postgres
        );
        assert_eq!(
            "rest_api".parse::<ConnectorType>().unwrap(),
            ConnectorType::WebApi
        );
    }

    #[test]
    fn unknown_connector_tag_is_unsupported() {
        let err = "mongodb".parse::<ConnectorType>().unwrap_err();
        assert!(matches!(
            err,
            DataSourceError::UnsupportedConnectorType(ref t) if t == "mongodb"
        ));
    }

    #[test]
    fn new_dataset_starts_pending_without_schema() {
        let ds = Dataset::new("ws", "sales", ConnectorType::Csv, Value::Null);
        assert_eq!(ds.status, DatasetStatus::Pending);
        assert!(!ds.has_cached_schema());
    }
}
