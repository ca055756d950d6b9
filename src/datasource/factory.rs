use serde_json::Value;
use tracing::info;

use super::base::DataSourceConnector;
use super::csv::CsvConnector;
use super::excel::ExcelConnector;
use super::mysql::MySqlConnector;
use super::postgres::PostgresConnector;
use super::sqlite::SqliteConnector;
use super::sqlserver::SqlServerConnector;
use super::stub::UnimplementedConnector;
use super::webapi::WebApiConnector;
use crate::error::DataSourceError;
use crate::models::ConnectorType;

/// Configuration contract for one backend kind, for surfacing to callers
/// before they attempt a registration.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ConnectorRequirements {
    pub connector_type: ConnectorType,
    pub required: Vec<&'static str>,
    pub optional: Vec<&'static str>,
    pub description: &'static str,
}

/// Maps connector tags onto connector instances. Stateless and read-only;
/// a single registry serves the whole process.
pub struct ConnectorRegistry;

impl ConnectorRegistry {
    pub fn new() -> Self {
        Self
    }

    /// Build a connector for the given kind. Fails without I/O when the
    /// kind is unknown or the configuration is structurally invalid.
    pub fn create(
        &self,
        connector_type: ConnectorType,
        config: &Value,
    ) -> Result<Box<dyn DataSourceConnector>, DataSourceError> {
        info!(connector_type = %connector_type.as_str(), "building connector");
        let connector: Box<dyn DataSourceConnector> = match connector_type {
            ConnectorType::Postgres => Box::new(PostgresConnector::new(config)?),
            ConnectorType::MySql | ConnectorType::MariaDb => {
                Box::new(MySqlConnector::new(config)?)
            }
            ConnectorType::Sqlite => Box::new(SqliteConnector::new(config)?),
            ConnectorType::SqlServer => Box::new(SqlServerConnector::new(config)?),
            ConnectorType::Csv => Box::new(CsvConnector::new(config)?),
            ConnectorType::Excel => Box::new(ExcelConnector::new(config)?),
            ConnectorType::WebApi => Box::new(WebApiConnector::new(config)?),
            ConnectorType::OData
            | ConnectorType::Odbc
            | ConnectorType::Jdbc
            | ConnectorType::Spark
            | ConnectorType::Databricks
            | ConnectorType::Teradata => {
                Box::new(UnimplementedConnector::new(connector_type.as_str()))
            }
        };
        Ok(connector)
    }

    pub fn supported_types(&self) -> Vec<ConnectorType> {
        ConnectorType::all().to_vec()
    }

    pub fn requirements(&self, connector_type: ConnectorType) -> ConnectorRequirements {
        let (required, optional, description): (Vec<&str>, Vec<&str>, &str) =
            match connector_type {
                ConnectorType::Postgres => (
                    vec!["host", "port", "database", "username", "password"],
                    vec!["schema", "url"],
                    "PostgreSQL database",
                ),
                ConnectorType::MySql => (
                    vec!["host", "port", "database", "username", "password"],
                    vec!["url"],
                    "MySQL database",
                ),
                ConnectorType::MariaDb => (
                    vec!["host", "port", "database", "username", "password"],
                    vec!["url"],
                    "MariaDB database",
                ),
                ConnectorType::Sqlite => {
                    (vec!["path"], vec!["url"], "SQLite database file")
                }
                ConnectorType::SqlServer => (
                    vec!["host", "port", "database", "username", "password"],
                    vec!["schema", "encrypt", "trust_server_certificate"],
                    "Microsoft SQL Server database",
                ),
                ConnectorType::Csv => (
                    vec!["path"],
                    vec!["delimiter"],
                    "CSV file on local disk or uploaded payload",
                ),
                ConnectorType::Excel => {
                    (vec!["path"], vec![], "Excel workbook (.xlsx/.xls)")
                }
                ConnectorType::WebApi => (
                    vec!["url"],
                    vec![
                        "auth_type",
                        "token",
                        "api_key",
                        "api_key_header",
                        "username",
                        "password",
                        "headers",
                        "data_path",
                        "table_name",
                        "timeout_secs",
                    ],
                    "JSON REST endpoint",
                ),
                ConnectorType::OData => {
                    (vec!["url"], vec!["username", "password"], "OData feed")
                }
                ConnectorType::Odbc => {
                    (vec!["connection_string"], vec![], "Generic ODBC source")
                }
                ConnectorType::Jdbc => (
                    vec!["connection_string", "driver"],
                    vec![],
                    "Generic JDBC source",
                ),
                ConnectorType::Spark => (
                    vec!["host", "port"],
                    vec!["username", "password"],
                    "Apache Spark SQL endpoint",
                ),
                ConnectorType::Databricks => (
                    vec!["server_hostname", "http_path", "access_token"],
                    vec![],
                    "Databricks SQL warehouse",
                ),
                ConnectorType::Teradata => (
                    vec!["host", "username", "password"],
                    vec!["database"],
                    "Teradata database",
                ),
            };
        ConnectorRequirements {
            connector_type,
            required,
            optional,
            description,
        }
    }
}

impl Default for ConnectorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
