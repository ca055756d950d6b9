//! Data-source connector core: a uniform facade over heterogeneous
//! backends (relational databases, files, web endpoints) with canonical
//! schema inference, cached discovery, and bounded paginated queries.

pub mod config;
pub mod core;
pub mod datasource;
pub mod error;
pub mod models;

pub use config::CoreConfig;
pub use core::datasets::{DatasetOrchestrator, DatasetStore, QueryExecutor, SchemaCache};
pub use datasource::{ConnectorRegistry, ConnectorRequirements, DataSourceConnector};
pub use error::DataSourceError;
pub use models::{
    CanonicalSchema, CanonicalType, ColumnSchema, ConnectorType, Dataset, DatasetStatus,
    DatasetSummary, QueryRequest, QueryResult, TableSchema,
};
