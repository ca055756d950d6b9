use thiserror::Error;
use uuid::Uuid;

/// Error taxonomy for the data-source core.
///
/// The first two variants are caller errors detected before any I/O; the
/// backend variants always carry the underlying message and are recorded
/// onto the dataset so repeated queries do not re-pay the network cost of
/// rediscovering the same failure.
#[derive(Debug, Error)]
pub enum DataSourceError {
    #[error("unsupported connector type: {0}")]
    UnsupportedConnectorType(String),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("schema inference failed: {0}")]
    SchemaInferenceFailed(String),

    #[error("query execution failed: {0}")]
    QueryExecutionFailed(String),

    #[error("failed to parse uploaded file: {0}")]
    ParseFailed(String),

    #[error("dataset not found: {0}")]
    DatasetNotFound(Uuid),

    #[error("metadata store error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DataSourceError {
    /// Caller errors map to 4xx at an HTTP boundary; everything else is a
    /// backend or internal failure.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            DataSourceError::UnsupportedConnectorType(_)
                | DataSourceError::InvalidConfiguration(_)
                | DataSourceError::DatasetNotFound(_)
        )
    }
}
