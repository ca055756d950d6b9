use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::models::schema::CanonicalType;

/// Caller-facing query shape. The limit is a request; the executor clamps
/// it to the hard cap independently of what the caller supplies.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryRequest {
    pub table_name: Option<String>,
    #[serde(default)]
    pub columns: Vec<String>,
    /// Column-name to value equality filters.
    #[serde(default)]
    pub filters: Map<String, Value>,
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub canonical_type: CanonicalType,
}

impl QueryColumn {
    pub fn new(name: impl Into<String>, canonical_type: CanonicalType) -> Self {
        QueryColumn {
            name: name.into(),
            canonical_type,
        }
    }
}

/// Uniform result shape across all backends. `total_rows` is always the
/// count of rows actually returned, never an estimate of the source size.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    pub rows: Vec<Map<String, Value>>,
    pub columns: Vec<QueryColumn>,
    pub total_rows: usize,
    pub execution_time_ms: u64,
    /// Set only on the stub-connector path; real backends never return
    /// synthetic rows.
    #[serde(default)]
    pub synthetic: bool,
}

impl QueryResult {
    pub fn empty() -> Self {
        QueryResult {
            rows: Vec::new(),
            columns: Vec::new(),
            total_rows: 0,
            execution_time_ms: 0,
            synthetic: false,
        }
    }
}
