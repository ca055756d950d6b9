use std::env;

/// Default row limit applied when a query request does not specify one.
pub const DEFAULT_QUERY_LIMIT: usize = 1000;
/// Hard cap on returned rows, enforced regardless of caller input.
pub const MAX_QUERY_ROWS: usize = 1000;
/// Upper bound on tables enumerated during schema discovery.
pub const SCHEMA_TABLE_CAP: usize = 50;
/// Sample rows retained per file-backed dataset (and fed to inference).
pub const SAMPLE_ROW_LIMIT: usize = 100;

#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub metadata_db_url: String,
    pub max_query_rows: usize,
    pub schema_table_cap: usize,
    pub sample_row_limit: usize,
}

impl CoreConfig {
    pub fn from_env() -> Self {
        CoreConfig {
            metadata_db_url: env::var("SYNTRA_METADATA_URL")
                .unwrap_or_else(|_| "sqlite://syntra-meta.db".to_string()),
            max_query_rows: env::var("SYNTRA_MAX_QUERY_ROWS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(MAX_QUERY_ROWS),
            schema_table_cap: env::var("SYNTRA_SCHEMA_TABLE_CAP")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(SCHEMA_TABLE_CAP),
            sample_row_limit: env::var("SYNTRA_SAMPLE_ROW_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(SAMPLE_ROW_LIMIT),
        }
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        CoreConfig {
            metadata_db_url: "sqlite::memory:".to_string(),
            max_query_rows: MAX_QUERY_ROWS,
            schema_table_cap: SCHEMA_TABLE_CAP,
            sample_row_limit: SAMPLE_ROW_LIMIT,
        }
    }
}
