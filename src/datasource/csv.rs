use std::path::PathBuf;

use async_trait::async_trait;
use csv::ReaderBuilder;
use serde_json::{Map, Value};

use super::base::DataSourceConnector;
use super::inference::infer_column_type;
use crate::config::SAMPLE_ROW_LIMIT;
use crate::error::DataSourceError;
use crate::models::{
    CanonicalSchema, CanonicalType, ColumnSchema, QueryColumn, QueryResult, TableSchema,
};

/// Outcome of a single-pass parse over a CSV payload. `row_count` covers
/// the whole payload even when `sample_rows` was truncated.
#[derive(Debug)]
pub struct ParsedCsv {
    pub schema: CanonicalSchema,
    pub sample_rows: Vec<Map<String, Value>>,
    pub row_count: i64,
}

/// Parse an uploaded CSV payload: keep at most `SAMPLE_ROW_LIMIT` rows, infer
/// one column type per header from those sampled values, and coerce the kept
/// values onto their inferred types. Rows past the sample only bump the count.
pub fn parse_csv_payload(
    bytes: &[u8],
    table_name: &str,
    delimiter: u8,
) -> Result<ParsedCsv, DataSourceError> {
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(bytes);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| DataSourceError::ParseFailed(e.to_string()))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    if headers.is_empty() || headers.iter().all(|h| h.is_empty()) {
        return Err(DataSourceError::ParseFailed("no header row".into()));
    }

    let mut column_values: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
    let mut raw_samples: Vec<Vec<String>> = Vec::new();
    let mut row_count: i64 = 0;

    for record in reader.records() {
        let record = record.map_err(|e| DataSourceError::ParseFailed(e.to_string()))?;
        row_count += 1;
        if raw_samples.len() >= SAMPLE_ROW_LIMIT {
            continue;
        }

        let fields: Vec<String> = (0..headers.len())
            .map(|i| record.get(i).unwrap_or("").to_string())
            .collect();
        for (i, value) in fields.iter().enumerate() {
            column_values[i].push(value.clone());
        }
        raw_samples.push(fields);
    }

    let columns: Vec<ColumnSchema> = headers
        .iter()
        .zip(column_values.iter())
        .map(|(name, values)| ColumnSchema {
            name: name.clone(),
            canonical_type: infer_column_type(values),
            nullable: values.iter().any(|v| v.trim().is_empty()),
            description: None,
        })
        .collect();

    let sample_rows: Vec<Map<String, Value>> = raw_samples
        .iter()
        .map(|fields| {
            let mut object = Map::new();
            for (column, raw) in columns.iter().zip(fields.iter()) {
                object.insert(
                    column.name.clone(),
                    coerce_value(raw, column.canonical_type),
                );
            }
            object
        })
        .collect();

    let table = TableSchema::new(table_name.to_string(), columns, row_count);
    Ok(ParsedCsv {
        schema: CanonicalSchema::new(vec![table]),
        sample_rows,
        row_count,
    })
}

/// Render a raw field as a JSON value matching the column's inferred type.
/// Values that no longer parse (possible since inference excludes blanks)
/// fall back to string or null.
pub fn coerce_value(raw: &str, canonical_type: CanonicalType) -> Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    match canonical_type {
        CanonicalType::Integer => trimmed
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(trimmed.to_string())),
        CanonicalType::Decimal => trimmed
            .parse::<f64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(trimmed.to_string())),
        CanonicalType::Boolean => match trimmed.to_lowercase().as_str() {
            "true" | "yes" | "y" | "1" => Value::Bool(true),
            "false" | "no" | "n" | "0" => Value::Bool(false),
            _ => Value::String(trimmed.to_string()),
        },
        CanonicalType::Date | CanonicalType::DateTime | CanonicalType::String => {
            Value::String(trimmed.to_string())
        }
    }
}

/// File-path backed CSV source. Uploaded payloads go through
/// `parse_csv_payload` at registration instead and never hit this.
#[derive(Debug)]
pub struct CsvConnector {
    path: PathBuf,
    delimiter: u8,
    table_name: String,
}

impl CsvConnector {
    pub fn new(config: &Value) -> Result<Self, DataSourceError> {
        let path = config
            .get("path")
            .or_else(|| config.get("file_path"))
            .and_then(|v| v.as_str())
            .ok_or_else(|| DataSourceError::InvalidConfiguration("missing file path".into()))?;
        let delimiter = config
            .get("delimiter")
            .and_then(|v| v.as_str())
            .and_then(|s| s.bytes().next())
            .unwrap_or(b',');

        let path = PathBuf::from(path);
        let table_name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("data")
            .to_string();

        Ok(Self {
            path,
            delimiter,
            table_name,
        })
    }

    fn parse_file(&self) -> Result<ParsedCsv, DataSourceError> {
        let bytes = std::fs::read(&self.path)
            .map_err(|e| DataSourceError::ConnectionFailed(e.to_string()))?;
        parse_csv_payload(&bytes, &self.table_name, self.delimiter)
    }
}

#[async_trait]
impl DataSourceConnector for CsvConnector {
    async fn test_connection(&self) -> (bool, String) {
        match std::fs::metadata(&self.path) {
            Ok(meta) if meta.is_file() => (true, "file readable".into()),
            Ok(_) => (false, "path is not a file".into()),
            Err(e) => (false, e.to_string()),
        }
    }

    async fn fetch_schema(
        &self,
        _table_filter: Option<&[String]>,
        _table_limit: usize,
    ) -> Result<CanonicalSchema, DataSourceError> {
        Ok(self.parse_file()?.schema)
    }

    async fn execute_query(
        &self,
        _query: &str,
        limit: usize,
        offset: usize,
    ) -> Result<QueryResult, DataSourceError> {
        let parsed = self.parse_file()?;
        Ok(rows_from_parsed(parsed, limit, offset))
    }

    async fn get_sample_data(
        &self,
        _table: &str,
        limit: usize,
    ) -> Result<QueryResult, DataSourceError> {
        let parsed = self.parse_file()?;
        Ok(rows_from_parsed(parsed, limit, 0))
    }
}

fn rows_from_parsed(parsed: ParsedCsv, limit: usize, offset: usize) -> QueryResult {
    let columns: Vec<QueryColumn> = parsed
        .schema
        .first_table()
        .map(|t| {
            t.columns
                .iter()
                .map(|c| QueryColumn::new(&c.name, c.canonical_type))
                .collect()
        })
        .unwrap_or_default();

    let rows: Vec<Map<String, Value>> = parsed
        .sample_rows
        .into_iter()
        .skip(offset)
        .take(limit)
        .collect();
    let total_rows = rows.len();

    QueryResult {
        rows,
        columns,
        total_rows,
        execution_time_ms: 0,
        synthetic: false,
    }
}
