use std::path::PathBuf;

use async_trait::async_trait;
use calamine::{open_workbook_auto, Data, Reader};
use serde_json::{Map, Value};

use super::base::DataSourceConnector;
use super::csv::coerce_value;
use super::inference::infer_column_type;
use crate::config::SAMPLE_ROW_LIMIT;
use crate::error::DataSourceError;
use crate::models::{CanonicalSchema, ColumnSchema, QueryColumn, QueryResult, TableSchema};

/// Workbook-backed source: every sheet with a header row becomes a table.
#[derive(Debug)]
pub struct ExcelConnector {
    path: PathBuf,
}

impl ExcelConnector {
    pub fn new(config: &Value) -> Result<Self, DataSourceError> {
        let path = config
            .get("path")
            .or_else(|| config.get("file_path"))
            .and_then(|v| v.as_str())
            .ok_or_else(|| DataSourceError::InvalidConfiguration("missing file path".into()))?;
        Ok(Self {
            path: PathBuf::from(path),
        })
    }

    fn read_sheets(
        &self,
        table_filter: Option<&[String]>,
        table_limit: usize,
    ) -> Result<Vec<(TableSchema, Vec<Map<String, Value>>)>, DataSourceError> {
        let mut workbook = open_workbook_auto(&self.path)
            .map_err(|e| DataSourceError::ConnectionFailed(e.to_string()))?;

        let mut sheet_names = workbook.sheet_names();
        if let Some(filter) = table_filter {
            sheet_names.retain(|n| filter.iter().any(|f| f == n));
        }
        sheet_names.truncate(table_limit);

        let mut sheets = Vec::with_capacity(sheet_names.len());
        for name in sheet_names {
            let range = workbook
                .worksheet_range(&name)
                .map_err(|e| DataSourceError::ParseFailed(e.to_string()))?;
            let mut rows = range.rows();

            let headers: Vec<String> = match rows.next() {
                Some(header_row) => header_row
                    .iter()
                    .map(|cell| cell.to_string().trim().to_string())
                    .collect(),
                None => continue,
            };
            if headers.iter().all(|h| h.is_empty()) {
                continue;
            }

            let mut column_values: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
            let mut raw_rows: Vec<Vec<String>> = Vec::new();
            for row in rows {
                let fields: Vec<String> = (0..headers.len())
                    .map(|i| row.get(i).map(cell_to_string).unwrap_or_default())
                    .collect();
                // Only the leading sample participates in type inference.
                if raw_rows.len() < SAMPLE_ROW_LIMIT {
                    for (i, value) in fields.iter().enumerate() {
                        column_values[i].push(value.clone());
                    }
                }
                raw_rows.push(fields);
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

            let data: Vec<Map<String, Value>> = raw_rows
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

            let row_count = data.len() as i64;
            sheets.push((TableSchema::new(name, columns, row_count), data));
        }

        Ok(sheets)
    }
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        // Excel stores whole numbers as floats; render them without the
        // trailing .0 so integer inference still works.
        Data::Float(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
            (*f as i64).to_string()
        }
        other => other.to_string(),
    }
}

#[async_trait]
impl DataSourceConnector for ExcelConnector {
    async fn test_connection(&self) -> (bool, String) {
        match open_workbook_auto(&self.path) {
            Ok(_) => (true, "workbook readable".into()),
            Err(e) => (false, e.to_string()),
        }
    }

    async fn fetch_schema(
        &self,
        table_filter: Option<&[String]>,
        table_limit: usize,
    ) -> Result<CanonicalSchema, DataSourceError> {
        let sheets = self.read_sheets(table_filter, table_limit)?;
        Ok(CanonicalSchema::new(
            sheets.into_iter().map(|(table, _)| table).collect(),
        ))
    }

    async fn execute_query(
        &self,
        _query: &str,
        limit: usize,
        offset: usize,
    ) -> Result<QueryResult, DataSourceError> {
        let sheets = self.read_sheets(None, 1)?;
        Ok(sheet_result(sheets, limit, offset))
    }

    async fn get_sample_data(
        &self,
        table: &str,
        limit: usize,
    ) -> Result<QueryResult, DataSourceError> {
        let filter = [table.to_string()];
        let mut sheets = self.read_sheets(Some(&filter), 1)?;
        if sheets.is_empty() {
            // Fall back to the first sheet when the requested name is not a
            // sheet (table records may carry display names).
            sheets = self.read_sheets(None, 1)?;
        }
        Ok(sheet_result(sheets, limit, 0))
    }
}

fn sheet_result(
    sheets: Vec<(TableSchema, Vec<Map<String, Value>>)>,
    limit: usize,
    offset: usize,
) -> QueryResult {
    match sheets.into_iter().next() {
        Some((table, data)) => {
            let columns = table
                .columns
                .iter()
                .map(|c| QueryColumn::new(&c.name, c.canonical_type))
                .collect();
            let rows: Vec<Map<String, Value>> =
                data.into_iter().skip(offset).take(limit).collect();
            let total_rows = rows.len();
            QueryResult {
                rows,
                columns,
                total_rows,
                execution_time_ms: 0,
                synthetic: false,
            }
        }
        None => QueryResult::empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_path_is_a_configuration_error() {
        let err = ExcelConnector::new(&json!({})).unwrap_err();
        assert!(matches!(err, DataSourceError::InvalidConfiguration(_)));
    }

    #[test]
    fn whole_number_floats_render_as_integers() {
        assert_eq!(cell_to_string(&Data::Float(42.0)), "42");
        assert_eq!(cell_to_string(&Data::Float(9.5)), "9.5");
        assert_eq!(cell_to_string(&Data::Empty), "");
        assert_eq!(cell_to_string(&Data::String("x".into())), "x");
    }

    #[tokio::test]
    async fn unreadable_workbook_fails_test_connection() {
        let connector =
            ExcelConnector::new(&json!({"path": "/nonexistent/book.xlsx"})).unwrap();
        let (ok, detail) = connector.test_connection().await;
        assert!(!ok);
        assert!(!detail.is_empty());
    }
}
