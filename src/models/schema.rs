use serde::{Deserialize, Serialize};

/// The closed set of canonical column types. Backend-native type names are
/// mapped into these six tags and must never leak into a stored schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CanonicalType {
    Integer,
    Decimal,
    Boolean,
    Date,
    #[serde(rename = "datetime")]
    DateTime,
    String,
}

impl CanonicalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CanonicalType::Integer => "integer",
            CanonicalType::Decimal => "decimal",
            CanonicalType::Boolean => "boolean",
            CanonicalType::Date => "date",
            CanonicalType::DateTime => "datetime",
            CanonicalType::String => "string",
        }
    }
}

impl std::fmt::Display for CanonicalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub canonical_type: CanonicalType,
    pub nullable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ColumnSchema {
    pub fn new(name: impl Into<String>, canonical_type: CanonicalType, nullable: bool) -> Self {
        ColumnSchema {
            name: name.into(),
            canonical_type,
            nullable,
            description: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub display_name: String,
    pub columns: Vec<ColumnSchema>,
    #[serde(default)]
    pub row_count: i64,
}

impl TableSchema {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnSchema>, row_count: i64) -> Self {
        let name = name.into();
        let display_name = display_name_for(&name);
        TableSchema {
            name,
            display_name,
            columns,
            row_count,
        }
    }
}

/// Canonical, backend-agnostic schema document. A placeholder schema has no
/// tables and carries an explicit message, so deferred discovery is
/// distinguishable from a genuinely empty source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalSchema {
    pub tables: Vec<TableSchema>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CanonicalSchema {
    pub fn new(tables: Vec<TableSchema>) -> Self {
        CanonicalSchema {
            tables,
            message: None,
        }
    }

    pub fn placeholder(message: impl Into<String>) -> Self {
        CanonicalSchema {
            tables: Vec::new(),
            message: Some(message.into()),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.message.is_some()
    }

    /// A schema counts as cached when it has at least one table and is not a
    /// deferred-discovery placeholder.
    pub fn is_cached(&self) -> bool {
        !self.tables.is_empty() && !self.is_placeholder()
    }

    pub fn first_table(&self) -> Option<&TableSchema> {
        self.tables.first()
    }

    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.iter().find(|t| t.name == name)
    }
}

/// Human-friendly table label: trailing segment, underscores to spaces,
/// title case.
pub fn display_name_for(table_name: &str) -> String {
    let bare = table_name.rsplit('.').next().unwrap_or(table_name);
    bare.split('_')
        .filter(|s| !s.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
