//! Canonical type inference: sample-based classification for file sources
//! and a native type-name lookup for relational sources.

use lazy_static::lazy_static;
use regex::Regex;

use crate::models::CanonicalType;

lazy_static! {
    static ref DATE_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap(),
        Regex::new(r"^\d{2}/\d{2}/\d{4}$").unwrap(),
        Regex::new(r"^\d{2}-\d{2}-\d{4}$").unwrap(),
    ];
}

const BOOLEAN_TOKENS: &[&str] = &["true", "false", "yes", "no", "1", "0", "y", "n"];

/// Classify a column from its sample values. Blank values are excluded
/// before classification; an all-blank column defaults to string.
///
/// The precedence is deliberate: integer is checked before decimal so that
/// `"5"` classifies as integer, and numeric checks run before the boolean
/// token set so `1`/`0` columns stay numeric.
pub fn infer_column_type(values: &[String]) -> CanonicalType {
    let samples: Vec<&str> = values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .collect();

    if samples.is_empty() {
        return CanonicalType::String;
    }

    if samples.iter().all(|v| is_exact_integer(v)) {
        return CanonicalType::Integer;
    }

    if samples.iter().all(|v| v.parse::<f64>().is_ok()) {
        return CanonicalType::Decimal;
    }

    if samples
        .iter()
        .all(|v| BOOLEAN_TOKENS.contains(&v.to_lowercase().as_str()))
    {
        return CanonicalType::Boolean;
    }

    for pattern in DATE_PATTERNS.iter() {
        if samples.iter().all(|v| pattern.is_match(v)) {
            return CanonicalType::Date;
        }
    }

    CanonicalType::String
}

/// A value is an exact integer when its canonical integer rendering equals
/// the input, so `"05"` and `"+5"` fall through to the decimal check.
fn is_exact_integer(value: &str) -> bool {
    value
        .parse::<i64>()
        .map(|n| n.to_string() == value)
        .unwrap_or(false)
}

/// Map a backend-native type name onto the canonical set. Names are
/// lower-cased and any parenthesized precision/scale is stripped first
/// (`character varying(255)` -> `character varying`). Unmapped names
/// default to string rather than failing.
pub fn canonical_from_native(native: &str) -> CanonicalType {
    let lowered = native.to_lowercase();
    let base = lowered.split('(').next().unwrap_or("").trim();

    match base {
        "integer" | "int" | "int2" | "int4" | "int8" | "bigint" | "smallint" | "tinyint"
        | "mediumint" | "serial" | "bigserial" => CanonicalType::Integer,
        "numeric" | "decimal" | "real" | "double precision" | "double" | "float" | "float4"
        | "float8" | "money" | "number" => CanonicalType::Decimal,
        "boolean" | "bool" | "bit" => CanonicalType::Boolean,
        "date" => CanonicalType::Date,
        "timestamp" | "timestamptz" | "timestamp without time zone"
        | "timestamp with time zone" | "datetime" | "datetime2" | "smalldatetime" | "time" => {
            CanonicalType::DateTime
        }
        "character varying" | "varchar" | "nvarchar" | "character" | "char" | "nchar" | "text"
        | "ntext" | "json" | "jsonb" | "uuid" | "clob" | "blob" => CanonicalType::String,
        _ => CanonicalType::String,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn infer(values: &[&str]) -> CanonicalType {
        let owned: Vec<String> = values.iter().map(|s| s.to_string()).collect();
        infer_column_type(&owned)
    }

    #[test]
    fn integer_values_infer_integer() {
        assert_eq!(infer(&["1", "42", "-7"]), CanonicalType::Integer);
    }

    #[test]
    fn integer_is_checked_before_decimal() {
        // "5" must not be classified decimal just because it parses as one.
        assert_eq!(infer(&["5"]), CanonicalType::Integer);
    }

    #[test]
    fn mixed_integers_and_decimals_infer_decimal() {
        assert_eq!(infer(&["1", "2.5", "3"]), CanonicalType::Decimal);
        assert_eq!(infer(&["9.5", "7"]), CanonicalType::Decimal);
    }

    #[test]
    fn padded_integers_fall_through_to_decimal() {
        assert_eq!(infer(&["05", "12"]), CanonicalType::Decimal);
    }

    #[test]
    fn boolean_tokens_infer_boolean() {
        assert_eq!(infer(&["yes", "NO", "y"]), CanonicalType::Boolean);
        assert_eq!(infer(&["true", "False"]), CanonicalType::Boolean);
        // All-numeric token columns stay numeric.
        assert_eq!(infer(&["1", "0"]), CanonicalType::Integer);
    }

    #[test]
    fn iso_dates_infer_date() {
        assert_eq!(
            infer(&["2024-01-01", "2024-01-01"]),
            CanonicalType::Date
        );
        assert_eq!(infer(&["01/15/2024", "02/20/2024"]), CanonicalType::Date);
    }

    #[test]
    fn mixed_date_patterns_do_not_infer_date() {
        assert_eq!(infer(&["2024-01-01", "01/15/2024"]), CanonicalType::String);
    }

    #[test]
    fn blanks_are_excluded_and_all_blank_defaults_to_string() {
        assert_eq!(infer(&["", "  ", "3"]), CanonicalType::Integer);
        assert_eq!(infer(&["", "   "]), CanonicalType::String);
        assert_eq!(infer(&[]), CanonicalType::String);
    }

    #[test]
    fn native_types_map_with_precision_stripped() {
        assert_eq!(
            canonical_from_native("character varying(255)"),
            CanonicalType::String
        );
        assert_eq!(canonical_from_native("NUMERIC(10,2)"), CanonicalType::Decimal);
        assert_eq!(canonical_from_native("bigint"), CanonicalType::Integer);
        assert_eq!(
            canonical_from_native("timestamp with time zone"),
            CanonicalType::DateTime
        );
    }

    #[test]
    fn unmapped_native_types_default_to_string() {
        assert_eq!(canonical_from_native("hstore"), CanonicalType::String);
        assert_eq!(canonical_from_native("geometry"), CanonicalType::String);
    }
}
