//! Value normalization for cross-store comparison and content hashing.
//!
//! Both sides of a comparison are rendered to a string with the same rules:
//! - NULLs: empty string
//! - Booleans: '0' or '1'
//! - Numerics: canonical decimal text (no trailing zeros, no exponent)
//! - DateTimes: `YYYY-MM-DD HH:MM:SS`, sub-second precision dropped
//! - Strings: CRLF folded to LF; trimmed for comparison only

use rust_decimal::Decimal;

use crate::core::{DocValue, SqlValue};

/// Timestamp format shared by both stores.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Canonical form of a document value, used by the content hash.
///
/// Strings keep surrounding whitespace so whitespace-only edits still change
/// the hash.
pub fn canonical_doc(value: &DocValue) -> String {
    match value {
        DocValue::Null => String::new(),
        DocValue::String(s) => s.replace("\r\n", "\n"),
        DocValue::Integer(i) => i.to_string(),
        DocValue::Number(f) => normalize_f64(*f),
        DocValue::Boolean(b) => bool_str(*b).to_string(),
        DocValue::DateTime(dt) => dt.naive_utc().format(DATETIME_FORMAT).to_string(),
        DocValue::Array(_) | DocValue::Object(_) => value.to_json().to_string(),
    }
}

/// Normalized form of a document value for field comparison.
pub fn normalize_doc(value: &DocValue) -> String {
    match value {
        DocValue::String(_) => canonical_doc(value).trim().to_string(),
        _ => canonical_doc(value),
    }
}

/// Normalized form of a destination value for field comparison.
pub fn normalize_sql(value: &SqlValue) -> String {
    match value {
        SqlValue::Null => String::new(),
        SqlValue::Bool(b) => bool_str(*b).to_string(),
        SqlValue::I64(i) => i.to_string(),
        SqlValue::F64(f) => normalize_f64(*f),
        SqlValue::Decimal(d) => normalize_decimal(*d),
        SqlValue::Text(s) => s.replace("\r\n", "\n").trim().to_string(),
        SqlValue::DateTime(dt) => dt.format(DATETIME_FORMAT).to_string(),
    }
}

fn bool_str(b: bool) -> &'static str {
    if b {
        "1"
    } else {
        "0"
    }
}

fn normalize_f64(f: f64) -> String {
    match Decimal::try_from(f) {
        Ok(d) => normalize_decimal(d),
        Err(_) => f.to_string(),
    }
}

fn normalize_decimal(d: Decimal) -> String {
    d.normalize().to_string()
}
