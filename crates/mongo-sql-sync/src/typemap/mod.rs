//! Type mapping from document value tags to relational column types.

use serde::Serialize;

use crate::core::{DocValue, ValueType};
use crate::schema::FieldSchema;

/// Dialect-neutral column type. Rendered to SQL text by a dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "args", rename_all = "snake_case")]
pub enum SqlType {
    /// Fixed-width key string.
    Identifier(u32),
    VarChar(u32),
    /// Unbounded text.
    Text,
    Int,
    BigInt,
    Decimal(u8, u8),
    Boolean,
    Timestamp,
}

/// Widths used by the mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeOptions {
    pub string_length: u32,
    pub id_length: u32,
}

impl Default for TypeOptions {
    fn default() -> Self {
        Self {
            string_length: 255,
            id_length: 64,
        }
    }
}

const NUMBER_TYPE: SqlType = SqlType::Decimal(18, 2);

/// Map a scalar field by its majority tag.
pub fn map_field(field: &FieldSchema, opts: &TypeOptions) -> SqlType {
    match field.dominant_scalar_type() {
        Some(ValueType::String) => string_type(field.max_string_length, opts),
        Some(ValueType::Integer) if field.wide_integer => SqlType::BigInt,
        Some(ValueType::Integer) => SqlType::Int,
        Some(ValueType::Number) => NUMBER_TYPE,
        Some(ValueType::Boolean) => SqlType::Boolean,
        Some(ValueType::DateTime) => SqlType::Timestamp,
        _ => SqlType::VarChar(opts.string_length),
    }
}

/// Map the `value` column of a primitive array by its majority element tag.
pub fn map_element(field: &FieldSchema, opts: &TypeOptions) -> SqlType {
    match field.dominant_element_type() {
        Some(ValueType::Integer) if field.wide_integer => SqlType::BigInt,
        Some(ValueType::Integer) => SqlType::Int,
        Some(ValueType::Number) => NUMBER_TYPE,
        Some(ValueType::Boolean) => SqlType::Boolean,
        _ => string_type(field.max_string_length, opts),
    }
}

/// Map a single observed value, used when a column is added during sync.
pub fn map_value(value: &DocValue, opts: &TypeOptions) -> SqlType {
    match value {
        DocValue::String(s) => string_type(s.chars().count(), opts),
        DocValue::Integer(i) if i32::try_from(*i).is_err() => SqlType::BigInt,
        DocValue::Integer(_) => SqlType::Int,
        DocValue::Number(_) => NUMBER_TYPE,
        DocValue::Boolean(_) => SqlType::Boolean,
        DocValue::DateTime(_) => SqlType::Timestamp,
        DocValue::Array(_) | DocValue::Object(_) => SqlType::Text,
        DocValue::Null => SqlType::VarChar(opts.string_length),
    }
}

fn string_type(max_len: usize, opts: &TypeOptions) -> SqlType {
    if max_len > opts.string_length as usize {
        SqlType::Text
    } else {
        SqlType::VarChar(opts.string_length)
    }
}
