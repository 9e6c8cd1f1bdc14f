//! Document and SQL value types.
//!
//! [`DocValue`] is the decoded form of a document field, independent of the
//! driver it came from. [`ValueType`] is the tag the classifier assigns to it;
//! every component that reasons about types (inference, type mapping, schema
//! evolution) goes through [`DocValue::value_type`].
//!
//! [`SqlValue`] is what gets bound as a statement parameter or read back from
//! a destination row.

use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Classification tag of a document value.
///
/// The declaration order is the tie-break precedence used when two tags are
/// observed equally often (earlier wins).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    String,
    Number,
    Integer,
    DateTime,
    Boolean,
    Null,
    Array,
    Object,
}

impl ValueType {
    /// Whether values with this tag map onto a single column.
    pub fn is_scalar(self) -> bool {
        !matches!(self, ValueType::Array | ValueType::Object)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValueType::String => "string",
            ValueType::Number => "number",
            ValueType::Integer => "integer",
            ValueType::DateTime => "datetime",
            ValueType::Boolean => "boolean",
            ValueType::Null => "null",
            ValueType::Array => "array",
            ValueType::Object => "object",
        };
        f.write_str(s)
    }
}

/// A decoded document value.
#[derive(Debug, Clone, PartialEq)]
pub enum DocValue {
    Null,
    String(String),
    Integer(i64),
    Number(f64),
    Boolean(bool),
    DateTime(DateTime<Utc>),
    Array(Vec<DocValue>),
    Object(Document),
}

impl DocValue {
    /// Classify this value.
    pub fn value_type(&self) -> ValueType {
        match self {
            DocValue::Null => ValueType::Null,
            DocValue::String(_) => ValueType::String,
            DocValue::Integer(_) => ValueType::Integer,
            DocValue::Number(_) => ValueType::Number,
            DocValue::Boolean(_) => ValueType::Boolean,
            DocValue::DateTime(_) => ValueType::DateTime,
            DocValue::Array(_) => ValueType::Array,
            DocValue::Object(_) => ValueType::Object,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, DocValue::Null)
    }

    /// Convert from a JSON value.
    ///
    /// Extended JSON wrappers `{"$oid": ..}` and `{"$date": ..}` are unwrapped
    /// into a string and a datetime.
    pub fn from_json(value: serde_json::Value) -> DocValue {
        use serde_json::Value;

        match value {
            Value::Null => DocValue::Null,
            Value::Bool(b) => DocValue::Boolean(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => DocValue::Integer(i),
                None => DocValue::Number(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => DocValue::String(s),
            Value::Array(items) => {
                DocValue::Array(items.into_iter().map(DocValue::from_json).collect())
            }
            Value::Object(map) => {
                if map.len() == 1 {
                    if let Some(Value::String(oid)) = map.get("$oid") {
                        return DocValue::String(oid.clone());
                    }
                    if let Some(Value::String(date)) = map.get("$date") {
                        if let Ok(dt) = DateTime::parse_from_rfc3339(date) {
                            return DocValue::DateTime(dt.with_timezone(&Utc));
                        }
                    }
                }
                DocValue::Object(Document::from_json_map(map))
            }
        }
    }

    /// Render as JSON, used when structure is stored in a text column.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;

        match self {
            DocValue::Null => Value::Null,
            DocValue::String(s) => Value::String(s.clone()),
            DocValue::Integer(i) => Value::from(*i),
            DocValue::Number(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            DocValue::Boolean(b) => Value::Bool(*b),
            DocValue::DateTime(dt) => Value::String(dt.to_rfc3339()),
            DocValue::Array(items) => Value::Array(items.iter().map(DocValue::to_json).collect()),
            DocValue::Object(doc) => doc.to_json(),
        }
    }

    /// Short display form used for sample values and log messages.
    pub fn display_string(&self) -> String {
        match self {
            DocValue::Null => String::new(),
            DocValue::String(s) => s.clone(),
            DocValue::Integer(i) => i.to_string(),
            DocValue::Number(f) => f.to_string(),
            DocValue::Boolean(b) => b.to_string(),
            DocValue::DateTime(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
            DocValue::Array(_) | DocValue::Object(_) => self.to_json().to_string(),
        }
    }
}

/// An ordered set of named values.
///
/// Field order is the order the source returned them in; lookups are linear,
/// which is fine for document-sized maps.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    fields: Vec<(String, DocValue)>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field, replacing an existing field of the same name.
    pub fn insert(&mut self, name: impl Into<String>, value: DocValue) {
        let name = name.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&DocValue> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Resolve a dotted path through nested objects.
    pub fn get_path(&self, path: &str) -> Option<&DocValue> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = self.get(first)?;
        for segment in segments {
            match current {
                DocValue::Object(doc) => current = doc.get(segment)?,
                _ => return None,
            }
        }
        Some(current)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DocValue)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// The document's identity as a string, if the key field holds a usable value.
    ///
    /// Strings (including object ids) and integers qualify; anything else does not.
    pub fn key_string(&self, key_field: &str) -> Option<String> {
        match self.get(key_field)? {
            DocValue::String(s) if !s.is_empty() => Some(s.clone()),
            DocValue::Integer(i) => Some(i.to_string()),
            _ => None,
        }
    }

    /// Build from a JSON value; non-object values yield an empty document.
    pub fn from_json(value: serde_json::Value) -> Document {
        match value {
            serde_json::Value::Object(map) => Document::from_json_map(map),
            _ => Document::new(),
        }
    }

    fn from_json_map(map: serde_json::Map<String, serde_json::Value>) -> Document {
        let mut doc = Document::new();
        for (name, value) in map {
            doc.insert(name, DocValue::from_json(value));
        }
        doc
    }

    pub fn to_json(&self) -> serde_json::Value {
        let map: serde_json::Map<String, serde_json::Value> = self
            .fields
            .iter()
            .map(|(n, v)| (n.clone(), v.to_json()))
            .collect();
        serde_json::Value::Object(map)
    }
}

impl FromIterator<(String, DocValue)> for Document {
    fn from_iter<I: IntoIterator<Item = (String, DocValue)>>(iter: I) -> Self {
        let mut doc = Document::new();
        for (name, value) in iter {
            doc.insert(name, value);
        }
        doc
    }
}

/// SQL parameter or result value.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    I64(i64),
    F64(f64),
    Decimal(Decimal),
    Text(String),
    DateTime(NaiveDateTime),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Convert a document value for binding; structure is stored as JSON text.
    pub fn from_doc(value: &DocValue) -> SqlValue {
        match value {
            DocValue::Null => SqlValue::Null,
            DocValue::String(s) => SqlValue::Text(s.clone()),
            DocValue::Integer(i) => SqlValue::I64(*i),
            DocValue::Number(f) => match Decimal::try_from(*f) {
                Ok(d) => SqlValue::Decimal(d),
                Err(_) => SqlValue::F64(*f),
            },
            DocValue::Boolean(b) => SqlValue::Bool(*b),
            DocValue::DateTime(dt) => SqlValue::DateTime(dt.naive_utc()),
            DocValue::Array(_) | DocValue::Object(_) => SqlValue::Text(value.to_json().to_string()),
        }
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::I64(v)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

/// A named set of column values, in column order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    cells: Vec<(String, SqlValue)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, column: impl Into<String>, value: SqlValue) {
        self.cells.push((column.into(), value));
    }

    /// Builder form of [`Row::push`].
    pub fn with(mut self, column: impl Into<String>, value: SqlValue) -> Self {
        self.push(column, value);
        self
    }

    /// Look up a column; exact match first, then case-insensitive.
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.cells
            .iter()
            .find(|(c, _)| c == column)
            .or_else(|| self.cells.iter().find(|(c, _)| c.eq_ignore_ascii_case(column)))
            .map(|(_, v)| v)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(c, _)| c.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &SqlValue> {
        self.cells.iter().map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.cells.iter().map(|(c, v)| (c.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}
