//! Flat scalar view of a document.
//!
//! The sync path only tracks top-level scalar fields. Nested objects and
//! arrays are left to the child tables written by a full migration.

use std::collections::{HashMap, HashSet};

use sha2::{Digest, Sha256};

use crate::core::identifier::column_name;
use crate::core::{DocValue, Document, Row, SqlValue};
use crate::verify::normalize::canonical_doc;

/// Top-level fields whose values are scalars (null included), in document order.
pub fn flatten(doc: &Document) -> Vec<(&str, &DocValue)> {
    doc.iter()
        .filter(|(name, value)| !name.is_empty() && value.value_type().is_scalar())
        .collect()
}

/// Number of top-level fields that are not part of the flat view.
pub fn structured_field_count(doc: &Document) -> usize {
    doc.iter()
        .filter(|(_, value)| !value.value_type().is_scalar())
        .count()
}

/// SHA-256 hex digest of the flattened fields.
///
/// Fields are sorted by name and rendered as `name=value` lines joined by a
/// newline, so field order in the source document never affects the hash.
pub fn content_hash(doc: &Document) -> String {
    let mut fields = flatten(doc);
    fields.sort_by(|a, b| a.0.cmp(b.0));

    let mut hasher = Sha256::new();
    for (i, (name, value)) in fields.iter().enumerate() {
        if i > 0 {
            hasher.update(b"\n");
        }
        hasher.update(name.as_bytes());
        hasher.update(b"=");
        hasher.update(canonical_doc(value).as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Flat fields whose derived column name is already taken by another field.
///
/// One message per colliding field across all of `docs`.
pub fn column_collisions(docs: &[Document]) -> Vec<String> {
    let mut owners: HashMap<String, String> = HashMap::new();
    let mut reported = HashSet::new();
    let mut messages = Vec::new();
    for doc in docs {
        for (field, _) in flatten(doc) {
            let column = column_name(field);
            let owner = owners
                .entry(column.to_lowercase())
                .or_insert_with(|| field.to_string());
            if owner.as_str() != field && reported.insert(field.to_string()) {
                messages.push(format!(
                    "fields '{}' and '{}' both map to column '{}'; the first one in each document is written",
                    owner, field, column
                ));
            }
        }
    }
    messages
}

/// Main-table row for `doc` covering exactly `columns`.
///
/// Columns the document does not carry are written as NULL so removed
/// fields are cleared on update. The key column always holds the key string.
/// When two fields map to one column the first one wins.
pub fn build_main_row(doc: &Document, key_field: &str, key: &str, columns: &[String]) -> Row {
    let key_column = column_name(key_field);
    let mut values: HashMap<String, &DocValue> = HashMap::new();
    for (name, value) in flatten(doc) {
        values.entry(column_name(name).to_lowercase()).or_insert(value);
    }

    let mut row = Row::new();
    for column in columns {
        if column.eq_ignore_ascii_case(&key_column) {
            row.push(column.as_str(), SqlValue::from(key));
            continue;
        }
        let value = values
            .get(&column.to_lowercase())
            .map(|v| SqlValue::from_doc(v))
            .unwrap_or(SqlValue::Null);
        row.push(column.as_str(), value);
    }
    row
}
