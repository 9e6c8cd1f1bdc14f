//! Additive schema evolution of the main table.
//!
//! Columns are only ever added, never dropped or retyped.

use std::collections::{HashMap, HashSet};

use tracing::{info, warn};

use super::flatten::flatten;
use crate::core::identifier::{column_name, validate_identifier};
use crate::core::traits::DestinationStore;
use crate::core::{DocValue, Document};
use crate::error::{Result, SyncError};
use crate::schema::ColumnDefinition;
use crate::typemap::{map_value, TypeOptions};

/// A flat field missing from the destination table.
#[derive(Debug, Clone, PartialEq)]
pub struct MissingColumn {
    pub field: String,
    pub column: ColumnDefinition,
}

/// Flat fields of `docs` with no matching column in `existing`.
///
/// Matching is case-insensitive on the derived column name. Each missing
/// column is typed from the first non-null value observed for it.
pub fn missing_columns(docs: &[Document], existing: &[String], opts: &TypeOptions) -> Vec<MissingColumn> {
    let present: HashSet<String> = existing.iter().map(|c| c.to_lowercase()).collect();
    let mut found: Vec<(String, String, Option<&DocValue>)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for doc in docs {
        for (field, value) in flatten(doc) {
            let column = column_name(field);
            let lower = column.to_lowercase();
            if present.contains(&lower) {
                continue;
            }
            let pos = *index.entry(lower).or_insert_with(|| {
                found.push((field.to_string(), column, None));
                found.len() - 1
            });
            if found[pos].2.is_none() && !value.is_null() {
                found[pos].2 = Some(value);
            }
        }
    }

    found
        .into_iter()
        .map(|(field, column, sample)| {
            let sql_type = map_value(sample.unwrap_or(&DocValue::Null), opts);
            MissingColumn {
                column: ColumnDefinition::data(column, sql_type, field.as_str()),
                field,
            }
        })
        .collect()
}

/// Add every missing flat column to `table`; returns the added columns.
///
/// A column that cannot be added is skipped with a warning; its field is
/// then left out of the main row. Only a connection failure aborts.
pub async fn evolve(
    store: &dyn DestinationStore,
    table: &str,
    docs: &[Document],
    opts: &TypeOptions,
    warnings: &mut Vec<String>,
) -> Result<Vec<MissingColumn>> {
    let existing = store.column_names(table).await?;
    let mut added = Vec::new();
    for m in missing_columns(docs, &existing, opts) {
        info!(
            "Adding column {}.{} for new field '{}'",
            table, m.column.name, m.field
        );
        let result = match validate_identifier(&m.column.name) {
            Ok(()) => store.add_column(table, &m.column).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => added.push(m),
            Err(e) if e.is_connection() => return Err(e),
            Err(e) => {
                let err = SyncError::ddl(table, format!("cannot add column {}: {}", m.column.name, e));
                warn!("{}", err);
                warnings.push(err.to_string());
            }
        }
    }
    Ok(added)
}
