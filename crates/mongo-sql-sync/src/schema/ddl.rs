//! DDL generation and execution for a [`SchemaPlan`].
//!
//! Drops run children first and creates run parents first, so foreign keys
//! never point at a missing table.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::planner::{SchemaPlan, TableDefinition};
use crate::core::identifier::{sanitize, validate_identifier};
use crate::core::traits::{DestinationStore, Dialect};
use crate::drivers::DialectImpl;
use crate::error::{Result, SyncError};

/// `CREATE TABLE` for one planned table.
pub fn create_table(table: &TableDefinition, dialect: &impl Dialect, schema: &str) -> String {
    let mut lines: Vec<String> = table
        .columns
        .iter()
        .map(|c| format!("    {}", dialect.column_definition(c)))
        .collect();

    if let Some(pk) = table.primary_key() {
        lines.push(format!("    PRIMARY KEY ({})", dialect.quote_ident(&pk.name)));
    }

    if let (Some(parent), Some(fk), Some(parent_key)) = (
        &table.parent_table,
        &table.foreign_key_column,
        &table.parent_key_column,
    ) {
        lines.push(format!(
            "    CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE CASCADE",
            dialect.quote_ident(&sanitize(&format!("fk_{}", table.name))),
            dialect.quote_ident(fk),
            dialect.qualify(schema, parent),
            dialect.quote_ident(parent_key)
        ));
    }

    format!(
        "CREATE TABLE {} (\n{}\n){}",
        dialect.qualify(schema, &table.name),
        lines.join(",\n"),
        dialect.create_table_suffix()
    )
}

/// Drop statements, children first.
pub fn drop_statements(plan: &SchemaPlan, dialect: &impl Dialect, schema: &str) -> Vec<String> {
    plan.tables
        .iter()
        .rev()
        .map(|t| dialect.build_drop_table(schema, &t.name))
        .collect()
}

/// Every statement for `plan`: optional drops, then creates.
pub fn emit(plan: &SchemaPlan, dialect: &impl Dialect, schema: &str, include_drop: bool) -> Vec<String> {
    let mut statements = if include_drop {
        drop_statements(plan, dialect, schema)
    } else {
        Vec::new()
    };
    statements.extend(plan.tables.iter().map(|t| create_table(t, dialect, schema)));
    statements
}

/// Contents of the schema file: the target dialect followed by the alternate
/// dialect under its own header.
pub fn render_file(plan: &SchemaPlan, dialect: &DialectImpl, schema: &str) -> String {
    let mut out = format!(
        "-- Schema for collection '{}'\n-- Tables: {}\n",
        plan.collection,
        plan.tables.len()
    );
    for warning in &plan.warnings {
        out.push_str(&format!("-- Warning: {}\n", warning));
    }

    push_section(&mut out, dialect.display_name(), &emit(plan, dialect, schema, true));

    let alternate = dialect.alternate();
    push_section(
        &mut out,
        alternate.display_name(),
        &emit(plan, &alternate, alternate.default_schema(), true),
    );
    out
}

fn push_section(out: &mut String, title: &str, statements: &[String]) {
    out.push_str("\n-- ============================================================\n");
    out.push_str(&format!("-- {}\n", title));
    out.push_str("-- ============================================================\n\n");
    for stmt in statements {
        out.push_str(stmt);
        if !stmt.ends_with(';') {
            out.push(';');
        }
        out.push_str("\n\n");
    }
}

/// Path of the schema file for `collection`.
pub fn file_path(dir: &Path, collection: &str) -> PathBuf {
    dir.join(format!("schema_{}.sql", sanitize(collection)))
}

/// Write rendered DDL to `<dir>/schema_<collection>.sql`.
pub fn write_file(dir: &Path, collection: &str, contents: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = file_path(dir, collection);
    std::fs::write(&path, contents)?;
    info!("Wrote DDL to {}", path.display());
    Ok(path)
}

/// Create the planned tables that do not exist yet.
///
/// With `drop_existing` every planned table is dropped first. Tables whose
/// names fail identifier validation are skipped. Statement failures are
/// logged and returned as warnings; the remaining tables are still attempted.
pub async fn apply(
    store: &dyn DestinationStore,
    plan: &SchemaPlan,
    drop_existing: bool,
) -> Result<Vec<String>> {
    let dialect = store.dialect();
    let schema = store.schema();
    let mut warnings = Vec::new();

    if drop_existing {
        for (table, sql) in plan
            .tables
            .iter()
            .rev()
            .map(|t| (t, dialect.build_drop_table(schema, &t.name)))
        {
            info!("Dropping table {}", table.name);
            if let Err(e) = store.execute(&sql).await {
                if e.is_connection() {
                    return Err(e);
                }
                let err = SyncError::ddl(&table.name, e.to_string());
                warn!("{}", err);
                warnings.push(err.to_string());
            }
        }
    }

    for table in &plan.tables {
        if let Err(e) = validate_names(table) {
            let err = SyncError::ddl(&table.name, e.to_string());
            warn!("{}", err);
            warnings.push(err.to_string());
            continue;
        }
        if store.table_exists(&table.name).await? {
            debug!("Table {} already exists", table.name);
            continue;
        }
        info!("Creating table {}", table.name);
        if let Err(e) = store.execute(&create_table(table, dialect, schema)).await {
            if e.is_connection() {
                return Err(e);
            }
            let err = SyncError::ddl(&table.name, e.to_string());
            warn!("{}", err);
            warnings.push(err.to_string());
        }
    }

    Ok(warnings)
}

fn validate_names(table: &TableDefinition) -> Result<()> {
    validate_identifier(&table.name)?;
    for column in &table.columns {
        validate_identifier(&column.name)?;
    }
    Ok(())
}
