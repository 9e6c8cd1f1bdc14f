//! Core traits for document sources, relational destinations and SQL dialects.
//!
//! # Design Patterns
//!
//! - **Strategy**: [`Dialect`] supplies the SQL syntax of one destination
//! - **Template Method**: the provided `build_*` methods compose statements from
//!   the few dialect-specific primitives
//! - **Adapter**: [`DocumentSource`] and [`DestinationStore`] hide the drivers

use std::collections::HashSet;

use async_trait::async_trait;

use crate::core::{Document, Row};
use crate::drivers::DialectImpl;
use crate::error::Result;
use crate::schema::ColumnDefinition;
use crate::typemap::SqlType;

/// SQL syntax of one destination database.
pub trait Dialect: Send + Sync {
    /// Get the dialect identifier ("mysql", "mssql").
    fn name(&self) -> &str;

    /// Human-readable product name, used in DDL file headers.
    fn display_name(&self) -> &str;

    /// Quote an identifier, doubling the closing quote character.
    fn quote_ident(&self, name: &str) -> String;

    /// Get a parameter placeholder for the given 1-based index.
    fn param_placeholder(&self, index: usize) -> String;

    /// Render a column type.
    fn render_type(&self, ty: SqlType) -> String;

    /// Keyword making an integer column auto-generated.
    fn identity_keyword(&self) -> &str;

    /// Existence-checked DROP TABLE.
    fn build_drop_table(&self, schema: &str, table: &str) -> String;

    /// Text appended after the closing parenthesis of CREATE TABLE.
    fn create_table_suffix(&self) -> &str {
        ""
    }

    /// Insert-or-update of one row by `key`; parameters follow `columns` order.
    fn build_upsert(&self, schema: &str, table: &str, columns: &[String], key: &str) -> String;

    /// Catalog query counting tables; parameters are (schema, table).
    fn table_exists_query(&self) -> String;

    /// Catalog query listing column names in ordinal order; parameters are (schema, table).
    fn column_names_query(&self) -> String;

    /// `schema.table`, or just `table` when `schema` is empty.
    fn qualify(&self, schema: &str, table: &str) -> String {
        if schema.is_empty() {
            self.quote_ident(table)
        } else {
            format!("{}.{}", self.quote_ident(schema), self.quote_ident(table))
        }
    }

    fn placeholders(&self, start: usize, count: usize) -> Vec<String> {
        (start..start + count)
            .map(|i| self.param_placeholder(i))
            .collect()
    }

    fn column_list(&self, columns: &[String]) -> String {
        columns
            .iter()
            .map(|c| self.quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Column clause of CREATE TABLE / ALTER TABLE ADD.
    fn column_definition(&self, column: &ColumnDefinition) -> String {
        let mut def = format!(
            "{} {} {}",
            self.quote_ident(&column.name),
            self.render_type(column.sql_type),
            if column.nullable { "NULL" } else { "NOT NULL" }
        );
        if column.is_identity {
            def.push(' ');
            def.push_str(self.identity_keyword());
        }
        def
    }

    fn build_insert(&self, schema: &str, table: &str, columns: &[String]) -> String {
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.qualify(schema, table),
            self.column_list(columns),
            self.placeholders(1, columns.len()).join(", ")
        )
    }

    /// UPDATE by key; parameters are the non-key columns in order, then the key.
    ///
    /// With no non-key column the key is assigned to itself, so the statement
    /// stays valid and only the key parameter is bound.
    fn build_update(&self, schema: &str, table: &str, columns: &[String], key: &str) -> String {
        let set: Vec<String> = columns
            .iter()
            .filter(|c| !c.eq_ignore_ascii_case(key))
            .enumerate()
            .map(|(i, c)| format!("{} = {}", self.quote_ident(c), self.param_placeholder(i + 1)))
            .collect();
        let quoted_key = self.quote_ident(key);
        let set_clause = if set.is_empty() {
            format!("{} = {}", quoted_key, quoted_key)
        } else {
            set.join(", ")
        };
        format!(
            "UPDATE {} SET {} WHERE {} = {}",
            self.qualify(schema, table),
            set_clause,
            quoted_key,
            self.param_placeholder(set.len() + 1)
        )
    }

    fn build_delete(&self, schema: &str, table: &str, key: &str) -> String {
        format!(
            "DELETE FROM {} WHERE {} = {}",
            self.qualify(schema, table),
            self.quote_ident(key),
            self.param_placeholder(1)
        )
    }

    fn build_select_keys(&self, schema: &str, table: &str, key: &str) -> String {
        format!(
            "SELECT {} FROM {}",
            self.quote_ident(key),
            self.qualify(schema, table)
        )
    }

    fn build_select_row(&self, schema: &str, table: &str, key: &str) -> String {
        format!(
            "SELECT * FROM {} WHERE {} = {}",
            self.qualify(schema, table),
            self.quote_ident(key),
            self.param_placeholder(1)
        )
    }

    fn build_count(&self, schema: &str, table: &str) -> String {
        format!("SELECT COUNT(*) FROM {}", self.qualify(schema, table))
    }

    fn build_add_column(&self, schema: &str, table: &str, column: &ColumnDefinition) -> String {
        let nullable = ColumnDefinition {
            nullable: true,
            is_identity: false,
            is_primary_key: false,
            ..column.clone()
        };
        format!(
            "ALTER TABLE {} ADD {}",
            self.qualify(schema, table),
            self.column_definition(&nullable)
        )
    }
}

/// Read access to one collection of the document store.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Collection name.
    fn collection(&self) -> &str;

    /// Number of documents in the collection.
    async fn count(&self) -> Result<u64>;

    /// Every document in the collection.
    async fn fetch_all(&self) -> Result<Vec<Document>>;

    /// At most `n` documents, in store order.
    async fn fetch_sample(&self, n: usize) -> Result<Vec<Document>>;
}

/// Write and catalog access to the relational destination.
///
/// Table names are unqualified; implementations qualify them with their
/// configured schema. Each call borrows one pooled connection for its duration.
#[async_trait]
pub trait DestinationStore: Send + Sync {
    fn dialect(&self) -> &DialectImpl;

    /// Schema used to qualify table names.
    fn schema(&self) -> &str;

    /// Round trip to the server.
    async fn ping(&self) -> Result<()>;

    async fn table_exists(&self, table: &str) -> Result<bool>;

    async fn column_names(&self, table: &str) -> Result<Vec<String>>;

    /// Execute a statement without parameters; returns affected rows.
    async fn execute(&self, sql: &str) -> Result<u64>;

    async fn add_column(&self, table: &str, column: &ColumnDefinition) -> Result<()> {
        let sql = self.dialect().build_add_column(self.schema(), table, column);
        self.execute(&sql).await.map(|_| ())
    }

    /// Every value of `key` in `table`, as strings.
    async fn fetch_keys(&self, table: &str, key: &str) -> Result<HashSet<String>>;

    async fn insert_row(&self, table: &str, row: &Row) -> Result<u64>;

    async fn upsert_row(&self, table: &str, key: &str, row: &Row) -> Result<u64>;

    /// Update by key; the key column is excluded from SET.
    async fn update_row(&self, table: &str, key: &str, row: &Row) -> Result<u64>;

    async fn delete_row(&self, table: &str, key: &str, id: &str) -> Result<u64>;

    /// Delete every row of a child table belonging to parent `id`.
    async fn delete_children(&self, table: &str, fk_column: &str, id: &str) -> Result<u64>;

    async fn count_rows(&self, table: &str) -> Result<u64>;

    async fn fetch_row(&self, table: &str, key: &str, id: &str) -> Result<Option<Row>>;

    /// Release pooled connections.
    async fn close(&self);
}
