//! In-memory implementations of the source and destination traits for tests.

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::core::traits::{DestinationStore, DocumentSource};
use crate::core::{Document, Row, SqlValue};
use crate::drivers::DialectImpl;
use crate::error::{Result, SyncError};
use crate::verify::normalize::normalize_sql;

/// A collection held in memory.
pub(crate) struct MemorySource {
    name: String,
    docs: Vec<Document>,
}

impl MemorySource {
    pub(crate) fn new(name: &str, docs: Vec<serde_json::Value>) -> Self {
        Self {
            name: name.to_string(),
            docs: docs.into_iter().map(Document::from_json).collect(),
        }
    }
}

#[async_trait]
impl DocumentSource for MemorySource {
    fn collection(&self) -> &str {
        &self.name
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.docs.len() as u64)
    }

    async fn fetch_all(&self) -> Result<Vec<Document>> {
        Ok(self.docs.clone())
    }

    async fn fetch_sample(&self, n: usize) -> Result<Vec<Document>> {
        Ok(self.docs.iter().take(n).cloned().collect())
    }
}

#[derive(Default)]
struct MemTable {
    columns: Vec<String>,
    rows: Vec<Row>,
}

#[derive(Default)]
struct State {
    tables: BTreeMap<String, MemTable>,
    executed: Vec<String>,
    failing: HashSet<String>,
    failing_tables: HashSet<String>,
    failing_statements: Vec<String>,
}

/// Destination tables held in memory.
///
/// `execute` understands the MySQL-dialect CREATE TABLE, DROP TABLE and
/// ALTER TABLE ADD statements this crate emits against an empty schema.
pub(crate) struct MemoryStore {
    dialect: DialectImpl,
    state: Mutex<State>,
}

impl MemoryStore {
    pub(crate) fn mysql() -> Self {
        Self {
            dialect: DialectImpl::Mysql(crate::drivers::MysqlDialect::new()),
            state: Mutex::new(State::default()),
        }
    }

    pub(crate) fn create_table(&self, name: &str, columns: &[&str]) {
        self.state.lock().unwrap().tables.insert(
            name.to_string(),
            MemTable {
                columns: columns.iter().map(|c| c.to_string()).collect(),
                rows: Vec::new(),
            },
        );
    }

    pub(crate) fn put_row(&self, table: &str, row: Row) {
        let mut state = self.state.lock().unwrap();
        state.tables.get_mut(table).unwrap().rows.push(row);
    }

    pub(crate) fn has_table(&self, name: &str) -> bool {
        self.state.lock().unwrap().tables.contains_key(name)
    }

    pub(crate) fn rows(&self, table: &str) -> Vec<Row> {
        self.state
            .lock()
            .unwrap()
            .tables
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    pub(crate) fn columns(&self, table: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .tables
            .get(table)
            .map(|t| t.columns.clone())
            .unwrap_or_default()
    }

    pub(crate) fn executed(&self) -> Vec<String> {
        self.state.lock().unwrap().executed.clone()
    }

    /// Make every write touching a row that carries `id` fail.
    pub(crate) fn fail_on(&self, id: &str) {
        self.state.lock().unwrap().failing.insert(id.to_string());
    }

    /// Make every row insert into `table` fail.
    pub(crate) fn fail_table(&self, table: &str) {
        self.state.lock().unwrap().failing_tables.insert(table.to_string());
    }

    /// Make every executed statement containing `fragment` fail.
    pub(crate) fn fail_statements(&self, fragment: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_statements
            .push(fragment.to_string());
    }

    fn check_failure(state: &State, row: &Row) -> Result<()> {
        for value in row.values() {
            if let SqlValue::Text(s) = value {
                if state.failing.contains(s) {
                    return Err(SyncError::record(s.as_str(), "injected failure"));
                }
            }
        }
        Ok(())
    }

    fn check_columns(table: &MemTable, name: &str, row: &Row) -> Result<()> {
        for column in row.columns() {
            if !table.columns.iter().any(|c| c.eq_ignore_ascii_case(column)) {
                return Err(SyncError::ddl(name, format!("unknown column '{}'", column)));
            }
        }
        Ok(())
    }
}

fn matches_key(row: &Row, key: &str, id: &str) -> bool {
    row.get(key).map(|v| normalize_sql(v) == id).unwrap_or(false)
}

fn missing(table: &str) -> SyncError {
    SyncError::ddl(table, "table does not exist")
}

fn last_ident(text: &str) -> String {
    text.trim()
        .rsplit('.')
        .next()
        .unwrap_or("")
        .trim_matches('`')
        .to_string()
}

#[async_trait]
impl DestinationStore for MemoryStore {
    fn dialect(&self) -> &DialectImpl {
        &self.dialect
    }

    fn schema(&self) -> &str {
        ""
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn table_exists(&self, table: &str) -> Result<bool> {
        Ok(self.has_table(table))
    }

    async fn column_names(&self, table: &str) -> Result<Vec<String>> {
        Ok(self.columns(table))
    }

    async fn execute(&self, sql: &str) -> Result<u64> {
        let mut state = self.state.lock().unwrap();
        state.executed.push(sql.to_string());
        if state.failing_statements.iter().any(|f| sql.contains(f.as_str())) {
            return Err(SyncError::ddl(last_ident(sql), "injected failure"));
        }

        if let Some(rest) = sql.strip_prefix("CREATE TABLE ") {
            let (name, body) = rest.split_once(" (").unwrap_or((rest, ""));
            let name = last_ident(name);
            if state.tables.contains_key(&name) {
                return Err(SyncError::ddl(name, "table already exists"));
            }
            let columns = body
                .lines()
                .filter_map(|l| l.trim_start().strip_prefix('`'))
                .filter_map(|l| l.split_once('`').map(|(c, _)| c.to_string()))
                .collect();
            state.tables.insert(name, MemTable { columns, rows: Vec::new() });
        } else if let Some(rest) = sql.strip_prefix("DROP TABLE IF EXISTS ") {
            state.tables.remove(&last_ident(rest));
        } else if let Some(rest) = sql.strip_prefix("ALTER TABLE ") {
            let (name, def) = rest.split_once(" ADD `").unwrap_or((rest, ""));
            let name = last_ident(name);
            let column = def.split_once('`').map(|(c, _)| c.to_string()).unwrap_or_default();
            let table = state.tables.get_mut(&name).ok_or_else(|| missing(&name))?;
            table.columns.push(column);
        }
        Ok(0)
    }

    async fn fetch_keys(&self, table: &str, key: &str) -> Result<HashSet<String>> {
        let state = self.state.lock().unwrap();
        let t = state.tables.get(table).ok_or_else(|| missing(table))?;
        Ok(t.rows
            .iter()
            .filter_map(|r| r.get(key))
            .filter(|v| !v.is_null())
            .map(normalize_sql)
            .collect())
    }

    async fn insert_row(&self, table: &str, row: &Row) -> Result<u64> {
        let mut state = self.state.lock().unwrap();
        Self::check_failure(&state, row)?;
        if state.failing_tables.contains(table) {
            return Err(SyncError::ddl(table, "injected failure"));
        }
        let t = state.tables.get_mut(table).ok_or_else(|| missing(table))?;
        Self::check_columns(t, table, row)?;
        t.rows.push(row.clone());
        Ok(1)
    }

    async fn upsert_row(&self, table: &str, key: &str, row: &Row) -> Result<u64> {
        let mut state = self.state.lock().unwrap();
        Self::check_failure(&state, row)?;
        let t = state.tables.get_mut(table).ok_or_else(|| missing(table))?;
        Self::check_columns(t, table, row)?;
        let id = row.get(key).map(normalize_sql).unwrap_or_default();
        match t.rows.iter_mut().find(|r| matches_key(r, key, &id)) {
            Some(existing) => {
                *existing = row.clone();
                Ok(2)
            }
            None => {
                t.rows.push(row.clone());
                Ok(1)
            }
        }
    }

    async fn update_row(&self, table: &str, key: &str, row: &Row) -> Result<u64> {
        let mut state = self.state.lock().unwrap();
        Self::check_failure(&state, row)?;
        if row.columns().all(|c| c.eq_ignore_ascii_case(key)) {
            return Err(SyncError::record(
                row.get(key).map(normalize_sql).unwrap_or_default(),
                "UPDATE without a column to set",
            ));
        }
        let t = state.tables.get_mut(table).ok_or_else(|| missing(table))?;
        Self::check_columns(t, table, row)?;
        let id = row.get(key).map(normalize_sql).unwrap_or_default();
        match t.rows.iter_mut().find(|r| matches_key(r, key, &id)) {
            Some(existing) => {
                *existing = row.clone();
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn delete_row(&self, table: &str, key: &str, id: &str) -> Result<u64> {
        let mut state = self.state.lock().unwrap();
        if state.failing.contains(id) {
            return Err(SyncError::record(id, "injected failure"));
        }
        let t = state.tables.get_mut(table).ok_or_else(|| missing(table))?;
        let before = t.rows.len();
        t.rows.retain(|r| !matches_key(r, key, id));
        Ok((before - t.rows.len()) as u64)
    }

    async fn delete_children(&self, table: &str, fk_column: &str, id: &str) -> Result<u64> {
        self.delete_row(table, fk_column, id).await
    }

    async fn count_rows(&self, table: &str) -> Result<u64> {
        let state = self.state.lock().unwrap();
        let t = state.tables.get(table).ok_or_else(|| missing(table))?;
        Ok(t.rows.len() as u64)
    }

    async fn fetch_row(&self, table: &str, key: &str, id: &str) -> Result<Option<Row>> {
        let state = self.state.lock().unwrap();
        let t = state.tables.get(table).ok_or_else(|| missing(table))?;
        Ok(t.rows.iter().find(|r| matches_key(r, key, id)).cloned())
    }

    async fn close(&self) {}
}
