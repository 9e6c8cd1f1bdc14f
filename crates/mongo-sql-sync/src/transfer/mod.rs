//! Row loader applying documents to the destination in batches.
//!
//! Work is strictly sequential: one batch at a time, one statement at a time.
//! A failing record is collected with its id and the operation that failed;
//! it never stops the remaining records. Only a connection failure aborts.

use std::collections::BTreeMap;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::core::traits::DestinationStore;
use crate::core::{Document, Row};
use crate::error::{Result, SyncError};
use crate::schema::decompose::child_rows;
use crate::schema::TableDefinition;
use crate::sync::detect::{ChangeKind, ChangeSet, SourceEntry};
use crate::sync::flatten::build_main_row;

/// Statement kind that failed for a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Insert,
    Update,
    Delete,
    Children,
}

/// A record that could not be applied.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordError {
    pub id: String,
    pub operation: Operation,
    pub message: String,
}

/// Counters for one load.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoadStats {
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
    pub child_rows: usize,
    pub failed: usize,
    pub duration_ms: u64,
}

/// Result of applying a change set or a full load.
#[derive(Debug, Clone, Default)]
pub struct LoadOutcome {
    pub stats: LoadStats,
    /// Id to content hash of every document whose main row was written.
    pub applied: BTreeMap<String, String>,
    pub errors: Vec<RecordError>,
}

impl LoadOutcome {
    fn fail(&mut self, id: &str, operation: Operation, err: &SyncError) {
        warn!("{:?} of '{}' failed: {}", operation, id, err);
        self.stats.failed += 1;
        self.errors.push(RecordError {
            id: id.to_string(),
            operation,
            message: err.to_string(),
        });
    }
}

/// Loader settings for one main table.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    pub table: String,
    pub key_field: String,
    pub key_column: String,
    pub batch_size: usize,
    /// Insert new documents with upsert statements.
    pub upsert_new: bool,
}

/// Writes main-table rows and, optionally, child rows.
pub struct BulkLoader<'a> {
    store: &'a dyn DestinationStore,
    config: LoaderConfig,
    /// Columns of the main table, in table order.
    columns: Vec<String>,
    children: Vec<TableDefinition>,
}

impl<'a> BulkLoader<'a> {
    pub fn new(store: &'a dyn DestinationStore, config: LoaderConfig, columns: Vec<String>) -> Self {
        Self {
            store,
            config,
            columns,
            children: Vec::new(),
        }
    }

    /// Child and junction tables refreshed with every written document.
    pub fn with_children(mut self, children: Vec<TableDefinition>) -> Self {
        self.children = children;
        self
    }

    fn main_row(&self, doc: &Document, id: &str) -> Row {
        build_main_row(doc, &self.config.key_field, id, &self.columns)
    }

    /// Apply the New, Updated and Deleted entries of `changes`.
    ///
    /// `docs` is the fetched batch the change indexes refer to.
    pub async fn apply_changes(&self, changes: &ChangeSet, docs: &[Document]) -> Result<LoadOutcome> {
        let start = Instant::now();
        let mut outcome = LoadOutcome::default();
        let batch_size = self.config.batch_size.max(1);

        let pending: Vec<_> = changes
            .changes
            .iter()
            .filter(|c| c.kind != ChangeKind::Unchanged)
            .collect();
        let total_batches = pending.len().div_ceil(batch_size);

        for (batch_no, batch) in pending.chunks(batch_size).enumerate() {
            debug!(
                "{}: applying batch {}/{} ({} changes)",
                self.config.table,
                batch_no + 1,
                total_batches,
                batch.len()
            );
            for change in batch {
                let doc = change.index.and_then(|i| docs.get(i));
                match (change.kind, doc) {
                    (ChangeKind::New, Some(doc)) => {
                        let row = self.main_row(doc, &change.id);
                        let result = if self.config.upsert_new {
                            self.store
                                .upsert_row(&self.config.table, &self.config.key_column, &row)
                                .await
                        } else {
                            self.store.insert_row(&self.config.table, &row).await
                        };
                        match result {
                            Ok(_) => {
                                self.record_applied(&mut outcome, &change.id, change.hash.as_deref());
                                if self.refresh_children(&mut outcome, doc, &change.id).await? {
                                    outcome.stats.inserted += 1;
                                }
                            }
                            Err(e) if e.is_connection() => return Err(e),
                            Err(e) => outcome.fail(&change.id, Operation::Insert, &e),
                        }
                    }
                    (ChangeKind::Updated, Some(doc)) => {
                        let result = if self.has_value_columns() {
                            let row = self.main_row(doc, &change.id);
                            self.store
                                .update_row(&self.config.table, &self.config.key_column, &row)
                                .await
                        } else {
                            // Key-only main row: nothing to set, only children change
                            Ok(1)
                        };
                        match result {
                            Ok(affected) => {
                                if affected == 0 {
                                    debug!("Update of '{}' matched no changed row", change.id);
                                }
                                self.record_applied(&mut outcome, &change.id, change.hash.as_deref());
                                if self.refresh_children(&mut outcome, doc, &change.id).await? {
                                    outcome.stats.updated += 1;
                                }
                            }
                            Err(e) if e.is_connection() => return Err(e),
                            Err(e) => outcome.fail(&change.id, Operation::Update, &e),
                        }
                    }
                    (ChangeKind::Deleted, _) => {
                        match self
                            .store
                            .delete_row(&self.config.table, &self.config.key_column, &change.id)
                            .await
                        {
                            Ok(_) => outcome.stats.deleted += 1,
                            Err(e) if e.is_connection() => return Err(e),
                            Err(e) => outcome.fail(&change.id, Operation::Delete, &e),
                        }
                    }
                    (kind, _) => {
                        let err = SyncError::record(&change.id, "source document not in batch");
                        let op = if kind == ChangeKind::New {
                            Operation::Insert
                        } else {
                            Operation::Update
                        };
                        outcome.fail(&change.id, op, &err);
                    }
                }
            }
        }

        outcome.stats.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "{}: {} inserted, {} updated, {} deleted, {} failed",
            self.config.table,
            outcome.stats.inserted,
            outcome.stats.updated,
            outcome.stats.deleted,
            outcome.stats.failed
        );
        Ok(outcome)
    }

    /// Upsert every keyed document with its child rows.
    pub async fn load_all(&self, entries: &[SourceEntry], docs: &[Document]) -> Result<LoadOutcome> {
        let start = Instant::now();
        let mut outcome = LoadOutcome::default();
        let batch_size = self.config.batch_size.max(1);

        for (batch_no, batch) in entries.chunks(batch_size).enumerate() {
            debug!(
                "{}: loading batch {} ({} documents)",
                self.config.table,
                batch_no + 1,
                batch.len()
            );
            for entry in batch {
                let Some(doc) = docs.get(entry.index) else {
                    continue;
                };
                let row = self.main_row(doc, &entry.id);
                match self
                    .store
                    .upsert_row(&self.config.table, &self.config.key_column, &row)
                    .await
                {
                    Ok(_) => {
                        self.record_applied(&mut outcome, &entry.id, Some(&entry.hash));
                        if self.refresh_children(&mut outcome, doc, &entry.id).await? {
                            outcome.stats.inserted += 1;
                        }
                    }
                    Err(e) if e.is_connection() => return Err(e),
                    Err(e) => outcome.fail(&entry.id, Operation::Insert, &e),
                }
            }
        }

        outcome.stats.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "{}: loaded {} documents ({} child rows, {} failed)",
            self.config.table, outcome.stats.inserted, outcome.stats.child_rows, outcome.stats.failed
        );
        Ok(outcome)
    }

    /// Whether the main table has any column besides the key.
    fn has_value_columns(&self) -> bool {
        self.columns
            .iter()
            .any(|c| !c.eq_ignore_ascii_case(&self.config.key_column))
    }

    fn record_applied(&self, outcome: &mut LoadOutcome, id: &str, hash: Option<&str>) {
        if let Some(hash) = hash {
            outcome.applied.insert(id.to_string(), hash.to_string());
        }
    }

    /// Replace the child rows of one document; `Ok(false)` when a child
    /// statement failed.
    ///
    /// A failure drops the document from `applied` so its hash is not
    /// recorded and the next run retries it.
    async fn refresh_children(&self, outcome: &mut LoadOutcome, doc: &Document, id: &str) -> Result<bool> {
        for table in &self.children {
            let Some(fk) = table.foreign_key_column.as_deref() else {
                continue;
            };
            if let Err(e) = self.store.delete_children(&table.name, fk, id).await {
                if e.is_connection() {
                    return Err(e);
                }
                outcome.applied.remove(id);
                outcome.fail(id, Operation::Children, &e);
                return Ok(false);
            }
            for row in child_rows(table, doc, id) {
                match self.store.insert_row(&table.name, &row).await {
                    Ok(_) => outcome.stats.child_rows += 1,
                    Err(e) if e.is_connection() => return Err(e),
                    Err(e) => {
                        outcome.applied.remove(id);
                        outcome.fail(id, Operation::Children, &e);
                        return Ok(false);
                    }
                }
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{plan_tables, PlanOptions, SchemaInferencer};
    use crate::sync::detect::{detect_changes, key_documents};
    use crate::testing::MemoryStore;
    use serde_json::json;
    use std::collections::HashSet;

    fn docs(values: Vec<serde_json::Value>) -> Vec<Document> {
        values.into_iter().map(Document::from_json).collect()
    }

    fn config(upsert_new: bool) -> LoaderConfig {
        LoaderConfig {
            table: "users".to_string(),
            key_field: "_id".to_string(),
            key_column: "_id".to_string(),
            batch_size: 2,
            upsert_new,
        }
    }

    fn columns() -> Vec<String> {
        vec!["_id".to_string(), "name".to_string(), "age".to_string()]
    }

    #[tokio::test]
    async fn test_apply_new_updated_deleted() {
        let store = MemoryStore::mysql();
        store.create_table("users", &["_id", "name", "age"]);
        store.put_row(
            "users",
            Row::new()
                .with("_id", "2".into())
                .with("name", "Old".into())
                .with("age", 1i64.into()),
        );
        store.put_row("users", Row::new().with("_id", "9".into()));

        let source = docs(vec![
            json!({"_id": "1", "name": "Ann", "age": 30}),
            json!({"_id": "2", "name": "Bob"}),
        ]);
        let (entries, _) = key_documents(&source, "_id");
        let dest: HashSet<String> = ["2", "9"].iter().map(|s| s.to_string()).collect();
        let changes = detect_changes(&entries, &dest, None, false);

        let loader = BulkLoader::new(&store, config(true), columns());
        let outcome = loader.apply_changes(&changes, &source).await.unwrap();

        assert_eq!(outcome.stats.inserted, 1);
        assert_eq!(outcome.stats.updated, 1);
        assert_eq!(outcome.stats.deleted, 1);
        assert_eq!(outcome.applied.len(), 2);

        let rows = store.rows("users");
        assert_eq!(rows.len(), 2);
        let bob = rows.iter().find(|r| r.get("_id") == Some(&"2".into())).unwrap();
        assert_eq!(bob.get("name"), Some(&"Bob".into()));
        assert_eq!(bob.get("age"), Some(&crate::core::SqlValue::Null));
    }

    #[tokio::test]
    async fn test_failures_are_collected_and_not_recorded() {
        let store = MemoryStore::mysql();
        store.create_table("users", &["_id", "name", "age"]);
        store.fail_on("2");

        let source = docs(vec![
            json!({"_id": "1", "name": "Ann"}),
            json!({"_id": "2", "name": "Bob"}),
            json!({"_id": "3", "name": "Cy"}),
        ]);
        let (entries, _) = key_documents(&source, "_id");
        let changes = detect_changes(&entries, &HashSet::new(), None, false);

        let loader = BulkLoader::new(&store, config(false), columns());
        let outcome = loader.apply_changes(&changes, &source).await.unwrap();

        assert_eq!(outcome.stats.inserted, 2);
        assert_eq!(outcome.stats.failed, 1);
        assert_eq!(outcome.errors[0].id, "2");
        assert_eq!(outcome.errors[0].operation, Operation::Insert);
        assert!(!outcome.applied.contains_key("2"));
        assert_eq!(store.rows("users").len(), 2);
    }

    #[tokio::test]
    async fn test_load_all_writes_child_rows() {
        let source = docs(vec![
            json!({"_id": "1", "name": "Ann", "tags": ["a", "b"]}),
            json!({"_id": "2", "name": "Bob", "tags": ["c"]}),
        ]);
        let schema = SchemaInferencer::default().infer(&source);
        let plan = plan_tables("users", &schema, &PlanOptions::default());

        let store = MemoryStore::mysql();
        crate::schema::ddl::apply(&store, &plan, false).await.unwrap();

        let (entries, _) = key_documents(&source, "_id");
        let loader = BulkLoader::new(&store, config(true), store.columns("users"))
            .with_children(plan.child_tables().to_vec());
        let outcome = loader.load_all(&entries, &source).await.unwrap();
        assert_eq!(outcome.stats.inserted, 2);
        assert_eq!(outcome.stats.child_rows, 3);

        // Reloading replaces child rows instead of duplicating them
        let outcome = loader.load_all(&entries, &source).await.unwrap();
        assert_eq!(outcome.stats.child_rows, 3);
        assert_eq!(store.rows("users_tags").len(), 3);
        assert_eq!(store.rows("users").len(), 2);
    }

    fn tag_plan(source: &[Document]) -> crate::schema::SchemaPlan {
        let schema = SchemaInferencer::default().infer(source);
        plan_tables("users", &schema, &PlanOptions::default())
    }

    #[tokio::test]
    async fn test_key_only_main_table_refreshes_children() {
        let source = docs(vec![json!({"_id": "1", "tags": ["a", "b"]})]);
        let plan = tag_plan(&source);
        let store = MemoryStore::mysql();
        crate::schema::ddl::apply(&store, &plan, false).await.unwrap();
        assert_eq!(store.columns("users"), vec!["_id"]);
        store.put_row("users", Row::new().with("_id", "1".into()));

        let (entries, _) = key_documents(&source, "_id");
        let dest: HashSet<String> = ["1".to_string()].into_iter().collect();
        let changes = detect_changes(&entries, &dest, None, true);
        assert_eq!(changes.kind_of("1"), Some(ChangeKind::Updated));

        let loader = BulkLoader::new(&store, config(true), store.columns("users"))
            .with_children(plan.child_tables().to_vec());
        let outcome = loader.apply_changes(&changes, &source).await.unwrap();

        assert!(outcome.errors.is_empty());
        assert_eq!(outcome.stats.updated, 1);
        assert!(outcome.applied.contains_key("1"));
        assert_eq!(store.rows("users_tags").len(), 2);
    }

    #[tokio::test]
    async fn test_child_failure_is_not_counted_as_loaded() {
        let source = docs(vec![
            json!({"_id": "1", "name": "Ann", "tags": ["a"]}),
            json!({"_id": "2", "name": "Bob", "tags": ["b"]}),
        ]);
        let plan = tag_plan(&source);
        let store = MemoryStore::mysql();
        crate::schema::ddl::apply(&store, &plan, false).await.unwrap();
        store.fail_table("users_tags");

        let (entries, _) = key_documents(&source, "_id");
        let loader = BulkLoader::new(&store, config(true), store.columns("users"))
            .with_children(plan.child_tables().to_vec());
        let outcome = loader.load_all(&entries, &source).await.unwrap();

        assert_eq!(outcome.stats.inserted, 0);
        assert_eq!(outcome.stats.failed, 2);
        assert!(outcome.errors.iter().all(|e| e.operation == Operation::Children));
        assert!(outcome.applied.is_empty());
    }
}
