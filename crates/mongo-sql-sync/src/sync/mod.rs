//! Incremental synchronization of one collection into its main table.
//!
//! A run fetches the whole collection and the destination's key column,
//! classifies every id against the previous run's content hashes, adds any
//! new flat columns, applies the changes and persists the new state.
//!
//! - [`flatten`]: flat scalar view of a document and its content hash
//! - [`detect`]: New / Updated / Unchanged / Deleted classification
//! - [`evolution`]: additive column evolution

pub mod detect;
pub mod evolution;
pub mod flatten;

use std::path::PathBuf;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::core::identifier::column_name;
use crate::core::traits::{DestinationStore, DocumentSource};
use crate::error::Result;
use crate::schema::planner::{plan_tables, PlanOptions, TableDefinition};
use crate::schema::{ddl, SchemaInferencer};
use crate::state::SyncState;
use crate::transfer::{BulkLoader, LoaderConfig, RecordError};
use crate::typemap::TypeOptions;

use detect::{detect_changes, key_documents, ChangeKind};

/// Settings for a sync run.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub key_field: String,
    pub batch_size: usize,
    pub upsert_new: bool,
    pub max_depth: usize,
    pub types: TypeOptions,
    pub state_dir: PathBuf,
    /// Ignore previous state and reclassify every existing id as Updated.
    pub force: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            key_field: "_id".to_string(),
            batch_size: 500,
            upsert_new: true,
            max_depth: 32,
            types: TypeOptions::default(),
            state_dir: PathBuf::from("."),
            force: false,
        }
    }
}

/// Outcome of one sync run.
#[derive(Debug, Clone, Serialize)]
pub struct SyncResult {
    pub collection: String,
    pub table: String,
    pub full_sync: bool,
    /// The main table had to be created by this run.
    pub bootstrapped: bool,
    pub source_documents: usize,
    pub new: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub deleted: usize,
    pub columns_added: Vec<String>,
    pub skipped: Vec<String>,
    pub errors: Vec<RecordError>,
    pub warnings: Vec<String>,
    pub state_file: String,
    pub duration_ms: u64,
}

impl SyncResult {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Runs incremental syncs of one collection.
pub struct SyncEngine<'a> {
    source: &'a dyn DocumentSource,
    store: &'a dyn DestinationStore,
    options: SyncOptions,
}

impl<'a> SyncEngine<'a> {
    pub fn new(source: &'a dyn DocumentSource, store: &'a dyn DestinationStore, options: SyncOptions) -> Self {
        Self {
            source,
            store,
            options,
        }
    }

    pub async fn run(&self) -> Result<SyncResult> {
        let started_at = Utc::now();
        let start = Instant::now();
        let opts = &self.options;
        let collection = self.source.collection();
        let table = column_name(collection);
        let key_column = column_name(&opts.key_field);
        let mut warnings = Vec::new();

        let state_path = SyncState::path_for(&opts.state_dir, &table);
        let prior = match SyncState::load(&state_path) {
            Ok(state) => state,
            Err(e) => {
                let msg = format!("ignoring unreadable sync state, running a full sync: {}", e);
                warn!("{}: {}", collection, msg);
                warnings.push(msg);
                None
            }
        };

        let docs = self.source.fetch_all().await?;
        info!("{}: fetched {} documents", collection, docs.len());
        for msg in flatten::column_collisions(&docs) {
            warn!("{}: {}", collection, msg);
            warnings.push(msg);
        }

        let inferred = SchemaInferencer::new(opts.max_depth).infer(&docs);
        let plan = plan_tables(
            collection,
            &inferred,
            &PlanOptions {
                key_field: opts.key_field.clone(),
                types: opts.types,
            },
        );

        let bootstrapped = !self.store.table_exists(&table).await?;
        if bootstrapped {
            info!("{}: table {} does not exist, creating schema", collection, table);
            warnings.extend(ddl::apply(self.store, &plan, false).await?);
        }

        let dest_ids = self.store.fetch_keys(&table, &key_column).await?;
        let (entries, skipped) = key_documents(&docs, &opts.key_field);
        let changes = detect_changes(&entries, &dest_ids, prior.as_ref(), opts.force);
        info!(
            "{}: {} new, {} updated, {} unchanged, {} deleted{}",
            collection,
            changes.count(ChangeKind::New),
            changes.count(ChangeKind::Updated),
            changes.count(ChangeKind::Unchanged),
            changes.count(ChangeKind::Deleted),
            if changes.is_full_sync { " (full sync)" } else { "" }
        );

        let added = evolution::evolve(self.store, &table, &docs, &opts.types, &mut warnings).await?;
        let columns = self.store.column_names(&table).await?;
        let children = existing_children(self.store, plan.child_tables(), &mut warnings).await?;

        let loader = BulkLoader::new(
            self.store,
            LoaderConfig {
                table: table.clone(),
                key_field: opts.key_field.clone(),
                key_column,
                batch_size: opts.batch_size,
                upsert_new: opts.upsert_new,
            },
            columns,
        )
        .with_children(children);
        let outcome = loader.apply_changes(&changes, &docs).await?;

        let mut state = SyncState::new(started_at);
        state.document_hashes = outcome.applied;
        for change in changes.of_kind(ChangeKind::Unchanged) {
            if let Some(hash) = &change.hash {
                state.document_hashes.insert(change.id.clone(), hash.clone());
            }
        }
        state.save(&state_path)?;

        Ok(SyncResult {
            collection: collection.to_string(),
            table,
            full_sync: changes.is_full_sync,
            bootstrapped,
            source_documents: docs.len(),
            new: outcome.stats.inserted,
            updated: outcome.stats.updated,
            unchanged: changes.count(ChangeKind::Unchanged),
            deleted: outcome.stats.deleted,
            columns_added: added.into_iter().map(|m| m.column.name).collect(),
            skipped,
            errors: outcome.errors,
            warnings,
            state_file: state_path.display().to_string(),
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}

/// Planned child tables present in the destination, narrowed to the columns
/// the destination actually has.
pub async fn existing_children(
    store: &dyn DestinationStore,
    planned: &[TableDefinition],
    warnings: &mut Vec<String>,
) -> Result<Vec<TableDefinition>> {
    let mut children = Vec::new();
    for child in planned {
        if !store.table_exists(&child.name).await? {
            continue;
        }
        let existing = store.column_names(&child.name).await?;
        let mut table = child.clone();
        table.columns.retain(|c| {
            c.source_field.is_none() || existing.iter().any(|e| e.eq_ignore_ascii_case(&c.name))
        });
        let dropped = child.columns.len() - table.columns.len();
        if dropped > 0 {
            warnings.push(format!(
                "{} has {} new nested field(s) without a column; run migrate to add them",
                child.name, dropped
            ));
        }
        children.push(table);
    }
    Ok(children)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Row, SqlValue};
    use crate::testing::{MemorySource, MemoryStore};
    use serde_json::json;

    fn options(dir: &std::path::Path) -> SyncOptions {
        SyncOptions {
            state_dir: dir.to_path_buf(),
            ..SyncOptions::default()
        }
    }

    fn row_for(store: &MemoryStore, id: &str) -> Option<Row> {
        store
            .rows("users")
            .into_iter()
            .find(|r| r.get("_id") == Some(&SqlValue::from(id)))
    }

    #[tokio::test]
    async fn test_first_sync_bootstraps_and_inserts() {
        let dir = tempfile::tempdir().unwrap();
        let source = MemorySource::new(
            "users",
            vec![
                json!({"_id": "1", "name": "Ann", "age": 30}),
                json!({"_id": "2", "name": "Bob", "age": 41}),
                json!({"_id": "3", "name": "Cy", "age": 25}),
            ],
        );
        let store = MemoryStore::mysql();

        let result = SyncEngine::new(&source, &store, options(dir.path()))
            .run()
            .await
            .unwrap();

        assert!(result.bootstrapped);
        assert!(result.full_sync);
        assert_eq!(result.new, 3);
        assert_eq!(store.rows("users").len(), 3);

        let state = SyncState::load(dir.path().join("sync_state_users.json"))
            .unwrap()
            .unwrap();
        assert_eq!(state.document_hashes.len(), 3);
    }

    #[tokio::test]
    async fn test_second_run_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let source = MemorySource::new(
            "users",
            vec![
                json!({"_id": "1", "name": "Ann"}),
                json!({"_id": "2", "name": "Bob"}),
            ],
        );
        let store = MemoryStore::mysql();
        let state_path = dir.path().join("sync_state_users.json");
        let engine = SyncEngine::new(&source, &store, options(dir.path()));
        engine.run().await.unwrap();
        let writes_after_first = store.rows("users");
        let hashes_after_first = SyncState::load(&state_path).unwrap().unwrap().document_hashes;

        let second = engine.run().await.unwrap();
        assert!(!second.full_sync);
        assert_eq!(second.unchanged, 2);
        assert_eq!(second.new + second.updated + second.deleted, 0);
        assert_eq!(store.rows("users"), writes_after_first);

        // Unchanged documents keep their hashes
        let hashes_after_second = SyncState::load(&state_path).unwrap().unwrap().document_hashes;
        assert_eq!(hashes_after_second.len(), 2);
        assert_eq!(hashes_after_second, hashes_after_first);
        assert_eq!(hashes_after_second.get("1"), hashes_after_first.get("1"));
    }

    #[tokio::test]
    async fn test_mixed_sync_with_new_field() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::mysql();
        let first = MemorySource::new(
            "users",
            vec![
                json!({"_id": "1", "name": "Ann", "age": 30}),
                json!({"_id": "2", "name": "Bob", "age": 41}),
                json!({"_id": "3", "name": "Cy", "age": 25}),
            ],
        );
        SyncEngine::new(&first, &store, options(dir.path()))
            .run()
            .await
            .unwrap();

        let second = MemorySource::new(
            "users",
            vec![
                json!({"_id": "1", "name": "Ann", "age": 30}),
                json!({"_id": "2", "name": "Bob", "age": 42, "email": "bob@example.com"}),
                json!({"_id": "4", "name": "Dee", "age": 19}),
            ],
        );
        let result = SyncEngine::new(&second, &store, options(dir.path()))
            .run()
            .await
            .unwrap();

        assert_eq!(result.unchanged, 1);
        assert_eq!(result.updated, 1);
        assert_eq!(result.new, 1);
        assert_eq!(result.deleted, 1);
        assert_eq!(result.columns_added, vec!["email".to_string()]);

        assert!(row_for(&store, "3").is_none());
        let bob = row_for(&store, "2").unwrap();
        assert_eq!(bob.get("age"), Some(&SqlValue::I64(42)));
        assert_eq!(bob.get("email"), Some(&SqlValue::from("bob@example.com")));
    }

    #[tokio::test]
    async fn test_failed_records_retry_next_run() {
        let dir = tempfile::tempdir().unwrap();
        let source = MemorySource::new(
            "users",
            vec![json!({"_id": "1", "name": "Ann"}), json!({"_id": "2", "name": "Bob"})],
        );
        let store = MemoryStore::mysql();
        store.create_table("users", &["_id", "name"]);
        store.fail_on("Bob");

        let result = SyncEngine::new(&source, &store, options(dir.path()))
            .run()
            .await
            .unwrap();
        assert_eq!(result.new, 1);
        assert_eq!(result.errors.len(), 1);
        assert!(!result.is_success());

        let state = SyncState::load(dir.path().join("sync_state_users.json"))
            .unwrap()
            .unwrap();
        assert!(state.hash_for("2").is_none());
        assert!(state.hash_for("1").is_some());
    }

    #[tokio::test]
    async fn test_corrupt_state_forces_full_sync() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("sync_state_users.json"), "{not json").unwrap();
        let source = MemorySource::new("users", vec![json!({"_id": "1", "name": "Ann"})]);
        let store = MemoryStore::mysql();

        let result = SyncEngine::new(&source, &store, options(dir.path()))
            .run()
            .await
            .unwrap();
        assert!(result.full_sync);
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.new, 1);
    }

    #[tokio::test]
    async fn test_force_reclassifies_existing_rows() {
        let dir = tempfile::tempdir().unwrap();
        let source = MemorySource::new("users", vec![json!({"_id": "1", "name": "Ann"})]);
        let store = MemoryStore::mysql();
        SyncEngine::new(&source, &store, options(dir.path()))
            .run()
            .await
            .unwrap();

        let forced = SyncOptions {
            force: true,
            ..options(dir.path())
        };
        let result = SyncEngine::new(&source, &store, forced).run().await.unwrap();
        assert!(result.full_sync);
        assert_eq!(result.updated, 1);
        assert_eq!(result.unchanged, 0);
    }

    #[tokio::test]
    async fn test_force_sync_of_key_only_main_table() {
        let dir = tempfile::tempdir().unwrap();
        let source = MemorySource::new(
            "users",
            vec![
                json!({"_id": "1", "tags": ["a", "b"]}),
                json!({"_id": "2", "tags": ["c"]}),
            ],
        );
        let store = MemoryStore::mysql();
        SyncEngine::new(&source, &store, options(dir.path()))
            .run()
            .await
            .unwrap();
        assert_eq!(store.columns("users"), vec!["_id"]);

        let forced = SyncOptions {
            force: true,
            ..options(dir.path())
        };
        let result = SyncEngine::new(&source, &store, forced).run().await.unwrap();
        assert!(result.errors.is_empty());
        assert_eq!(result.updated, 2);
        assert_eq!(store.rows("users_tags").len(), 3);

        let state = SyncState::load(dir.path().join("sync_state_users.json"))
            .unwrap()
            .unwrap();
        assert_eq!(state.document_hashes.len(), 2);
    }
}
