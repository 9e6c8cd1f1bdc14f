//! Workflow coordinator: analyze, migrate, sync, validate and health-check.
//!
//! Collections are processed one after another. A failure while processing
//! one collection (including a lost connection) is recorded in its
//! [`CollectionResult`] and the remaining collections still run.

pub mod pools;

pub use pools::TargetStore;

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::core::traits::{DestinationStore, DocumentSource};
use crate::drivers::{DialectImpl, MongoSource};
use crate::error::{Result, SyncError};
use crate::schema::planner::{plan_tables, PlanOptions, SchemaPlan};
use crate::schema::{ddl, InferredSchema, SchemaInferencer};
use crate::state::SyncState;
use crate::sync::detect::key_documents;
use crate::sync::flatten::column_collisions;
use crate::sync::{evolution, existing_children, SyncEngine, SyncOptions, SyncResult};
use crate::transfer::{BulkLoader, LoaderConfig, RecordError};
use crate::typemap::TypeOptions;
use crate::verify::{ValidationReport, ValidationStatus, Validator};

/// Per-collection result that knows whether it succeeded.
pub trait CollectionOutcome {
    fn is_success(&self) -> bool;
}

/// Outcome of one collection within a run.
#[derive(Debug, Clone, Serialize)]
pub struct CollectionResult<T> {
    pub collection: String,

    /// Present when the collection was processed to completion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<T>,

    /// Error that stopped processing of this collection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: CollectionOutcome> CollectionResult<T> {
    fn from_result(collection: &str, result: Result<T>) -> Self {
        match result {
            Ok(r) => Self {
                collection: collection.to_string(),
                result: Some(r),
                error: None,
            },
            Err(e) => {
                error!("{}: {}", collection, e);
                Self {
                    collection: collection.to_string(),
                    result: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    pub fn is_success(&self) -> bool {
        self.result.as_ref().is_some_and(|r| r.is_success())
    }
}

/// Result of running one command over every selected collection.
#[derive(Debug, Clone, Serialize)]
pub struct RunResult<T> {
    /// Unique run identifier.
    pub run_id: String,

    /// Command that produced this result ("migrate", "sync", ...).
    pub command: String,

    /// "completed" or "failed".
    pub status: String,

    /// SHA-256 of the configuration in effect.
    pub config_hash: String,

    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    pub collections_total: usize,
    pub collections_success: usize,
    pub collections_failed: usize,
    pub failed_collections: Vec<String>,

    pub collections: Vec<CollectionResult<T>>,
}

impl<T: CollectionOutcome + Serialize> RunResult<T> {
    fn finish(
        run_id: String,
        command: &str,
        config_hash: String,
        started_at: DateTime<Utc>,
        collections: Vec<CollectionResult<T>>,
    ) -> Self {
        let completed_at = Utc::now();
        let failed_collections: Vec<String> = collections
            .iter()
            .filter(|c| !c.is_success())
            .map(|c| c.collection.clone())
            .collect();
        let collections_failed = failed_collections.len();

        Self {
            run_id,
            command: command.to_string(),
            status: if collections_failed == 0 { "completed" } else { "failed" }.to_string(),
            config_hash,
            started_at,
            completed_at,
            duration_seconds: (completed_at - started_at).num_milliseconds() as f64 / 1000.0,
            collections_total: collections.len(),
            collections_success: collections.len() - collections_failed,
            collections_failed,
            failed_collections,
            collections,
        }
    }

    pub fn is_success(&self) -> bool {
        self.collections_failed == 0
    }

    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Schema analysis of one collection.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResult {
    pub collection: String,
    pub total_documents: u64,
    pub documents_sampled: usize,
    pub schema: InferredSchema,
    pub plan: SchemaPlan,
    pub ddl_file: String,
    pub warnings: Vec<String>,
}

impl CollectionOutcome for AnalysisResult {
    fn is_success(&self) -> bool {
        true
    }
}

/// Full load of one collection.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationResult {
    pub collection: String,
    pub table: String,
    pub tables: Vec<String>,
    pub ddl_file: String,
    pub source_documents: usize,
    pub loaded: usize,
    pub child_rows: usize,
    pub failed: usize,
    pub columns_added: Vec<String>,
    pub skipped: Vec<String>,
    pub errors: Vec<RecordError>,
    pub warnings: Vec<String>,
    pub state_file: String,
    pub duration_ms: u64,
}

impl CollectionOutcome for MigrationResult {
    fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

impl CollectionOutcome for SyncResult {
    fn is_success(&self) -> bool {
        SyncResult::is_success(self)
    }
}

impl CollectionOutcome for ValidationReport {
    fn is_success(&self) -> bool {
        self.overall_status == ValidationStatus::Passed
    }
}

/// Connectivity of both stores.
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheckResult {
    pub healthy: bool,
    pub source_connected: bool,
    pub source_latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_error: Option<String>,
    pub target_type: String,
    pub target_connected: bool,
    pub target_latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_error: Option<String>,
}

/// Runs the workflows for the configured collections.
pub struct Orchestrator {
    config: Config,
    source: MongoSource,
    target: Option<TargetStore>,
}

impl Orchestrator {
    /// Connect to both stores.
    pub async fn new(config: Config) -> Result<Self> {
        let source = MongoSource::connect(&config.source).await?;
        let target = TargetStore::from_config(&config.target).await?;
        Ok(Self {
            config,
            source,
            target: Some(target),
        })
    }

    /// Connect to the document store only; enough for [`Orchestrator::analyze`].
    pub async fn source_only(config: Config) -> Result<Self> {
        let source = MongoSource::connect(&config.source).await?;
        Ok(Self {
            config,
            source,
            target: None,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn store(&self) -> Result<&dyn DestinationStore> {
        self.target
            .as_ref()
            .map(TargetStore::as_store)
            .ok_or_else(|| SyncError::Config("destination store is not connected".into()))
    }

    /// Collections to process: `only`, else the configured list, else every
    /// collection in the database.
    async fn collection_names(&self, only: Option<&str>) -> Result<Vec<String>> {
        let names = self.config.collections(only);
        if !names.is_empty() {
            return Ok(names);
        }
        let names = self.source.collection_names().await?;
        info!("No collections configured, using all {} in the database", names.len());
        Ok(names)
    }

    fn start(&self, command: &str) -> (String, DateTime<Utc>) {
        let run_id = uuid::Uuid::new_v4().to_string();
        info!(
            "Starting {} run {} (config hash {})",
            command,
            run_id,
            &self.config.hash()[..16]
        );
        (run_id, Utc::now())
    }

    /// Infer the schema of each collection and write its DDL file.
    pub async fn analyze(&self, only: Option<&str>) -> Result<RunResult<AnalysisResult>> {
        let (run_id, started_at) = self.start("analyze");
        let mut results = Vec::new();
        for name in self.collection_names(only).await? {
            let source = self.source.collection(&name);
            let result = analyze_collection(&source, &self.config).await;
            results.push(CollectionResult::from_result(&name, result));
        }
        Ok(RunResult::finish(run_id, "analyze", self.config.hash(), started_at, results))
    }

    /// Create the schema and load every document of each collection.
    pub async fn migrate(&self, only: Option<&str>) -> Result<RunResult<MigrationResult>> {
        let store = self.store()?;
        let (run_id, started_at) = self.start("migrate");
        let mut results = Vec::new();
        for name in self.collection_names(only).await? {
            let source = self.source.collection(&name);
            let result = migrate_collection(&source, store, &self.config).await;
            results.push(CollectionResult::from_result(&name, result));
        }
        Ok(RunResult::finish(run_id, "migrate", self.config.hash(), started_at, results))
    }

    /// Incrementally sync each collection's main table.
    pub async fn sync(&self, only: Option<&str>, force: bool) -> Result<RunResult<SyncResult>> {
        let store = self.store()?;
        let (run_id, started_at) = self.start("sync");
        let mut results = Vec::new();
        for name in self.collection_names(only).await? {
            let source = self.source.collection(&name);
            let engine = SyncEngine::new(&source, store, sync_options(&self.config, force));
            let result = engine.run().await;
            results.push(CollectionResult::from_result(&name, result));
        }
        Ok(RunResult::finish(run_id, "sync", self.config.hash(), started_at, results))
    }

    /// Compare counts and sampled documents of each collection.
    pub async fn validate(
        &self,
        only: Option<&str>,
        sample_size: Option<usize>,
    ) -> Result<RunResult<ValidationReport>> {
        let store = self.store()?;
        let (run_id, started_at) = self.start("validate");
        let sample_size = sample_size.unwrap_or(self.config.migration.validation_sample_size);
        let mut results = Vec::new();
        for name in self.collection_names(only).await? {
            let source = self.source.collection(&name);
            let report = Validator::new(&source, store, &self.config.migration.key_field, sample_size)
                .validate()
                .await;
            results.push(CollectionResult::from_result(&name, Ok(report)));
        }
        Ok(RunResult::finish(run_id, "validate", self.config.hash(), started_at, results))
    }

    /// Connect to both stores and time a round trip to each. Never fails;
    /// connection problems are reported in the result.
    pub async fn health_check(config: &Config) -> HealthCheckResult {
        let mut result = HealthCheckResult {
            healthy: false,
            source_connected: false,
            source_latency_ms: 0,
            source_error: None,
            target_type: config.target.r#type.clone(),
            target_connected: false,
            target_latency_ms: 0,
            target_error: None,
        };

        let start = Instant::now();
        match MongoSource::connect(&config.source).await {
            Ok(source) => {
                result.source_connected = true;
                result.source_latency_ms = start.elapsed().as_millis() as u64;
                source.close().await;
            }
            Err(e) => {
                warn!("Source health check failed: {}", e);
                result.source_error = Some(e.to_string());
            }
        }

        let start = Instant::now();
        match TargetStore::from_config(&config.target).await {
            Ok(target) => {
                result.target_connected = true;
                result.target_latency_ms = start.elapsed().as_millis() as u64;
                target.close().await;
            }
            Err(e) => {
                warn!("Target health check failed: {}", e);
                result.target_error = Some(e.to_string());
            }
        }

        result.healthy = result.source_connected && result.target_connected;
        result
    }

    /// Release both connections.
    pub async fn close(self) {
        if let Some(target) = &self.target {
            target.close().await;
        }
        self.source.close().await;
    }
}

fn type_options(config: &Config) -> TypeOptions {
    TypeOptions {
        string_length: config.migration.string_length,
        id_length: config.migration.id_length,
    }
}

fn plan_options(config: &Config) -> PlanOptions {
    PlanOptions {
        key_field: config.migration.key_field.clone(),
        types: type_options(config),
    }
}

fn sync_options(config: &Config, force: bool) -> SyncOptions {
    let m = &config.migration;
    SyncOptions {
        key_field: m.key_field.clone(),
        batch_size: m.batch_size,
        upsert_new: m.sync_upsert,
        max_depth: m.max_depth,
        types: type_options(config),
        state_dir: m.state_dir(),
        force,
    }
}

/// Sample, infer and plan one collection.
async fn infer_plan(
    source: &dyn DocumentSource,
    config: &Config,
) -> Result<(u64, usize, InferredSchema, SchemaPlan)> {
    let m = &config.migration;
    let total = source.count().await?;
    let sample = source.fetch_sample(m.sample_size).await?;
    info!(
        "{}: sampled {} of {} documents",
        source.collection(),
        sample.len(),
        total
    );
    let schema = SchemaInferencer::new(m.max_depth).infer(&sample);
    let plan = plan_tables(source.collection(), &schema, &plan_options(config));
    Ok((total, sample.len(), schema, plan))
}

fn plan_warnings(schema: &InferredSchema, plan: &SchemaPlan) -> Vec<String> {
    schema
        .warnings
        .iter()
        .map(|w| format!("{}: {}", w.path, w.message))
        .chain(plan.warnings.iter().cloned())
        .collect()
}

/// Infer the schema of one collection and write its DDL file, rendered for
/// the configured destination dialect and schema.
pub async fn analyze_collection(source: &dyn DocumentSource, config: &Config) -> Result<AnalysisResult> {
    let (total, sampled, schema, plan) = infer_plan(source, config).await?;
    let dialect = DialectImpl::from_db_type(&config.target.r#type)?;
    let contents = ddl::render_file(&plan, &dialect, &config.target.get_schema());
    let path = ddl::write_file(&config.migration.output_dir(), source.collection(), &contents)?;

    info!(
        "{}: {} fields, {} tables planned",
        source.collection(),
        schema.fields.len(),
        plan.tables.len()
    );
    Ok(AnalysisResult {
        collection: source.collection().to_string(),
        total_documents: total,
        documents_sampled: sampled,
        warnings: plan_warnings(&schema, &plan),
        schema,
        plan,
        ddl_file: path.display().to_string(),
    })
}

/// Create the schema of one collection and load every document into it,
/// then seed the sync state with the hashes of the loaded documents.
pub async fn migrate_collection(
    source: &dyn DocumentSource,
    store: &dyn DestinationStore,
    config: &Config,
) -> Result<MigrationResult> {
    let started_at = Utc::now();
    let start = Instant::now();
    let m = &config.migration;
    let collection = source.collection();

    let (_, _, schema, plan) = infer_plan(source, config).await?;
    let mut warnings = plan_warnings(&schema, &plan);

    let contents = ddl::render_file(&plan, store.dialect(), store.schema());
    let ddl_file = ddl::write_file(&m.output_dir(), collection, &contents)?;
    warnings.extend(ddl::apply(store, &plan, m.drop_existing).await?);

    let docs = source.fetch_all().await?;
    info!("{}: fetched {} documents", collection, docs.len());
    for msg in column_collisions(&docs) {
        warn!("{}: {}", collection, msg);
        warnings.push(msg);
    }

    let table = plan.main_table().name.clone();
    let added = evolution::evolve(store, &table, &docs, &type_options(config), &mut warnings).await?;
    let columns = store.column_names(&table).await?;
    let children = existing_children(store, plan.child_tables(), &mut warnings).await?;

    let (entries, skipped) = key_documents(&docs, &m.key_field);
    if !skipped.is_empty() {
        warn!("{}: {} document(s) skipped", collection, skipped.len());
    }

    let loader = BulkLoader::new(
        store,
        LoaderConfig {
            table: table.clone(),
            key_field: m.key_field.clone(),
            key_column: plan.key_column.clone(),
            batch_size: m.batch_size,
            upsert_new: m.sync_upsert,
        },
        columns,
    )
    .with_children(children);
    let outcome = loader.load_all(&entries, &docs).await?;

    let mut state = SyncState::new(started_at);
    state.document_hashes = outcome.applied;
    let state_path = SyncState::path_for(&m.state_dir(), &table);
    state.save(&state_path)?;

    Ok(MigrationResult {
        collection: collection.to_string(),
        tables: plan.tables.iter().map(|t| t.name.clone()).collect(),
        table,
        ddl_file: ddl_file.display().to_string(),
        source_documents: docs.len(),
        loaded: outcome.stats.inserted,
        child_rows: outcome.stats.child_rows,
        failed: outcome.stats.failed,
        columns_added: added.into_iter().map(|c| c.column.name).collect(),
        skipped,
        errors: outcome.errors,
        warnings,
        state_file: state_path.display().to_string(),
        duration_ms: start.elapsed().as_millis() as u64,
    })
}
