//! # mongo-sql-sync
//!
//! MongoDB to relational (MySQL / SQL Server) schema inference, migration and
//! incremental synchronization library.
//!
//! - **Schema inference** from sampled documents, with type histograms and
//!   nested/array detection
//! - **Relational planning** of a main table plus child and junction tables,
//!   emitted as DDL for both supported dialects
//! - **Full migration** that decomposes every document into its tables
//! - **Incremental sync** driven by per-document content hashes kept in a JSON
//!   state file, with additive column evolution
//! - **Validation** of counts and sampled documents against the destination
//!
//! ## Example
//!
//! ```rust,no_run
//! use mongo_sql_sync::{Config, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("config.yaml")?;
//!     let orchestrator = Orchestrator::new(config).await?;
//!     let result = orchestrator.sync(None, false).await?;
//!     println!("{}", result.to_json()?);
//!     orchestrator.close().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod drivers;
pub mod error;
pub mod orchestrator;
pub mod schema;
pub mod state;
pub mod sync;
pub mod transfer;
pub mod typemap;
pub mod verify;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports for convenient access
pub use config::{Config, MigrationConfig, SourceConfig, TargetConfig};
pub use crate::core::{DestinationStore, Dialect, DocValue, Document, DocumentSource, Row, SqlValue, ValueType};
pub use drivers::{DatabaseDialect, DialectImpl, MongoSource, MssqlStore, MysqlStore};
pub use error::{Result, SyncError};
pub use orchestrator::{
    AnalysisResult, CollectionOutcome, CollectionResult, HealthCheckResult, MigrationResult, Orchestrator, RunResult,
    TargetStore,
};
pub use schema::{InferredSchema, SchemaInferencer, SchemaPlan};
pub use state::SyncState;
pub use sync::{SyncEngine, SyncOptions, SyncResult};
pub use transfer::{BulkLoader, LoadStats, RecordError};
pub use verify::{ValidationReport, ValidationStatus, Validator};
