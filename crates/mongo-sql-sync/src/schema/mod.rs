//! Schema inference and relational planning.
//!
//! - [`inference`]: builds a field schema map from sampled documents
//! - [`planner`]: turns the map into main, child and junction table definitions
//! - [`ddl`]: renders, writes and applies CREATE/DROP statements for a plan
//! - [`decompose`]: splits a document into rows for the planned child tables

pub mod ddl;
pub mod decompose;
pub mod inference;
pub mod planner;

pub use inference::{FieldSchema, InferenceWarning, InferredSchema, SchemaInferencer};
pub use planner::{
    is_flat, plan_tables, ColumnDefinition, PlanOptions, RelationshipKind, SchemaPlan,
    TableDefinition,
};
