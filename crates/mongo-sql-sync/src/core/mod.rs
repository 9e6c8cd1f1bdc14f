//! Core types and traits shared by every component.
//!
//! - [`value`]: decoded document values, their classification tag, and the
//!   SQL values bound to destination statements
//! - [`identifier`]: derivation and validation of table and column names
//! - [`traits`]: the dialect, document source and destination store seams

pub mod identifier;
pub mod traits;
pub mod value;

pub use traits::{DestinationStore, Dialect, DocumentSource};
pub use value::{DocValue, Document, Row, SqlValue, ValueType};
