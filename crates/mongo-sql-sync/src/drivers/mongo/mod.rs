//! MongoDB source driver.
//!
//! Reads whole collections or a leading sample and decodes BSON into
//! [`Document`](crate::core::Document) values.

mod source;

pub use source::{convert_bson, convert_document, MongoCollection, MongoSource};
