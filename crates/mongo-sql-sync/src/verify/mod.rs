//! Post-load validation of a collection against its main table.
//!
//! Compares record counts, then samples documents and compares their flat
//! scalar fields with the destination row after normalizing both sides.
//! Child and junction tables are not validated.

pub mod normalize;
pub mod types;

pub use types::{SampleDetail, ValidationReport, ValidationStatus};

use std::time::Instant;

use tracing::{debug, error, info, warn};

use crate::core::identifier::column_name;
use crate::core::traits::{DestinationStore, DocumentSource};
use crate::error::{Result, SyncError};
use crate::sync::flatten::{flatten, structured_field_count};
use normalize::{normalize_doc, normalize_sql};

/// Validates one collection.
pub struct Validator<'a> {
    source: &'a dyn DocumentSource,
    store: &'a dyn DestinationStore,
    key_field: String,
    sample_size: usize,
}

impl<'a> Validator<'a> {
    pub fn new(
        source: &'a dyn DocumentSource,
        store: &'a dyn DestinationStore,
        key_field: &str,
        sample_size: usize,
    ) -> Self {
        Self {
            source,
            store,
            key_field: key_field.to_string(),
            sample_size,
        }
    }

    /// Run the validation. Never fails: a step that errors sets the status
    /// to ERROR and the report keeps whatever was collected before it.
    pub async fn validate(&self) -> ValidationReport {
        let start = Instant::now();
        let collection = self.source.collection();
        let table = column_name(collection);
        let mut report = ValidationReport::new(collection, &table);

        match self.run(&table, &mut report).await {
            Ok(()) => report.overall_status = report.compute_status(),
            Err(e) => {
                error!("Validation of {} failed: {}", collection, e);
                report.issues.push(format!("Validation error: {}", e));
                report.overall_status = ValidationStatus::Error;
            }
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "Validation of {}: {} ({} issues, {}/{} samples matched)",
            collection,
            report.overall_status,
            report.issues.len(),
            report.samples_passed(),
            report.details.len()
        );
        report
    }

    async fn run(&self, table: &str, report: &mut ValidationReport) -> Result<()> {
        report.mongo_count = self.source.count().await?;
        report.sql_count = self.store.count_rows(table).await?;
        report.record_count_match = report.mongo_count == report.sql_count;
        if !report.record_count_match {
            report.issues.push(format!(
                "Record count mismatch: source has {} documents, destination has {} rows",
                report.mongo_count, report.sql_count
            ));
        }

        let key_column = column_name(&self.key_field);
        let sample = self.source.fetch_sample(self.sample_size).await?;
        let mut skipped_fields = 0;

        for doc in &sample {
            let Some(id) = doc.key_string(&self.key_field) else {
                report.warnings.push(format!(
                    "sampled document without a usable '{}' skipped",
                    self.key_field
                ));
                continue;
            };
            skipped_fields += structured_field_count(doc);

            let Some(row) = self.store.fetch_row(table, &key_column, &id).await? else {
                let mut detail = SampleDetail::new(&id);
                detail.matched = false;
                report.issues.push(format!("Document {} not found in SQL", id));
                report.details.push(detail);
                continue;
            };

            let mut detail = SampleDetail::new(&id);
            for (field, value) in flatten(doc) {
                detail.fields_compared += 1;
                match row.get(&column_name(field)) {
                    None => detail.missing_column(field),
                    Some(dest) => {
                        let (s, d) = (normalize_doc(value), normalize_sql(dest));
                        if s != d {
                            detail.mismatch(field, &s, &d);
                        }
                    }
                }
            }

            if !detail.matched {
                debug!("Document {} differs: {}", id, detail.differences.join("; "));
                report.issues.push(format!(
                    "Document {}: {}",
                    id,
                    detail.differences.join("; ")
                ));
            }
            report.details.push(detail);
        }

        if skipped_fields > 0 {
            let msg = format!(
                "{} nested or array field value(s) not validated (child tables are not compared)",
                skipped_fields
            );
            warn!("{}: {}", report.collection, msg);
            report.warnings.push(msg);
        }

        if report.details.is_empty() && report.mongo_count > 0 {
            return Err(SyncError::Validation(
                "no sampled document could be compared".to_string(),
            ));
        }
        Ok(())
    }
}
