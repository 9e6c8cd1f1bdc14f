//! Report types produced by the validator.

use std::fmt;

use serde::Serialize;

/// Overall outcome of a validation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ValidationStatus {
    /// No issues.
    Passed,
    /// Some issues, but no more failed samples than passed ones.
    Partial,
    /// More failed samples than passed ones.
    Failed,
    /// A step could not be completed; the report holds partial results.
    Error,
}

impl fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValidationStatus::Passed => "PASSED",
            ValidationStatus::Partial => "PARTIAL",
            ValidationStatus::Failed => "FAILED",
            ValidationStatus::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// Comparison of one sampled document with its destination row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleDetail {
    pub id: String,
    pub matched: bool,
    pub fields_compared: usize,
    /// One entry per differing field, e.g. `age (source: '30' vs dest: '40')`.
    pub differences: Vec<String>,
}

impl SampleDetail {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            matched: true,
            fields_compared: 0,
            differences: Vec::new(),
        }
    }

    pub fn missing_column(&mut self, field: &str) {
        self.matched = false;
        self.differences.push(format!("{} missing in SQL", field));
    }

    pub fn mismatch(&mut self, field: &str, source: &str, dest: &str) {
        self.matched = false;
        self.differences
            .push(format!("{} (source: '{}' vs dest: '{}')", field, source, dest));
    }
}

/// Result of validating one collection against its main table.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub collection: String,
    pub table: String,
    pub mongo_count: u64,
    pub sql_count: u64,
    pub record_count_match: bool,
    pub details: Vec<SampleDetail>,
    pub issues: Vec<String>,
    pub warnings: Vec<String>,
    pub overall_status: ValidationStatus,
    pub duration_ms: u64,
}

impl ValidationReport {
    pub fn new(collection: &str, table: &str) -> Self {
        Self {
            collection: collection.to_string(),
            table: table.to_string(),
            mongo_count: 0,
            sql_count: 0,
            record_count_match: false,
            details: Vec::new(),
            issues: Vec::new(),
            warnings: Vec::new(),
            overall_status: ValidationStatus::Passed,
            duration_ms: 0,
        }
    }

    pub fn samples_passed(&self) -> usize {
        self.details.iter().filter(|d| d.matched).count()
    }

    pub fn samples_failed(&self) -> usize {
        self.details.iter().filter(|d| !d.matched).count()
    }

    /// Fields compared across all samples.
    pub fn fields_compared(&self) -> usize {
        self.details.iter().map(|d| d.fields_compared).sum()
    }

    /// Status from the collected issues and samples.
    pub fn compute_status(&self) -> ValidationStatus {
        if self.issues.is_empty() {
            ValidationStatus::Passed
        } else if self.samples_failed() > self.samples_passed() {
            ValidationStatus::Failed
        } else {
            ValidationStatus::Partial
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_difference_format() {
        let mut detail = SampleDetail::new("1");
        detail.mismatch("age", "30", "40");
        detail.missing_column("email");
        assert!(!detail.matched);
        assert_eq!(
            detail.differences,
            vec![
                "age (source: '30' vs dest: '40')".to_string(),
                "email missing in SQL".to_string()
            ]
        );
    }

    #[test]
    fn test_status_rules() {
        let mut report = ValidationReport::new("users", "users");
        assert_eq!(report.compute_status(), ValidationStatus::Passed);

        report.details.push(SampleDetail::new("1"));
        report.issues.push("count mismatch".to_string());
        assert_eq!(report.compute_status(), ValidationStatus::Partial);

        let mut bad = SampleDetail::new("2");
        bad.mismatch("age", "1", "2");
        report.details.push(bad.clone());
        assert_eq!(report.compute_status(), ValidationStatus::Partial);

        report.details.push(bad);
        assert_eq!(report.compute_status(), ValidationStatus::Failed);
    }

    #[test]
    fn test_status_serializes_uppercase() {
        assert_eq!(
            serde_json::to_string(&ValidationStatus::Partial).unwrap(),
            "\"PARTIAL\""
        );
        assert_eq!(ValidationStatus::Error.to_string(), "ERROR");
    }
}
