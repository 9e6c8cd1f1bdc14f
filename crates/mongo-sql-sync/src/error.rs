//! Error types for the sync library.

use thiserror::Error;

/// Main error type for schema analysis, migration and sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Could not reach one of the stores. Fatal for the current collection only.
    #[error("Connection error: {message}\n  Context: {context}")]
    Connection { message: String, context: String },

    /// Document store error
    #[error("Source database error: {0}")]
    Source(#[from] mongodb::error::Error),

    /// MySQL destination error
    #[error("MySQL error: {0}")]
    Mysql(#[from] mysql_async::Error),

    /// SQL Server destination error
    #[error("SQL Server error: {0}")]
    Mssql(#[from] tiberius::error::Error),

    /// Schema inference could not produce a usable result
    #[error("Schema inference failed: {0}")]
    SchemaInference(String),

    /// DDL statement failed
    #[error("DDL failed for table {table}: {message}")]
    Ddl { table: String, message: String },

    /// Single record insert/update/delete failed
    #[error("Record {id} failed: {message}")]
    Record { id: String, message: String },

    /// Validation could not be completed
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Sync state file error
    #[error("Sync state error: {0}")]
    State(String),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SyncError {
    /// Create a Connection error with context about where it occurred
    pub fn connection(message: impl std::fmt::Display, context: impl Into<String>) -> Self {
        SyncError::Connection {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a Ddl error
    pub fn ddl(table: impl Into<String>, message: impl Into<String>) -> Self {
        SyncError::Ddl {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create a Record error
    pub fn record(id: impl Into<String>, message: impl Into<String>) -> Self {
        SyncError::Record {
            id: id.into(),
            message: message.into(),
        }
    }

    /// Whether the error means a store could not be reached at all.
    pub fn is_connection(&self) -> bool {
        matches!(self, SyncError::Connection { .. })
    }

    /// Process exit code for the CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            SyncError::Config(_) | SyncError::Yaml(_) => 2,
            SyncError::Connection { .. } => 3,
            SyncError::Source(_) | SyncError::Mysql(_) | SyncError::Mssql(_) => 4,
            SyncError::Validation(_) => 5,
            SyncError::State(_) | SyncError::Io(_) | SyncError::Json(_) => 6,
            _ => 1,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_error_is_classified() {
        let err = SyncError::connection("refused", "opening MySQL pool");
        assert!(err.is_connection());
        assert_eq!(err.exit_code(), 3);
        assert!(err.to_string().contains("opening MySQL pool"));
    }

    #[test]
    fn test_config_exit_code() {
        assert_eq!(SyncError::Config("bad".into()).exit_code(), 2);
        assert!(!SyncError::Config("bad".into()).is_connection());
    }

    #[test]
    fn test_format_detailed_includes_message() {
        let err = SyncError::record("42", "duplicate key");
        let detailed = err.format_detailed();
        assert!(detailed.starts_with("Error: Record 42 failed: duplicate key"));
    }
}
