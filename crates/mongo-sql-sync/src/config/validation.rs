//! Configuration validation.

use super::Config;
use crate::error::{Result, SyncError};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    // Source validation
    if config.source.uri.is_empty() {
        return Err(SyncError::Config("source.uri is required".into()));
    }
    if config.source.database.is_empty() {
        return Err(SyncError::Config("source.database is required".into()));
    }
    if config.source.collections.iter().any(|c| c.trim().is_empty()) {
        return Err(SyncError::Config(
            "source.collections must not contain empty names".into(),
        ));
    }

    // Target validation
    if config.target.host.is_empty() {
        return Err(SyncError::Config("target.host is required".into()));
    }
    if config.target.database.is_empty() {
        return Err(SyncError::Config("target.database is required".into()));
    }
    if config.target.user.is_empty() {
        return Err(SyncError::Config("target.user is required".into()));
    }
    if config.target.r#type != "mysql" && config.target.r#type != "mssql" {
        return Err(SyncError::Config(format!(
            "target.type must be 'mysql' or 'mssql', got '{}'",
            config.target.r#type
        )));
    }
    if !matches!(
        config.target.ssl_mode.as_str(),
        "disable" | "prefer" | "require"
    ) {
        return Err(SyncError::Config(format!(
            "target.ssl_mode must be 'disable', 'prefer' or 'require', got '{}'",
            config.target.ssl_mode
        )));
    }
    if let Some(0) = config.target.max_connections {
        return Err(SyncError::Config(
            "target.max_connections must be at least 1".into(),
        ));
    }

    // Migration validation
    let m = &config.migration;
    if m.key_field.is_empty() {
        return Err(SyncError::Config("migration.key_field is required".into()));
    }
    for (name, value) in [
        ("sample_size", m.sample_size),
        ("validation_sample_size", m.validation_sample_size),
        ("batch_size", m.batch_size),
        ("max_depth", m.max_depth),
    ] {
        if value == 0 {
            return Err(SyncError::Config(format!(
                "migration.{} must be at least 1",
                name
            )));
        }
    }
    if m.id_length == 0 || m.string_length == 0 {
        return Err(SyncError::Config(
            "migration.id_length and migration.string_length must be at least 1".into(),
        ));
    }

    Ok(())
}
