//! Destination store selection.
//!
//! [`TargetStore`] wraps the concrete store for the configured destination so
//! the orchestrator holds one owned value and hands out `&dyn DestinationStore`
//! to the workflows.

use crate::config::TargetConfig;
use crate::core::traits::DestinationStore;
use crate::drivers::{DatabaseDialect, MssqlStore, MysqlStore};
use crate::error::Result;
use tracing::info;

/// Enum wrapper for destination store implementations.
pub enum TargetStore {
    Mysql(MysqlStore),
    Mssql(MssqlStore),
}

impl TargetStore {
    /// Connect to the destination named by `config.type`.
    pub async fn from_config(config: &TargetConfig) -> Result<Self> {
        match DatabaseDialect::parse(&config.r#type)? {
            DatabaseDialect::MySql => {
                info!(
                    "Connecting to MySQL at {}:{}/{}",
                    config.host,
                    config.get_port(),
                    config.database
                );
                Ok(Self::Mysql(MysqlStore::connect(config).await?))
            }
            DatabaseDialect::SqlServer => {
                info!(
                    "Connecting to SQL Server at {}:{}/{}",
                    config.host,
                    config.get_port(),
                    config.database
                );
                Ok(Self::Mssql(MssqlStore::connect(config).await?))
            }
        }
    }

    pub fn as_store(&self) -> &dyn DestinationStore {
        match self {
            Self::Mysql(s) => s,
            Self::Mssql(s) => s,
        }
    }

    /// Get the database type.
    pub fn db_type(&self) -> &str {
        match self {
            Self::Mysql(_) => "mysql",
            Self::Mssql(_) => "mssql",
        }
    }

    pub async fn close(&self) {
        self.as_store().close().await;
    }
}
