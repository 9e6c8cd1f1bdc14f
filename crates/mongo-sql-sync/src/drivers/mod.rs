//! Database driver implementations.
//!
//! - [`mysql`]: MySQL destination (mysql_async)
//! - [`mssql`]: Microsoft SQL Server destination (Tiberius with bb8 pooling)
//! - [`mongo`]: MongoDB document source
//!
//! # Architecture
//!
//! Each destination module implements:
//! - `Dialect`: SQL syntax strategy for the database engine
//! - `DestinationStore`: catalog and row-level access to the database
//!
//! Dialects are dispatched through [`DialectImpl`], an enum with one variant
//! per engine, so callers never box a dialect.

pub mod mongo;
pub mod mssql;
pub mod mysql;

pub use mongo::{MongoCollection, MongoSource};
pub use mssql::{MssqlDialect, MssqlStore};
pub use mysql::{MysqlDialect, MysqlStore};

use serde::Serialize;

use crate::core::traits::Dialect;
use crate::error::{Result, SyncError};
use crate::typemap::SqlType;

/// Supported relational destinations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDialect {
    MySql,
    SqlServer,
}

impl DatabaseDialect {
    pub fn parse(db_type: &str) -> Result<Self> {
        match db_type.to_lowercase().as_str() {
            "mysql" | "mariadb" => Ok(DatabaseDialect::MySql),
            "mssql" | "sqlserver" | "sql_server" => Ok(DatabaseDialect::SqlServer),
            other => Err(SyncError::Config(format!(
                "Unknown database type: '{}'. Supported types: mysql, mssql",
                other
            ))),
        }
    }

    /// The other supported destination.
    pub fn alternate(self) -> Self {
        match self {
            DatabaseDialect::MySql => DatabaseDialect::SqlServer,
            DatabaseDialect::SqlServer => DatabaseDialect::MySql,
        }
    }

    pub fn dialect(self) -> DialectImpl {
        match self {
            DatabaseDialect::MySql => DialectImpl::Mysql(MysqlDialect::new()),
            DatabaseDialect::SqlServer => DialectImpl::Mssql(MssqlDialect::new()),
        }
    }
}

/// Enum-based static dispatch for dialects.
///
/// The compiler generates a match statement instead of using vtable dispatch.
#[derive(Debug, Clone)]
pub enum DialectImpl {
    Mysql(MysqlDialect),
    Mssql(MssqlDialect),
}

impl DialectImpl {
    /// Create a dialect implementation from a database type string.
    ///
    /// # Errors
    ///
    /// Returns an error if the database type is not recognized.
    pub fn from_db_type(db_type: &str) -> Result<Self> {
        Ok(DatabaseDialect::parse(db_type)?.dialect())
    }

    pub fn kind(&self) -> DatabaseDialect {
        match self {
            DialectImpl::Mysql(_) => DatabaseDialect::MySql,
            DialectImpl::Mssql(_) => DatabaseDialect::SqlServer,
        }
    }

    /// Dialect of the other supported destination, used for the secondary
    /// section of generated DDL files.
    pub fn alternate(&self) -> DialectImpl {
        self.kind().alternate().dialect()
    }

    /// Schema used when rendering for this dialect without a live connection.
    pub fn default_schema(&self) -> &'static str {
        match self {
            DialectImpl::Mysql(_) => "",
            DialectImpl::Mssql(_) => "dbo",
        }
    }
}

impl Dialect for DialectImpl {
    fn name(&self) -> &str {
        match self {
            DialectImpl::Mysql(d) => d.name(),
            DialectImpl::Mssql(d) => d.name(),
        }
    }

    fn display_name(&self) -> &str {
        match self {
            DialectImpl::Mysql(d) => d.display_name(),
            DialectImpl::Mssql(d) => d.display_name(),
        }
    }

    fn quote_ident(&self, name: &str) -> String {
        match self {
            DialectImpl::Mysql(d) => d.quote_ident(name),
            DialectImpl::Mssql(d) => d.quote_ident(name),
        }
    }

    fn param_placeholder(&self, index: usize) -> String {
        match self {
            DialectImpl::Mysql(d) => d.param_placeholder(index),
            DialectImpl::Mssql(d) => d.param_placeholder(index),
        }
    }

    fn render_type(&self, ty: SqlType) -> String {
        match self {
            DialectImpl::Mysql(d) => d.render_type(ty),
            DialectImpl::Mssql(d) => d.render_type(ty),
        }
    }

    fn identity_keyword(&self) -> &str {
        match self {
            DialectImpl::Mysql(d) => d.identity_keyword(),
            DialectImpl::Mssql(d) => d.identity_keyword(),
        }
    }

    fn build_drop_table(&self, schema: &str, table: &str) -> String {
        match self {
            DialectImpl::Mysql(d) => d.build_drop_table(schema, table),
            DialectImpl::Mssql(d) => d.build_drop_table(schema, table),
        }
    }

    fn create_table_suffix(&self) -> &str {
        match self {
            DialectImpl::Mysql(d) => d.create_table_suffix(),
            DialectImpl::Mssql(d) => d.create_table_suffix(),
        }
    }

    fn build_upsert(&self, schema: &str, table: &str, columns: &[String], key: &str) -> String {
        match self {
            DialectImpl::Mysql(d) => d.build_upsert(schema, table, columns, key),
            DialectImpl::Mssql(d) => d.build_upsert(schema, table, columns, key),
        }
    }

    fn table_exists_query(&self) -> String {
        match self {
            DialectImpl::Mysql(d) => d.table_exists_query(),
            DialectImpl::Mssql(d) => d.table_exists_query(),
        }
    }

    fn column_names_query(&self) -> String {
        match self {
            DialectImpl::Mysql(d) => d.column_names_query(),
            DialectImpl::Mssql(d) => d.column_names_query(),
        }
    }
}
