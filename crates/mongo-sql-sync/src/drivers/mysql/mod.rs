//! MySQL destination driver.
//!
//! - [`MysqlDialect`]: SQL syntax strategy
//! - [`MysqlStore`]: pooled destination store
//!
//! # Supported Versions
//!
//! - MySQL 5.7+, 8.0+
//! - MariaDB 10.2+

mod dialect;
mod store;

pub use dialect::MysqlDialect;
pub use store::MysqlStore;
