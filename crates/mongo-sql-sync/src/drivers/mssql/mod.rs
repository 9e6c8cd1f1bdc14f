//! Microsoft SQL Server destination driver.
//!
//! - [`MssqlDialect`]: SQL syntax strategy for MSSQL
//! - [`MssqlStore`]: destination store over a bb8 pool of Tiberius clients

mod dialect;
mod store;

pub use dialect::MssqlDialect;
pub use store::{MssqlStore, TiberiusConnectionManager};
