//! MSSQL destination store.
//!
//! Uses Tiberius with bb8 connection pooling. Statements are sent with
//! positional `@Pn` parameters.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use bb8::{Pool, PooledConnection};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use tiberius::{AuthMethod, Client, ColumnData, Config, EncryptionLevel, FromSql, ToSql};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, info};

use super::MssqlDialect;
use crate::config::TargetConfig;
use crate::core::traits::{DestinationStore, Dialect};
use crate::core::{Row, SqlValue};
use crate::drivers::DialectImpl;
use crate::error::{Result, SyncError};

/// Connection pool timeouts.
const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(300);
const POOL_MAX_LIFETIME: Duration = Duration::from_secs(1800);

/// Connection manager for bb8 pool with Tiberius.
#[derive(Clone)]
pub struct TiberiusConnectionManager {
    config: TargetConfig,
}

impl TiberiusConnectionManager {
    pub fn new(config: TargetConfig) -> Self {
        Self { config }
    }

    fn build_config(&self) -> Config {
        let mut config = Config::new();
        config.host(&self.config.host);
        config.port(self.config.get_port());
        config.database(&self.config.database);
        config.authentication(AuthMethod::sql_server(
            &self.config.user,
            &self.config.password,
        ));

        match self.config.ssl_mode.to_lowercase().as_str() {
            "disable" => {
                config.encryption(EncryptionLevel::NotSupported);
            }
            "require" => {
                config.trust_cert();
                config.encryption(EncryptionLevel::Required);
            }
            _ => {
                // Login packet is always encrypted; data only if the server insists
                config.trust_cert();
                config.encryption(EncryptionLevel::Off);
            }
        }

        config
    }
}

#[async_trait]
impl bb8::ManageConnection for TiberiusConnectionManager {
    type Connection = Client<Compat<TcpStream>>;
    type Error = tiberius::error::Error;

    async fn connect(&self) -> std::result::Result<Self::Connection, Self::Error> {
        let config = self.build_config();
        let tcp = TcpStream::connect(config.get_addr()).await.map_err(|e| {
            tiberius::error::Error::Io {
                kind: e.kind(),
                message: e.to_string(),
            }
        })?;
        tcp.set_nodelay(true).ok();
        Client::connect(config, tcp.compat_write()).await
    }

    async fn is_valid(&self, conn: &mut Self::Connection) -> std::result::Result<(), Self::Error> {
        conn.simple_query("SELECT 1").await?.into_row().await?;
        Ok(())
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}

/// SQL Server destination store.
pub struct MssqlStore {
    pool: Pool<TiberiusConnectionManager>,
    schema: String,
    dialect: DialectImpl,
}

impl MssqlStore {
    /// Build the pool and test one connection.
    pub async fn connect(config: &TargetConfig) -> Result<Self> {
        let max_size = config.get_max_connections();
        let manager = TiberiusConnectionManager::new(config.clone());
        let pool = Pool::builder()
            .max_size(max_size)
            .min_idle(Some(1))
            .connection_timeout(POOL_CONNECTION_TIMEOUT)
            .idle_timeout(Some(POOL_IDLE_TIMEOUT))
            .max_lifetime(Some(POOL_MAX_LIFETIME))
            .test_on_check_out(true)
            .build(manager)
            .await
            .map_err(|e| SyncError::connection(e, "creating MSSQL target pool"))?;

        let store = Self {
            pool,
            schema: config.get_schema(),
            dialect: DialectImpl::Mssql(MssqlDialect::new()),
        };
        store.ping().await?;

        info!(
            "Connected to MSSQL target: {}:{}/{} (pool_size={})",
            config.host,
            config.get_port(),
            config.database,
            max_size
        );

        Ok(store)
    }

    /// Get a pooled connection.
    async fn get_conn(&self) -> Result<PooledConnection<'_, TiberiusConnectionManager>> {
        self.pool
            .get()
            .await
            .map_err(|e| SyncError::connection(e, "getting MSSQL target connection"))
    }

    async fn exec(&self, sql: &str, values: &[SqlValue]) -> Result<u64> {
        let params: Vec<Box<dyn ToSql>> = values.iter().map(sql_value_to_sql_param).collect();
        let refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let mut conn = self.get_conn().await?;
        let result = conn.execute(sql, &refs).await?;
        Ok(result.total())
    }

    async fn query_rows(&self, sql: &str, values: &[SqlValue]) -> Result<Vec<tiberius::Row>> {
        let params: Vec<Box<dyn ToSql>> = values.iter().map(sql_value_to_sql_param).collect();
        let refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let mut conn = self.get_conn().await?;
        let rows = conn.query(sql, &refs).await?.into_first_result().await?;
        Ok(rows)
    }

    fn catalog_params(&self, table: &str) -> [SqlValue; 2] {
        [SqlValue::from(self.schema.as_str()), SqlValue::from(table)]
    }
}

#[async_trait]
impl DestinationStore for MssqlStore {
    fn dialect(&self) -> &DialectImpl {
        &self.dialect
    }

    fn schema(&self) -> &str {
        &self.schema
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.get_conn().await?;
        conn.simple_query("SELECT 1")
            .await
            .map_err(|e| SyncError::connection(e, "testing MSSQL target connection"))?
            .into_row()
            .await
            .map_err(|e| SyncError::connection(e, "testing MSSQL target connection"))?;
        Ok(())
    }

    async fn table_exists(&self, table: &str) -> Result<bool> {
        let rows = self
            .query_rows(&self.dialect.table_exists_query(), &self.catalog_params(table))
            .await?;
        let count = rows
            .into_iter()
            .next()
            .and_then(|row| row.get::<i32, _>(0))
            .unwrap_or(0);
        Ok(count > 0)
    }

    async fn column_names(&self, table: &str) -> Result<Vec<String>> {
        let rows = self
            .query_rows(&self.dialect.column_names_query(), &self.catalog_params(table))
            .await?;
        Ok(rows
            .iter()
            .filter_map(|row| row.get::<&str, _>(0).map(str::to_string))
            .collect())
    }

    async fn execute(&self, sql: &str) -> Result<u64> {
        debug!("MSSQL: {}", sql);
        self.exec(sql, &[]).await
    }

    async fn fetch_keys(&self, table: &str, key: &str) -> Result<HashSet<String>> {
        let sql = self.dialect.build_select_keys(&self.schema, table, key);
        let rows = self.query_rows(&sql, &[]).await?;
        let mut keys = HashSet::with_capacity(rows.len());
        for row in rows {
            if let Some(data) = row.into_iter().next() {
                match column_data_to_sql(data) {
                    SqlValue::Null => {}
                    SqlValue::Text(s) => {
                        keys.insert(s);
                    }
                    other => {
                        keys.insert(crate::verify::normalize::normalize_sql(&other));
                    }
                }
            }
        }
        Ok(keys)
    }

    async fn insert_row(&self, table: &str, row: &Row) -> Result<u64> {
        let columns: Vec<String> = row.columns().map(str::to_string).collect();
        let values: Vec<SqlValue> = row.values().cloned().collect();
        let sql = self.dialect.build_insert(&self.schema, table, &columns);
        self.exec(&sql, &values).await
    }

    async fn upsert_row(&self, table: &str, key: &str, row: &Row) -> Result<u64> {
        let columns: Vec<String> = row.columns().map(str::to_string).collect();
        let values: Vec<SqlValue> = row.values().cloned().collect();
        let sql = self.dialect.build_upsert(&self.schema, table, &columns, key);
        self.exec(&sql, &values).await
    }

    async fn update_row(&self, table: &str, key: &str, row: &Row) -> Result<u64> {
        let columns: Vec<String> = row.columns().map(str::to_string).collect();
        let key_value = row
            .get(key)
            .cloned()
            .ok_or_else(|| SyncError::record("?", format!("row has no '{}' value", key)))?;
        let mut values: Vec<SqlValue> = row
            .iter()
            .filter(|(c, _)| !c.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.clone())
            .collect();
        values.push(key_value);
        let sql = self.dialect.build_update(&self.schema, table, &columns, key);
        self.exec(&sql, &values).await
    }

    async fn delete_row(&self, table: &str, key: &str, id: &str) -> Result<u64> {
        let sql = self.dialect.build_delete(&self.schema, table, key);
        self.exec(&sql, &[SqlValue::from(id)]).await
    }

    async fn delete_children(&self, table: &str, fk_column: &str, id: &str) -> Result<u64> {
        let sql = self.dialect.build_delete(&self.schema, table, fk_column);
        self.exec(&sql, &[SqlValue::from(id)]).await
    }

    async fn count_rows(&self, table: &str) -> Result<u64> {
        let sql = self.dialect.build_count(&self.schema, table);
        let rows = self.query_rows(&sql, &[]).await?;
        let count = rows
            .into_iter()
            .next()
            .and_then(|row| row.get::<i32, _>(0))
            .unwrap_or(0);
        Ok(count.max(0) as u64)
    }

    async fn fetch_row(&self, table: &str, key: &str, id: &str) -> Result<Option<Row>> {
        let sql = self.dialect.build_select_row(&self.schema, table, key);
        let rows = self.query_rows(&sql, &[SqlValue::from(id)]).await?;
        Ok(rows.into_iter().next().map(convert_row))
    }

    async fn close(&self) {
        // bb8 closes connections when the pool drops
        debug!(
            "Releasing MSSQL pool ({} connections)",
            self.pool.state().connections
        );
    }
}

fn sql_value_to_sql_param(value: &SqlValue) -> Box<dyn ToSql> {
    match value {
        SqlValue::Null => Box::new(Option::<String>::None),
        SqlValue::Bool(b) => Box::new(*b),
        SqlValue::I64(i) => Box::new(*i),
        SqlValue::F64(f) => Box::new(*f),
        SqlValue::Decimal(d) => Box::new(*d),
        SqlValue::Text(s) => Box::new(s.clone()),
        SqlValue::DateTime(dt) => Box::new(*dt),
    }
}

/// Convert one result cell. Unknown encodings fall through a chain of
/// typed decoders and end as text.
fn column_data_to_sql(data: ColumnData<'static>) -> SqlValue {
    match data {
        ColumnData::Bit(v) => v.map(SqlValue::Bool).unwrap_or(SqlValue::Null),
        ColumnData::U8(v) => v.map(|n| SqlValue::I64(i64::from(n))).unwrap_or(SqlValue::Null),
        ColumnData::I16(v) => v.map(|n| SqlValue::I64(i64::from(n))).unwrap_or(SqlValue::Null),
        ColumnData::I32(v) => v.map(|n| SqlValue::I64(i64::from(n))).unwrap_or(SqlValue::Null),
        ColumnData::I64(v) => v.map(SqlValue::I64).unwrap_or(SqlValue::Null),
        ColumnData::F32(v) => v.map(|f| SqlValue::F64(f64::from(f))).unwrap_or(SqlValue::Null),
        ColumnData::F64(v) => v.map(SqlValue::F64).unwrap_or(SqlValue::Null),
        ColumnData::String(v) => v
            .map(|s| SqlValue::Text(s.into_owned()))
            .unwrap_or(SqlValue::Null),
        ColumnData::Guid(v) => v
            .map(|u| SqlValue::Text(u.to_string()))
            .unwrap_or(SqlValue::Null),
        ColumnData::Binary(v) => v
            .map(|b| SqlValue::Text(hex::encode(b.as_ref())))
            .unwrap_or(SqlValue::Null),
        other => {
            if let Ok(Some(d)) = Decimal::from_sql(&other) {
                return SqlValue::Decimal(d);
            }
            if let Ok(Some(dt)) = NaiveDateTime::from_sql(&other) {
                return SqlValue::DateTime(dt);
            }
            if let Ok(Some(d)) = NaiveDate::from_sql(&other) {
                return d
                    .and_hms_opt(0, 0, 0)
                    .map(SqlValue::DateTime)
                    .unwrap_or(SqlValue::Null);
            }
            if let Ok(Some(t)) = NaiveTime::from_sql(&other) {
                return SqlValue::Text(t.format("%H:%M:%S").to_string());
            }
            match <&str as FromSql>::from_sql(&other) {
                Ok(Some(s)) => SqlValue::Text(s.to_string()),
                _ => SqlValue::Null,
            }
        }
    }
}

fn convert_row(row: tiberius::Row) -> Row {
    let names: Vec<String> = row
        .columns()
        .iter()
        .map(|c| c.name().to_string())
        .collect();
    let mut out = Row::new();
    for (name, data) in names.into_iter().zip(row) {
        out.push(name, column_data_to_sql(data));
    }
    out
}
