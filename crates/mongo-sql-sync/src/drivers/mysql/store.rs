//! MySQL destination store.
//!
//! Uses mysql_async for connection pooling. Every operation takes one
//! connection from the pool; it is returned when the guard drops.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use mysql_async::consts::ColumnType;
use mysql_async::prelude::*;
use mysql_async::{Conn, Opts, OptsBuilder, Params, Pool, PoolConstraints, PoolOpts, SslOpts};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use super::MysqlDialect;
use crate::config::TargetConfig;
use crate::core::traits::{DestinationStore, Dialect};
use crate::core::{Row, SqlValue};
use crate::drivers::DialectImpl;
use crate::error::{Result, SyncError};

/// MySQL destination using mysql_async.
pub struct MysqlStore {
    pool: Pool,
    schema: String,
    dialect: DialectImpl,
}

impl MysqlStore {
    /// Create a pool from configuration and verify it with a round trip.
    pub async fn connect(config: &TargetConfig) -> Result<Self> {
        let ssl_opts = match config.ssl_mode.to_lowercase().as_str() {
            "disable" => {
                warn!("MySQL TLS is disabled. Credentials will be transmitted in plaintext.");
                None
            }
            "require" => Some(SslOpts::default()),
            _ => Some(SslOpts::default().with_danger_accept_invalid_certs(true)),
        };

        let mut builder = OptsBuilder::default()
            .ip_or_hostname(config.host.as_str())
            .tcp_port(config.get_port())
            .db_name(Some(config.database.as_str()))
            .user(Some(config.user.as_str()))
            .pass(Some(config.password.as_str()))
            // Use utf8mb4 for full Unicode support
            .init(vec!["SET NAMES utf8mb4"]);

        if let Some(ssl) = ssl_opts {
            builder = builder.ssl_opts(ssl);
        }

        let max_conns = config.get_max_connections() as usize;
        let constraints = PoolConstraints::new(1, max_conns.max(1)).ok_or_else(|| {
            SyncError::Config(format!("invalid MySQL pool size {}", max_conns))
        })?;
        let opts: Opts = builder
            .pool_opts(PoolOpts::new().with_constraints(constraints))
            .into();

        let store = Self {
            pool: Pool::new(opts),
            schema: config.get_schema(),
            dialect: DialectImpl::Mysql(MysqlDialect::new()),
        };
        store.ping().await?;

        info!(
            "Connected to MySQL target: {}:{}/{}",
            config.host,
            config.get_port(),
            config.database
        );

        Ok(store)
    }

    async fn conn(&self, context: &str) -> Result<Conn> {
        self.pool
            .get_conn()
            .await
            .map_err(|e| SyncError::connection(e, context.to_string()))
    }

    async fn exec(&self, sql: &str, params: Vec<SqlValue>, context: &str) -> Result<u64> {
        let mut conn = self.conn(context).await?;
        let values: Vec<mysql_async::Value> = params.iter().map(sql_value_to_mysql).collect();
        conn.exec_drop(sql, Params::Positional(values)).await?;
        Ok(conn.affected_rows())
    }

    fn row_params(row: &Row) -> (Vec<String>, Vec<SqlValue>) {
        let columns = row.columns().map(str::to_string).collect();
        let values = row.values().cloned().collect();
        (columns, values)
    }
}

#[async_trait]
impl DestinationStore for MysqlStore {
    fn dialect(&self) -> &DialectImpl {
        &self.dialect
    }

    fn schema(&self) -> &str {
        &self.schema
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn("testing MySQL connection").await?;
        conn.query_drop("SELECT 1")
            .await
            .map_err(|e| SyncError::connection(e, "testing MySQL connection"))?;
        Ok(())
    }

    async fn table_exists(&self, table: &str) -> Result<bool> {
        let mut conn = self.conn("checking MySQL table").await?;
        let count: Option<i64> = conn
            .exec_first(
                self.dialect.table_exists_query(),
                (self.schema.as_str(), table),
            )
            .await?;
        Ok(count.unwrap_or(0) > 0)
    }

    async fn column_names(&self, table: &str) -> Result<Vec<String>> {
        let mut conn = self.conn("reading MySQL columns").await?;
        let names: Vec<String> = conn
            .exec(
                self.dialect.column_names_query(),
                (self.schema.as_str(), table),
            )
            .await?;
        Ok(names)
    }

    async fn execute(&self, sql: &str) -> Result<u64> {
        let mut conn = self.conn("executing MySQL statement").await?;
        debug!("MySQL: {}", sql);
        conn.query_drop(sql).await?;
        Ok(conn.affected_rows())
    }

    async fn fetch_keys(&self, table: &str, key: &str) -> Result<HashSet<String>> {
        let mut conn = self.conn("reading MySQL keys").await?;
        let sql = self.dialect.build_select_keys(&self.schema, table, key);
        let rows: Vec<mysql_async::Row> = conn.query(sql).await?;
        let mut keys = HashSet::with_capacity(rows.len());
        for row in rows {
            if let Some(value) = row.as_ref(0) {
                match mysql_value_to_sql(value, ColumnType::MYSQL_TYPE_VAR_STRING) {
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
        let (columns, values) = Self::row_params(row);
        let sql = self.dialect.build_insert(&self.schema, table, &columns);
        self.exec(&sql, values, "inserting MySQL row").await
    }

    async fn upsert_row(&self, table: &str, key: &str, row: &Row) -> Result<u64> {
        let (columns, values) = Self::row_params(row);
        let sql = self.dialect.build_upsert(&self.schema, table, &columns, key);
        self.exec(&sql, values, "upserting MySQL row").await
    }

    async fn update_row(&self, table: &str, key: &str, row: &Row) -> Result<u64> {
        let (columns, _) = Self::row_params(row);
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
        self.exec(&sql, values, "updating MySQL row").await
    }

    async fn delete_row(&self, table: &str, key: &str, id: &str) -> Result<u64> {
        let sql = self.dialect.build_delete(&self.schema, table, key);
        self.exec(&sql, vec![SqlValue::from(id)], "deleting MySQL row").await
    }

    async fn delete_children(&self, table: &str, fk_column: &str, id: &str) -> Result<u64> {
        let sql = self.dialect.build_delete(&self.schema, table, fk_column);
        self.exec(&sql, vec![SqlValue::from(id)], "deleting MySQL child rows")
            .await
    }

    async fn count_rows(&self, table: &str) -> Result<u64> {
        let mut conn = self.conn("counting MySQL rows").await?;
        let count: Option<i64> = conn
            .query_first(self.dialect.build_count(&self.schema, table))
            .await?;
        Ok(count.unwrap_or(0).max(0) as u64)
    }

    async fn fetch_row(&self, table: &str, key: &str, id: &str) -> Result<Option<Row>> {
        let mut conn = self.conn("reading MySQL row").await?;
        let sql = self.dialect.build_select_row(&self.schema, table, key);
        let row: Option<mysql_async::Row> = conn
            .exec_first(sql, Params::Positional(vec![mysql_async::Value::from(id)]))
            .await?;
        Ok(row.map(convert_row))
    }

    async fn close(&self) {
        if let Err(e) = self.pool.clone().disconnect().await {
            warn!("Error closing MySQL pool: {}", e);
        }
    }
}

/// Convert a bound value to the mysql_async representation.
///
/// Timestamps are bound in whole seconds. `DATETIME` columns round a
/// fraction instead of truncating it.
fn sql_value_to_mysql(value: &SqlValue) -> mysql_async::Value {
    use mysql_async::Value;

    match value {
        SqlValue::Null => Value::NULL,
        SqlValue::Bool(b) => Value::Int(i64::from(*b)),
        SqlValue::I64(i) => Value::Int(*i),
        SqlValue::F64(f) => Value::Double(*f),
        SqlValue::Decimal(d) => Value::Bytes(d.to_string().into_bytes()),
        SqlValue::Text(s) => Value::Bytes(s.as_bytes().to_vec()),
        SqlValue::DateTime(dt) => Value::Date(
            dt.year() as u16,
            dt.month() as u8,
            dt.day() as u8,
            dt.hour() as u8,
            dt.minute() as u8,
            dt.second() as u8,
            0,
        ),
    }
}

/// Convert a result value, using the column type for text-encoded values.
fn mysql_value_to_sql(value: &mysql_async::Value, column_type: ColumnType) -> SqlValue {
    use mysql_async::Value;

    match value {
        Value::NULL => SqlValue::Null,
        Value::Int(i) => SqlValue::I64(*i),
        Value::UInt(u) => match i64::try_from(*u) {
            Ok(i) => SqlValue::I64(i),
            Err(_) => SqlValue::Decimal(Decimal::from(*u)),
        },
        Value::Float(f) => SqlValue::F64(f64::from(*f)),
        Value::Double(f) => SqlValue::F64(*f),
        Value::Date(y, mo, d, h, mi, s, us) => NaiveDate::from_ymd_opt(*y as i32, *mo as u32, *d as u32)
            .and_then(|date| date.and_hms_micro_opt(*h as u32, *mi as u32, *s as u32, *us))
            .map(SqlValue::DateTime)
            .unwrap_or(SqlValue::Null),
        Value::Time(neg, days, h, mi, s, _) => {
            let hours = *days * 24 + u32::from(*h);
            let sign = if *neg { "-" } else { "" };
            SqlValue::Text(format!("{}{:02}:{:02}:{:02}", sign, hours, mi, s))
        }
        Value::Bytes(bytes) => {
            let text = String::from_utf8_lossy(bytes).into_owned();
            match column_type {
                ColumnType::MYSQL_TYPE_DECIMAL | ColumnType::MYSQL_TYPE_NEWDECIMAL => text
                    .parse::<Decimal>()
                    .map(SqlValue::Decimal)
                    .unwrap_or(SqlValue::Text(text)),
                ColumnType::MYSQL_TYPE_TINY
                | ColumnType::MYSQL_TYPE_SHORT
                | ColumnType::MYSQL_TYPE_INT24
                | ColumnType::MYSQL_TYPE_LONG
                | ColumnType::MYSQL_TYPE_LONGLONG => text
                    .parse::<i64>()
                    .map(SqlValue::I64)
                    .unwrap_or(SqlValue::Text(text)),
                ColumnType::MYSQL_TYPE_FLOAT | ColumnType::MYSQL_TYPE_DOUBLE => text
                    .parse::<f64>()
                    .map(SqlValue::F64)
                    .unwrap_or(SqlValue::Text(text)),
                ColumnType::MYSQL_TYPE_DATETIME | ColumnType::MYSQL_TYPE_TIMESTAMP => {
                    NaiveDateTime::parse_from_str(&text, "%Y-%m-%d %H:%M:%S%.f")
                        .map(SqlValue::DateTime)
                        .unwrap_or(SqlValue::Text(text))
                }
                _ => SqlValue::Text(text),
            }
        }
    }
}

fn convert_row(row: mysql_async::Row) -> Row {
    let mut out = Row::new();
    for (idx, column) in row.columns_ref().iter().enumerate() {
        let value = row
            .as_ref(idx)
            .map(|v| mysql_value_to_sql(v, column.column_type()))
            .unwrap_or(SqlValue::Null);
        out.push(column.name_str().to_string(), value);
    }
    out
}
