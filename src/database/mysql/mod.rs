// MySQL access for the city event tables
// Schema introspection and execution of generated SQL over the text protocol


use anyhow::{Context, Result, bail};
use itertools::Itertools;
use serde_json::{Map, Number, Value};
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions, MySqlRow};
use sqlx::{Column, MySql, Pool, Row, TypeInfo, ValueRef};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::DatabaseConfig;
use crate::config::settings::is_valid_table_name;

pub type DbPool = Pool<MySql>;

const ACQUIRE_TIMEOUT_SECONDS: u64 = 10;

#[derive(Debug, Clone)]
pub struct Database {
    pool: DbPool,
}

/// One result row, columns in select order
#[derive(Debug, Clone, PartialEq)]
pub struct SqlRow {
    values: Vec<(String, Value)>,
}

impl SqlRow {
    #[inline]
    pub fn new(values: Vec<(String, Value)>) -> Self {
        Self { values }
    }

    #[inline]
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|(name, _)| name.as_str())
    }

    #[inline]
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// JSON object with keys in column order
    #[inline]
    pub fn to_json(&self) -> Value {
        let map: Map<String, Value> = self.values.iter().cloned().collect();
        Value::Object(map)
    }
}

impl fmt::Display for SqlRow {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

/// One JSON object per row, rows separated by newlines
#[inline]
pub fn render_rows(rows: &[SqlRow]) -> String {
    rows.iter().map(ToString::to_string).join("\n")
}

/// Convert a text-protocol value to JSON, keeping numeric columns numeric
#[inline]
pub fn column_value(type_name: &str, text: Option<String>) -> Value {
    let Some(text) = text else {
        return Value::Null;
    };

    let upper = type_name.to_ascii_uppercase();
    let numeric = ["INT", "DECIMAL", "DOUBLE", "FLOAT", "NUMERIC", "REAL"]
        .iter()
        .any(|kind| upper.contains(kind));

    if numeric {
        if let Ok(number) = text.parse::<Number>() {
            return Value::Number(number);
        }
    }

    Value::String(text)
}

impl Database {
    fn connect_options(config: &DatabaseConfig) -> MySqlConnectOptions {
        MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password)
            .database(&config.database)
            .charset(&config.charset)
    }

    fn pool_options() -> MySqlPoolOptions {
        MySqlPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(ACQUIRE_TIMEOUT_SECONDS))
    }

    /// Create a pool that connects on first use
    #[inline]
    pub fn connect_lazy(config: &DatabaseConfig) -> Self {
        debug!(
            "Configuring MySQL pool for {}@{}:{}/{}",
            config.user, config.host, config.port, config.database
        );
        let pool = Self::pool_options().connect_lazy_with(Self::connect_options(config));
        Self { pool }
    }

    /// Create a pool and establish a first connection
    #[inline]
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = Self::pool_options()
            .connect_with(Self::connect_options(config))
            .await
            .with_context(|| {
                format!(
                    "Failed to connect to MySQL at {}:{}/{}",
                    config.host, config.port, config.database
                )
            })?;

        info!(
            "Connected to MySQL at {}:{}/{}",
            config.host, config.port, config.database
        );
        Ok(Self { pool })
    }

    #[inline]
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// DDL of `table` as reported by `SHOW CREATE TABLE`
    #[inline]
    pub async fn show_create_table(&self, table: &str) -> Result<String> {
        if !is_valid_table_name(table) {
            bail!("Invalid table name: {table}");
        }

        let sql = format!("SHOW CREATE TABLE `{table}`");
        let row = sqlx::raw_sql(&sql)
            .fetch_one(&self.pool)
            .await
            .with_context(|| format!("Failed to describe table {table}"))?;

        // Columns are `Table` and `Create Table`
        let ddl = text_value(&row, 1)?
            .with_context(|| format!("SHOW CREATE TABLE returned no DDL for {table}"))?;

        debug!("Fetched {} bytes of DDL for {}", ddl.len(), table);
        Ok(ddl)
    }

    /// Run arbitrary SQL and collect every returned row
    #[inline]
    pub async fn fetch_rows(&self, sql: &str) -> Result<Vec<SqlRow>> {
        debug!("Executing SQL: {}", sql);

        let rows = sqlx::raw_sql(sql)
            .fetch_all(&self.pool)
            .await
            .context("Failed to execute SQL")?;

        let rows = rows.iter().map(convert_row).collect::<Result<Vec<_>>>()?;
        info!("SQL returned {} rows", rows.len());
        Ok(rows)
    }

    #[inline]
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn text_value(row: &MySqlRow, index: usize) -> Result<Option<String>> {
    let raw = row
        .try_get_raw(index)
        .with_context(|| format!("Missing column {index}"))?;
    if raw.is_null() {
        return Ok(None);
    }

    match row.try_get_unchecked::<String, _>(index) {
        Ok(text) => Ok(Some(text)),
        Err(_) => {
            let bytes: Vec<u8> = row
                .try_get_unchecked(index)
                .with_context(|| format!("Failed to decode column {index}"))?;
            Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
        }
    }
}

fn convert_row(row: &MySqlRow) -> Result<SqlRow> {
    let values = row
        .columns()
        .iter()
        .map(|column| {
            let text = text_value(row, column.ordinal())?;
            Ok((
                column.name().to_string(),
                column_value(column.type_info().name(), text),
            ))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(SqlRow::new(values))
}
