//! SQLite adapter.
//!
//! # Connection Modes
//! - File-based: `sqlite:///path/to/database.db` or `sqlite://./relative.db`
//! - In-memory: `sqlite::memory:` or `:memory:`
//!
//! SQLite cannot add several columns in one `ALTER TABLE`, so column
//! additions arrive here one statement at a time.

use super::{ConnectionConfig, DatabaseAdapter};
use crate::{Result, dialect::Dialect, error::TableKeeperError, models::DatabaseType, models::LiveColumn};
use async_trait::async_trait;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::str::FromStr;

/// SQLite database adapter.
///
/// Uses a single pooled connection. In-memory databases live exactly as long
/// as that connection, so it is never recycled.
pub struct SqliteAdapter {
    pool: SqlitePool,
    config: ConnectionConfig,
    connection_string: String,
}

impl std::fmt::Debug for SqliteAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteAdapter")
            .field("config", &self.config)
            .field("is_in_memory", &self.is_in_memory())
            .finish_non_exhaustive()
    }
}

impl SqliteAdapter {
    /// Opens an adapter with default settings.
    ///
    /// # Errors
    /// Returns error if the connection string is invalid or the database
    /// cannot be opened
    pub async fn new(connection_string: &str) -> Result<Self> {
        Self::with_config(connection_string, ConnectionConfig::default()).await
    }

    /// Opens an adapter with custom configuration.
    ///
    /// File databases are created when missing.
    ///
    /// # Errors
    /// Returns error if the connection string is invalid or the database
    /// cannot be opened
    pub async fn with_config(connection_string: &str, config: ConnectionConfig) -> Result<Self> {
        config.validate()?;
        let normalized = normalize_connection_string(connection_string);
        let options = SqliteConnectOptions::from_str(&normalized)
            .map_err(|e| {
                TableKeeperError::configuration(format!("Invalid SQLite connection string: {}", e))
            })?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(TableKeeperError::connection_failed)?;

        let config = ConnectionConfig {
            database: Some(extract_database_name(connection_string)),
            max_connections: 1,
            ..config
        };

        Ok(Self {
            pool,
            config,
            connection_string: connection_string.to_string(),
        })
    }

    /// Checks if the connection is to an in-memory database.
    pub fn is_in_memory(&self) -> bool {
        self.connection_string.contains(":memory:")
            || self.connection_string.contains("mode=memory")
    }

    /// Closes the connection gracefully.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl DatabaseAdapter for SqliteAdapter {
    async fn test_connection(&self) -> Result<()> {
        let result: i32 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(TableKeeperError::connection_failed)?;

        if result != 1 {
            return Err(TableKeeperError::configuration(
                "Basic connectivity test failed: unexpected result",
            ));
        }
        Ok(())
    }

    async fn table_exists(&self, table: &str) -> Result<bool> {
        let count: i64 =
            sqlx::query_scalar(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ? COLLATE NOCASE",
            )
                .bind(table)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| {
                    TableKeeperError::catalog_failed(
                        format!("Failed to check existence of table '{}'", table),
                        e,
                    )
                })?;
        Ok(count > 0)
    }

    async fn list_columns(&self, table: &str) -> Result<Vec<LiveColumn>> {
        let rows: Vec<(i64, String)> =
            sqlx::query_as("SELECT cid, name FROM pragma_table_info(?) ORDER BY cid")
                .bind(table)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| {
                    TableKeeperError::catalog_failed(
                        format!("Failed to list columns of table '{}'", table),
                        e,
                    )
                })?;

        rows.into_iter()
            .map(|(cid, name)| {
                let ordinal = u32::try_from(cid + 1).map_err(|_| {
                    TableKeeperError::configuration(format!(
                        "Unexpected column id {} in table '{}'",
                        cid, table
                    ))
                })?;
                Ok(LiveColumn::new(ordinal, name))
            })
            .collect()
    }

    async fn execute_ddl(&self, statement: &str) -> Result<()> {
        tracing::debug!(statement, "Executing DDL");
        sqlx::query(statement)
            .execute(&self.pool)
            .await
            .map_err(|e| TableKeeperError::execution_failed(statement, e))?;
        Ok(())
    }

    async fn insert_row(&self, statement: &str, values: &[Option<String>]) -> Result<u64> {
        let mut query = sqlx::query(statement);
        for value in values {
            query = query.bind(value.clone());
        }
        let result = query
            .execute(&self.pool)
            .await
            .map_err(|e| TableKeeperError::execution_failed(statement, e))?;
        Ok(result.rows_affected())
    }

    fn database_type(&self) -> DatabaseType {
        DatabaseType::SQLite
    }

    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn connection_config(&self) -> ConnectionConfig {
        self.config.clone()
    }
}

/// Normalizes connection string to SQLite URL format.
fn normalize_connection_string(connection_string: &str) -> String {
    if connection_string == ":memory:" {
        return "sqlite::memory:".to_string();
    }

    if connection_string.starts_with("sqlite:") {
        return connection_string.to_string();
    }

    format!("sqlite://{}", connection_string)
}

/// Extracts database name from connection string.
fn extract_database_name(connection_string: &str) -> String {
    if connection_string.contains(":memory:") {
        return ":memory:".to_string();
    }

    let path = connection_string
        .strip_prefix("sqlite://")
        .unwrap_or(connection_string);
    let path = path.split('?').next().unwrap_or(path);
    match path.rsplit('/').next() {
        Some(filename) if !filename.is_empty() => filename.to_string(),
        _ => "main".to_string(),
    }
}
