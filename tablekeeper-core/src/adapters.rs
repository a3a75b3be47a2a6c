//! Database adapter trait and factory.
//!
//! An adapter is the only component that talks to the database. It answers
//! catalog questions with parameterized queries and runs statements that the
//! [`Dialect`](crate::dialect::Dialect) layer has already built from
//! validated identifiers.

use crate::{Result, dialect::Dialect, models::DatabaseType, models::LiveColumn};
use async_trait::async_trait;

mod connection;
#[cfg(feature = "mssql")]
pub mod mssql;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use connection::ConnectionConfig;

/// Main trait for database adapters with object-safe design
///
/// # Object Safety
/// This trait is object-safe, allowing for dynamic dispatch through
/// `Box<dyn DatabaseAdapter>` or `Arc<dyn DatabaseAdapter>`.
#[async_trait]
pub trait DatabaseAdapter: Send + Sync {
    /// Tests the database connection
    ///
    /// # Errors
    /// Returns error if connection fails or times out
    async fn test_connection(&self) -> Result<()>;

    /// Checks whether a base table named `table` exists.
    ///
    /// The name is bound as a parameter, never interpolated.
    ///
    /// # Errors
    /// Returns a catalog error if the lookup fails
    async fn table_exists(&self, table: &str) -> Result<bool>;

    /// Lists the columns of `table` ordered by ordinal position.
    ///
    /// Returns an empty list when the table does not exist.
    ///
    /// # Errors
    /// Returns a catalog error if the lookup fails
    async fn list_columns(&self, table: &str) -> Result<Vec<LiveColumn>>;

    /// Runs a DDL statement built by the dialect layer.
    ///
    /// # Errors
    /// Returns an execution error if the statement fails
    async fn execute_ddl(&self, statement: &str) -> Result<()>;

    /// Runs a parameterized insert, binding `values` in order.
    ///
    /// # Returns
    /// Number of rows affected
    ///
    /// # Errors
    /// Returns an execution error if the statement fails
    async fn insert_row(&self, statement: &str, values: &[Option<String>]) -> Result<u64>;

    /// Returns the database type this adapter handles
    fn database_type(&self) -> DatabaseType;

    /// SQL flavour used to build statements for this adapter
    fn dialect(&self) -> Dialect;

    /// Gets the connection configuration (credentials never included)
    fn connection_config(&self) -> ConnectionConfig;
}

/// Factory function to create database adapters based on connection string
///
/// # Errors
/// Returns error if:
/// - Connection string format is invalid
/// - Database type is not supported
/// - Required features are not compiled in
///
/// # Example
/// ```rust,no_run
/// use tablekeeper_core::adapters::create_adapter;
///
/// # async fn example() -> tablekeeper_core::Result<()> {
/// let adapter = create_adapter("sqlite::memory:").await?;
/// let exists = adapter.table_exists("Chamados").await?;
/// println!("Chamados exists: {exists}");
/// # Ok(())
/// # }
/// ```
pub async fn create_adapter(connection_string: &str) -> Result<Box<dyn DatabaseAdapter>> {
    create_adapter_with_config(connection_string, ConnectionConfig::default()).await
}

/// Like [`create_adapter`] with explicit pool and timeout settings.
///
/// # Errors
/// As [`create_adapter`], plus invalid `config` values.
pub async fn create_adapter_with_config(
    connection_string: &str,
    config: ConnectionConfig,
) -> Result<Box<dyn DatabaseAdapter>> {
    config.validate()?;
    let database_type = detect_database_type(connection_string)?;

    match database_type {
        #[cfg(feature = "sqlite")]
        DatabaseType::SQLite => {
            let adapter =
                crate::adapters::sqlite::SqliteAdapter::with_config(connection_string, config)
                    .await?;
            Ok(Box::new(adapter))
        }
        #[cfg(not(feature = "sqlite"))]
        DatabaseType::SQLite => Err(crate::error::TableKeeperError::unsupported_feature(
            "SQLite adapter",
            "Compile with --features sqlite to enable SQLite support",
        )),
        #[cfg(feature = "mssql")]
        DatabaseType::SqlServer => {
            let adapter =
                crate::adapters::mssql::SqlServerAdapter::new(connection_string, config)?;
            Ok(Box::new(adapter))
        }
        #[cfg(not(feature = "mssql"))]
        DatabaseType::SqlServer => Err(crate::error::TableKeeperError::unsupported_feature(
            "SQL Server adapter",
            "Compile with --features mssql to enable SQL Server support",
        )),
    }
}

/// Detects database type from connection string
///
/// # Errors
/// Returns error if connection string format is unrecognized
pub fn detect_database_type(connection_string: &str) -> Result<DatabaseType> {
    if connection_string.starts_with("sqlite:")
        || connection_string == ":memory:"
        || connection_string.ends_with(".db")
        || connection_string.ends_with(".sqlite")
        || connection_string.ends_with(".sqlite3")
    {
        Ok(DatabaseType::SQLite)
    } else if connection_string.starts_with("mssql://")
        || connection_string.starts_with("sqlserver://")
    {
        Ok(DatabaseType::SqlServer)
    } else {
        Err(crate::error::TableKeeperError::configuration(
            "Unrecognized database connection string format",
        ))
    }
}
