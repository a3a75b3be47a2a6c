//! Database connection configuration.

use std::time::Duration;

/// Pool and timeout settings shared by all adapters.
///
/// This struct intentionally does NOT store passwords or credentials.
///
/// # Example
/// ```rust
/// use tablekeeper_core::adapters::ConnectionConfig;
/// use std::time::Duration;
///
/// let config = ConnectionConfig::default().with_connect_timeout(Duration::from_secs(5));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Optional host, for display only
    pub host: Option<String>,
    /// Optional database name, for display only
    pub database: Option<String>,
    /// Connection establishment timeout
    pub connect_timeout: Duration,
    /// Time to wait for a pooled connection
    pub acquire_timeout: Duration,
    /// Maximum number of connections in pool
    pub max_connections: u32,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: None,
            database: None,
            connect_timeout: Duration::from_secs(30),
            acquire_timeout: Duration::from_secs(30),
            max_connections: 5,
        }
    }
}

impl std::fmt::Display for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ConnectionConfig({}{})",
            self.host.as_deref().unwrap_or("local"),
            self.database
                .as_ref()
                .map_or_else(String::new, |db| format!("/{}", db))
        )
    }
}

impl ConnectionConfig {
    /// Validates connection configuration parameters.
    ///
    /// # Errors
    /// Returns error if configuration values are invalid or unsafe
    pub fn validate(&self) -> crate::Result<()> {
        if self.max_connections == 0 {
            return Err(crate::error::TableKeeperError::configuration(
                "max_connections must be greater than 0",
            ));
        }

        if self.max_connections > 100 {
            return Err(crate::error::TableKeeperError::configuration(
                "max_connections should not exceed 100 for safety",
            ));
        }

        if self.connect_timeout.is_zero() {
            return Err(crate::error::TableKeeperError::configuration(
                "connect_timeout must be greater than 0",
            ));
        }

        if self.acquire_timeout.is_zero() {
            return Err(crate::error::TableKeeperError::configuration(
                "acquire_timeout must be greater than 0",
            ));
        }

        Ok(())
    }

    /// Builder method to set host.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Builder method to set database.
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Builder method to set the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Builder method to set the pool size.
    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }
}
