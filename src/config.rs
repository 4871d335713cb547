//! Store connection configuration
//!
//! Connection parameters are configuration, not part of the algorithmic
//! contract: any store reachable over the network that provides the atomic
//! operations in [`crate::store::AtomicStore`] will do.

/// Configuration for the backing key-value store connection
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Store host name or address
    pub host: String,
    /// Store port
    pub port: u16,
    /// Database index to select
    pub database: i64,
    /// Connection timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Per-command response timeout in milliseconds
    pub response_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            database: 0,
            connect_timeout_ms: 5000,
            response_timeout_ms: 30000,
        }
    }
}

impl StoreConfig {
    /// Create a new config for a host and port
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            ..Default::default()
        }
    }

    /// Select a database index
    pub fn with_database(mut self, database: i64) -> Self {
        self.database = database;
        self
    }

    /// Set connect and response timeouts
    pub fn with_timeouts(mut self, connect_ms: u64, response_ms: u64) -> Self {
        self.connect_timeout_ms = connect_ms;
        self.response_timeout_ms = response_ms;
        self
    }

    /// Connection URL in `redis://host:port/db` form
    pub fn url(&self) -> String {
        format!("redis://{}:{}/{}", self.host, self.port, self.database)
    }
}
