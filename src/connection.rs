//! Connection providers.
//!
//! The store never holds a connection between operations; it asks its
//! provider for a fresh one each time and drops it when the operation ends.
//! Pooling, if any, lives behind this trait.

use rusqlite::Connection;

use crate::config::StoreConfig;
use crate::error::Result;

/// Hands out one connection per store operation.
pub trait ConnectionProvider: Send + Sync + 'static {
    fn connect(&self) -> Result<Connection>;
}

impl<F> ConnectionProvider for F
where
    F: Fn() -> Result<Connection> + Send + Sync + 'static,
{
    fn connect(&self) -> Result<Connection> {
        self()
    }
}

/// Opens the configured SQLite file for every call.
#[derive(Debug, Clone)]
pub struct SqliteConnectionProvider {
    config: StoreConfig,
}

impl SqliteConnectionProvider {
    pub fn new(config: StoreConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }
}

impl ConnectionProvider for SqliteConnectionProvider {
    fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.config.db_path)?;
        conn.busy_timeout(self.config.busy_timeout())?;
        Ok(conn)
    }
}
