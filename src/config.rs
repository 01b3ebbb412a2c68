//! Store configuration.

use std::time::Duration;

use serde::Deserialize;

const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Configuration for [`SqliteConnectionProvider`](crate::SqliteConnectionProvider)
/// and the store built on it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path to the SQLite database file. `:memory:` gives every connection its
    /// own private database.
    pub db_path: String,
    /// How long a connection waits on a locked database before failing.
    pub busy_timeout_ms: u64,
    /// Log each write with its values substituted in, at debug level.
    pub log_bound_sql: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: "records.db".to_string(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            log_bound_sql: false,
        }
    }
}

impl StoreConfig {
    /// Create a config for the given database path with default settings.
    pub fn new(db_path: impl Into<String>) -> Self {
        Self {
            db_path: db_path.into(),
            ..Self::default()
        }
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout_ms = timeout.as_millis().try_into().unwrap_or(u64::MAX);
        self
    }

    pub fn with_bound_sql_logging(mut self, enabled: bool) -> Self {
        self.log_bound_sql = enabled;
        self
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}
