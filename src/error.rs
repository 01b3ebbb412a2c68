//! Error type shared by every store operation.

use thiserror::Error;

/// Errors returned by [`DynamicRecordStore`](crate::DynamicRecordStore) operations.
///
/// Validation variants are raised before any SQL is built; the rest come from
/// the database or the blocking task that talks to it.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A table or column name failed the identifier allow-list.
    #[error("invalid identifier {name:?}: {reason}")]
    InvalidIdentifier { name: String, reason: &'static str },

    /// Create or update was called without any fields.
    #[error("field set is empty")]
    EmptyFields,

    /// A raw filter condition was blank or tried to stack statements.
    #[error("invalid condition: {0}")]
    InvalidCondition(String),

    /// A `key=value` body segment had no `=`.
    #[error("malformed form segment: {0:?}")]
    MalformedForm(String),

    /// The SQLite driver reported a failure.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A custom connection provider could not hand out a connection.
    #[error("connection provider error: {0}")]
    Provider(#[from] anyhow::Error),

    /// The blocking task panicked or was cancelled.
    #[error("task error: {0}")]
    Task(String),
}

impl StoreError {
    /// True when the failure happened at or below the database boundary.
    pub fn is_database(&self) -> bool {
        matches!(
            self,
            StoreError::Database(_) | StoreError::Provider(_) | StoreError::Task(_)
        )
    }

    /// True when the request was rejected before touching the database.
    pub fn is_validation(&self) -> bool {
        !self.is_database()
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
