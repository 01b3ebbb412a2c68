//! Dynamic SQLite record store for the Runar ecosystem.
//!
//! # Intention
//!
//! - Accept a table name plus a flat set of text fields and turn it into SQL.
//! - Create tables on first write, with an `id` key and one text column per field.
//! - Run every database call off the async runtime, one connection per call.
//!
//! # Architectural Boundaries
//!
//! - Only request-to-SQL translation and its execution belong here.
//! - HTTP routing and status mapping stay with the caller.
//!
//! # Example
//!
//! ```rust,ignore
//! use rust_record_store::{DynamicRecordStore, FieldSet, StoreConfig};
//!
//! let store = DynamicRecordStore::from_config(StoreConfig::new("records.db"));
//! let fields = FieldSet::parse_form("name=alice&age=30")?;
//! store.create("users", fields).await?;
//! let rows = store.read("users", "id = 1").await?;
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod record;
pub mod sql;
pub mod sqlite;

pub use config::StoreConfig;
pub use connection::{ConnectionProvider, SqliteConnectionProvider};
pub use error::{Result, StoreError};
pub use record::{Condition, FieldSet, Identifier, Row};
pub use sqlite::{
    CreateOperation, CrudOperation, CrudOutcome, DeleteOperation, DynamicRecordStore,
    ReadOperation, RecordStore, UpdateOperation, WriteOutcome,
};
