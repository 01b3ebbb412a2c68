use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, error, info, warn};
use rusqlite::types::ValueRef;
use rusqlite::{params, params_from_iter, Connection};
use serde::Serialize;

use crate::config::StoreConfig;
use crate::connection::{ConnectionProvider, SqliteConnectionProvider};
use crate::error::{Result, StoreError};
use crate::record::{Condition, FieldSet, Identifier, Row};
use crate::sql::{self, SqlQuery, TABLE_EXISTS_SQL};

/// Result of a successful create, update or delete.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WriteOutcome {
    /// Rows inserted, updated or deleted. Zero is still a success.
    pub rows_affected: usize,
    /// The write had to create its table first.
    pub table_created: bool,
}

/// CRUD operation types
#[derive(Debug, Clone, PartialEq)]
pub struct CreateOperation {
    pub table: String,
    pub fields: FieldSet,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReadOperation {
    pub table: String,
    pub condition: Condition,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateOperation {
    pub table: String,
    pub fields: FieldSet,
    pub condition: Condition,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteOperation {
    pub table: String,
    pub condition: Condition,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CrudOperation {
    Create(CreateOperation),
    Read(ReadOperation),
    Update(UpdateOperation),
    Delete(DeleteOperation),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CrudOutcome {
    Written(WriteOutcome),
    Rows(Vec<Row>),
}

/// The record store as seen by request handlers.
///
/// Handlers depend on this trait rather than on [`DynamicRecordStore`] so a
/// test double can stand in for the database.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn create(&self, table: &str, fields: FieldSet) -> Result<WriteOutcome>;

    async fn update(
        &self,
        table: &str,
        fields: FieldSet,
        condition: Condition,
    ) -> Result<WriteOutcome>;

    async fn delete(&self, table: &str, condition: Condition) -> Result<WriteOutcome>;

    async fn read(&self, table: &str, condition: Condition) -> Result<Vec<Row>>;

    /// Perform a CRUD operation described as a value.
    async fn execute(&self, op: CrudOperation) -> Result<CrudOutcome> {
        match op {
            CrudOperation::Create(op) => self
                .create(&op.table, op.fields)
                .await
                .map(CrudOutcome::Written),
            CrudOperation::Read(op) => self
                .read(&op.table, op.condition)
                .await
                .map(CrudOutcome::Rows),
            CrudOperation::Update(op) => self
                .update(&op.table, op.fields, op.condition)
                .await
                .map(CrudOutcome::Written),
            CrudOperation::Delete(op) => self
                .delete(&op.table, op.condition)
                .await
                .map(CrudOutcome::Written),
        }
    }
}

/// Translates table/field requests into SQL, creating tables on first write.
///
/// Each operation is lazy: nothing reaches the database until the returned
/// future is polled. It then takes one connection from the provider, runs its
/// statements on the blocking pool and drops the connection on every path.
pub struct DynamicRecordStore<P = SqliteConnectionProvider> {
    provider: Arc<P>,
    log_bound_sql: bool,
}

impl<P> Clone for DynamicRecordStore<P> {
    fn clone(&self) -> Self {
        Self {
            provider: self.provider.clone(),
            log_bound_sql: self.log_bound_sql,
        }
    }
}

impl DynamicRecordStore<SqliteConnectionProvider> {
    /// Create a store over the SQLite file named in the config.
    pub fn from_config(config: StoreConfig) -> Self {
        let log_bound_sql = config.log_bound_sql;
        info!("opening record store at path: {}", config.db_path);
        Self::new(SqliteConnectionProvider::new(config)).with_bound_sql_logging(log_bound_sql)
    }
}

impl<P: ConnectionProvider> DynamicRecordStore<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider: Arc::new(provider),
            log_bound_sql: false,
        }
    }

    pub fn with_bound_sql_logging(mut self, enabled: bool) -> Self {
        self.log_bound_sql = enabled;
        self
    }

    /// Insert one record, creating the table first if it does not exist.
    pub async fn create(&self, table: &str, fields: FieldSet) -> Result<WriteOutcome> {
        let table = checked("create", Identifier::new(table))?;
        checked("create", require_fields(&fields))?;
        let log_bound_sql = self.log_bound_sql;

        self.run("create", move |conn| {
            debug!("Checking if table exists: {table}");
            let table_created = if table_exists(conn, &table)? {
                false
            } else {
                info!("Table does not exist, creating table: {table}");
                create_table(conn, &table, &fields)?
            };
            let rows_affected = execute(conn, &sql::insert(&table, &fields), log_bound_sql)?;
            Ok(WriteOutcome {
                rows_affected,
                table_created,
            })
        })
        .await
    }

    /// Set `fields` on every row matching `condition`.
    pub async fn update(
        &self,
        table: &str,
        fields: FieldSet,
        condition: impl Into<Condition>,
    ) -> Result<WriteOutcome> {
        let table = checked("update", Identifier::new(table))?;
        checked("update", require_fields(&fields))?;
        let condition = condition.into();
        checked("update", condition.validate())?;
        let query = sql::update(&table, &fields, &condition);
        let log_bound_sql = self.log_bound_sql;

        self.run("update", move |conn| {
            let rows_affected = execute(conn, &query, log_bound_sql)?;
            Ok(WriteOutcome {
                rows_affected,
                table_created: false,
            })
        })
        .await
    }

    pub async fn delete(
        &self,
        table: &str,
        condition: impl Into<Condition>,
    ) -> Result<WriteOutcome> {
        let table = checked("delete", Identifier::new(table))?;
        let condition = condition.into();
        checked("delete", condition.validate())?;
        let query = sql::delete(&table, &condition);
        let log_bound_sql = self.log_bound_sql;

        self.run("delete", move |conn| {
            let rows_affected = execute(conn, &query, log_bound_sql)?;
            Ok(WriteOutcome {
                rows_affected,
                table_created: false,
            })
        })
        .await
    }

    /// Fetch every matching row with all values as text.
    ///
    /// A missing table is an error, not an empty result.
    pub async fn read(&self, table: &str, condition: impl Into<Condition>) -> Result<Vec<Row>> {
        let table = checked("read", Identifier::new(table))?;
        let condition = condition.into();
        checked("read", condition.validate())?;
        let query = sql::select(&table, &condition);

        self.run("read", move |conn| query_rows(conn, &query)).await
    }

    pub async fn table_exists(&self, table: &str) -> Result<bool> {
        let table = checked("table_exists", Identifier::new(table))?;
        self.run("table_exists", move |conn| table_exists(conn, &table))
            .await
    }

    /// Perform a CRUD operation described as a value.
    pub async fn execute(&self, op: CrudOperation) -> Result<CrudOutcome> {
        RecordStore::execute(self, op).await
    }

    // One connection per call, opened and dropped inside the blocking task.
    async fn run<T, F>(&self, op: &'static str, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let provider = self.provider.clone();
        let joined = tokio::task::spawn_blocking(move || {
            let conn = provider.connect()?;
            work(&conn)
        })
        .await;

        let result = match joined {
            Ok(result) => result,
            Err(e) => Err(StoreError::Task(format!("spawn_blocking join error: {e}"))),
        };
        if let Err(e) = &result {
            error!("{op} failed: {e}");
        }
        result
    }
}

#[async_trait]
impl<P: ConnectionProvider> RecordStore for DynamicRecordStore<P> {
    async fn create(&self, table: &str, fields: FieldSet) -> Result<WriteOutcome> {
        DynamicRecordStore::<P>::create(self, table, fields).await
    }

    async fn update(
        &self,
        table: &str,
        fields: FieldSet,
        condition: Condition,
    ) -> Result<WriteOutcome> {
        DynamicRecordStore::<P>::update(self, table, fields, condition).await
    }

    async fn delete(&self, table: &str, condition: Condition) -> Result<WriteOutcome> {
        DynamicRecordStore::<P>::delete(self, table, condition).await
    }

    async fn read(&self, table: &str, condition: Condition) -> Result<Vec<Row>> {
        DynamicRecordStore::<P>::read(self, table, condition).await
    }
}

fn checked<T>(op: &str, result: Result<T>) -> Result<T> {
    if let Err(e) = &result {
        warn!("{op} rejected: {e}");
    }
    result
}

fn require_fields(fields: &FieldSet) -> Result<()> {
    if fields.is_empty() {
        return Err(StoreError::EmptyFields);
    }
    Ok(())
}

fn table_exists(conn: &Connection, table: &Identifier) -> Result<bool> {
    let count: i64 = conn.query_row(TABLE_EXISTS_SQL, params![table.as_str()], |row| {
        row.get(0)
    })?;
    Ok(count > 0)
}

// Returns whether this call created the table. Losing a creation race to a
// concurrent writer is not an error: the table exists either way.
fn create_table(conn: &Connection, table: &Identifier, fields: &FieldSet) -> Result<bool> {
    let query = sql::create_table(table, fields);
    info!("Creating table with SQL: {}", query.statement);
    match conn.execute(&query.statement, []) {
        Ok(_) => Ok(true),
        Err(e) => {
            if table_exists(conn, table)? {
                debug!("Table {table} was created concurrently ({e}), continuing with insert");
                Ok(false)
            } else {
                Err(e.into())
            }
        }
    }
}

fn execute(conn: &Connection, query: &SqlQuery, log_bound_sql: bool) -> Result<usize> {
    debug!("Executing SQL: {}", query.statement);
    if log_bound_sql {
        debug!("Bound SQL: {}", query.render_bound());
    }
    Ok(conn.execute(&query.statement, params_from_iter(query.params.iter()))?)
}

fn query_rows(conn: &Connection, query: &SqlQuery) -> Result<Vec<Row>> {
    debug!("Executing SQL: {}", query.statement);
    let mut stmt = conn.prepare(&query.statement)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

    let mut rows = stmt.query(params_from_iter(query.params.iter()))?;
    let mut result = Vec::new();
    while let Some(row) = rows.next()? {
        let mut record = Row::with_capacity(columns.len());
        for (i, name) in columns.iter().enumerate() {
            if let Some(text) = value_to_text(row.get_ref(i)?) {
                record.insert(name.clone(), text);
            }
        }
        result.push(record);
    }
    Ok(result)
}

fn value_to_text(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(i.to_string()),
        // Debug keeps the trailing `.0` SQLite prints for whole reals.
        ValueRef::Real(f) => Some(format!("{f:?}")),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Some(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_to_text() {
        assert_eq!(value_to_text(ValueRef::Null), None);
        assert_eq!(value_to_text(ValueRef::Integer(42)), Some("42".to_string()));
        assert_eq!(value_to_text(ValueRef::Real(1.5)), Some("1.5".to_string()));
        assert_eq!(value_to_text(ValueRef::Real(30.0)), Some("30.0".to_string()));
        assert_eq!(
            value_to_text(ValueRef::Text(b"alice")),
            Some("alice".to_string())
        );
    }

    #[test]
    fn test_create_table_tolerates_existing_table() {
        let conn = Connection::open_in_memory().unwrap();
        let table = Identifier::new("users").unwrap();
        let fields = FieldSet::new().with_field("name", "alice").unwrap();

        assert!(!table_exists(&conn, &table).unwrap());
        assert!(create_table(&conn, &table, &fields).unwrap());
        assert!(table_exists(&conn, &table).unwrap());
        // A second attempt, as a racing writer would make, reports no creation.
        assert!(!create_table(&conn, &table, &fields).unwrap());
    }

    #[test]
    fn test_table_exists_ignores_case() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE users (id INTEGER PRIMARY KEY)")
            .unwrap();

        assert!(table_exists(&conn, &Identifier::new("Users").unwrap()).unwrap());
        assert!(table_exists(&conn, &Identifier::new("USERS").unwrap()).unwrap());
        assert!(!table_exists(&conn, &Identifier::new("user").unwrap()).unwrap());
    }

    #[test]
    fn test_query_rows_reals_keep_sqlite_text_form() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE m (v REAL);
             INSERT INTO m (v) VALUES (30.0), (0.25);",
        )
        .unwrap();

        let rows = query_rows(&conn, &SqlQuery::new("SELECT v FROM m ORDER BY v DESC")).unwrap();
        let values: Vec<&str> = rows.iter().map(|r| r["v"].as_str()).collect();
        let rendered: Vec<String> = conn
            .prepare("SELECT CAST(v AS TEXT) FROM m ORDER BY v DESC")
            .unwrap()
            .query_map([], |row| row.get::<_, String>(0))
            .unwrap()
            .collect::<rusqlite::Result<_>>()
            .unwrap();
        assert_eq!(values, vec!["30.0", "0.25"]);
        assert_eq!(values, rendered);
    }

    #[test]
    fn test_query_rows_omits_nulls() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE t (id INTEGER PRIMARY KEY, a TEXT, b TEXT);
             INSERT INTO t (a, b) VALUES ('x', NULL);",
        )
        .unwrap();

        let rows = query_rows(&conn, &SqlQuery::new("SELECT * FROM t")).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("id").map(String::as_str), Some("1"));
        assert_eq!(rows[0].get("a").map(String::as_str), Some("x"));
        assert!(!rows[0].contains_key("b"));
    }
}
