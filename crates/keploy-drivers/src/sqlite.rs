// crates/keploy-drivers/src/sqlite.rs
// ============================================================================
// Module: SQLite Backend
// Description: SqlBackend implementation over a shared rusqlite connection.
// Purpose: Provide a real SQL backend for instrumented services and tests.
// Dependencies: rusqlite, tracing
// ============================================================================

//! ## Overview
//! One [`rusqlite::Connection`] guarded by a mutex. Query results are
//! materialized before the lock is released, so the returned rows are plain
//! [`BufferedRows`]. Transactions issue `BEGIN`/`COMMIT`/`ROLLBACK` on the
//! same connection and therefore serialize with every other caller.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use rusqlite::Connection;
use rusqlite::params_from_iter;
use rusqlite::types::Value;
use rusqlite::types::ValueRef;
use tracing::debug;
use tracing::warn;

use crate::sql::BufferedRows;
use crate::sql::ExecResult;
use crate::sql::Row;
use crate::sql::SqlBackend;
use crate::sql::SqlError;
use crate::sql::SqlRows;
use crate::sql::SqlTx;
use crate::sql::SqlValue;

// ============================================================================
// SECTION: Backend
// ============================================================================

/// `SQLite` backend sharing one connection.
#[derive(Debug, Clone)]
pub struct SqliteBackend {
    /// Shared connection.
    connection: Arc<Mutex<Connection>>,
}

impl SqliteBackend {
    /// Opens a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError::Backend`] when `SQLite` cannot open it.
    pub fn open_in_memory() -> Result<Self, SqlError> {
        Ok(Self::from_connection(Connection::open_in_memory()?))
    }

    /// Opens or creates a database file.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError::Backend`] when `SQLite` cannot open it.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SqlError> {
        let path = path.as_ref();
        let connection = Connection::open(path)?;
        debug!(path = %path.display(), "opened sqlite database");
        Ok(Self::from_connection(connection))
    }

    /// Wraps an existing connection.
    #[must_use]
    pub fn from_connection(connection: Connection) -> Self {
        Self {
            connection: Arc::new(Mutex::new(connection)),
        }
    }

    /// Runs a batch of statements without instrumentation.
    ///
    /// Intended for schema setup and seeding.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError`] when a statement fails.
    pub fn execute_batch(&self, sql: &str) -> Result<(), SqlError> {
        lock(&self.connection)?.execute_batch(sql)?;
        Ok(())
    }
}

impl SqlBackend for SqliteBackend {
    fn query(&self, sql: &str, args: &[SqlValue]) -> Result<Box<dyn SqlRows>, SqlError> {
        let connection = lock(&self.connection)?;
        let mut statement = connection.prepare(sql)?;
        let columns: Vec<String> =
            statement.column_names().into_iter().map(str::to_string).collect();
        let width = columns.len();
        let mut rows = statement.query(params_from_iter(args.iter().map(to_sqlite)))?;
        let mut buffered: Vec<Row> = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(width);
            for index in 0 .. width {
                values.push(from_sqlite(row.get_ref(index)?));
            }
            buffered.push(values);
        }
        Ok(Box::new(BufferedRows::new(columns, buffered)))
    }

    fn exec(&self, sql: &str, args: &[SqlValue]) -> Result<ExecResult, SqlError> {
        execute(&*lock(&self.connection)?, sql, args)
    }

    fn begin(&self) -> Result<Box<dyn SqlTx>, SqlError> {
        lock(&self.connection)?.execute_batch("BEGIN")?;
        Ok(Box::new(SqliteTx {
            connection: Arc::clone(&self.connection),
        }))
    }
}

// ============================================================================
// SECTION: Transactions
// ============================================================================

/// Open `SQLite` transaction.
struct SqliteTx {
    /// Connection the transaction was started on.
    connection: Arc<Mutex<Connection>>,
}

impl SqlTx for SqliteTx {
    fn exec(&mut self, sql: &str, args: &[SqlValue]) -> Result<ExecResult, SqlError> {
        execute(&*lock(&self.connection)?, sql, args)
    }

    fn commit(&mut self) -> Result<(), SqlError> {
        lock(&self.connection)?.execute_batch("COMMIT")?;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), SqlError> {
        lock(&self.connection)?.execute_batch("ROLLBACK")?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

impl From<rusqlite::Error> for SqlError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::QueryReturnedNoRows => Self::NoRows,
            other => Self::Backend(other.to_string()),
        }
    }
}

/// Locks the connection; a poisoned lock is a bad connection.
fn lock(connection: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>, SqlError> {
    connection.lock().map_err(|_| {
        warn!("sqlite connection lock poisoned");
        SqlError::BadConn
    })
}

/// Runs a statement and reports its effect.
fn execute(connection: &Connection, sql: &str, args: &[SqlValue]) -> Result<ExecResult, SqlError> {
    let changed = connection.execute(sql, params_from_iter(args.iter().map(to_sqlite)))?;
    Ok(ExecResult {
        rows_affected: u64::try_from(changed).unwrap_or(u64::MAX),
        last_insert_id: connection.last_insert_rowid(),
    })
}

/// Converts a value for binding.
fn to_sqlite(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(value) => Value::Integer(*value),
        SqlValue::Real(value) => Value::Real(*value),
        SqlValue::Text(text) => Value::Text(text.clone()),
        SqlValue::Blob(bytes) => Value::Blob(bytes.clone()),
    }
}

/// Converts a column read back from `SQLite`.
fn from_sqlite(value: ValueRef<'_>) -> SqlValue {
    match value {
        ValueRef::Null => SqlValue::Null,
        ValueRef::Integer(value) => SqlValue::Integer(value),
        ValueRef::Real(value) => SqlValue::Real(value),
        ValueRef::Text(bytes) => SqlValue::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => SqlValue::Blob(bytes.to_vec()),
    }
}
