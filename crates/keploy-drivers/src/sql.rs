// crates/keploy-drivers/src/sql.rs
// ============================================================================
// Module: Keploy SQL Driver
// Description: Record/replay wrapper around a blocking SQL backend.
// Purpose: Capture queries, row iteration, and transactions as dependencies.
// Dependencies: keploy-core, serde, thiserror
// ============================================================================

//! ## Overview
//! [`KeploySql`] wraps any [`SqlBackend`]. Every call goes through the
//! dependency kernel:
//!
//! | Call | Operation recorded |
//! |------|--------------------|
//! | [`KeploySql::query`] | `QueryContext` (column names) |
//! | [`Rows::next`] | `QueryContext.Next` (one row or `EOF`) |
//! | [`Rows::close`] | `QueryContext.Close` |
//! | [`KeploySql::exec`] / [`Tx::exec`] | `ExecContext` |
//! | [`KeploySql::begin`] | `BeginTx` |
//! | [`Tx::commit`] / [`Tx::rollback`] | `Commit` / `Rollback` |
//!
//! Handles returned by `query` and `begin` keep the interception resolved
//! when they were opened, so iteration records onto the same request even
//! when it continues on another task. In `Test` mode the backend is never
//! touched. An exhausted replay queue on `Next` ends iteration; any other
//! unmatched call fails with [`SqlError::BadConn`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use keploy_core::BinaryPayload;
use keploy_core::CursorState;
use keploy_core::DependencyKind;
use keploy_core::DependencyMeta;
use keploy_core::DriverError;
use keploy_core::Interception;
use keploy_core::RecordedError;
use keploy_core::TransactionState;
use keploy_core::intercept_blocking;
use keploy_core::replay_outcome;
use keploy_core::report_stream_end;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Dependency name used for SQL calls.
pub const SQL_DEPENDENCY_NAME: &str = "SQL";
/// Query operation.
pub const QUERY_OP: &str = "QueryContext";
/// Row iteration operation.
pub const NEXT_OP: &str = "QueryContext.Next";
/// Rows close operation.
pub const CLOSE_OP: &str = "QueryContext.Close";
/// Statement execution operation.
pub const EXEC_OP: &str = "ExecContext";
/// Transaction start operation.
pub const BEGIN_OP: &str = "BeginTx";
/// Transaction commit operation.
pub const COMMIT_OP: &str = "Commit";
/// Transaction rollback operation.
pub const ROLLBACK_OP: &str = "Rollback";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// SQL driver errors.
///
/// The unit variants are the canonical sentinels; recorded messages that
/// match one of them are restored to the variant on replay.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SqlError {
    /// The connection is unusable. Also returned for unmatched replays.
    #[error("driver: bad connection")]
    BadConn,
    /// The driver declined the fast path.
    #[error("driver: skip fast-path; continue as if unimplemented")]
    Skip,
    /// A single-row query matched nothing.
    #[error("sql: no rows in result set")]
    NoRows,
    /// Row iteration finished.
    #[error("EOF")]
    Eof,
    /// The rows handle was used after `close`.
    #[error("sql: Rows are closed")]
    RowsClosed,
    /// The transaction already committed or rolled back.
    #[error("sql: transaction has already been committed or rolled back")]
    TxDone,
    /// Any other backend failure.
    #[error("{0}")]
    Backend(String),
}

impl SqlError {
    /// Sentinels restored by message on replay.
    const SENTINELS: [Self; 6] =
        [Self::BadConn, Self::Skip, Self::NoRows, Self::Eof, Self::RowsClosed, Self::TxDone];
}

impl DriverError for SqlError {
    fn mock_not_found() -> Self {
        Self::BadConn
    }

    fn to_recorded(&self) -> RecordedError {
        RecordedError::new(self.to_string())
    }

    fn from_recorded(recorded: RecordedError) -> Self {
        Self::SENTINELS
            .into_iter()
            .find(|sentinel| sentinel.to_string() == recorded.err_string)
            .unwrap_or(Self::Backend(recorded.err_string))
    }
}

// ============================================================================
// SECTION: Values
// ============================================================================

/// Column value exchanged with the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SqlValue {
    /// SQL `NULL`.
    Null,
    /// Signed integer.
    Integer(i64),
    /// Floating point number.
    Real(f64),
    /// UTF-8 text.
    Text(String),
    /// Raw bytes.
    Blob(Vec<u8>),
}

impl BinaryPayload for SqlValue {}

impl SqlValue {
    /// Returns the text value, if any.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Returns the integer value, if any.
    #[must_use]
    pub const fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Real(value) => write!(f, "{value}"),
            Self::Text(text) => f.write_str(text),
            Self::Blob(bytes) => write!(f, "<{} bytes>", bytes.len()),
        }
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

/// One result row.
pub type Row = Vec<SqlValue>;

/// Outcome of a statement that returns no rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExecResult {
    /// Rows changed by the statement.
    pub rows_affected: u64,
    /// Last inserted row id reported by the backend.
    pub last_insert_id: i64,
}

impl BinaryPayload for ExecResult {}

// ============================================================================
// SECTION: Backend Contracts
// ============================================================================

/// Blocking SQL connection pool or handle.
pub trait SqlBackend: Send + Sync {
    /// Runs a query and returns its rows.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError`] when the query fails.
    fn query(&self, sql: &str, args: &[SqlValue]) -> Result<Box<dyn SqlRows>, SqlError>;

    /// Runs a statement that returns no rows.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError`] when the statement fails.
    fn exec(&self, sql: &str, args: &[SqlValue]) -> Result<ExecResult, SqlError>;

    /// Starts a transaction.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError`] when the transaction cannot start.
    fn begin(&self) -> Result<Box<dyn SqlTx>, SqlError>;
}

/// Live row iterator returned by a backend.
pub trait SqlRows: Send {
    /// Column names.
    fn columns(&self) -> Vec<String>;

    /// Returns the next row, or `None` at the end.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError`] when the backend fails mid-iteration.
    fn next(&mut self) -> Result<Option<Row>, SqlError>;

    /// Releases the iterator.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError`] when the backend fails to release it.
    fn close(&mut self) -> Result<(), SqlError>;
}

/// Live transaction returned by a backend.
pub trait SqlTx: Send {
    /// Runs a statement inside the transaction.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError`] when the statement fails.
    fn exec(&mut self, sql: &str, args: &[SqlValue]) -> Result<ExecResult, SqlError>;

    /// Commits the transaction.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError`] when the commit fails.
    fn commit(&mut self) -> Result<(), SqlError>;

    /// Rolls the transaction back.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError`] when the rollback fails.
    fn rollback(&mut self) -> Result<(), SqlError>;
}

/// Rows held in memory.
#[derive(Debug, Clone, Default)]
pub struct BufferedRows {
    /// Column names.
    columns: Vec<String>,
    /// Remaining rows in order.
    rows: VecDeque<Row>,
    /// Set once closed.
    closed: bool,
}

impl BufferedRows {
    /// Creates an iterator over `rows`.
    #[must_use]
    pub fn new(columns: Vec<String>, rows: impl IntoIterator<Item = Row>) -> Self {
        Self {
            columns,
            rows: rows.into_iter().collect(),
            closed: false,
        }
    }
}

impl SqlRows for BufferedRows {
    fn columns(&self) -> Vec<String> {
        self.columns.clone()
    }

    fn next(&mut self) -> Result<Option<Row>, SqlError> {
        if self.closed {
            return Err(SqlError::RowsClosed);
        }
        Ok(self.rows.pop_front())
    }

    fn close(&mut self) -> Result<(), SqlError> {
        self.closed = true;
        self.rows.clear();
        Ok(())
    }
}

// ============================================================================
// SECTION: Instrumented Handle
// ============================================================================

/// Instrumented SQL handle.
#[derive(Clone)]
pub struct KeploySql {
    /// Wrapped backend, untouched in `Test` mode.
    backend: Arc<dyn SqlBackend>,
}

impl KeploySql {
    /// Wraps `backend`.
    #[must_use]
    pub fn new(backend: Arc<dyn SqlBackend>) -> Self {
        Self {
            backend,
        }
    }

    /// Runs a query.
    ///
    /// # Errors
    ///
    /// Returns the backend's [`SqlError`], or its recorded form in `Test`
    /// mode.
    pub fn query(&self, sql: &str, args: &[SqlValue]) -> Result<Rows, SqlError> {
        let interception = Interception::current();
        let meta = statement_meta(QUERY_OP, sql);
        let mut live = None;
        let columns = interception.call_blocking(meta.clone(), || {
            let rows = self.backend.query(sql, args)?;
            let columns = rows.columns();
            live = Some(rows);
            Ok::<_, SqlError>(columns)
        })?;
        Ok(Rows {
            meta,
            interception,
            inner: live,
            columns,
            state: CursorState::Open,
        })
    }

    /// Runs a statement that returns no rows.
    ///
    /// # Errors
    ///
    /// Returns the backend's [`SqlError`], or its recorded form in `Test`
    /// mode.
    pub fn exec(&self, sql: &str, args: &[SqlValue]) -> Result<ExecResult, SqlError> {
        intercept_blocking(statement_meta(EXEC_OP, sql), || self.backend.exec(sql, args))
    }

    /// Starts a transaction.
    ///
    /// # Errors
    ///
    /// Returns the backend's [`SqlError`], or its recorded form in `Test`
    /// mode.
    pub fn begin(&self) -> Result<Tx, SqlError> {
        let interception = Interception::current();
        let mut live = None;
        interception.call_blocking(sql_meta(BEGIN_OP), || {
            live = Some(self.backend.begin()?);
            Ok::<(), SqlError>(())
        })?;
        Ok(Tx {
            interception,
            inner: live,
            state: TransactionState::Begun,
        })
    }
}

impl fmt::Debug for KeploySql {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeploySql").finish_non_exhaustive()
    }
}

// ============================================================================
// SECTION: Rows
// ============================================================================

/// Instrumented row iterator.
pub struct Rows {
    /// Meta of the originating query.
    meta: DependencyMeta,
    /// Interception resolved when the query ran.
    interception: Interception,
    /// Live backend rows; absent in `Test` mode.
    inner: Option<Box<dyn SqlRows>>,
    /// Column names.
    columns: Vec<String>,
    /// Iteration state.
    state: CursorState,
}

impl Rows {
    /// Returns the column names.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Returns the iteration state.
    #[must_use]
    pub const fn state(&self) -> CursorState {
        self.state
    }

    /// Advances to the next row.
    ///
    /// Returns `Ok(None)` once iteration is over. In `Test` mode an empty
    /// replay queue also ends iteration.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError::RowsClosed`] after [`Rows::close`], or the
    /// backend's error.
    pub fn next(&mut self) -> Result<Option<Row>, SqlError> {
        if self.state == CursorState::Closed {
            return Err(SqlError::RowsClosed);
        }
        let meta = self.meta.for_operation(NEXT_OP);
        let outcome: Result<Row, SqlError> = match &self.interception {
            Interception::Replay(ctx) => replay_outcome(ctx, &meta).unwrap_or_else(|err| {
                report_stream_end(ctx, &err);
                Err(SqlError::Eof)
            }),
            live => {
                let inner = &mut self.inner;
                live.call_blocking(meta, || match inner {
                    Some(rows) => rows.next()?.ok_or(SqlError::Eof),
                    None => Err(SqlError::BadConn),
                })
            }
        };
        match outcome {
            Ok(row) => {
                self.state = self.state.next(true).map_err(|_| SqlError::RowsClosed)?;
                Ok(Some(row))
            }
            Err(SqlError::Eof) => {
                self.state = self.state.next(false).map_err(|_| SqlError::RowsClosed)?;
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Closes the iterator. Closing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns the backend's [`SqlError`].
    pub fn close(&mut self) -> Result<(), SqlError> {
        if self.state == CursorState::Closed {
            return Ok(());
        }
        let inner = &mut self.inner;
        let result = self
            .interception
            .call_blocking(self.meta.for_operation(CLOSE_OP), || {
                inner.as_mut().map_or(Ok(()), |rows| rows.close())
            });
        self.state = self.state.close();
        result
    }
}

impl fmt::Debug for Rows {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rows")
            .field("meta", &self.meta)
            .field("columns", &self.columns)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// SECTION: Transactions
// ============================================================================

/// Instrumented transaction.
pub struct Tx {
    /// Interception resolved when the transaction began.
    interception: Interception,
    /// Live backend transaction; absent in `Test` mode.
    inner: Option<Box<dyn SqlTx>>,
    /// Lifecycle state.
    state: TransactionState,
}

impl Tx {
    /// Returns the lifecycle state.
    #[must_use]
    pub const fn state(&self) -> TransactionState {
        self.state
    }

    /// Runs a statement inside the transaction.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError::TxDone`] once finished, or the backend's error.
    pub fn exec(&mut self, sql: &str, args: &[SqlValue]) -> Result<ExecResult, SqlError> {
        if self.state.is_finished() {
            return Err(SqlError::TxDone);
        }
        let inner = &mut self.inner;
        self.interception.call_blocking(statement_meta(EXEC_OP, sql).with("tx", "true"), || {
            inner.as_mut().ok_or(SqlError::BadConn)?.exec(sql, args)
        })
    }

    /// Commits the transaction.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError::TxDone`] once finished, or the backend's error.
    pub fn commit(&mut self) -> Result<(), SqlError> {
        let next = self.state.commit().map_err(|_| SqlError::TxDone)?;
        let inner = &mut self.inner;
        let result = self.interception.call_blocking(sql_meta(COMMIT_OP), || {
            inner.as_mut().ok_or(SqlError::BadConn)?.commit()
        });
        self.state = next;
        result
    }

    /// Rolls the transaction back.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError::TxDone`] once finished, or the backend's error.
    pub fn rollback(&mut self) -> Result<(), SqlError> {
        let next = self.state.rollback().map_err(|_| SqlError::TxDone)?;
        let inner = &mut self.inner;
        let result = self.interception.call_blocking(sql_meta(ROLLBACK_OP), || {
            inner.as_mut().ok_or(SqlError::BadConn)?.rollback()
        });
        self.state = next;
        result
    }
}

impl fmt::Debug for Tx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tx").field("state", &self.state).finish_non_exhaustive()
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Meta for an SQL operation.
fn sql_meta(operation: &str) -> DependencyMeta {
    DependencyMeta::new(SQL_DEPENDENCY_NAME, DependencyKind::SqlDb, operation)
}

/// Meta for an SQL operation carrying its statement text.
fn statement_meta(operation: &str, sql: &str) -> DependencyMeta {
    sql_meta(operation).with("query", sql)
}
