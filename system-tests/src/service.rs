// system-tests/src/service.rs
// ============================================================================
// Module: Users Service
// Description: Sample axum service instrumented for record and replay.
// Purpose: Give the system suites a realistic handler with SQL and clock deps.
// Dependencies: axum, keploy-capture, keploy-core, keploy-drivers, tokio
// ============================================================================

//! ## Overview
//! `GET /users/{id}` runs one parameterized query, `GET /users` iterates a
//! two-row cursor, and `GET /now` echoes the interceptable clock. The
//! database sits behind [`ObservedSql`], which counts how often the real
//! backend is reached so suites can prove replay never touches it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use axum::Json;
use axum::Router;
use axum::extract::Path;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use keploy_capture::CapturePipeline;
use keploy_capture::instrument;
use keploy_core::Clock;
use keploy_core::KeployClock;
use keploy_core::SystemClock;
use keploy_drivers::ExecResult;
use keploy_drivers::KeploySql;
use keploy_drivers::SqlBackend;
use keploy_drivers::SqlError;
use keploy_drivers::SqlRows;
use keploy_drivers::SqlTx;
use keploy_drivers::SqlValue;
use keploy_drivers::SqliteBackend;
use serde_json::json;
use tokio::net::TcpListener;
use tracing::warn;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Schema and rows loaded into every fresh database.
pub const SEED_SQL: &str = "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
     INSERT INTO users (id, name) VALUES (42, 'Ash'), (43, 'Brock');";
/// Lookup issued by `GET /users/{id}`.
pub const USER_QUERY: &str = "SELECT name FROM users WHERE id = ?";
/// Listing issued by `GET /users`.
pub const LIST_QUERY: &str = "SELECT name FROM users ORDER BY id";

// ============================================================================
// SECTION: Observed Backend
// ============================================================================

/// `SQLite` backend that counts the calls reaching it.
#[derive(Debug)]
pub struct ObservedSql {
    /// Real database.
    inner: SqliteBackend,
    /// Calls received.
    calls: AtomicUsize,
}

impl ObservedSql {
    /// Opens an in-memory database loaded with [`SEED_SQL`].
    ///
    /// # Errors
    ///
    /// Returns [`SqlError`] when `SQLite` cannot open or seed the database.
    pub fn seeded() -> Result<Self, SqlError> {
        let inner = SqliteBackend::open_in_memory()?;
        inner.execute_batch(SEED_SQL)?;
        Ok(Self {
            inner,
            calls: AtomicUsize::new(0),
        })
    }

    /// Returns how many calls reached the database.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Counts one call.
    fn observe(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

impl SqlBackend for ObservedSql {
    fn query(&self, sql: &str, args: &[SqlValue]) -> Result<Box<dyn SqlRows>, SqlError> {
        self.observe();
        self.inner.query(sql, args)
    }

    fn exec(&self, sql: &str, args: &[SqlValue]) -> Result<ExecResult, SqlError> {
        self.observe();
        self.inner.exec(sql, args)
    }

    fn begin(&self) -> Result<Box<dyn SqlTx>, SqlError> {
        self.observe();
        self.inner.begin()
    }
}

// ============================================================================
// SECTION: Handlers
// ============================================================================

/// Shared handler state.
#[derive(Clone)]
pub struct UsersState {
    /// Instrumented database handle.
    sql: KeploySql,
    /// Clock used to stamp `/now`.
    clock: Arc<dyn Clock>,
}

impl UsersState {
    /// Creates state reading time from the interceptable system clock.
    #[must_use]
    pub fn new(sql: KeploySql) -> Self {
        Self {
            sql,
            clock: Arc::new(KeployClock::new(SystemClock)),
        }
    }

    /// Replaces the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Runs `query` and collects the first column of every row.
    fn names(&self, query: &str, args: &[SqlValue]) -> Result<Vec<String>, SqlError> {
        let mut rows = self.sql.query(query, args)?;
        let mut names = Vec::new();
        while let Some(row) = rows.next()? {
            if let Some(name) = row.first().and_then(SqlValue::as_text) {
                names.push(name.to_string());
            }
        }
        rows.close()?;
        Ok(names)
    }
}

/// Builds the uninstrumented router.
#[must_use]
pub fn router(state: UsersState) -> Router {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/{id}", get(get_user))
        .route("/now", get(now))
        .with_state(state)
}

/// Serves the instrumented router on an ephemeral loopback port.
///
/// # Errors
///
/// Returns the bind error when no port is available.
pub async fn serve(state: UsersState, pipeline: Arc<CapturePipeline>) -> std::io::Result<SocketAddr> {
    let app = instrument(router(state), pipeline);
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            warn!(error = %err, "users service stopped");
        }
    });
    Ok(addr)
}

/// Looks up one user by id.
async fn get_user(State(state): State<UsersState>, Path(id): Path<i64>) -> Response {
    match state.names(USER_QUERY, &[SqlValue::Integer(id)]) {
        Ok(names) => match names.into_iter().next() {
            Some(name) => Json(json!({ "name": name })).into_response(),
            None => (StatusCode::NOT_FOUND, Json(json!({ "error": "user not found" }))).into_response(),
        },
        Err(err) => server_error(&err),
    }
}

/// Lists every user name in id order.
async fn list_users(State(state): State<UsersState>) -> Response {
    match state.names(LIST_QUERY, &[]) {
        Ok(names) => Json(json!({ "names": names })).into_response(),
        Err(err) => server_error(&err),
    }
}

/// Echoes the current time in unix seconds.
async fn now(State(state): State<UsersState>) -> Json<serde_json::Value> {
    Json(json!({ "now": state.clock.now().as_unix_seconds() }))
}

/// Renders a database failure.
fn server_error(err: &SqlError) -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": err.to_string() }))).into_response()
}
