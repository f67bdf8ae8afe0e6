// crates/keploy-drivers/tests/common/mod.rs
// =============================================================================
// Module: Driver Test Helpers
// Description: Record and replay harnesses plus backend fakes.
// Purpose: Share context setup between the driver suites.
// =============================================================================

#![allow(dead_code, reason = "Test helpers are selectively used across suites.")]

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use keploy_core::Dependency;
use keploy_core::Mock;
use keploy_core::RequestContext;
use keploy_core::TestcaseId;
use keploy_core::Timestamp;
use keploy_core::install;
use keploy_core::install_sync;
use keploy_drivers::ExecResult;
use keploy_drivers::KvBackend;
use keploy_drivers::KvError;
use keploy_drivers::SqlBackend;
use keploy_drivers::SqlError;
use keploy_drivers::SqlRows;
use keploy_drivers::SqlTx;
use keploy_drivers::SqlValue;

/// Capture time used by every harness.
pub const CAPTURED_AT: i64 = 1_700_000_000;

/// Recorded artifacts of one harness run.
pub struct Recording<R> {
    /// Value the body returned.
    pub output: R,
    /// Dependencies in call order.
    pub deps: Vec<Dependency>,
    /// Mocks in call order.
    pub mocks: Vec<Mock>,
}

impl<R> Recording<R> {
    /// Operation names of the recorded dependencies.
    pub fn operations(&self) -> Vec<String> {
        self.deps.iter().map(|dep| dep.meta.operation().to_string()).collect()
    }
}

/// Runs `body` under a fresh record context.
pub fn record_sync<R>(body: impl FnOnce() -> R) -> Recording<R> {
    let ctx = Arc::new(RequestContext::record(Timestamp::from_unix_seconds(CAPTURED_AT)));
    let output = install_sync(Arc::clone(&ctx), body);
    let (deps, mocks) = ctx.take_recorded().unwrap();
    Recording {
        output,
        deps,
        mocks,
    }
}

/// Runs `body` under a replay context loaded with `deps` and `mocks`.
///
/// Returns the output and the number of records left unconsumed.
pub fn replay_sync<R>(
    deps: Vec<Dependency>,
    mocks: Vec<Mock>,
    body: impl FnOnce() -> R,
) -> (R, (usize, usize)) {
    let ctx = replay_context(deps, mocks);
    let output = install_sync(Arc::clone(&ctx), body);
    (output, ctx.queued().unwrap())
}

/// Async variant of [`record_sync`].
pub async fn record<F: Future>(body: F) -> Recording<F::Output> {
    let ctx = Arc::new(RequestContext::record(Timestamp::from_unix_seconds(CAPTURED_AT)));
    let output = install(Arc::clone(&ctx), body).await;
    let (deps, mocks) = ctx.take_recorded().unwrap();
    Recording {
        output,
        deps,
        mocks,
    }
}

/// Async variant of [`replay_sync`].
pub async fn replay<F: Future>(
    deps: Vec<Dependency>,
    mocks: Vec<Mock>,
    body: F,
) -> (F::Output, (usize, usize)) {
    let ctx = replay_context(deps, mocks);
    let output = install(Arc::clone(&ctx), body).await;
    (output, ctx.queued().unwrap())
}

fn replay_context(deps: Vec<Dependency>, mocks: Vec<Mock>) -> Arc<RequestContext> {
    Arc::new(RequestContext::replay(
        TestcaseId::new("tc-replay"),
        Timestamp::from_unix_seconds(CAPTURED_AT),
        deps,
        mocks,
    ))
}

// ============================================================================
// SECTION: SQL Fakes
// ============================================================================

/// SQL backend that fails every call and counts them.
#[derive(Default)]
pub struct UnreachableSql {
    /// Calls received.
    pub calls: AtomicUsize,
}

impl UnreachableSql {
    fn refuse<T>(&self) -> Result<T, SqlError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(SqlError::Backend("database unreachable".to_string()))
    }
}

impl SqlBackend for UnreachableSql {
    fn query(&self, _: &str, _: &[SqlValue]) -> Result<Box<dyn SqlRows>, SqlError> {
        self.refuse()
    }

    fn exec(&self, _: &str, _: &[SqlValue]) -> Result<ExecResult, SqlError> {
        self.refuse()
    }

    fn begin(&self) -> Result<Box<dyn SqlTx>, SqlError> {
        self.refuse()
    }
}

/// SQL backend whose `exec` fails with a fixed error.
pub struct FailingExec(pub SqlError);

impl SqlBackend for FailingExec {
    fn query(&self, _: &str, _: &[SqlValue]) -> Result<Box<dyn SqlRows>, SqlError> {
        Err(self.0.clone())
    }

    fn exec(&self, _: &str, _: &[SqlValue]) -> Result<ExecResult, SqlError> {
        Err(self.0.clone())
    }

    fn begin(&self) -> Result<Box<dyn SqlTx>, SqlError> {
        Err(self.0.clone())
    }
}

// ============================================================================
// SECTION: Key-Value Fake
// ============================================================================

/// In-memory key-value backend that counts calls.
#[derive(Default)]
pub struct MemoryKv {
    /// Stored entries.
    pub entries: Mutex<BTreeMap<String, String>>,
    /// Calls received.
    pub calls: AtomicUsize,
}

impl MemoryKv {
    /// Returns the number of calls received.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KvBackend for MemoryKv {
    async fn get(&self, key: &str) -> Result<String, KvError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.entries.lock().unwrap().get(key).cloned().ok_or(KvError::Nil)
    }

    async fn set(&self, key: &str, value: &str, _: Option<Duration>) -> Result<(), KvError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.entries.lock().unwrap().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn del(&self, keys: &[&str]) -> Result<u64, KvError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut entries = self.entries.lock().unwrap();
        Ok(keys.iter().filter(|key| entries.remove(**key).is_some()).count() as u64)
    }
}
