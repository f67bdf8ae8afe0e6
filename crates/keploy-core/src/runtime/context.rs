// crates/keploy-core/src/runtime/context.rs
// ============================================================================
// Module: Keploy Request Context
// Description: Per-inbound-request state carried on a task-local slot.
// Purpose: Scope dependency ordering, testcase identity, and replay queues.
// Dependencies: crate::core, tokio
// ============================================================================

//! ## Overview
//! One [`RequestContext`] exists per instrumented inbound request. The capture
//! pipeline installs it in a task-local slot for the duration of the handler
//! and every driver adapter reads it back with [`get_state`]. Nothing here is
//! process-global, so concurrent requests never share queues.
//!
//! Invariants:
//! - Queue mutations always happen under the context mutex.
//! - In `Record` mode the queues only grow; in `Test` mode they are pre-loaded
//!   and consumed head-first.
//! - The installed slot is cleared when the scoped future completes, panics,
//!   or is dropped.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::core::Dependency;
use crate::core::DependencyMeta;
use crate::core::HttpResponse;
use crate::core::Mock;
use crate::core::Mode;
use crate::core::TestcaseId;
use crate::core::Timestamp;

// ============================================================================
// SECTION: Task-Local Slot
// ============================================================================

tokio::task_local! {
    /// Request context of the inbound request driving the current task.
    static CURRENT: Arc<RequestContext>;
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Request context errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    /// No request context is installed for the current task.
    #[error("no request context installed")]
    NoContext,
    /// The context mutex was poisoned by a panicking task.
    #[error("request context poisoned: {0}")]
    Poisoned(String),
}

// ============================================================================
// SECTION: Request Context
// ============================================================================

/// Ordered record/replay queues guarded by the context mutex.
#[derive(Debug, Default)]
struct Queues {
    /// Dependency records.
    deps: VecDeque<Dependency>,
    /// Structured mocks.
    mocks: VecDeque<Mock>,
}

/// Per-inbound-request state.
#[derive(Debug)]
pub struct RequestContext {
    /// Mode fixed at creation.
    mode: Mode,
    /// Testcase identifier for replayed requests.
    test_id: Option<TestcaseId>,
    /// Capture time, returned by the clock driver during replay.
    captured_at: Timestamp,
    /// Persist artifacts as individual files in addition to the upsert.
    file_export: bool,
    /// Record/replay queues.
    queues: Mutex<Queues>,
    /// Single-use latch released when the handler returns.
    completion: Mutex<Option<oneshot::Sender<HttpResponse>>>,
}

impl RequestContext {
    /// Creates a record-mode context stamped with `captured_at`.
    #[must_use]
    pub fn record(captured_at: Timestamp) -> Self {
        Self {
            mode: Mode::Record,
            test_id: None,
            captured_at,
            file_export: false,
            queues: Mutex::new(Queues::default()),
            completion: Mutex::new(None),
        }
    }

    /// Creates a test-mode context pre-loaded with a replay script.
    #[must_use]
    pub fn replay(
        test_id: TestcaseId,
        captured_at: Timestamp,
        deps: Vec<Dependency>,
        mocks: Vec<Mock>,
    ) -> Self {
        Self {
            mode: Mode::Test,
            test_id: Some(test_id),
            captured_at,
            file_export: false,
            queues: Mutex::new(Queues {
                deps: deps.into(),
                mocks: mocks.into(),
            }),
            completion: Mutex::new(None),
        }
    }

    /// Enables or disables per-file export of recorded artifacts.
    #[must_use]
    pub const fn with_file_export(mut self, file_export: bool) -> Self {
        self.file_export = file_export;
        self
    }

    /// Attaches the completion latch the replay driver is waiting on.
    #[must_use]
    pub fn with_completion(self, completion: oneshot::Sender<HttpResponse>) -> Self {
        Self {
            completion: Mutex::new(Some(completion)),
            ..self
        }
    }

    /// Returns the context mode.
    #[must_use]
    pub const fn mode(&self) -> Mode {
        self.mode
    }

    /// Returns the replayed testcase identifier, if any.
    #[must_use]
    pub const fn test_id(&self) -> Option<&TestcaseId> {
        self.test_id.as_ref()
    }

    /// Returns the capture time.
    #[must_use]
    pub const fn captured_at(&self) -> Timestamp {
        self.captured_at
    }

    /// Returns true when artifacts should also be exported as files.
    #[must_use]
    pub const fn file_export(&self) -> bool {
        self.file_export
    }

    /// Appends a dependency record.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::Poisoned`] when the mutex is poisoned.
    pub fn append_dep(&self, dep: Dependency) -> Result<(), ContextError> {
        self.queues()?.deps.push_back(dep);
        Ok(())
    }

    /// Appends a structured mock.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::Poisoned`] when the mutex is poisoned.
    pub fn append_mock(&self, mock: Mock) -> Result<(), ContextError> {
        self.queues()?.mocks.push_back(mock);
        Ok(())
    }

    /// Pops the head dependency when it matches `meta`.
    ///
    /// Returns `Ok(None)` when the queue is empty or the head belongs to a
    /// different call; the head is left in place in that case.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::Poisoned`] when the mutex is poisoned.
    pub fn consume_next_dep(&self, meta: &DependencyMeta) -> Result<Option<Dependency>, ContextError> {
        let mut queues = self.queues()?;
        let matched = queues.deps.front().is_some_and(|head| head.meta.matches(meta));
        Ok(if matched { queues.deps.pop_front() } else { None })
    }

    /// Pops the head mock when it matches `meta`.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::Poisoned`] when the mutex is poisoned.
    pub fn consume_next_mock(&self, meta: &DependencyMeta) -> Result<Option<Mock>, ContextError> {
        let mut queues = self.queues()?;
        let matched = queues.mocks.front().is_some_and(|head| head.meta.matches(meta));
        Ok(if matched { queues.mocks.pop_front() } else { None })
    }

    /// Drains both queues, returning dependencies and mocks in order.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::Poisoned`] when the mutex is poisoned.
    pub fn take_recorded(&self) -> Result<(Vec<Dependency>, Vec<Mock>), ContextError> {
        let mut queues = self.queues()?;
        let deps = queues.deps.drain(..).collect();
        let mocks = queues.mocks.drain(..).collect();
        drop(queues);
        Ok((deps, mocks))
    }

    /// Returns the number of queued dependencies and mocks.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::Poisoned`] when the mutex is poisoned.
    pub fn queued(&self) -> Result<(usize, usize), ContextError> {
        let queues = self.queues()?;
        Ok((queues.deps.len(), queues.mocks.len()))
    }

    /// Releases the completion latch with the produced response.
    ///
    /// Returns false when no latch is attached, it already fired, or the
    /// waiting side gave up.
    pub fn complete(&self, response: HttpResponse) -> bool {
        let sender = match self.completion.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        sender.is_some_and(|sender| sender.send(response).is_ok())
    }

    /// Locks the queues.
    fn queues(&self) -> Result<MutexGuard<'_, Queues>, ContextError> {
        self.queues.lock().map_err(|err| ContextError::Poisoned(err.to_string()))
    }
}

// ============================================================================
// SECTION: Installation
// ============================================================================

/// Runs `fut` with `ctx` installed as the current request context.
///
/// The slot is cleared on every exit path of the returned future.
pub fn install<F>(ctx: Arc<RequestContext>, fut: F) -> impl Future<Output = F::Output>
where
    F: Future,
{
    CURRENT.scope(ctx, fut)
}

/// Runs a synchronous closure with `ctx` installed.
pub fn install_sync<R>(ctx: Arc<RequestContext>, f: impl FnOnce() -> R) -> R {
    CURRENT.sync_scope(ctx, f)
}

/// Returns the current request context.
///
/// # Errors
///
/// Returns [`ContextError::NoContext`] when none is installed; adapters treat
/// this as a signal to bypass instrumentation.
pub fn get_state() -> Result<Arc<RequestContext>, ContextError> {
    CURRENT.try_with(Arc::clone).map_err(|_| ContextError::NoContext)
}

/// Returns the effective mode for driver calls on the current task.
///
/// This is the context's mode when one is installed and `Off` otherwise, so
/// drivers stay inert in code paths that never passed through capture.
#[must_use]
pub fn get_mode_from_context() -> Mode {
    get_state().map_or(Mode::Off, |ctx| ctx.mode())
}

/// Wraps `fut` so it observes the caller's request context wherever it runs.
pub fn in_context<F>(fut: F) -> impl Future<Output = F::Output>
where
    F: Future,
{
    let ctx = get_state().ok();
    async move {
        match ctx {
            Some(ctx) => CURRENT.scope(ctx, fut).await,
            None => fut.await,
        }
    }
}

/// Spawns a task that inherits the caller's request context.
pub fn spawn_in_context<F>(fut: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::spawn(in_context(fut))
}
