// crates/keploy-core/src/runtime/kernel.rs
// ============================================================================
// Module: Keploy Driver Kernel
// Description: Shared record/replay body every driver adapter delegates to.
// Purpose: Gate on mode, run-and-record in Record, dequeue-and-decode in Test.
// Dependencies: crate::core, crate::runtime::context, tracing
// ============================================================================

//! ## Overview
//! A wrapped driver call `op(args) -> Result<T, E>` becomes a call to
//! [`intercept`] (or [`intercept_blocking`] for synchronous drivers):
//!
//! - no context or `Off`: the real call runs untouched;
//! - `Record`: the real call runs and exactly one [`Dependency`] is appended;
//! - `Test`: the real call never runs; the head of the replay queue is
//!   consumed when its `{name, type, operation}` matches, otherwise the driver
//!   sees [`DriverError::mock_not_found`].
//!
//! Instrumentation failures never surface as new error types. Encode
//! failures are logged and the call still returns its real outcome; decode
//! failures are logged and reported as a missing mock.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::future::Future;
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;
use tracing::warn;

use crate::core::CodecError;
use crate::core::Dependency;
use crate::core::DependencyMeta;
use crate::core::DriverError;
use crate::core::Mock;
use crate::core::MockSpec;
use crate::core::Mode;
use crate::core::Payload;
use crate::runtime::context::ContextError;
use crate::runtime::context::RequestContext;
use crate::runtime::context::get_state;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Kernel errors raised while replaying a call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KernelError {
    /// The head of the replay queue does not match the call.
    #[error("mock not found for {0}")]
    MockNotFound(String),
    /// The matched record could not be decoded.
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// The request context could not be accessed.
    #[error(transparent)]
    Context(#[from] ContextError),
}

// ============================================================================
// SECTION: Mode Gate
// ============================================================================

/// What the kernel will do with the current call.
#[derive(Debug, Clone)]
pub enum Interception {
    /// Run the real call without instrumentation.
    PassThrough,
    /// Run the real call and record it on the context.
    Record(Arc<RequestContext>),
    /// Answer the call from the context's replay queue.
    Replay(Arc<RequestContext>),
}

impl Interception {
    /// Resolves the interception for the current task.
    #[must_use]
    pub fn current() -> Self {
        let Ok(ctx) = get_state() else {
            return Self::PassThrough;
        };
        match ctx.mode() {
            Mode::Record => Self::Record(ctx),
            Mode::Test => Self::Replay(ctx),
            Mode::Off => Self::PassThrough,
        }
    }

    /// Runs an asynchronous call under this interception.
    ///
    /// Stream handles keep the interception resolved when they were opened
    /// so later iterations land on the same context.
    pub async fn call<T, E, F, Fut>(&self, meta: DependencyMeta, real: F) -> Result<T, E>
    where
        T: Payload,
        E: DriverError,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        match self {
            Self::PassThrough => real().await,
            Self::Record(ctx) => {
                let outcome = real().await;
                record_outcome(ctx, meta, &outcome);
                outcome
            }
            Self::Replay(ctx) => replay_or_not_found(ctx, &meta),
        }
    }

    /// Runs a synchronous call under this interception.
    pub fn call_blocking<T, E, F>(&self, meta: DependencyMeta, real: F) -> Result<T, E>
    where
        T: Payload,
        E: DriverError,
        F: FnOnce() -> Result<T, E>,
    {
        match self {
            Self::PassThrough => real(),
            Self::Record(ctx) => {
                let outcome = real();
                record_outcome(ctx, meta, &outcome);
                outcome
            }
            Self::Replay(ctx) => replay_or_not_found(ctx, &meta),
        }
    }

    /// Returns true when calls are answered from recordings.
    #[must_use]
    pub const fn is_replay(&self) -> bool {
        matches!(self, Self::Replay(_))
    }
}

// ============================================================================
// SECTION: Dependency Interception
// ============================================================================

/// Intercepts an asynchronous driver call.
pub async fn intercept<T, E, F, Fut>(meta: DependencyMeta, real: F) -> Result<T, E>
where
    T: Payload,
    E: DriverError,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    Interception::current().call(meta, real).await
}

/// Intercepts a synchronous driver call.
pub fn intercept_blocking<T, E, F>(meta: DependencyMeta, real: F) -> Result<T, E>
where
    T: Payload,
    E: DriverError,
    F: FnOnce() -> Result<T, E>,
{
    Interception::current().call_blocking(meta, real)
}

/// Appends exactly one dependency describing `outcome`.
///
/// When encoding fails the dependency is still appended, with no data, so
/// recorded call counts stay exact; replaying it reports a missing mock.
pub fn record_outcome<T, E>(ctx: &RequestContext, meta: DependencyMeta, outcome: &Result<T, E>)
where
    T: Payload,
    E: DriverError,
{
    let dep = match Dependency::from_outcome(meta.clone(), outcome) {
        Ok(dep) => dep,
        Err(err) => {
            warn!(dependency = %meta, error = %err, "dependency encode failed");
            Dependency::new(meta, Vec::new())
        }
    };
    if let Err(err) = ctx.append_dep(dep) {
        warn!(error = %err, "dependency dropped");
    }
}

/// Consumes the matching head dependency and decodes it.
///
/// # Errors
///
/// Returns [`KernelError::MockNotFound`] when the head does not match and
/// [`KernelError::Codec`] when it cannot be decoded.
pub fn replay_outcome<T, E>(ctx: &RequestContext, meta: &DependencyMeta) -> Result<Result<T, E>, KernelError>
where
    T: Payload,
    E: DriverError,
{
    let dep = ctx
        .consume_next_dep(meta)?
        .ok_or_else(|| KernelError::MockNotFound(meta.to_string()))?;
    Ok(dep.into_outcome()?)
}

/// Replays a call, mapping kernel errors to the driver's not-found sentinel.
fn replay_or_not_found<T, E>(ctx: &RequestContext, meta: &DependencyMeta) -> Result<T, E>
where
    T: Payload,
    E: DriverError,
{
    match replay_outcome(ctx, meta) {
        Ok(outcome) => outcome,
        Err(err) => {
            report_replay_miss(ctx, &err);
            Err(E::mock_not_found())
        }
    }
}

// ============================================================================
// SECTION: Mock Interception
// ============================================================================

/// Intercepts an asynchronous call recorded as a structured mock.
///
/// `encode` renders the real outcome into a [`MockSpec`]; `decode` restores
/// an outcome from a recorded spec.
pub async fn intercept_mock<T, E, F, Fut, Enc, Dec>(
    meta: DependencyMeta,
    real: F,
    encode: Enc,
    decode: Dec,
) -> Result<T, E>
where
    E: DriverError,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    Enc: FnOnce(&Result<T, E>) -> MockSpec,
    Dec: FnOnce(MockSpec) -> Result<Result<T, E>, CodecError>,
{
    match Interception::current() {
        Interception::PassThrough => real().await,
        Interception::Record(ctx) => {
            let outcome = real().await;
            let mock = Mock::new(meta, encode(&outcome));
            if let Err(err) = ctx.append_mock(mock) {
                warn!(error = %err, "mock dropped");
            }
            outcome
        }
        Interception::Replay(ctx) => match replay_mock(&ctx, &meta) {
            Ok(spec) => decode(spec).unwrap_or_else(|err| {
                report_replay_miss(&ctx, &KernelError::Codec(err));
                Err(E::mock_not_found())
            }),
            Err(err) => {
                report_replay_miss(&ctx, &err);
                Err(E::mock_not_found())
            }
        },
    }
}

/// Consumes the matching head mock.
///
/// # Errors
///
/// Returns [`KernelError::MockNotFound`] when the head does not match.
pub fn replay_mock(ctx: &RequestContext, meta: &DependencyMeta) -> Result<MockSpec, KernelError> {
    ctx.consume_next_mock(meta)?
        .map(|mock| mock.spec)
        .ok_or_else(|| KernelError::MockNotFound(meta.to_string()))
}

/// Logs a replay miss with the testcase it happened in.
///
/// Misses and unusable records are both logged at warn level.
pub fn report_replay_miss(ctx: &RequestContext, err: &KernelError) {
    let test_id = ctx.test_id().map(ToString::to_string).unwrap_or_default();
    match err {
        KernelError::MockNotFound(_) => warn!(test_id = %test_id, error = %err, "replay miss"),
        KernelError::Codec(_) | KernelError::Context(_) => {
            warn!(test_id = %test_id, error = %err, "replay record unusable");
        }
    }
}

/// Logs the end of a replayed row or document stream.
///
/// Iterators stop by running off the recorded queue, so a plain miss is the
/// normal end of iteration and is logged at debug level. Unusable records
/// still go through [`report_replay_miss`].
pub fn report_stream_end(ctx: &RequestContext, err: &KernelError) {
    match err {
        KernelError::MockNotFound(_) => {
            let test_id = ctx.test_id().map(ToString::to_string).unwrap_or_default();
            debug!(test_id = %test_id, error = %err, "replay stream ended");
        }
        KernelError::Codec(_) | KernelError::Context(_) => report_replay_miss(ctx, err),
    }
}
