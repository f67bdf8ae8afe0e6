// crates/keploy-core/src/runtime/mod.rs
// ============================================================================
// Module: Keploy Runtime
// Description: Request context, driver kernel, clock, and replay plumbing.
// Purpose: Execute intercepted calls against the active request context.
// Dependencies: crate::{core, interfaces}, tokio, tracing
// ============================================================================

//! ## Overview
//! Runtime modules carry per-request state and implement the record/replay
//! kernel that every driver adapter delegates to. All adapters go through
//! the same kernel so mode gating and matching stay uniform.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod clock;
pub mod context;
pub mod kernel;
pub mod registry;
pub mod store;
pub mod stream;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use clock::Clock;
pub use clock::FixedClock;
pub use clock::KeployClock;
pub use clock::SystemClock;
pub use clock::now;
pub use context::ContextError;
pub use context::RequestContext;
pub use context::get_mode_from_context;
pub use context::get_state;
pub use context::in_context;
pub use context::install;
pub use context::install_sync;
pub use context::spawn_in_context;
pub use kernel::Interception;
pub use kernel::KernelError;
pub use kernel::intercept;
pub use kernel::intercept_blocking;
pub use kernel::intercept_mock;
pub use kernel::record_outcome;
pub use kernel::replay_mock;
pub use kernel::replay_outcome;
pub use kernel::report_replay_miss;
pub use kernel::report_stream_end;
pub use registry::RegistryError;
pub use registry::ReplayRegistry;
pub use store::InMemoryControlPlane;
pub use stream::CursorState;
pub use stream::SingleResultState;
pub use stream::StreamStateError;
pub use stream::TransactionState;
