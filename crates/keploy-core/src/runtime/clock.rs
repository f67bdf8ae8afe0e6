// crates/keploy-core/src/runtime/clock.rs
// ============================================================================
// Module: Keploy Clock Driver
// Description: Wall clock treated as an interceptable dependency.
// Purpose: Let handlers that stamp responses with "now" round-trip on replay.
// Dependencies: crate::core, crate::runtime::context
// ============================================================================

//! ## Overview
//! Handlers read time through a [`Clock`]. [`KeployClock`] answers with the
//! wrapped clock in `Record` and `Off`, and with the testcase capture time
//! carried on the request context in `Test`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::core::Mode;
use crate::core::Timestamp;
use crate::runtime::context::get_state;

// ============================================================================
// SECTION: Clock Trait
// ============================================================================

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> Timestamp;
}

/// Real wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

/// Clock frozen at a fixed instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub Timestamp);

impl Clock for FixedClock {
    fn now(&self) -> Timestamp {
        self.0
    }
}

// ============================================================================
// SECTION: Interceptable Clock
// ============================================================================

/// Clock that replays the capture time in `Test` mode.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeployClock<C = SystemClock> {
    /// Clock consulted outside replay.
    inner: C,
}

impl<C: Clock> KeployClock<C> {
    /// Wraps `inner`.
    pub const fn new(inner: C) -> Self {
        Self {
            inner,
        }
    }
}

impl<C: Clock> Clock for KeployClock<C> {
    fn now(&self) -> Timestamp {
        match get_state() {
            Ok(ctx) if ctx.mode() == Mode::Test => ctx.captured_at(),
            _ => self.inner.now(),
        }
    }
}

/// Returns the current time through the interceptable system clock.
#[must_use]
pub fn now() -> Timestamp {
    KeployClock::<SystemClock>::default().now()
}
