// crates/keploy-core/src/runtime/stream.rs
// ============================================================================
// Module: Keploy Stream State Machines
// Description: Explicit states for cursors, transactions, and single results.
// Purpose: Map "empty replay queue" onto "iterator exhausted" deterministically.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! Streaming driver handles are modeled as explicit state machines instead
//! of coroutines. Each iteration of a cursor is its own dependency record, so
//! the adapter only needs to know which transition the record produced.
//!
//! - Cursor: `Open -> HasRow | Exhausted`, `Close` from any state is terminal.
//! - Transaction: `Begun -> Committed | RolledBack`, both terminal.
//! - Single result: `Pending -> Decoded`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Illegal transition on a stream state machine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {machine} transition: {event} from {from}")]
pub struct StreamStateError {
    /// State machine name.
    pub machine: &'static str,
    /// State the transition was attempted from.
    pub from: &'static str,
    /// Attempted event.
    pub event: &'static str,
}

impl StreamStateError {
    /// Builds an error for `machine` rejecting `event` in state `from`.
    const fn new(machine: &'static str, from: &'static str, event: &'static str) -> Self {
        Self {
            machine,
            from,
            event,
        }
    }
}

// ============================================================================
// SECTION: Cursor
// ============================================================================

/// Cursor / rows iteration state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CursorState {
    /// Created, nothing read yet.
    #[default]
    Open,
    /// The last `Next` produced a row.
    HasRow,
    /// The last `Next` reported the end of iteration.
    Exhausted,
    /// Closed; terminal.
    Closed,
}

impl CursorState {
    /// Returns the state label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::HasRow => "has_row",
            Self::Exhausted => "exhausted",
            Self::Closed => "closed",
        }
    }

    /// Applies a `Next` that did or did not produce a row.
    ///
    /// # Errors
    ///
    /// Returns [`StreamStateError`] when the cursor is closed.
    pub const fn next(self, has_row: bool) -> Result<Self, StreamStateError> {
        match self {
            Self::Closed => Err(StreamStateError::new("cursor", self.as_str(), "next")),
            Self::Exhausted => Ok(Self::Exhausted),
            Self::Open | Self::HasRow => Ok(if has_row { Self::HasRow } else { Self::Exhausted }),
        }
    }

    /// Applies `Close`; allowed from every state.
    #[must_use]
    pub const fn close(self) -> Self {
        Self::Closed
    }

    /// Returns true when a row is available for scanning.
    #[must_use]
    pub const fn has_row(self) -> bool {
        matches!(self, Self::HasRow)
    }

    /// Returns true when further `Next` calls will not produce rows.
    #[must_use]
    pub const fn is_done(self) -> bool {
        matches!(self, Self::Exhausted | Self::Closed)
    }
}

impl fmt::Display for CursorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Transaction
// ============================================================================

/// Transaction lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionState {
    /// Begun and still open.
    #[default]
    Begun,
    /// Committed; terminal.
    Committed,
    /// Rolled back; terminal.
    RolledBack,
}

impl TransactionState {
    /// Returns the state label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Begun => "begun",
            Self::Committed => "committed",
            Self::RolledBack => "rolled_back",
        }
    }

    /// Applies `Commit`.
    ///
    /// # Errors
    ///
    /// Returns [`StreamStateError`] when the transaction already finished.
    pub const fn commit(self) -> Result<Self, StreamStateError> {
        match self {
            Self::Begun => Ok(Self::Committed),
            Self::Committed | Self::RolledBack => {
                Err(StreamStateError::new("transaction", self.as_str(), "commit"))
            }
        }
    }

    /// Applies `Rollback`.
    ///
    /// # Errors
    ///
    /// Returns [`StreamStateError`] when the transaction already finished.
    pub const fn rollback(self) -> Result<Self, StreamStateError> {
        match self {
            Self::Begun => Ok(Self::RolledBack),
            Self::Committed | Self::RolledBack => {
                Err(StreamStateError::new("transaction", self.as_str(), "rollback"))
            }
        }
    }

    /// Returns true once committed or rolled back.
    #[must_use]
    pub const fn is_finished(self) -> bool {
        !matches!(self, Self::Begun)
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Single Result
// ============================================================================

/// Single-result handle state (`FindOne` and friends).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SingleResultState {
    /// Result not yet consumed.
    #[default]
    Pending,
    /// `Decode` ran.
    Decoded,
}

impl SingleResultState {
    /// Returns the state label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Decoded => "decoded",
        }
    }

    /// Applies `Decode`.
    ///
    /// # Errors
    ///
    /// Returns [`StreamStateError`] when the result was already decoded.
    pub const fn decode(self) -> Result<Self, StreamStateError> {
        match self {
            Self::Pending => Ok(Self::Decoded),
            Self::Decoded => Err(StreamStateError::new("single result", self.as_str(), "decode")),
        }
    }
}

impl fmt::Display for SingleResultState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
