// crates/keploy-core/src/core/mode.rs
// ============================================================================
// Module: Keploy Mode Register
// Description: Tri-state SDK mode and the process-wide register holding it.
// Purpose: Decide whether intercepted calls record, replay, or pass through.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! The SDK runs in one of three modes. `Record` captures every intercepted
//! call, `Test` answers calls from a recorded script, and `Off` passes
//! everything through untouched. The process-wide register is a lock-free
//! cell; per-request contexts may carry their own mode which takes precedence
//! for driver calls (see [`crate::runtime::get_mode_from_context`]).
//!
//! Invariants:
//! - An unset or unreadable register reads as [`Mode::Off`].
//! - `capture` is accepted as a legacy spelling of `record`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::OnceLock;
use std::sync::atomic::AtomicU8;
use std::sync::atomic::Ordering;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Mode
// ============================================================================

/// SDK operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Execute real calls and capture them.
    Record,
    /// Answer calls from recorded dependencies without touching backends.
    Test,
    /// Pass through with no instrumentation side effects.
    #[default]
    Off,
}

impl Mode {
    /// Returns the canonical lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Record => "record",
            Self::Test => "test",
            Self::Off => "off",
        }
    }

    /// Encodes the mode for the atomic register.
    const fn to_raw(self) -> u8 {
        match self {
            Self::Off => 0,
            Self::Record => 1,
            Self::Test => 2,
        }
    }

    /// Decodes a raw register value, falling back to `Off`.
    const fn from_raw(raw: u8) -> Self {
        match raw {
            1 => Self::Record,
            2 => Self::Test,
            _ => Self::Off,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = ModeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "record" | "capture" => Ok(Self::Record),
            "test" => Ok(Self::Test),
            "off" => Ok(Self::Off),
            _ => Err(ModeError::InvalidMode(value.to_string())),
        }
    }
}

/// Mode register errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModeError {
    /// The supplied value is not one of `record`, `test`, or `off`.
    #[error("invalid mode: {0:?}")]
    InvalidMode(String),
}

// ============================================================================
// SECTION: Register
// ============================================================================

/// Shared, lock-free mode cell.
///
/// Clones share the same cell. The process-wide register is available via
/// [`ModeRegister::global`]; embedders and tests may create private registers.
#[derive(Debug, Clone, Default)]
pub struct ModeRegister {
    /// Raw mode value.
    cell: Arc<AtomicU8>,
}

impl ModeRegister {
    /// Creates a register initialized to `mode`.
    #[must_use]
    pub fn new(mode: Mode) -> Self {
        Self {
            cell: Arc::new(AtomicU8::new(mode.to_raw())),
        }
    }

    /// Returns the process-wide register.
    #[must_use]
    pub fn global() -> &'static Self {
        static GLOBAL: OnceLock<ModeRegister> = OnceLock::new();
        GLOBAL.get_or_init(Self::default)
    }

    /// Reads the current mode.
    #[must_use]
    pub fn get(&self) -> Mode {
        Mode::from_raw(self.cell.load(Ordering::Acquire))
    }

    /// Stores a new mode.
    pub fn set(&self, mode: Mode) {
        self.cell.store(mode.to_raw(), Ordering::Release);
    }

    /// Parses and stores a mode label.
    ///
    /// # Errors
    ///
    /// Returns [`ModeError::InvalidMode`] when the label is unknown; the
    /// register is left unchanged.
    pub fn set_str(&self, value: &str) -> Result<Mode, ModeError> {
        let mode = value.parse::<Mode>()?;
        self.set(mode);
        Ok(mode)
    }
}

/// Returns the process-wide mode.
#[must_use]
pub fn get_mode() -> Mode {
    ModeRegister::global().get()
}

/// Sets the process-wide mode from a label.
///
/// # Errors
///
/// Returns [`ModeError::InvalidMode`] when the label is unknown.
pub fn set_mode(value: &str) -> Result<Mode, ModeError> {
    ModeRegister::global().set_str(value)
}
