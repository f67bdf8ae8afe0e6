// crates/keploy-config/src/lib.rs
// ============================================================================
// Module: Keploy Config Library
// Description: Canonical config model and validation.
// Purpose: Single source of truth for keploy.toml semantics.
// Dependencies: keploy-core, regex, serde, toml, url
// ============================================================================

//! ## Overview
//! `keploy-config` defines the configuration surface shared by the capture
//! pipeline, the control-plane clients, and the replay driver. Loading is
//! strict: oversized files, unknown modes, and inconsistent sections fail
//! before any instrumentation starts.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
