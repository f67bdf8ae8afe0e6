// system-tests/tests/helpers/mod.rs
// ============================================================================
// Module: System Test Helpers
// Description: Shared helpers for Keploy system-tests.
// Purpose: Launch the users service in a chosen mode and drive it over HTTP.
// Dependencies: system-tests, keploy-capture, keploy-replay
// ============================================================================

//! ## Overview
//! Shared helpers for Keploy system-tests.
//! Invariants:
//! - Every service binds an ephemeral loopback port and a fresh database.
//! - Recording and replay instances never share a replay registry.

#![allow(dead_code, reason = "Shared helpers are reused across multiple test suites.")]

pub mod harness;
