// system-tests/src/lib.rs
// ============================================================================
// Module: Keploy System Tests Library
// Description: Shared configuration and the sample service under test.
// Purpose: Provide common utilities for the end-to-end record/replay suites.
// Dependencies: keploy-capture, keploy-drivers, axum
// ============================================================================

//! ## Overview
//! This crate hosts the environment configuration and a small instrumented
//! users service exercised by the suites in `system-tests/tests`. The
//! service reads from `SQLite` through the SQL driver and stamps responses
//! through the interceptable clock, so every scenario runs over a real
//! socket.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;
pub mod service;
