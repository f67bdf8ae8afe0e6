// crates/keploy-replay/src/lib.rs
// ============================================================================
// Module: Keploy Replay Library
// Description: Test-mode driver for the record/replay SDK.
// Purpose: Replay stored testcases against a live service and report results.
// Dependencies: keploy-core, keploy-config, reqwest, tokio
// ============================================================================

//! ## Overview
//! The replay driver runs beside the service under test. It shares a
//! [`keploy_core::ReplayRegistry`] with the capture pipeline: the driver
//! registers each testcase before dispatching it, and the pipeline claims
//! the entry when the request carrying the matching test-id header arrives.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod driver;


// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use driver::CaseOutcome;
pub use driver::CaseVerdict;
pub use driver::ReplayDriver;
pub use driver::ReplayError;
pub use driver::RunSummary;
