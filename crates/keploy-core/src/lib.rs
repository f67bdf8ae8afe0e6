// crates/keploy-core/src/lib.rs
// ============================================================================
// Module: Keploy Core Library
// Description: Public API surface for the Keploy record/replay core.
// Purpose: Expose the data model, control-plane interface, and runtime kernel.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! Keploy core is the framework-free part of the record/replay layer: the
//! tri-state mode register, the per-request context carried on a task-local
//! slot, the dependency protocol, and the kernel every driver adapter
//! delegates to. Framework adapters, driver wrappers, and control-plane
//! transports live in sibling crates and integrate through the interfaces
//! exported here.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use core::*;

pub use interfaces::ControlPlane;
pub use interfaces::ControlPlaneError;
pub use interfaces::ReportEntry;
pub use interfaces::RunReport;
pub use interfaces::RunStatus;
pub use interfaces::TestResult;
pub use interfaces::Verdict;
pub use runtime::*;
