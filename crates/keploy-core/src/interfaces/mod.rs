// crates/keploy-core/src/interfaces/mod.rs
// ============================================================================
// Module: Keploy Interfaces
// Description: Backend-agnostic contract for the external control plane.
// Purpose: Define the narrow surface the SDK uses to persist and fetch testcases.
// Dependencies: crate::core, async-trait, thiserror
// ============================================================================

//! ## Overview
//! The control plane persists testcases and mocks, serves them back during
//! replay, and computes verdicts. The SDK treats it as opaque and talks to it
//! only through [`ControlPlane`]. Every operation is idempotent from the
//! caller's perspective; deduplication happens on the server side.

// ============================================================================
// SECTION: Imports
// ============================================================================

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::AppId;
use crate::core::HttpResponse;
use crate::core::Mock;
use crate::core::RunId;
use crate::core::Testcase;
use crate::core::TestcaseId;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Final status of a replay run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunStatus {
    /// Every testcase passed.
    Passed,
    /// At least one testcase failed or timed out.
    Failed,
}

impl RunStatus {
    /// Returns the wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Passed => "PASSED",
            Self::Failed => "FAILED",
        }
    }
}

/// Execution outcome reported for one replayed testcase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResult {
    /// Run the result belongs to.
    pub run_id: RunId,
    /// Replayed testcase.
    pub tc_id: TestcaseId,
    /// Response the service produced.
    pub actual_resp: HttpResponse,
}

/// Verdict returned by the control plane for a posted result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    /// True when the produced response matched the recording.
    pub pass: bool,
}

impl Verdict {
    /// Compares status and body of a recorded and a produced response.
    ///
    /// Used by the local control planes; the remote server applies its own
    /// noise-aware diff.
    #[must_use]
    pub fn compare(expected: &HttpResponse, actual: &HttpResponse) -> Self {
        Self {
            pass: expected.status_code == actual.status_code && expected.body == actual.body,
        }
    }
}

/// One graded result inside a run report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportEntry {
    /// Replayed testcase.
    pub tc_id: TestcaseId,
    /// Verdict for the testcase.
    pub pass: bool,
    /// Response the service produced.
    pub actual_resp: HttpResponse,
}

/// Accumulated state of one replay run kept by local control planes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    /// Run identifier.
    pub run_id: RunId,
    /// Application under test.
    pub app_id: AppId,
    /// Number of testcases announced at start.
    pub total: usize,
    /// Final status, set when the run ends.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<RunStatus>,
    /// Graded results in arrival order.
    pub results: Vec<ReportEntry>,
}

impl RunReport {
    /// Opens an empty report.
    #[must_use]
    pub const fn new(run_id: RunId, app_id: AppId, total: usize) -> Self {
        Self {
            run_id,
            app_id,
            total,
            status: None,
            results: Vec::new(),
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Control-plane errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControlPlaneError {
    /// The control plane could not be reached.
    #[error("control plane unavailable: {0}")]
    Unavailable(String),
    /// The control plane answered with something unparseable.
    #[error("control plane protocol error: {0}")]
    Protocol(String),
    /// The control plane refused the request.
    #[error("control plane rejected request ({status}): {message}")]
    Rejected {
        /// HTTP status code or local equivalent.
        status: u16,
        /// Reason reported by the server.
        message: String,
    },
    /// Local storage failure (file-backed planes).
    #[error("control plane io error: {0}")]
    Io(String),
}

// ============================================================================
// SECTION: Control Plane
// ============================================================================

/// Narrow client of the external testcase/mock server.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Upserts a testcase and returns its canonical identifier.
    ///
    /// # Errors
    ///
    /// Returns [`ControlPlaneError`] when the upsert fails.
    async fn put_testcase(&self, testcase: &Testcase) -> Result<TestcaseId, ControlPlaneError>;

    /// Upserts a single mock document on behalf of a testcase.
    ///
    /// # Errors
    ///
    /// Returns [`ControlPlaneError`] when the upsert fails.
    async fn put_mock(&self, testcase_id: &TestcaseId, mock: &Mock)
    -> Result<(), ControlPlaneError>;

    /// Fetches every testcase recorded for an application.
    ///
    /// # Errors
    ///
    /// Returns [`ControlPlaneError`] when the listing fails.
    async fn get_testcases(&self, app_id: &AppId) -> Result<Vec<Testcase>, ControlPlaneError>;

    /// Opens a replay run.
    ///
    /// # Errors
    ///
    /// Returns [`ControlPlaneError`] when the run cannot be opened.
    async fn start_run(&self, app_id: &AppId, total: usize) -> Result<RunId, ControlPlaneError>;

    /// Reports the response produced for one replayed testcase.
    ///
    /// # Errors
    ///
    /// Returns [`ControlPlaneError`] when the report fails.
    async fn post_result(&self, result: &TestResult) -> Result<Verdict, ControlPlaneError>;

    /// Closes a replay run.
    ///
    /// # Errors
    ///
    /// Returns [`ControlPlaneError`] when the run cannot be closed.
    async fn end_run(&self, run_id: &RunId, status: RunStatus) -> Result<(), ControlPlaneError>;
}
