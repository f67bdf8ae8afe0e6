// crates/keploy-core/src/runtime/store.rs
// ============================================================================
// Module: Keploy In-Memory Control Plane
// Description: Process-local control plane for tests and embedded use.
// Purpose: Provide a deterministic ControlPlane without network or disk.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! [`InMemoryControlPlane`] keeps testcases, mocks, and run reports behind a
//! mutex. Verdicts use [`Verdict::compare`]. It is not intended for
//! production use.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use async_trait::async_trait;

use crate::core::AppId;
use crate::core::Mock;
use crate::core::RunId;
use crate::core::Testcase;
use crate::core::TestcaseId;
use crate::interfaces::ControlPlane;
use crate::interfaces::ControlPlaneError;
use crate::interfaces::ReportEntry;
use crate::interfaces::RunReport;
use crate::interfaces::RunStatus;
use crate::interfaces::TestResult;
use crate::interfaces::Verdict;

// ============================================================================
// SECTION: State
// ============================================================================

/// Mutable state behind the control-plane mutex.
#[derive(Debug, Default)]
struct State {
    /// Testcases keyed by id.
    testcases: BTreeMap<TestcaseId, Testcase>,
    /// Mocks upserted separately, keyed by owning testcase.
    mocks: BTreeMap<TestcaseId, Vec<Mock>>,
    /// Run reports keyed by run id.
    runs: BTreeMap<String, RunReport>,
}

// ============================================================================
// SECTION: In-Memory Control Plane
// ============================================================================

/// In-memory control plane for tests and examples.
#[derive(Debug, Default, Clone)]
pub struct InMemoryControlPlane {
    /// Shared state protected by a mutex.
    state: Arc<Mutex<State>>,
}

impl InMemoryControlPlane {
    /// Creates an empty control plane.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a control plane seeded with `testcases`.
    #[must_use]
    pub fn with_testcases(testcases: impl IntoIterator<Item = Testcase>) -> Self {
        let state = State {
            testcases: testcases.into_iter().map(|tc| (tc.id.clone(), tc)).collect(),
            ..State::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Returns every stored testcase with separately upserted mocks attached.
    ///
    /// # Errors
    ///
    /// Returns [`ControlPlaneError::Unavailable`] when the mutex is poisoned.
    pub fn testcases(&self) -> Result<Vec<Testcase>, ControlPlaneError> {
        let state = self.lock()?;
        Ok(state.testcases.values().map(|tc| stitch(&state, tc)).collect())
    }

    /// Returns the report for `run_id`, if the run exists.
    ///
    /// # Errors
    ///
    /// Returns [`ControlPlaneError::Unavailable`] when the mutex is poisoned.
    pub fn run(&self, run_id: &RunId) -> Result<Option<RunReport>, ControlPlaneError> {
        Ok(self.lock()?.runs.get(run_id.as_str()).cloned())
    }

    /// Locks the state.
    fn lock(&self) -> Result<MutexGuard<'_, State>, ControlPlaneError> {
        self.state
            .lock()
            .map_err(|_| ControlPlaneError::Unavailable("control plane mutex poisoned".to_string()))
    }
}

#[async_trait]
impl ControlPlane for InMemoryControlPlane {
    async fn put_testcase(&self, testcase: &Testcase) -> Result<TestcaseId, ControlPlaneError> {
        let mut testcase = testcase.clone();
        if testcase.id.is_empty() {
            testcase.id = TestcaseId::generate();
        }
        let id = testcase.id.clone();
        self.lock()?.testcases.insert(id.clone(), testcase);
        Ok(id)
    }

    async fn put_mock(
        &self,
        testcase_id: &TestcaseId,
        mock: &Mock,
    ) -> Result<(), ControlPlaneError> {
        self.lock()?.mocks.entry(testcase_id.clone()).or_default().push(mock.clone());
        Ok(())
    }

    async fn get_testcases(&self, app_id: &AppId) -> Result<Vec<Testcase>, ControlPlaneError> {
        let state = self.lock()?;
        let mut testcases: Vec<Testcase> = state
            .testcases
            .values()
            .filter(|tc| tc.app_id == *app_id)
            .map(|tc| stitch(&state, tc))
            .collect();
        drop(state);
        testcases.sort_by(|a, b| a.captured_at.cmp(&b.captured_at).then_with(|| a.id.cmp(&b.id)));
        Ok(testcases)
    }

    async fn start_run(&self, app_id: &AppId, total: usize) -> Result<RunId, ControlPlaneError> {
        let run_id = RunId::generate();
        let report = RunReport::new(run_id.clone(), app_id.clone(), total);
        self.lock()?.runs.insert(run_id.as_str().to_string(), report);
        Ok(run_id)
    }

    async fn post_result(&self, result: &TestResult) -> Result<Verdict, ControlPlaneError> {
        let mut state = self.lock()?;
        let expected = state
            .testcases
            .get(&result.tc_id)
            .ok_or_else(|| rejected(404, format!("unknown testcase {}", result.tc_id)))?
            .http_resp
            .clone()
            .unwrap_or_default();
        let verdict = Verdict::compare(&expected, &result.actual_resp);
        let report = state
            .runs
            .get_mut(result.run_id.as_str())
            .ok_or_else(|| rejected(404, format!("unknown run {}", result.run_id)))?;
        if report.status.is_some() {
            return Err(rejected(409, format!("run {} already ended", result.run_id)));
        }
        report.results.push(ReportEntry {
            tc_id: result.tc_id.clone(),
            pass: verdict.pass,
            actual_resp: result.actual_resp.clone(),
        });
        drop(state);
        Ok(verdict)
    }

    async fn end_run(&self, run_id: &RunId, status: RunStatus) -> Result<(), ControlPlaneError> {
        let mut state = self.lock()?;
        let report = state
            .runs
            .get_mut(run_id.as_str())
            .ok_or_else(|| rejected(404, format!("unknown run {run_id}")))?;
        report.status = Some(status);
        drop(state);
        Ok(())
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns `testcase` with separately upserted mocks appended.
fn stitch(state: &State, testcase: &Testcase) -> Testcase {
    let mut testcase = testcase.clone();
    if let Some(mocks) = state.mocks.get(&testcase.id) {
        testcase.mocks.extend(mocks.iter().cloned());
    }
    testcase
}

/// Builds a rejection error.
const fn rejected(status: u16, message: String) -> ControlPlaneError {
    ControlPlaneError::Rejected {
        status,
        message,
    }
}
