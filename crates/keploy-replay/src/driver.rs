// crates/keploy-replay/src/driver.rs
// ============================================================================
// Module: Keploy Replay Driver
// Description: Re-issues recorded requests against the running service.
// Purpose: Drive one replay run from testcase fetch to final status.
// Dependencies: keploy-core, reqwest, tokio, tracing
// ============================================================================

//! ## Overview
//! [`ReplayDriver::run`] executes one replay run:
//!
//! 1. Waits the startup delay, then fetches the app's testcases. A fetch
//!    failure aborts the run.
//! 2. Opens a run on the control plane.
//! 3. For each testcase, in order: registers its recorded dependencies in
//!    the [`ReplayRegistry`], sends the stored request to the service with
//!    the test-id header, and waits on the completion latch for the
//!    response the handler produced.
//! 4. Posts `(run, testcase, actual)` and collects the server verdict.
//! 5. Closes the run as `PASSED` or `FAILED`.
//!
//! A testcase whose latch does not fire before the deadline counts as a
//! failure. Its registry entry is dropped but the in-flight request is left
//! running.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use keploy_config::KeployConfig;
use keploy_core::AppId;
use keploy_core::ControlPlane;
use keploy_core::ControlPlaneError;
use keploy_core::HttpRequest;
use keploy_core::Mode;
use keploy_core::ReplayRegistry;
use keploy_core::RunId;
use keploy_core::RunStatus;
use keploy_core::TEST_ID_HEADER;
use keploy_core::TestResult;
use keploy_core::Testcase;
use keploy_core::TestcaseId;
use reqwest::Client;
use reqwest::Method;
use reqwest::Request;
use reqwest::header::HeaderName;
use reqwest::header::HeaderValue;
use reqwest::redirect::Policy;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::info;
use tracing::warn;
use url::Url;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Recorded headers never forwarded on replay.
const SKIPPED_HEADERS: [&str; 6] =
    ["host", "content-length", "connection", "transfer-encoding", "keep-alive", "upgrade"];

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Replay driver errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReplayError {
    /// The control plane failed while opening or closing the run.
    #[error("replay control plane error: {0}")]
    ControlPlane(String),
    /// A replay request could not be built or sent.
    #[error("replay dispatch error: {0}")]
    Dispatch(String),
    /// The driver configuration is unusable.
    #[error("replay config error: {0}")]
    Config(String),
}

impl From<ControlPlaneError> for ReplayError {
    fn from(err: ControlPlaneError) -> Self {
        Self::ControlPlane(err.to_string())
    }
}

// ============================================================================
// SECTION: Results
// ============================================================================

/// Outcome of one replayed testcase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaseVerdict {
    /// The server judged the response equal to the recording.
    Passed,
    /// The server judged the response different from the recording.
    Failed,
    /// The handler did not complete before the deadline.
    TimedOut,
    /// The request never produced a response.
    DispatchFailed(String),
    /// The verdict could not be obtained from the control plane.
    Unreported(String),
    /// The testcase has no HTTP request to replay.
    Skipped,
}

impl CaseVerdict {
    /// Returns true for verdicts that fail the run.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        !matches!(self, Self::Passed | Self::Skipped)
    }
}

/// Verdict recorded for one testcase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseOutcome {
    /// Replayed testcase.
    pub tc_id: TestcaseId,
    /// Outcome.
    pub verdict: CaseVerdict,
}

/// Aggregated result of a replay run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Run identifier issued by the control plane.
    pub run_id: RunId,
    /// Final status reported to the control plane.
    pub status: RunStatus,
    /// Per-testcase outcomes in replay order.
    pub outcomes: Vec<CaseOutcome>,
}

impl RunSummary {
    /// Number of passing testcases.
    #[must_use]
    pub fn passed(&self) -> usize {
        self.outcomes.iter().filter(|outcome| outcome.verdict == CaseVerdict::Passed).count()
    }

    /// Number of failing testcases.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|outcome| outcome.verdict.is_failure()).count()
    }
}

// ============================================================================
// SECTION: Driver
// ============================================================================

/// Replay run driver for one application.
#[derive(Clone)]
pub struct ReplayDriver {
    /// Application under test.
    app_id: AppId,
    /// Testcase source and verdict sink.
    control_plane: Arc<dyn ControlPlane>,
    /// Registry shared with the capture pipeline.
    registry: ReplayRegistry,
    /// Client used to reach the service.
    client: Client,
    /// Base URL of the service.
    base_url: Url,
    /// Grace period before the first fetch.
    delay: Duration,
    /// Per-testcase deadline.
    timeout: Duration,
}

impl ReplayDriver {
    /// Creates a driver targeting `base_url`.
    ///
    /// `registry` must be the one the service's capture pipeline consults.
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::Config`] when the URL is invalid or the HTTP
    /// client cannot be built.
    pub fn new(
        app_id: AppId,
        base_url: &str,
        control_plane: Arc<dyn ControlPlane>,
        registry: ReplayRegistry,
    ) -> Result<Self, ReplayError> {
        let base_url = Url::parse(base_url)
            .map_err(|err| ReplayError::Config(format!("invalid service url {base_url}: {err}")))?;
        let client = Client::builder()
            .redirect(Policy::none())
            .build()
            .map_err(|err| ReplayError::Config(err.to_string()))?;
        Ok(Self {
            app_id,
            control_plane,
            registry,
            client,
            base_url,
            delay: Duration::ZERO,
            timeout: Duration::from_secs(60),
        })
    }

    /// Creates a driver from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::Config`] unless the configuration is in test
    /// mode with a usable service address.
    pub fn from_config(
        config: &KeployConfig,
        control_plane: Arc<dyn ControlPlane>,
        registry: ReplayRegistry,
    ) -> Result<Self, ReplayError> {
        if config.mode != Mode::Test {
            return Err(ReplayError::Config(format!(
                "replay requires mode=test, got mode={}",
                config.mode.as_str()
            )));
        }
        Ok(Self::new(
            AppId::new(config.app.id.clone()),
            &config.app.base_url(),
            control_plane,
            registry,
        )?
        .with_delay(config.app.delay())
        .with_timeout(config.app.timeout()))
    }

    /// Sets the startup grace period.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Sets the per-testcase deadline.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Runs the driver on a background task.
    #[must_use]
    pub fn spawn(self) -> JoinHandle<Result<RunSummary, ReplayError>> {
        tokio::spawn(async move { self.run().await })
    }

    /// Executes one replay run.
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::ControlPlane`] when testcases cannot be fetched
    /// or the run cannot be opened or closed. Per-testcase failures are
    /// reported in the summary instead.
    pub async fn run(&self) -> Result<RunSummary, ReplayError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let testcases = self.control_plane.get_testcases(&self.app_id).await?;
        let run_id = self.control_plane.start_run(&self.app_id, testcases.len()).await?;
        info!(app_id = %self.app_id, run_id = %run_id, total = testcases.len(), "replay run started");

        let mut outcomes = Vec::with_capacity(testcases.len());
        for testcase in &testcases {
            let verdict = self.replay_one(&run_id, testcase).await;
            match &verdict {
                CaseVerdict::Passed => debug!(test_id = %testcase.id, "testcase passed"),
                CaseVerdict::Skipped => debug!(test_id = %testcase.id, "testcase skipped"),
                other => warn!(test_id = %testcase.id, verdict = verdict_label(other), "testcase failed"),
            }
            outcomes.push(CaseOutcome {
                tc_id: testcase.id.clone(),
                verdict,
            });
        }

        let status = if outcomes.iter().any(|outcome| outcome.verdict.is_failure()) {
            RunStatus::Failed
        } else {
            RunStatus::Passed
        };
        self.control_plane.end_run(&run_id, status).await?;
        let summary = RunSummary {
            run_id,
            status,
            outcomes,
        };
        info!(
            run_id = %summary.run_id,
            status = status.as_str(),
            passed = summary.passed(),
            failed = summary.failed(),
            "replay run finished"
        );
        Ok(summary)
    }

    /// Replays one testcase and obtains its verdict.
    async fn replay_one(&self, run_id: &RunId, testcase: &Testcase) -> CaseVerdict {
        let Some(recorded) = testcase.http_req.as_ref() else {
            return CaseVerdict::Skipped;
        };
        let request = match self.build_request(&testcase.id, recorded) {
            Ok(request) => request,
            Err(err) => return CaseVerdict::DispatchFailed(err.to_string()),
        };
        let receiver = match self.registry.register(testcase) {
            Ok(receiver) => receiver,
            Err(err) => return CaseVerdict::DispatchFailed(err.to_string()),
        };

        let client = self.client.clone();
        let registry = self.registry.clone();
        let id = testcase.id.clone();
        let dispatch = tokio::spawn(async move {
            match client.execute(request).await {
                Ok(_) => Ok(()),
                Err(err) => {
                    // Dropping the entry closes the latch.
                    if let Err(abandon) = registry.abandon(&id) {
                        warn!(test_id = %id, error = %abandon, "replay registry unavailable");
                    }
                    Err(err.to_string())
                }
            }
        });

        let actual_resp = match tokio::time::timeout(self.timeout, receiver).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => {
                let reason = match dispatch.await {
                    Ok(Err(err)) => err,
                    Ok(Ok(())) => "service answered without completing the replay".to_string(),
                    Err(err) => err.to_string(),
                };
                return CaseVerdict::DispatchFailed(reason);
            }
            Err(_) => {
                if let Err(err) = self.registry.abandon(&testcase.id) {
                    warn!(test_id = %testcase.id, error = %err, "replay registry unavailable");
                }
                return CaseVerdict::TimedOut;
            }
        };

        let result = TestResult {
            run_id: run_id.clone(),
            tc_id: testcase.id.clone(),
            actual_resp,
        };
        match self.control_plane.post_result(&result).await {
            Ok(verdict) if verdict.pass => CaseVerdict::Passed,
            Ok(_) => CaseVerdict::Failed,
            Err(err) => CaseVerdict::Unreported(err.to_string()),
        }
    }

    /// Builds the replay request for a recorded inbound request.
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::Dispatch`] when the recording cannot be
    /// expressed as a request to the service.
    pub fn build_request(
        &self,
        id: &TestcaseId,
        recorded: &HttpRequest,
    ) -> Result<Request, ReplayError> {
        let method = Method::from_bytes(recorded.method.as_bytes())
            .map_err(|_| ReplayError::Dispatch(format!("invalid method {}", recorded.method)))?;
        let url = self
            .base_url
            .join(&recorded.url)
            .map_err(|err| ReplayError::Dispatch(format!("invalid url {}: {err}", recorded.url)))?;
        let mut request = Request::new(method, url);
        let headers = request.headers_mut();
        for (name, values) in &recorded.header {
            let lower = name.to_ascii_lowercase();
            if SKIPPED_HEADERS.contains(&lower.as_str()) || lower == TEST_ID_HEADER {
                continue;
            }
            let Ok(name) = HeaderName::from_bytes(lower.as_bytes()) else {
                continue;
            };
            for value in values {
                if let Ok(value) = HeaderValue::from_str(value) {
                    headers.append(name.clone(), value);
                }
            }
        }
        let test_id = HeaderValue::from_str(id.as_str())
            .map_err(|_| ReplayError::Dispatch(format!("testcase id {id} is not a header value")))?;
        headers.insert(TEST_ID_HEADER, test_id);
        if !recorded.body.is_empty() {
            *request.body_mut() = Some(recorded.body.clone().into());
        }
        Ok(request)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Short label of a failing verdict for logs.
const fn verdict_label(verdict: &CaseVerdict) -> &'static str {
    match verdict {
        CaseVerdict::Passed => "passed",
        CaseVerdict::Failed => "failed",
        CaseVerdict::TimedOut => "timed_out",
        CaseVerdict::DispatchFailed(_) => "dispatch_failed",
        CaseVerdict::Unreported(_) => "unreported",
        CaseVerdict::Skipped => "skipped",
    }
}
