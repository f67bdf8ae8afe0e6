// system-tests/tests/helpers/harness.rs
// ============================================================================
// Module: Service Harness
// Description: Launches the instrumented users service for one scenario.
// Purpose: Keep mode, clock, and control-plane wiring identical across suites.
// ============================================================================

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use keploy_capture::CapturePipeline;
use keploy_core::AppId;
use keploy_core::ControlPlane;
use keploy_core::FixedClock;
use keploy_core::InMemoryControlPlane;
use keploy_core::KeployClock;
use keploy_core::Mode;
use keploy_core::ModeRegister;
use keploy_core::ReplayRegistry;
use keploy_core::TEST_ID_HEADER;
use keploy_core::Testcase;
use keploy_core::Timestamp;
use keploy_drivers::KeploySql;
use keploy_replay::ReplayDriver;
use keploy_replay::RunSummary;
use system_tests::config::SystemTestConfig;
use system_tests::service::ObservedSql;
use system_tests::service::UsersState;
use system_tests::service::serve;

/// Application id used by every scenario.
pub const APP: &str = "users";
/// Capture instant used by clock scenarios.
pub const T0: i64 = 1_700_000_000;

/// Launch options.
#[derive(Clone, Copy, Default)]
pub struct Launch {
    /// Freeze both the capture and handler clocks at this instant.
    pub frozen_at: Option<Timestamp>,
    /// Upsert mocks as separate documents.
    pub file_export: bool,
}

/// One running users service.
pub struct Service {
    /// Bound address.
    pub addr: SocketAddr,
    /// Capture pipeline in front of the router.
    pub pipeline: Arc<CapturePipeline>,
    /// Registry the pipeline resolves test ids against.
    pub registry: ReplayRegistry,
    /// Database behind the SQL driver.
    pub backend: Arc<ObservedSql>,
    /// Control plane the pipeline records into.
    pub plane: Arc<dyn ControlPlane>,
}

impl Service {
    /// Starts a service in `mode` recording into `plane`.
    pub async fn start(mode: Mode, plane: Arc<dyn ControlPlane>) -> Self {
        Self::launch(mode, plane, Launch::default()).await
    }

    /// Starts a service with explicit options.
    pub async fn launch(mode: Mode, plane: Arc<dyn ControlPlane>, options: Launch) -> Self {
        let registry = ReplayRegistry::new();
        let backend = Arc::new(ObservedSql::seeded().unwrap());
        let mut pipeline = CapturePipeline::new(AppId::new(APP), Arc::clone(&plane), registry.clone())
            .with_mode_register(ModeRegister::new(mode))
            .with_file_export(options.file_export);
        let mut state = UsersState::new(KeploySql::new(Arc::clone(&backend) as _));
        if let Some(at) = options.frozen_at {
            pipeline = pipeline.with_clock(Arc::new(FixedClock(at)));
            state = state.with_clock(Arc::new(KeployClock::new(FixedClock(at))));
        }
        let pipeline = Arc::new(pipeline);
        let addr = serve(state, Arc::clone(&pipeline)).await.unwrap();
        Self {
            addr,
            pipeline,
            registry,
            backend,
            plane,
        }
    }

    /// Returns the absolute URL of `path`.
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    /// Issues `GET path` and returns status and body.
    pub async fn get(&self, path: &str) -> (u16, String) {
        self.send(path, None).await
    }

    /// Issues `GET path` tagged with `test_id`.
    pub async fn get_as(&self, path: &str, test_id: &str) -> (u16, String) {
        self.send(path, Some(test_id)).await
    }

    /// Waits for every testcase upload started so far.
    pub async fn flush(&self) {
        self.pipeline.flush().await;
    }

    /// Builds a replay driver targeting this service.
    pub fn driver(&self) -> ReplayDriver {
        let timeout = SystemTestConfig::load().unwrap().replay_timeout(Duration::from_secs(10));
        ReplayDriver::new(
            AppId::new(APP),
            &format!("http://{}", self.addr),
            Arc::clone(&self.plane),
            self.registry.clone(),
        )
        .unwrap()
        .with_timeout(timeout)
    }

    /// Sends one request.
    async fn send(&self, path: &str, test_id: Option<&str>) -> (u16, String) {
        let mut request = reqwest::Client::new().get(self.url(path));
        if let Some(test_id) = test_id {
            request = request.header(TEST_ID_HEADER, test_id);
        }
        let response = request.send().await.unwrap();
        let status = response.status().as_u16();
        (status, response.text().await.unwrap())
    }
}

// ============================================================================
// SECTION: Scenario Steps
// ============================================================================

/// Records one testcase per path against a fresh `Record` service.
pub async fn record(paths: &[&str]) -> Vec<Testcase> {
    let plane = Arc::new(InMemoryControlPlane::new());
    let service = Service::start(Mode::Record, Arc::clone(&plane) as _).await;
    for path in paths {
        let (status, body) = service.get(path).await;
        assert_eq!(status, 200, "{path} answered {body}");
    }
    service.flush().await;
    plane.testcases().unwrap()
}

/// Replays `testcases` against a fresh `Test` service through the replay driver.
pub async fn replay(testcases: Vec<Testcase>) -> (Service, Arc<InMemoryControlPlane>, RunSummary) {
    let plane = Arc::new(InMemoryControlPlane::with_testcases(testcases));
    let service = Service::start(Mode::Test, Arc::clone(&plane) as _).await;
    let summary = service.driver().run().await.unwrap();
    (service, plane, summary)
}

/// Returns the testcase recorded for `url`.
pub fn by_url<'a>(testcases: &'a [Testcase], url: &str) -> &'a Testcase {
    testcases
        .iter()
        .find(|testcase| testcase.http_req.as_ref().is_some_and(|request| request.url == url))
        .unwrap_or_else(|| panic!("no testcase recorded for {url}"))
}

/// Operation names of a testcase's dependencies.
pub fn operations(testcase: &Testcase) -> Vec<&str> {
    testcase.deps.iter().map(|dep| dep.meta.operation()).collect()
}
