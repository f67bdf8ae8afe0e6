// crates/keploy-capture/tests/axum_capture.rs
// ============================================================================
// Module: Axum Capture Tests
// Description: End-to-end capture through a served axum router.
// Purpose: Validate record, replay, and streaming over real sockets.
// Dependencies: keploy-capture, keploy-core, axum, reqwest, tokio, tokio-stream
// ============================================================================

//! Axum adapter integration tests for record and replay over loopback.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use axum::body::Body;
use axum::body::Bytes;
use axum::extract::Path;
use axum::http::StatusCode;
use axum::routing::get;
use keploy_capture::CapturePipeline;
use keploy_capture::TEST_ID_HEADER;
use keploy_capture::instrument;
use keploy_core::AppId;
use keploy_core::Dependency;
use keploy_core::DependencyKind;
use keploy_core::DependencyMeta;
use keploy_core::DriverError;
use keploy_core::HttpRequest;
use keploy_core::HttpResponse;
use keploy_core::InMemoryControlPlane;
use keploy_core::Mode;
use keploy_core::ModeRegister;
use keploy_core::RecordedError;
use keploy_core::ReplayRegistry;
use keploy_core::Testcase;
use keploy_core::TestcaseId;
use keploy_core::Timestamp;
use keploy_core::intercept;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::IntervalStream;

// ============================================================================
// SECTION: Service Under Test
// ============================================================================

#[derive(Debug)]
struct LookupError(String);

impl DriverError for LookupError {
    fn mock_not_found() -> Self {
        Self("mock not found".to_string())
    }

    fn to_recorded(&self) -> RecordedError {
        RecordedError::new(self.0.clone())
    }

    fn from_recorded(recorded: RecordedError) -> Self {
        Self(recorded.err_string)
    }
}

fn lookup_meta() -> DependencyMeta {
    DependencyMeta::new("inventory", DependencyKind::NoSqlDb, "Get")
}

static BACKEND_CALLS: AtomicUsize = AtomicUsize::new(0);

async fn get_order(Path(id): Path<String>) -> Result<String, (StatusCode, String)> {
    let row: Result<String, LookupError> = intercept(lookup_meta(), || async move {
        BACKEND_CALLS.fetch_add(1, Ordering::SeqCst);
        Ok(format!("live-{id}"))
    })
    .await;
    row.map_err(|err| (StatusCode::SERVICE_UNAVAILABLE, err.0))
}

/// Server-sent ticks that never end.
async fn ticks() -> Body {
    let ticks = IntervalStream::new(tokio::time::interval(Duration::from_millis(50)))
        .map(|_| Ok::<_, Infallible>(Bytes::from_static(b"tick\n")));
    Body::from_stream(ticks)
}

async fn serve(pipeline: Arc<CapturePipeline>) -> SocketAddr {
    let routes =
        axum::Router::new().route("/orders/{id}", get(get_order)).route("/ticks", get(ticks));
    let app = instrument(routes, pipeline);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn recorded_testcase(id: &str, row: &str) -> Testcase {
    let mut testcase = Testcase::http(
        TestcaseId::new(id),
        AppId::new("shop"),
        Timestamp::from_unix_seconds(1_600_000_000),
        HttpRequest::default(),
        HttpResponse::default(),
    );
    let outcome: Result<String, LookupError> = Ok(row.to_string());
    testcase.deps.push(Dependency::from_outcome(lookup_meta(), &outcome).unwrap());
    testcase
}

fn pipeline(mode: Mode, plane: &Arc<InMemoryControlPlane>) -> Arc<CapturePipeline> {
    Arc::new(
        CapturePipeline::new(AppId::new("shop"), Arc::clone(plane) as _, ReplayRegistry::new())
            .with_mode_register(ModeRegister::new(mode)),
    )
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn record_captures_request_response_and_path_params() {
    let plane = Arc::new(InMemoryControlPlane::new());
    let pipeline = pipeline(Mode::Record, &plane);
    let addr = serve(Arc::clone(&pipeline)).await;

    let response = reqwest::Client::new()
        .get(format!("http://{addr}/orders/7?verbose=1"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "live-7");
    pipeline.flush().await;

    let testcases = plane.testcases().unwrap();
    assert_eq!(testcases.len(), 1);
    let request = testcases[0].http_req.as_ref().unwrap();
    assert_eq!(request.method, "GET");
    assert_eq!(request.url, "/orders/7?verbose=1");
    assert_eq!(request.url_params.get("id").map(String::as_str), Some("7"));
    assert_eq!(request.url_params.get("verbose").map(String::as_str), Some("1"));
    assert_eq!(testcases[0].http_resp.as_ref().unwrap().body, "live-7");
    assert_eq!(testcases[0].deps.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn replay_header_serves_recorded_dependencies() {
    let plane = Arc::new(InMemoryControlPlane::new());
    let pipeline = pipeline(Mode::Test, &plane);
    let receiver = pipeline.registry().register(&recorded_testcase("tc-7", "taped-7")).unwrap();
    let addr = serve(Arc::clone(&pipeline)).await;
    let before = BACKEND_CALLS.load(Ordering::SeqCst);

    let response = reqwest::Client::new()
        .get(format!("http://{addr}/orders/7"))
        .header(TEST_ID_HEADER, "tc-7")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "taped-7");

    let delivered = receiver.await.unwrap();
    assert_eq!(delivered.status_code, 200);
    assert_eq!(delivered.body, "taped-7");
    assert_eq!(BACKEND_CALLS.load(Ordering::SeqCst), before);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_replays_stay_isolated() {
    let plane = Arc::new(InMemoryControlPlane::new());
    let pipeline = pipeline(Mode::Test, &plane);
    let addr = serve(Arc::clone(&pipeline)).await;
    let client = reqwest::Client::new();

    let mut tasks = Vec::new();
    for index in 0 .. 16 {
        let id = format!("tc-{index}");
        let receiver = pipeline
            .registry()
            .register(&recorded_testcase(&id, &format!("row-{index}")))
            .unwrap();
        let client = client.clone();
        tasks.push(tokio::spawn(async move {
            let body = client
                .get(format!("http://{addr}/orders/{index}"))
                .header(TEST_ID_HEADER, id)
                .send()
                .await
                .unwrap()
                .text()
                .await
                .unwrap();
            let delivered = receiver.await.unwrap();
            (index, body, delivered.body)
        }));
    }
    for task in tasks {
        let (index, body, delivered) = task.await.unwrap();
        assert_eq!(body, format!("row-{index}"));
        assert_eq!(delivered, body);
    }
    assert_eq!(pipeline.registry().pending().unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn off_mode_is_transparent() {
    let plane = Arc::new(InMemoryControlPlane::new());
    let pipeline = pipeline(Mode::Off, &plane);
    let addr = serve(Arc::clone(&pipeline)).await;

    let response = reqwest::Client::new()
        .get(format!("http://{addr}/orders/9"))
        .header(TEST_ID_HEADER, "ignored")
        .send()
        .await
        .unwrap();
    assert_eq!(response.text().await.unwrap(), "live-9");
    pipeline.flush().await;
    assert!(plane.testcases().unwrap().is_empty());
}

/// Reads the first frame of the endless tick stream, failing after two seconds.
async fn first_tick(addr: SocketAddr) -> Bytes {
    let read = async {
        let mut response =
            reqwest::Client::new().get(format!("http://{addr}/ticks")).send().await.unwrap();
        assert_eq!(response.status(), 200);
        response.chunk().await.unwrap().unwrap()
    };
    tokio::time::timeout(Duration::from_secs(2), read).await.expect("first tick within two seconds")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn record_mode_streams_unbounded_responses() {
    let plane = Arc::new(InMemoryControlPlane::new());
    let pipeline = pipeline(Mode::Record, &plane);
    let addr = serve(Arc::clone(&pipeline)).await;
    assert!(first_tick(addr).await.starts_with(b"tick\n"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_mode_without_header_streams_unbounded_responses() {
    let plane = Arc::new(InMemoryControlPlane::new());
    let pipeline = pipeline(Mode::Test, &plane);
    let addr = serve(Arc::clone(&pipeline)).await;
    assert!(first_tick(addr).await.starts_with(b"tick\n"));
}
