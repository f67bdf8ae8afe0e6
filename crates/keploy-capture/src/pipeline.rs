// crates/keploy-capture/src/pipeline.rs
// ============================================================================
// Module: Keploy Capture Pipeline
// Description: Binds one inbound request to the dependencies it produced.
// Purpose: Emit testcases in record mode and feed responses back in replay.
// Dependencies: keploy-core, keploy-config, http-body-util, tokio, tracing
// ============================================================================

//! ## Overview
//! [`CapturePipeline::handle`] runs once per inbound request:
//!
//! 1. `Off`: the handler chain runs untouched.
//! 2. The request carries the test-id header: a `Test` context is built from
//!    the replay registry, the handler runs, and the produced response is
//!    released on the completion latch.
//! 3. Otherwise, in `Record` mode and when the filter allows: a `Record`
//!    context is installed, the handler runs, and the assembled testcase is
//!    upserted in the background.
//!
//! The request body is buffered and handed back to the handler unchanged;
//! the response writer is wrapped in a [`TeeWriter`]. A declared length over
//! the body limit bypasses capture before anything is read. A body that
//! outgrows the limit while streaming, or fails mid-read, also bypasses
//! capture: the handler then receives the bytes already read followed by
//! the rest of the stream (or the same read error), never a shortened body.
//! Hijacked exchanges and responses larger than the limit are served but
//! not recorded.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use axum::body::Body;
use axum::http::Request;
use axum::http::Version;
use bytes::Bytes;
use bytes::BytesMut;
use http_body_util::BodyExt;
use keploy_config::KeployConfig;
use keploy_core::AppId;
use keploy_core::Clock;
use keploy_core::ControlPlane;
use keploy_core::HttpRequest;
use keploy_core::HttpResponse;
use keploy_core::Mode;
use keploy_core::ModeRegister;
use keploy_core::ReplayRegistry;
use keploy_core::RequestContext;
use keploy_core::SystemClock;
use keploy_core::Testcase;
use keploy_core::TestcaseId;
use keploy_core::install;
use tokio::task::JoinSet;
use tokio_stream::StreamExt;
use tracing::debug;
use tracing::warn;

use crate::filter::CaptureFilter;
use crate::router::CaptureError;
use crate::router::Router;
use crate::router::TEST_ID_HEADER;
use crate::tee::TeeWriter;
use crate::tee::header_map_to_headers;
use crate::tee::lock_capture;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default maximum request or response body buffered for capture.
pub const DEFAULT_MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

// ============================================================================
// SECTION: Pipeline
// ============================================================================

/// Inbound capture pipeline shared by every request of a service.
pub struct CapturePipeline {
    /// Mode register consulted per request.
    mode: ModeRegister,
    /// Application the testcases belong to.
    app_id: AppId,
    /// Destination of recorded testcases.
    control_plane: Arc<dyn ControlPlane>,
    /// Replay scripts registered by the replay driver.
    registry: ReplayRegistry,
    /// Record-mode request filter.
    filter: CaptureFilter,
    /// Noise paths attached to recorded testcases.
    noise: Vec<String>,
    /// Upsert mocks separately instead of inline.
    file_export: bool,
    /// Source of capture timestamps.
    clock: Arc<dyn Clock>,
    /// Maximum body size buffered, for requests and mirrored responses.
    max_body_bytes: usize,
    /// Background testcase upserts.
    uploads: Mutex<JoinSet<()>>,
}

impl CapturePipeline {
    /// Creates a pipeline bound to the process-wide mode register.
    #[must_use]
    pub fn new(
        app_id: AppId,
        control_plane: Arc<dyn ControlPlane>,
        registry: ReplayRegistry,
    ) -> Self {
        Self {
            mode: ModeRegister::global().clone(),
            app_id,
            control_plane,
            registry,
            filter: CaptureFilter::default(),
            noise: Vec::new(),
            file_export: false,
            clock: Arc::new(SystemClock),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            uploads: Mutex::new(JoinSet::new()),
        }
    }

    /// Creates a pipeline from validated configuration.
    ///
    /// The configured mode is written to the process-wide register.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::Config`] when the capture filter is invalid.
    pub fn from_config(
        config: &KeployConfig,
        control_plane: Arc<dyn ControlPlane>,
        registry: ReplayRegistry,
    ) -> Result<Self, CaptureError> {
        ModeRegister::global().set(config.mode);
        let filter = CaptureFilter::from_config(&config.app.filter)?;
        Ok(Self::new(AppId::new(config.app.id.clone()), control_plane, registry)
            .with_filter(filter)
            .with_noise(config.app.noise.clone())
            .with_file_export(config.app.file_export))
    }

    /// Uses `mode` instead of the process-wide register.
    #[must_use]
    pub fn with_mode_register(mut self, mode: ModeRegister) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the record-mode filter.
    #[must_use]
    pub fn with_filter(mut self, filter: CaptureFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Sets the noise paths stored on testcases.
    #[must_use]
    pub fn with_noise(mut self, noise: Vec<String>) -> Self {
        self.noise = noise;
        self
    }

    /// Upserts mocks as individual documents.
    #[must_use]
    pub const fn with_file_export(mut self, file_export: bool) -> Self {
        self.file_export = file_export;
        self
    }

    /// Sets the clock used to stamp recorded testcases.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sets the maximum body size buffered for capture.
    #[must_use]
    pub const fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    /// Returns the current process mode.
    #[must_use]
    pub fn mode(&self) -> Mode {
        self.mode.get()
    }

    /// Returns the replay registry consulted for test-id requests.
    #[must_use]
    pub const fn registry(&self) -> &ReplayRegistry {
        &self.registry
    }

    /// Runs one inbound request through the pipeline.
    ///
    /// # Errors
    ///
    /// Returns the [`CaptureError`] reported by the handler chain; capture
    /// failures themselves never fail the request.
    pub async fn handle<R>(&self, router: &mut R) -> Result<(), CaptureError>
    where
        R: Router + ?Sized,
    {
        let mode = self.mode.get();
        if mode == Mode::Off {
            return router.next().await;
        }
        let test_id = router
            .request()
            .headers()
            .get(TEST_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(|value| TestcaseId::new(value.trim()));
        let ctx = match test_id {
            Some(id) => self.replay_context(&id),
            None if mode == Mode::Record
                && self.filter.allows(router.request().uri(), router.request().headers()) =>
            {
                RequestContext::record(self.clock.now()).with_file_export(self.file_export)
            }
            None => return router.next().await,
        };

        let declared = router
            .request()
            .headers()
            .get(axum::http::header::CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<usize>().ok());
        if declared.is_some_and(|length| length > self.max_body_bytes) {
            warn!(
                max_body_bytes = self.max_body_bytes,
                "request body over capture limit; serving request uncaptured"
            );
            return router.next().await;
        }

        let body = std::mem::take(router.request_mut().body_mut());
        let bytes = match buffer_body(body, self.max_body_bytes).await {
            BufferedBody::Complete(bytes) => bytes,
            BufferedBody::Bypass(body, reason) => {
                warn!(reason = %reason, "inbound capture failed; serving request uncaptured");
                *router.request_mut().body_mut() = body;
                return router.next().await;
            }
        };
        *router.request_mut().body_mut() = Body::from(bytes.clone());
        let request = snapshot_request(router.request(), router.url_params(), &bytes);

        let Some(inner) = router.take_response_writer() else {
            warn!("no response writer available; serving request uncaptured");
            return router.next().await;
        };
        let (tee, capture) = TeeWriter::with_limit(inner, self.max_body_bytes);
        router.set_response_writer(Box::new(tee));

        let ctx = Arc::new(ctx);
        router.request_mut().extensions_mut().insert(Arc::clone(&ctx));
        let outcome = install(Arc::clone(&ctx), router.next()).await;

        let (response, hijacked, truncated) = {
            let capture = lock_capture(&capture);
            (capture.to_http_response(), capture.hijacked, capture.truncated)
        };
        match ctx.mode() {
            Mode::Test => {
                let test_id = ctx.test_id().map(ToString::to_string).unwrap_or_default();
                if truncated {
                    warn!(test_id = %test_id, "replayed response over capture limit; body cut short");
                }
                if ctx.complete(response) {
                    debug!(test_id = %test_id, "replayed response delivered");
                } else {
                    debug!(test_id = %test_id, "replayed response not awaited");
                }
            }
            Mode::Record if hijacked => debug!("connection hijacked; testcase not recorded"),
            Mode::Record if truncated => {
                warn!(
                    max_body_bytes = self.max_body_bytes,
                    "response body over capture limit; testcase not recorded"
                );
            }
            Mode::Record => self.emit(&ctx, request, response),
            Mode::Off => {}
        }
        outcome
    }

    /// Waits for every background upsert started so far.
    pub async fn flush(&self) {
        let mut uploads = std::mem::take(&mut *self.uploads());
        while let Some(result) = uploads.join_next().await {
            if let Err(err) = result {
                warn!(error = %err, "testcase upload task failed");
            }
        }
    }

    /// Builds the context for a replayed request.
    ///
    /// An unregistered id still gets an empty `Test` context so the handler
    /// never reaches a real backend.
    fn replay_context(&self, id: &TestcaseId) -> RequestContext {
        match self.registry.take(id) {
            Ok(Some(ctx)) => ctx,
            Ok(None) => {
                warn!(test_id = %id, "no replay registered for test id");
                RequestContext::replay(id.clone(), self.clock.now(), Vec::new(), Vec::new())
            }
            Err(err) => {
                warn!(test_id = %id, error = %err, "replay registry unavailable");
                RequestContext::replay(id.clone(), self.clock.now(), Vec::new(), Vec::new())
            }
        }
    }

    /// Assembles the testcase and starts its upsert.
    fn emit(&self, ctx: &RequestContext, request: HttpRequest, response: HttpResponse) {
        let (deps, mocks) = match ctx.take_recorded() {
            Ok(recorded) => recorded,
            Err(err) => {
                warn!(error = %err, "recorded dependencies unavailable; testcase dropped");
                return;
            }
        };
        let mut testcase = Testcase::http(
            TestcaseId::generate(),
            self.app_id.clone(),
            ctx.captured_at(),
            request,
            response,
        );
        testcase.deps = deps;
        testcase.noise.clone_from(&self.noise);
        let separate_mocks = if ctx.file_export() {
            mocks
        } else {
            testcase.mocks = mocks;
            Vec::new()
        };
        let control_plane = Arc::clone(&self.control_plane);
        self.uploads().spawn(async move {
            match control_plane.put_testcase(&testcase).await {
                Ok(id) => {
                    for mock in &separate_mocks {
                        if let Err(err) = control_plane.put_mock(&id, mock).await {
                            warn!(testcase_id = %id, error = %err, "mock upsert failed");
                        }
                    }
                    debug!(
                        testcase_id = %id,
                        deps = testcase.deps.len(),
                        mocks = testcase.mocks.len() + separate_mocks.len(),
                        "testcase recorded"
                    );
                }
                Err(err) => {
                    warn!(testcase_id = %testcase.id, error = %err, "testcase dropped");
                }
            }
        });
    }

    /// Locks the upload set, reaping finished tasks.
    fn uploads(&self) -> MutexGuard<'_, JoinSet<()>> {
        let mut uploads = match self.uploads.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        while uploads.try_join_next().is_some() {}
        uploads
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Request body after an attempt to buffer it for capture.
enum BufferedBody {
    /// The whole body, within the limit.
    Complete(Bytes),
    /// Capture is bypassed; the body replays what was read, then the rest.
    Bypass(Body, String),
}

/// Buffers `body` up to `limit` bytes without losing any of it.
async fn buffer_body(mut body: Body, limit: usize) -> BufferedBody {
    let mut buffered = BytesMut::new();
    while let Some(frame) = body.frame().await {
        match frame {
            Ok(frame) => {
                let Ok(data) = frame.into_data() else {
                    continue;
                };
                buffered.extend_from_slice(&data);
                if buffered.len() > limit {
                    let read = tokio_stream::once(Ok(buffered.freeze()));
                    let body = Body::from_stream(read.chain(body.into_data_stream()));
                    return BufferedBody::Bypass(body, format!("request body over {limit} bytes"));
                }
            }
            Err(err) => {
                let reason = err.to_string();
                let read = tokio_stream::iter([Ok(buffered.freeze()), Err(err)]);
                return BufferedBody::Bypass(Body::from_stream(read), reason);
            }
        }
    }
    BufferedBody::Complete(buffered.freeze())
}

/// Captures the request model before the handler consumes the request.
fn snapshot_request(
    request: &Request<Body>,
    path_params: BTreeMap<String, String>,
    body: &[u8],
) -> HttpRequest {
    let uri = request.uri();
    let mut url_params: BTreeMap<String, String> = uri
        .query()
        .map(|query| url::form_urlencoded::parse(query.as_bytes()).into_owned().collect())
        .unwrap_or_default();
    url_params.extend(path_params);
    let (proto_major, proto_minor) = match request.version() {
        Version::HTTP_09 => (0, 9),
        Version::HTTP_10 => (1, 0),
        Version::HTTP_2 => (2, 0),
        Version::HTTP_3 => (3, 0),
        _ => (1, 1),
    };
    HttpRequest {
        method: request.method().as_str().to_string(),
        proto_major,
        proto_minor,
        url: uri.path_and_query().map_or_else(|| uri.path().to_string(), ToString::to_string),
        url_params,
        header: header_map_to_headers(request.headers()),
        body: String::from_utf8_lossy(body).into_owned(),
    }
}
