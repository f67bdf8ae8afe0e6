// crates/keploy-capture/src/tee.rs
// ============================================================================
// Module: Keploy Response Tee
// Description: Response writer that duplicates every write into memory.
// Purpose: Make status, headers, and body observable after the handler.
// Dependencies: axum (http types), async-trait, crate::router
// ============================================================================

//! ## Overview
//! [`TeeWriter`] wraps the framework writer by composition: every call is
//! forwarded to the inner writer first and mirrored into a shared
//! [`ResponseCapture`] only when it succeeded. `ready`, `flush` and `hijack`
//! are proxied so streaming and long-polling handlers keep working. The
//! mirror can be capped; bytes past the cap still reach the client but the
//! capture is flagged as truncated.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use async_trait::async_trait;
use axum::http::HeaderMap;
use axum::http::HeaderName;
use axum::http::HeaderValue;
use axum::http::StatusCode;
use keploy_core::Headers;
use keploy_core::HttpResponse;

use crate::router::CaptureError;
use crate::router::ResponseWriter;

// ============================================================================
// SECTION: Capture Buffer
// ============================================================================

/// Response observed through a writer.
#[derive(Debug, Default, Clone)]
pub struct ResponseCapture {
    /// Status written, if any.
    pub status: Option<StatusCode>,
    /// Headers appended before the status.
    pub headers: HeaderMap,
    /// Body bytes accepted by the writer.
    pub body: Vec<u8>,
    /// True once the connection was handed to the handler.
    pub hijacked: bool,
    /// True when the body outgrew the capture limit and was cut short.
    pub truncated: bool,
}

impl ResponseCapture {
    /// Returns the effective status; `200` when nothing was written.
    #[must_use]
    pub fn status_or_ok(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::OK)
    }

    /// Converts the capture into the testcase response model.
    #[must_use]
    pub fn to_http_response(&self) -> HttpResponse {
        HttpResponse {
            status_code: self.status_or_ok().as_u16(),
            header: header_map_to_headers(&self.headers),
            body: String::from_utf8_lossy(&self.body).into_owned(),
        }
    }

    /// Records a header unless the status is already written.
    fn append_header(&mut self, name: HeaderName, value: HeaderValue) {
        if self.status.is_none() {
            self.headers.append(name, value);
        }
    }

    /// Records the first status written.
    fn write_header(&mut self, status: StatusCode) {
        if self.status.is_none() {
            self.status = Some(status);
        }
    }
}

/// Shared handle to a [`ResponseCapture`].
pub type SharedCapture = Arc<Mutex<ResponseCapture>>;

/// Locks a shared capture, recovering from poisoning.
pub(crate) fn lock_capture(capture: &SharedCapture) -> MutexGuard<'_, ResponseCapture> {
    match capture.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Converts an http header map into the testcase header model.
#[must_use]
pub fn header_map_to_headers(map: &HeaderMap) -> Headers {
    let mut headers = Headers::new();
    for (name, value) in map {
        headers
            .entry(name.as_str().to_string())
            .or_default()
            .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
    }
    headers
}

// ============================================================================
// SECTION: Tee Writer
// ============================================================================

/// Writer that forwards to `inner` and mirrors into a capture buffer.
pub struct TeeWriter {
    /// Framework writer.
    inner: Box<dyn ResponseWriter>,
    /// Mirror of everything the inner writer accepted.
    capture: SharedCapture,
    /// Maximum body bytes mirrored.
    limit: usize,
}

impl TeeWriter {
    /// Wraps `inner`, returning the writer and its capture handle.
    #[must_use]
    pub fn new(inner: Box<dyn ResponseWriter>) -> (Self, SharedCapture) {
        Self::with_limit(inner, usize::MAX)
    }

    /// Wraps `inner`, mirroring at most `limit` body bytes.
    #[must_use]
    pub fn with_limit(inner: Box<dyn ResponseWriter>, limit: usize) -> (Self, SharedCapture) {
        let capture = SharedCapture::default();
        (
            Self {
                inner,
                capture: Arc::clone(&capture),
                limit,
            },
            capture,
        )
    }
}

#[async_trait]
impl ResponseWriter for TeeWriter {
    fn append_header(&mut self, name: HeaderName, value: HeaderValue) {
        lock_capture(&self.capture).append_header(name.clone(), value.clone());
        self.inner.append_header(name, value);
    }

    fn write_header(&mut self, status: StatusCode) {
        self.inner.write_header(status);
        lock_capture(&self.capture).write_header(status);
    }

    fn write(&mut self, chunk: &[u8]) -> Result<usize, CaptureError> {
        let written = self.inner.write(chunk)?;
        let accepted = &chunk[.. written.min(chunk.len())];
        let mut capture = lock_capture(&self.capture);
        capture.write_header(StatusCode::OK);
        let room = self.limit.saturating_sub(capture.body.len());
        if accepted.len() > room {
            capture.truncated = true;
        }
        capture.body.extend_from_slice(&accepted[.. accepted.len().min(room)]);
        drop(capture);
        Ok(written)
    }

    async fn ready(&mut self) -> Result<(), CaptureError> {
        self.inner.ready().await
    }

    fn flush(&mut self) -> Result<(), CaptureError> {
        self.inner.flush()
    }

    fn hijack(&mut self) -> Result<(), CaptureError> {
        self.inner.hijack()?;
        lock_capture(&self.capture).hijacked = true;
        Ok(())
    }
}

// ============================================================================
// SECTION: Buffer Writer
// ============================================================================

/// Terminal writer that only buffers, for adapters and tests that want the
/// whole response as a value.
#[derive(Debug, Clone, Default)]
pub struct BufferWriter {
    /// Buffered response.
    state: SharedCapture,
}

impl BufferWriter {
    /// Creates a writer and returns the handle its output lands in.
    #[must_use]
    pub fn new() -> (Self, SharedCapture) {
        let writer = Self::default();
        let state = Arc::clone(&writer.state);
        (writer, state)
    }
}

impl ResponseWriter for BufferWriter {
    fn append_header(&mut self, name: HeaderName, value: HeaderValue) {
        lock_capture(&self.state).append_header(name, value);
    }

    fn write_header(&mut self, status: StatusCode) {
        lock_capture(&self.state).write_header(status);
    }

    fn write(&mut self, chunk: &[u8]) -> Result<usize, CaptureError> {
        let mut state = lock_capture(&self.state);
        state.write_header(StatusCode::OK);
        state.body.extend_from_slice(chunk);
        drop(state);
        Ok(chunk.len())
    }

    fn hijack(&mut self) -> Result<(), CaptureError> {
        lock_capture(&self.state).hijacked = true;
        Ok(())
    }
}
