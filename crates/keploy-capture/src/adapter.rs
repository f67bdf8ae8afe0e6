// crates/keploy-capture/src/adapter.rs
// ============================================================================
// Module: Keploy Axum Adapter
// Description: Router contract implementation for axum services.
// Purpose: Install the capture pipeline as an axum middleware layer.
// Dependencies: axum, http-body-util, bytes, tokio, tokio-stream, tracing
// ============================================================================

//! ## Overview
//! axum handlers return responses as values instead of pushing through a
//! writer. [`AxumExchange`] bridges the two: after the downstream service
//! returns, the response is replayed into the exchange's [`ResponseWriter`]
//! frame by frame. [`capture_middleware`] runs the pipeline on its own task
//! and answers the client as soon as the status is written: body frames
//! flow through a bounded channel while the tee mirrors them, so streamed
//! and long-polling responses reach the client as they are produced.
//!
//! A `101 Switching Protocols` response hijacks the writer; such exchanges
//! are served but never recorded.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::RawPathParams;
use axum::extract::Request;
use axum::extract::State;
use axum::extract::rejection::RawPathParamsRejection;
use axum::http::HeaderMap;
use axum::http::HeaderName;
use axum::http::HeaderValue;
use axum::http::StatusCode;
use axum::middleware;
use axum::middleware::Next;
use axum::response::IntoResponse;
use axum::response::Response;
use bytes::Bytes;
use http_body_util::BodyExt;
use keploy_core::Mode;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::oneshot;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;
use tracing::warn;

use crate::pipeline::CapturePipeline;
use crate::router::CaptureError;
use crate::router::ResponseWriter;
use crate::router::Router;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Body frames buffered between the handler task and the client.
const RESPONSE_FRAME_BUFFER: usize = 16;

// ============================================================================
// SECTION: Exchange
// ============================================================================

/// One axum request/response exchange seen through the [`Router`] contract.
pub struct AxumExchange {
    /// Inbound request; taken when the chain runs.
    request: Request,
    /// Downstream service; `None` once it ran.
    next: Option<Next>,
    /// Current response writer.
    writer: Option<Box<dyn ResponseWriter>>,
    /// Path parameters matched by the axum router.
    url_params: BTreeMap<String, String>,
}

impl AxumExchange {
    /// Creates an exchange writing to `writer`.
    #[must_use]
    pub fn new(
        request: Request,
        next: Next,
        writer: Box<dyn ResponseWriter>,
        url_params: BTreeMap<String, String>,
    ) -> Self {
        Self {
            request,
            next: Some(next),
            writer: Some(writer),
            url_params,
        }
    }
}

#[async_trait]
impl Router for AxumExchange {
    fn request(&self) -> &Request<Body> {
        &self.request
    }

    fn request_mut(&mut self) -> &mut Request<Body> {
        &mut self.request
    }

    fn take_response_writer(&mut self) -> Option<Box<dyn ResponseWriter>> {
        self.writer.take()
    }

    fn set_response_writer(&mut self, writer: Box<dyn ResponseWriter>) {
        self.writer = Some(writer);
    }

    async fn next(&mut self) -> Result<(), CaptureError> {
        let next = self
            .next
            .take()
            .ok_or_else(|| CaptureError::Handler("handler chain already ran".to_string()))?;
        let request = std::mem::take(&mut self.request);
        let response = next.run(request).await;
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| CaptureError::Writer("no response writer installed".to_string()))?;
        write_response(writer.as_mut(), response).await
    }

    fn url_params(&self) -> BTreeMap<String, String> {
        self.url_params.clone()
    }
}

/// Pushes an axum response through a writer, flushing after every frame.
pub(crate) async fn write_response(
    writer: &mut dyn ResponseWriter,
    response: Response,
) -> Result<(), CaptureError> {
    let (parts, mut body) = response.into_parts();
    for (name, value) in &parts.headers {
        writer.append_header(name.clone(), value.clone());
    }
    writer.write_header(parts.status);
    if parts.status == StatusCode::SWITCHING_PROTOCOLS {
        if let Err(err) = writer.hijack() {
            debug!(error = %err, "response writer cannot hijack");
        }
        return Ok(());
    }
    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(|err| CaptureError::Body(err.to_string()))?;
        if let Ok(data) = frame.into_data() {
            write_all(writer, &data).await?;
            writer.flush()?;
        }
    }
    Ok(())
}

/// Writes a whole chunk, waiting for the writer between partial writes.
async fn write_all(writer: &mut dyn ResponseWriter, mut chunk: &[u8]) -> Result<(), CaptureError> {
    while !chunk.is_empty() {
        writer.ready().await?;
        let written = writer.write(chunk)?;
        if written == 0 {
            return Err(CaptureError::Writer("writer accepted zero bytes".to_string()));
        }
        chunk = &chunk[written.min(chunk.len()) ..];
    }
    Ok(())
}

// ============================================================================
// SECTION: Stream Writer
// ============================================================================

/// Status and headers of a streamed response.
struct ResponseHead {
    /// Status written by the handler.
    status: StatusCode,
    /// Headers appended before the status.
    headers: HeaderMap,
}

/// Terminal writer handing the response to axum while it is being written.
struct StreamWriter {
    /// Headers collected until the status is written.
    headers: HeaderMap,
    /// Receives the head once; `None` afterwards.
    head: Option<oneshot::Sender<ResponseHead>>,
    /// Body frames for the client.
    frames: mpsc::Sender<Bytes>,
}

impl StreamWriter {
    /// Creates a writer with the receiving ends of its head and body.
    fn new() -> (Self, oneshot::Receiver<ResponseHead>, mpsc::Receiver<Bytes>) {
        let (head_tx, head_rx) = oneshot::channel();
        let (frames_tx, frames_rx) = mpsc::channel(RESPONSE_FRAME_BUFFER);
        let writer = Self {
            headers: HeaderMap::new(),
            head: Some(head_tx),
            frames: frames_tx,
        };
        (writer, head_rx, frames_rx)
    }

    /// Sends the head unless it already went out.
    fn send_head(&mut self, status: StatusCode) {
        let Some(head) = self.head.take() else {
            return;
        };
        let headers = std::mem::take(&mut self.headers);
        let head_sent = head.send(ResponseHead {
            status,
            headers,
        });
        if head_sent.is_err() {
            debug!("client went away before the response head");
        }
    }
}

/// Error for a client that stopped reading.
fn client_gone() -> CaptureError {
    CaptureError::Writer("client disconnected".to_string())
}

#[async_trait]
impl ResponseWriter for StreamWriter {
    fn append_header(&mut self, name: HeaderName, value: HeaderValue) {
        if self.head.is_some() {
            self.headers.append(name, value);
        }
    }

    fn write_header(&mut self, status: StatusCode) {
        self.send_head(status);
    }

    fn write(&mut self, chunk: &[u8]) -> Result<usize, CaptureError> {
        self.send_head(StatusCode::OK);
        match self.frames.try_send(Bytes::copy_from_slice(chunk)) {
            Ok(()) => Ok(chunk.len()),
            Err(TrySendError::Full(_)) => Ok(0),
            Err(TrySendError::Closed(_)) => Err(client_gone()),
        }
    }

    async fn ready(&mut self) -> Result<(), CaptureError> {
        // Single producer: the slot stays free after the permit is dropped.
        self.frames.reserve().await.map(drop).map_err(|_| client_gone())
    }

    fn hijack(&mut self) -> Result<(), CaptureError> {
        // The 101 head already carries the upgrade to hyper.
        Ok(())
    }
}

// ============================================================================
// SECTION: Middleware
// ============================================================================

/// axum middleware running every request through the capture pipeline.
pub async fn capture_middleware(
    State(pipeline): State<Arc<CapturePipeline>>,
    params: Result<RawPathParams, RawPathParamsRejection>,
    request: Request,
    next: Next,
) -> Response {
    if pipeline.mode() == Mode::Off {
        return next.run(request).await;
    }
    let url_params = params
        .map(|params| {
            params
                .iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect()
        })
        .unwrap_or_default();
    let (writer, head, frames) = StreamWriter::new();
    let mut exchange = AxumExchange::new(request, next, Box::new(writer), url_params);
    let task = tokio::spawn(async move {
        let outcome = pipeline.handle(&mut exchange).await;
        if let Err(err) = &outcome {
            warn!(error = %err, "captured exchange failed");
        }
        outcome
    });

    if let Ok(head) = head.await {
        let body = if head.status == StatusCode::SWITCHING_PROTOCOLS {
            Body::empty()
        } else {
            Body::from_stream(ReceiverStream::new(frames).map(Ok::<_, Infallible>))
        };
        let mut response = Response::new(body);
        *response.status_mut() = head.status;
        *response.headers_mut() = head.headers;
        return response;
    }
    match task.await {
        Ok(Ok(())) => StatusCode::OK.into_response(),
        Ok(Err(_)) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        Err(err) => {
            warn!(error = %err, "capture task aborted before a response was written");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Wraps every route of `router` with [`capture_middleware`].
pub fn instrument<S>(router: axum::Router<S>, pipeline: Arc<CapturePipeline>) -> axum::Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.layer(middleware::from_fn_with_state(pipeline, capture_middleware))
}
