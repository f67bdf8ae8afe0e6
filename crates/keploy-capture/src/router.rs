// crates/keploy-capture/src/router.rs
// ============================================================================
// Module: Keploy Router Contract
// Description: Framework-neutral view of one inbound request.
// Purpose: Let the capture pipeline drive any HTTP framework uniformly.
// Dependencies: axum (http types), async-trait, keploy-core
// ============================================================================

//! ## Overview
//! A framework adapter exposes each inbound request as a [`Router`]: the
//! request itself, a replaceable [`ResponseWriter`], the request context,
//! the downstream handler chain, and the framework's path parameters. The
//! pipeline never parses URLs or touches framework types beyond this.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::HeaderName;
use axum::http::HeaderValue;
use axum::http::Request;
use axum::http::StatusCode;
use keploy_core::RequestContext;
pub use keploy_core::TEST_ID_HEADER;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Inbound capture errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    /// The request body could not be buffered.
    #[error("request body error: {0}")]
    Body(String),
    /// The downstream handler chain failed.
    #[error("handler error: {0}")]
    Handler(String),
    /// The response writer rejected a write.
    #[error("response writer error: {0}")]
    Writer(String),
    /// The pipeline configuration is invalid.
    #[error("capture config error: {0}")]
    Config(String),
    /// The writer does not support the requested capability.
    #[error("unsupported response writer capability: {0}")]
    Unsupported(String),
}

// ============================================================================
// SECTION: Response Writer
// ============================================================================

/// Push-style response sink, the shape the capture tee wraps.
///
/// Callers await [`ResponseWriter::ready`] before each [`ResponseWriter::write`]
/// so sinks that forward to a live connection can apply backpressure.
#[async_trait]
pub trait ResponseWriter: Send {
    /// Appends a response header. Ignored once the status is written.
    fn append_header(&mut self, name: HeaderName, value: HeaderValue);

    /// Writes the status line. Only the first call takes effect.
    fn write_header(&mut self, status: StatusCode);

    /// Writes a body chunk and returns the number of bytes accepted.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::Writer`] when the sink rejects the chunk.
    fn write(&mut self, chunk: &[u8]) -> Result<usize, CaptureError>;

    /// Waits until the sink can accept the next chunk.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::Writer`] when the client is gone.
    async fn ready(&mut self) -> Result<(), CaptureError> {
        Ok(())
    }

    /// Flushes buffered bytes to the client.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::Writer`] when flushing fails.
    fn flush(&mut self) -> Result<(), CaptureError> {
        Ok(())
    }

    /// Hands the underlying connection to the handler.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::Unsupported`] unless the sink supports it.
    fn hijack(&mut self) -> Result<(), CaptureError> {
        Err(CaptureError::Unsupported("hijack".to_string()))
    }
}

// ============================================================================
// SECTION: Router
// ============================================================================

/// Uniform capability set a framework adapter provides per request.
#[async_trait]
pub trait Router: Send {
    /// Returns the inbound request.
    fn request(&self) -> &Request<Body>;

    /// Returns the inbound request for in-place replacement of parts.
    fn request_mut(&mut self) -> &mut Request<Body>;

    /// Replaces the inbound request.
    fn set_request(&mut self, request: Request<Body>) {
        *self.request_mut() = request;
    }

    /// Removes the current response writer, if one is set.
    fn take_response_writer(&mut self) -> Option<Box<dyn ResponseWriter>>;

    /// Installs a response writer.
    fn set_response_writer(&mut self, writer: Box<dyn ResponseWriter>);

    /// Returns the request context attached to the request, if any.
    fn context(&self) -> Option<Arc<RequestContext>> {
        self.request().extensions().get::<Arc<RequestContext>>().cloned()
    }

    /// Invokes the downstream handler chain.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError`] when the chain cannot run or its response
    /// cannot be written.
    async fn next(&mut self) -> Result<(), CaptureError>;

    /// Returns the path parameters matched by the framework router.
    fn url_params(&self) -> BTreeMap<String, String>;
}
