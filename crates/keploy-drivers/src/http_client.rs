// crates/keploy-drivers/src/http_client.rs
// ============================================================================
// Module: Keploy HTTP Client Driver
// Description: Record/replay wrapper around outbound reqwest calls.
// Purpose: Capture outbound HTTP exchanges as structured HTTP mocks.
// Dependencies: keploy-core, base64, reqwest, thiserror
// ============================================================================

//! ## Overview
//! [`KeployHttpClient::execute`] is the instrumented `Do`. The request
//! context is resolved on every call, never stored on the client, so one
//! client can serve concurrent requests. Exchanges are recorded as
//! [`MockSpec::Http`] mocks holding the outbound request and the response
//! (or the transport error). Responses are fully buffered as raw bytes. A
//! body that is not valid UTF-8 is stored base64-encoded in the mock and
//! flagged, so replay hands back the exact bytes the server sent.

// ============================================================================
// SECTION: Imports
// ============================================================================

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use keploy_core::CodecError;
use keploy_core::DependencyKind;
use keploy_core::DependencyMeta;
use keploy_core::DriverError;
use keploy_core::Headers;
use keploy_core::HttpMockSpec;
use keploy_core::HttpRequest;
use keploy_core::HttpResponse;
use keploy_core::MockSpec;
use keploy_core::RecordedError;
use keploy_core::intercept_mock;
use reqwest::Client;
use reqwest::Request;
use reqwest::Version;
use reqwest::header::HeaderMap;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Dependency name used for outbound HTTP calls.
pub const HTTP_CLIENT_DEPENDENCY_NAME: &str = "http-client";
/// Outbound call operation.
pub const DO_OP: &str = "Do";

/// Prefix of transport error messages.
const TRANSPORT_PREFIX: &str = "http transport error: ";
/// Prefix of body error messages.
const BODY_PREFIX: &str = "http body error: ";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Outbound HTTP errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HttpClientError {
    /// The request could not be sent or no response arrived.
    #[error("http transport error: {0}")]
    Transport(String),
    /// The response body could not be read.
    #[error("http body error: {0}")]
    Body(String),
    /// No recorded exchange matched the call in `Test` mode.
    #[error("keploy: no recorded response for outbound request")]
    MockNotFound,
}

impl DriverError for HttpClientError {
    fn mock_not_found() -> Self {
        Self::MockNotFound
    }

    fn to_recorded(&self) -> RecordedError {
        RecordedError::new(self.to_string())
    }

    fn from_recorded(recorded: RecordedError) -> Self {
        let message = recorded.err_string;
        if message == Self::MockNotFound.to_string() {
            return Self::MockNotFound;
        }
        if let Some(detail) = message.strip_prefix(BODY_PREFIX) {
            return Self::Body(detail.to_string());
        }
        let detail = message.strip_prefix(TRANSPORT_PREFIX).unwrap_or(&message);
        Self::Transport(detail.to_string())
    }
}

// ============================================================================
// SECTION: Response
// ============================================================================

/// Buffered outbound response.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClientResponse {
    /// Status code.
    pub status_code: u16,
    /// Response headers, repeated values in order.
    pub header: Headers,
    /// Raw response body.
    pub body: Vec<u8>,
}

impl ClientResponse {
    /// Returns the body decoded as UTF-8, replacing invalid sequences.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

// ============================================================================
// SECTION: Client
// ============================================================================

/// Instrumented outbound HTTP client.
#[derive(Debug, Clone, Default)]
pub struct KeployHttpClient {
    /// Wrapped client, untouched in `Test` mode.
    client: Client,
}

impl KeployHttpClient {
    /// Wraps `client`.
    #[must_use]
    pub const fn new(client: Client) -> Self {
        Self {
            client,
        }
    }

    /// Returns the wrapped client for building requests.
    #[must_use]
    pub const fn inner(&self) -> &Client {
        &self.client
    }

    /// Sends `request` and buffers the response.
    ///
    /// # Errors
    ///
    /// Returns [`HttpClientError`] on transport or body failures, their
    /// recorded form in `Test` mode, or [`HttpClientError::MockNotFound`]
    /// when nothing was recorded for the call.
    pub async fn execute(&self, request: Request) -> Result<ClientResponse, HttpClientError> {
        let snapshot = snapshot_request(&request);
        let meta = DependencyMeta::new(HTTP_CLIENT_DEPENDENCY_NAME, DependencyKind::HttpClient, DO_OP)
            .with("method", snapshot.method.clone())
            .with("url", snapshot.url.clone());
        let client = &self.client;
        intercept_mock(
            meta,
            move || async move { send(client, request).await },
            move |outcome| encode_exchange(snapshot, outcome),
            decode_exchange,
        )
        .await
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Performs the real call.
async fn send(client: &Client, request: Request) -> Result<ClientResponse, HttpClientError> {
    let response = client
        .execute(request)
        .await
        .map_err(|err| HttpClientError::Transport(err.to_string()))?;
    let status_code = response.status().as_u16();
    let header = headers_to_map(response.headers());
    let body = response.bytes().await.map_err(|err| HttpClientError::Body(err.to_string()))?;
    Ok(ClientResponse {
        status_code,
        header,
        body: body.to_vec(),
    })
}

/// Renders an exchange as a mock spec.
fn encode_exchange(request: HttpRequest, outcome: &Result<ClientResponse, HttpClientError>) -> MockSpec {
    let (response, body_base64, err) = match outcome {
        Ok(response) => {
            let (body, body_base64) = match std::str::from_utf8(&response.body) {
                Ok(text) => (text.to_string(), false),
                Err(_) => (STANDARD.encode(&response.body), true),
            };
            let recorded = HttpResponse {
                status_code: response.status_code,
                header: response.header.clone(),
                body,
            };
            (recorded, body_base64, None)
        }
        Err(err) => (HttpResponse::default(), false, Some(err.to_string())),
    };
    MockSpec::Http(HttpMockSpec {
        request,
        response,
        err,
        body_base64,
    })
}

/// Restores an exchange from a recorded spec.
fn decode_exchange(spec: MockSpec) -> Result<Result<ClientResponse, HttpClientError>, CodecError> {
    let spec = match spec {
        MockSpec::Http(spec) => spec,
        other => return Err(CodecError::Decode(format!("expected an Http mock, found {}", other.kind()))),
    };
    if let Some(err) = spec.err {
        return Ok(Err(HttpClientError::from_recorded(RecordedError::new(err))));
    }
    let body = if spec.body_base64 {
        STANDARD
            .decode(spec.response.body.as_bytes())
            .map_err(|err| CodecError::Decode(format!("http mock body is not base64: {err}")))?
    } else {
        spec.response.body.into_bytes()
    };
    Ok(Ok(ClientResponse {
        status_code: spec.response.status_code,
        header: spec.response.header,
        body,
    }))
}

/// Captures the outbound request for the mock.
fn snapshot_request(request: &Request) -> HttpRequest {
    let (proto_major, proto_minor) = match request.version() {
        Version::HTTP_09 => (0, 9),
        Version::HTTP_10 => (1, 0),
        Version::HTTP_2 => (2, 0),
        Version::HTTP_3 => (3, 0),
        _ => (1, 1),
    };
    let body = request
        .body()
        .and_then(reqwest::Body::as_bytes)
        .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
        .unwrap_or_default();
    HttpRequest {
        method: request.method().as_str().to_string(),
        proto_major,
        proto_minor,
        url: request.url().to_string(),
        header: headers_to_map(request.headers()),
        body,
        ..HttpRequest::default()
    }
}

/// Converts a header map, keeping repeated values in order.
fn headers_to_map(headers: &HeaderMap) -> Headers {
    let mut map = Headers::new();
    for (name, value) in headers {
        map.entry(name.as_str().to_string())
            .or_default()
            .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
    }
    map
}
