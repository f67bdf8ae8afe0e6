// crates/keploy-core/src/core/testcase.rs
// ============================================================================
// Module: Keploy Testcase Model
// Description: Inbound request/response pairs plus their recorded dependencies.
// Purpose: Define the unit produced in record mode and consumed in test mode.
// Dependencies: crate::core::{dependency, mock, identifiers, time}, serde
// ============================================================================

//! ## Overview
//! A [`Testcase`] binds one inbound request and the response the service
//! produced to the ordered dependency and mock sequences observed while the
//! handler ran. The core builds testcases but never interprets `noise`; that
//! list is forwarded to the control plane for its diff.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use crate::core::codec::BinaryPayload;
use crate::core::dependency::Dependency;
use crate::core::identifiers::AppId;
use crate::core::identifiers::TestcaseId;
use crate::core::mock::Mock;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: HTTP Exchange
// ============================================================================

/// Header map keyed by lowercase header name, values in arrival order.
pub type Headers = BTreeMap<String, Vec<String>>;

/// Captured inbound or outbound HTTP request.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HttpRequest {
    /// Request method.
    pub method: String,
    /// HTTP major version.
    pub proto_major: u8,
    /// HTTP minor version.
    pub proto_minor: u8,
    /// Path and query (or absolute URL for outbound requests).
    pub url: String,
    /// Path parameters extracted by the framework adapter.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub url_params: BTreeMap<String, String>,
    /// Request headers.
    #[serde(default)]
    pub header: Headers,
    /// Request body decoded as UTF-8 (lossy).
    #[serde(default)]
    pub body: String,
}

/// Captured HTTP response.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HttpResponse {
    /// Status code.
    pub status_code: u16,
    /// Response headers.
    #[serde(default)]
    pub header: Headers,
    /// Response body decoded as UTF-8 (lossy).
    #[serde(default)]
    pub body: String,
}

impl BinaryPayload for HttpResponse {}

// ============================================================================
// SECTION: gRPC Exchange
// ============================================================================

/// Captured gRPC request.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GrpcRequest {
    /// Fully qualified method name.
    pub method: String,
    /// Request message rendered as JSON text.
    pub body: String,
}

/// Captured gRPC response.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GrpcResponse {
    /// Response message rendered as JSON text.
    pub body: String,
    /// Status message when the call failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err: Option<String>,
}

// ============================================================================
// SECTION: Testcase
// ============================================================================

/// Inbound protocol of a testcase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TestcaseKind {
    /// HTTP request/response.
    Http,
    /// gRPC unary call.
    #[serde(rename = "gRPC")]
    Grpc,
}

impl TestcaseKind {
    /// Returns the stable kind label used in exported documents.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Http => "Http",
            Self::Grpc => "gRPC",
        }
    }
}

/// One inbound request with its response and recorded dependencies.
///
/// # Invariants
/// - `kind == Http` implies `http_req` and `http_resp` are present.
/// - `deps` and `mocks` are in the order the handler issued the calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Testcase {
    /// Testcase identifier.
    pub id: TestcaseId,
    /// Unix time at which the request was captured.
    pub captured_at: Timestamp,
    /// Owning application.
    pub app_id: AppId,
    /// Inbound protocol.
    pub kind: TestcaseKind,
    /// HTTP request, for HTTP testcases.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_req: Option<HttpRequest>,
    /// HTTP response, for HTTP testcases.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_resp: Option<HttpResponse>,
    /// gRPC request, for gRPC testcases.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grpc_req: Option<GrpcRequest>,
    /// gRPC response, for gRPC testcases.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grpc_resp: Option<GrpcResponse>,
    /// Recorded dependencies in call order.
    #[serde(default)]
    pub deps: Vec<Dependency>,
    /// Recorded structured mocks in call order.
    #[serde(default)]
    pub mocks: Vec<Mock>,
    /// Field paths the diff should ignore.
    #[serde(default)]
    pub noise: Vec<String>,
}

impl Testcase {
    /// Builds an HTTP testcase.
    #[must_use]
    pub fn http(
        id: TestcaseId,
        app_id: AppId,
        captured_at: Timestamp,
        request: HttpRequest,
        response: HttpResponse,
    ) -> Self {
        Self {
            id,
            captured_at,
            app_id,
            kind: TestcaseKind::Http,
            http_req: Some(request),
            http_resp: Some(response),
            grpc_req: None,
            grpc_resp: None,
            deps: Vec::new(),
            mocks: Vec::new(),
            noise: Vec::new(),
        }
    }

    /// Builds a gRPC testcase.
    #[must_use]
    pub fn grpc(
        id: TestcaseId,
        app_id: AppId,
        captured_at: Timestamp,
        request: GrpcRequest,
        response: GrpcResponse,
    ) -> Self {
        Self {
            id,
            captured_at,
            app_id,
            kind: TestcaseKind::Grpc,
            http_req: None,
            http_resp: None,
            grpc_req: Some(request),
            grpc_resp: Some(response),
            deps: Vec::new(),
            mocks: Vec::new(),
            noise: Vec::new(),
        }
    }
}
