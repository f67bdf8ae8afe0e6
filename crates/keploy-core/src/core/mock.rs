// crates/keploy-core/src/core/mock.rs
// ============================================================================
// Module: Keploy Mock Model
// Description: Structured recordings for payloads that are not byte-encodable.
// Purpose: Capture SQL tables, HTTP exchanges, and gRPC calls as typed records.
// Dependencies: crate::core::{dependency, testcase}, serde
// ============================================================================

//! ## Overview
//! A [`Mock`] is the typed sibling of [`crate::Dependency`]. It carries the
//! same meta map and follows the same order-plus-keys matching rule, but its
//! payload is a readable structure so it survives export to YAML and review
//! by humans.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::codec::base64_chunks;
use crate::core::dependency::DependencyMeta;
use crate::core::testcase::GrpcRequest;
use crate::core::testcase::GrpcResponse;
use crate::core::testcase::HttpRequest;
use crate::core::testcase::HttpResponse;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Document version stamped on mocks and exported testcases.
pub const MOCK_VERSION: &str = "api.keploy.io/v1beta1";

// ============================================================================
// SECTION: Mock Payloads
// ============================================================================

/// Outbound HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpMockSpec {
    /// Request as issued by the handler.
    pub request: HttpRequest,
    /// Materialized response.
    pub response: HttpResponse,
    /// Transport error, when the request failed before a response arrived.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err: Option<String>,
    /// Set when `response.body` holds base64 because the payload was not UTF-8.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub body_base64: bool,
}

/// SQL result table.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SqlMockSpec {
    /// Column names.
    #[serde(default)]
    pub columns: Vec<String>,
    /// Rows rendered as strings, one inner vector per row.
    #[serde(default)]
    pub rows: Vec<Vec<String>>,
    /// Rows affected for statements without a result set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows_affected: Option<i64>,
    /// Driver error message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err: Option<String>,
}

/// Outbound gRPC call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrpcMockSpec {
    /// Request message.
    pub request: GrpcRequest,
    /// Response message.
    pub response: GrpcResponse,
}

/// Opaque chunks for drivers without a typed shape.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GenericMockSpec {
    /// Encoded output slots.
    #[serde(with = "base64_chunks")]
    pub objects: Vec<Vec<u8>>,
}

/// Typed payload of a mock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload")]
pub enum MockSpec {
    /// HTTP client exchange.
    Http(HttpMockSpec),
    /// SQL statement result.
    #[serde(rename = "SQL")]
    Sql(SqlMockSpec),
    /// gRPC client call.
    #[serde(rename = "gRPC")]
    Grpc(GrpcMockSpec),
    /// Generic opaque payload.
    Generic(GenericMockSpec),
}

impl MockSpec {
    /// Returns the stable kind label.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Http(_) => "Http",
            Self::Sql(_) => "SQL",
            Self::Grpc(_) => "gRPC",
            Self::Generic(_) => "Generic",
        }
    }
}

// ============================================================================
// SECTION: Mock
// ============================================================================

/// Structured recording of one outbound call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mock {
    /// Document version.
    pub version: String,
    /// Mock name, unique within its testcase once exported.
    pub name: String,
    /// Call description used for matching.
    pub meta: DependencyMeta,
    /// Typed payload.
    pub spec: MockSpec,
}

impl Mock {
    /// Creates a mock with an empty name; exporters assign names.
    #[must_use]
    pub fn new(meta: DependencyMeta, spec: MockSpec) -> Self {
        Self {
            version: MOCK_VERSION.to_string(),
            name: String::new(),
            meta,
            spec,
        }
    }
}
