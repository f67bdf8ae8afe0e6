// crates/keploy-core/src/core/dependency.rs
// ============================================================================
// Module: Keploy Dependency Protocol
// Description: Uniform record for one intercepted outbound call.
// Purpose: Describe a call by meta keys and store its outputs as chunks.
// Dependencies: crate::core::codec, serde
// ============================================================================

//! ## Overview
//! A [`Dependency`] is the record a driver adapter appends for each
//! intercepted call: a string meta map plus one opaque chunk per output slot.
//! The slot layout is always `[result, error]`; the result chunk is empty when
//! the call failed.
//!
//! Replay matching looks only at `name`, `type`, and `operation` plus arrival
//! order. Other meta keys describe the call for humans and may change freely
//! without invalidating existing recordings.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::core::codec::CodecError;
use crate::core::codec::DriverError;
use crate::core::codec::Payload;
use crate::core::codec::RecordedError;
use crate::core::codec::base64_chunks;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Meta key holding the driver family.
pub const META_NAME: &str = "name";
/// Meta key holding the coarse dependency kind.
pub const META_TYPE: &str = "type";
/// Meta key holding the driver-specific verb.
pub const META_OPERATION: &str = "operation";

// ============================================================================
// SECTION: Dependency Kind
// ============================================================================

/// Coarse classification of an intercepted backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DependencyKind {
    /// Relational database.
    #[serde(rename = "SqlDB")]
    SqlDb,
    /// Document or key-value store.
    #[serde(rename = "NoSqlDB")]
    NoSqlDb,
    /// Outbound HTTP client.
    #[serde(rename = "HttpClient")]
    HttpClient,
    /// Outbound gRPC client.
    #[serde(rename = "gRPC")]
    Grpc,
    /// Anything else.
    #[serde(rename = "Generic")]
    Generic,
}

impl DependencyKind {
    /// Returns the stable label stored under the `type` meta key.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SqlDb => "SqlDB",
            Self::NoSqlDb => "NoSqlDB",
            Self::HttpClient => "HttpClient",
            Self::Grpc => "gRPC",
            Self::Generic => "Generic",
        }
    }
}

impl fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Meta
// ============================================================================

/// Self-describing meta map for an intercepted call.
///
/// # Invariants
/// - `name`, `type`, and `operation` are always present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DependencyMeta(BTreeMap<String, String>);

impl DependencyMeta {
    /// Creates meta with the three matching keys.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: DependencyKind, operation: impl Into<String>) -> Self {
        let mut map = BTreeMap::new();
        map.insert(META_NAME.to_string(), name.into());
        map.insert(META_TYPE.to_string(), kind.as_str().to_string());
        map.insert(META_OPERATION.to_string(), operation.into());
        Self(map)
    }

    /// Adds a free-form descriptive key.
    ///
    /// The matching keys cannot be overwritten through this method.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        if !is_matching_key(&key) {
            self.0.insert(key, value.into());
        }
        self
    }

    /// Returns a copy with a different operation, keeping every other key.
    #[must_use]
    pub fn for_operation(&self, operation: impl Into<String>) -> Self {
        let mut map = self.0.clone();
        map.insert(META_OPERATION.to_string(), operation.into());
        Self(map)
    }

    /// Returns the driver family.
    #[must_use]
    pub fn name(&self) -> &str {
        self.get(META_NAME).unwrap_or_default()
    }

    /// Returns the dependency kind label.
    #[must_use]
    pub fn kind(&self) -> &str {
        self.get(META_TYPE).unwrap_or_default()
    }

    /// Returns the operation verb.
    #[must_use]
    pub fn operation(&self) -> &str {
        self.get(META_OPERATION).unwrap_or_default()
    }

    /// Returns a meta value by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Returns true when `name`, `type`, and `operation` are equal.
    #[must_use]
    pub fn matches(&self, other: &Self) -> bool {
        self.name() == other.name()
            && self.kind() == other.kind()
            && self.operation() == other.operation()
    }

    /// Returns the underlying map.
    #[must_use]
    pub const fn as_map(&self) -> &BTreeMap<String, String> {
        &self.0
    }
}

impl fmt::Display for DependencyMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.name(), self.kind(), self.operation())
    }
}

/// Returns true for keys reserved for replay matching.
fn is_matching_key(key: &str) -> bool {
    key == META_NAME || key == META_TYPE || key == META_OPERATION
}

// ============================================================================
// SECTION: Dependency
// ============================================================================

/// One recorded outbound call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    /// Call description used for matching.
    pub meta: DependencyMeta,
    /// Encoded output slots, `[result, error]`.
    #[serde(with = "base64_chunks")]
    pub data: Vec<Vec<u8>>,
}

impl Dependency {
    /// Creates a dependency from pre-encoded chunks.
    #[must_use]
    pub const fn new(meta: DependencyMeta, data: Vec<Vec<u8>>) -> Self {
        Self {
            meta,
            data,
        }
    }

    /// Encodes a call outcome into the `[result, error]` layout.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Encode`] when either slot fails to encode.
    pub fn from_outcome<T, E>(meta: DependencyMeta, outcome: &Result<T, E>) -> Result<Self, CodecError>
    where
        T: Payload,
        E: DriverError,
    {
        let (result, error) = match outcome {
            Ok(value) => (value.encode_payload()?, None::<RecordedError>),
            Err(err) => (Vec::new(), Some(err.to_recorded())),
        };
        let error = error.encode_payload()?;
        Ok(Self::new(meta, vec![result, error]))
    }

    /// Decodes the `[result, error]` layout back into a call outcome.
    ///
    /// Recorded errors pass through [`DriverError::from_recorded`] so that
    /// well-known sentinels are restored.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Decode`] when the chunks are missing or malformed.
    pub fn into_outcome<T, E>(self) -> Result<Result<T, E>, CodecError>
    where
        T: Payload,
        E: DriverError,
    {
        let mut chunks = self.data.into_iter();
        let result = chunks.next().ok_or_else(|| missing_slot("result"))?;
        let error = chunks.next().ok_or_else(|| missing_slot("error"))?;
        let error = Option::<RecordedError>::decode_payload(&error)?;
        if let Some(recorded) = error {
            return Ok(Err(E::from_recorded(recorded)));
        }
        T::decode_payload(&result).map(Ok)
    }
}

/// Builds the decode error for an absent output slot.
fn missing_slot(slot: &str) -> CodecError {
    CodecError::Decode(format!("dependency is missing the {slot} slot"))
}
