// crates/keploy-core/src/core/codec.rs
// ============================================================================
// Module: Keploy Payload Codec
// Description: Binary encoding for intercepted call outputs and error slots.
// Purpose: Turn driver outputs into opaque chunks that decode back losslessly.
// Dependencies: bincode, base64, serde
// ============================================================================

//! ## Overview
//! Every output slot of an intercepted call is encoded independently. Output
//! types opt in by implementing [`Payload`]. Plain `serde` types get a
//! `bincode` implementation by registering with the [`BinaryPayload`] marker;
//! std scalars, strings and the usual containers are registered here.
//! `bincode` is not self-describing, so serde attributes that skip fields or
//! ask for the input's shape (`skip_serializing_if`, `flatten`, `untagged`)
//! produce bytes it cannot read back. Encoding therefore decodes every chunk
//! once before handing it out and fails with [`CodecError::Encode`] instead
//! of recording a chunk that would only break at replay.
//! Types whose native form would lose information (streamed bodies, live
//! cursors) must be materialized by the adapter before encoding.
//!
//! Errors travel as a [`RecordedError`] string; drivers map well-known strings
//! back to their canonical sentinels on decode.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Payload codec errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Output could not be encoded.
    #[error("payload encode error: {0}")]
    Encode(String),
    /// Recorded bytes could not be decoded into the requested type.
    #[error("payload decode error: {0}")]
    Decode(String),
}

// ============================================================================
// SECTION: Payload Trait
// ============================================================================

/// Output type that can be stored in a dependency chunk.
///
/// # Invariants
/// - `decode_payload(&encode_payload(x)?)? == x` for every value `x`.
pub trait Payload: Sized {
    /// Encodes the value into an opaque chunk.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Encode`] when the value cannot be encoded.
    fn encode_payload(&self) -> Result<Vec<u8>, CodecError>;

    /// Decodes a chunk produced by [`Payload::encode_payload`].
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Decode`] when the bytes do not describe `Self`.
    fn decode_payload(bytes: &[u8]) -> Result<Self, CodecError>;
}

/// Marker for `serde` types stored through `bincode`.
///
/// Register a type by implementing this trait with an empty body. The type's
/// serde layout must be positional: no skipped fields, no flattening and no
/// untagged enums.
pub trait BinaryPayload: Serialize + DeserializeOwned {}

impl<T: BinaryPayload> Payload for T {
    fn encode_payload(&self) -> Result<Vec<u8>, CodecError> {
        let bytes = bincode::serialize(self).map_err(|err| CodecError::Encode(err.to_string()))?;
        bincode::deserialize::<Self>(&bytes)
            .map_err(|err| CodecError::Encode(format!("payload does not decode back: {err}")))?;
        Ok(bytes)
    }

    fn decode_payload(bytes: &[u8]) -> Result<Self, CodecError> {
        bincode::deserialize(bytes).map_err(|err| CodecError::Decode(err.to_string()))
    }
}

/// Registers std types as [`BinaryPayload`].
macro_rules! binary_payload {
    ($($ty:ty),* $(,)?) => {
        $(impl BinaryPayload for $ty {})*
    };
}

binary_payload!(bool, u8, u16, u32, u64, usize, i8, i16, i32, i64, isize, f32, f64, char, String, ());

impl<T: BinaryPayload> BinaryPayload for Vec<T> {}

impl<T: BinaryPayload> BinaryPayload for Option<T> {}

impl<K: BinaryPayload + Ord, V: BinaryPayload> BinaryPayload for BTreeMap<K, V> {}

impl<A: BinaryPayload, B: BinaryPayload> BinaryPayload for (A, B) {}

impl<A: BinaryPayload, B: BinaryPayload, C: BinaryPayload> BinaryPayload for (A, B, C) {}

// ============================================================================
// SECTION: Error Slot
// ============================================================================

/// Recorded error carried in the error slot of a dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedError {
    /// Error message as produced by the real driver.
    pub err_string: String,
}

impl BinaryPayload for RecordedError {}

impl RecordedError {
    /// Creates a recorded error from a message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            err_string: message.into(),
        }
    }
}

/// Maps driver errors to and from their recorded string form.
///
/// Implementations restore well-known messages to the canonical sentinel
/// value so handlers that compare against sentinels behave identically under
/// replay. Unknown messages become opaque errors carrying the original text.
pub trait DriverError: Sized {
    /// Error returned when a TEST-mode call finds no matching recording.
    fn mock_not_found() -> Self;

    /// Renders the error for recording.
    fn to_recorded(&self) -> RecordedError;

    /// Restores an error from its recorded form.
    fn from_recorded(recorded: RecordedError) -> Self;
}

// ============================================================================
// SECTION: Chunk Serialization
// ============================================================================

/// Serde helpers that render binary chunks as base64 strings.
pub(crate) mod base64_chunks {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::Deserialize;
    use serde::Deserializer;
    use serde::Serializer;
    use serde::ser::SerializeSeq;

    /// Serializes chunks as a sequence of base64 strings.
    pub fn serialize<S>(chunks: &[Vec<u8>], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(chunks.len()))?;
        for chunk in chunks {
            seq.serialize_element(&STANDARD.encode(chunk))?;
        }
        seq.end()
    }

    /// Deserializes chunks from a sequence of base64 strings.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = Vec::<String>::deserialize(deserializer)?;
        encoded
            .iter()
            .map(|chunk| STANDARD.decode(chunk).map_err(serde::de::Error::custom))
            .collect()
    }
}
