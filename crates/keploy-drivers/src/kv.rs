// crates/keploy-drivers/src/kv.rs
// ============================================================================
// Module: Keploy Key-Value Driver
// Description: Record/replay wrapper around an async key-value store.
// Purpose: Capture Get/Set/Del as dependencies with the Nil sentinel.
// Dependencies: keploy-core, async-trait, thiserror
// ============================================================================

//! ## Overview
//! [`KeployKv`] wraps a [`KvBackend`]. A missing key is [`KvError::Nil`],
//! and so is an unmatched call in `Test` mode, which makes the handler take
//! its cache-miss path.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use keploy_core::DependencyKind;
use keploy_core::DependencyMeta;
use keploy_core::DriverError;
use keploy_core::RecordedError;
use keploy_core::intercept;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Dependency name used for key-value calls.
pub const KV_DEPENDENCY_NAME: &str = "redis";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Key-value store errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KvError {
    /// The key does not exist. Also returned for unmatched replays.
    #[error("redis: nil")]
    Nil,
    /// Any other backend failure.
    #[error("{0}")]
    Backend(String),
}

impl DriverError for KvError {
    fn mock_not_found() -> Self {
        Self::Nil
    }

    fn to_recorded(&self) -> RecordedError {
        RecordedError::new(self.to_string())
    }

    fn from_recorded(recorded: RecordedError) -> Self {
        if recorded.err_string == Self::Nil.to_string() {
            Self::Nil
        } else {
            Self::Backend(recorded.err_string)
        }
    }
}

// ============================================================================
// SECTION: Backend Contract
// ============================================================================

/// Async key-value store.
#[async_trait]
pub trait KvBackend: Send + Sync {
    /// Reads `key`.
    ///
    /// # Errors
    ///
    /// Returns [`KvError::Nil`] when the key is absent.
    async fn get(&self, key: &str) -> Result<String, KvError>;

    /// Writes `key` with an optional expiry.
    ///
    /// # Errors
    ///
    /// Returns [`KvError`] when the write fails.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), KvError>;

    /// Deletes `keys` and returns how many existed.
    ///
    /// # Errors
    ///
    /// Returns [`KvError`] when the delete fails.
    async fn del(&self, keys: &[&str]) -> Result<u64, KvError>;
}

// ============================================================================
// SECTION: Instrumented Handle
// ============================================================================

/// Instrumented key-value handle.
#[derive(Clone)]
pub struct KeployKv {
    /// Wrapped backend, untouched in `Test` mode.
    backend: Arc<dyn KvBackend>,
}

impl KeployKv {
    /// Wraps `backend`.
    #[must_use]
    pub fn new(backend: Arc<dyn KvBackend>) -> Self {
        Self {
            backend,
        }
    }

    /// Reads `key`.
    ///
    /// # Errors
    ///
    /// Returns [`KvError::Nil`] for a missing key, or the backend's error.
    pub async fn get(&self, key: &str) -> Result<String, KvError> {
        intercept(kv_meta("Get").with("key", key), move || async move { self.backend.get(key).await })
            .await
    }

    /// Writes `key`.
    ///
    /// # Errors
    ///
    /// Returns the backend's [`KvError`].
    pub async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), KvError> {
        intercept(kv_meta("Set").with("key", key), move || async move {
            self.backend.set(key, value, ttl).await
        })
        .await
    }

    /// Deletes `keys` and returns how many existed.
    ///
    /// # Errors
    ///
    /// Returns the backend's [`KvError`].
    pub async fn del(&self, keys: &[&str]) -> Result<u64, KvError> {
        intercept(kv_meta("Del").with("keys", keys.join(",")), move || async move {
            self.backend.del(keys).await
        })
        .await
    }
}

impl fmt::Debug for KeployKv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeployKv").finish_non_exhaustive()
    }
}

/// Meta for a key-value operation.
fn kv_meta(operation: &str) -> DependencyMeta {
    DependencyMeta::new(KV_DEPENDENCY_NAME, DependencyKind::NoSqlDb, operation)
}
