// crates/keploy-core/src/runtime/registry.rs
// ============================================================================
// Module: Keploy Replay Registry
// Description: Id-keyed map shared by the replay driver and capture pipeline.
// Purpose: Hand recorded dependencies to the request that carries a test id.
// Dependencies: crate::core, crate::runtime::context, tokio
// ============================================================================

//! ## Overview
//! The replay driver registers a testcase before dispatching its request.
//! When the capture pipeline sees the test-id header it takes the entry,
//! which yields a `Test`-mode [`RequestContext`] pre-loaded with the recorded
//! queues and the completion latch. Entries leave the map when taken or
//! abandoned, so the map only holds in-flight dispatches.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use thiserror::Error;
use tokio::sync::oneshot;

use crate::core::Dependency;
use crate::core::HttpResponse;
use crate::core::Mock;
use crate::core::Testcase;
use crate::core::TestcaseId;
use crate::core::Timestamp;
use crate::runtime::context::RequestContext;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Replay registry errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A replay for the testcase is already in flight.
    #[error("replay already registered for testcase {0}")]
    Duplicate(String),
    /// The registry mutex was poisoned.
    #[error("replay registry poisoned: {0}")]
    Poisoned(String),
}

// ============================================================================
// SECTION: Entries
// ============================================================================

/// Recorded script waiting for its dispatched request.
#[derive(Debug)]
struct PendingReplay {
    /// Recorded dependencies.
    deps: Vec<Dependency>,
    /// Recorded mocks.
    mocks: Vec<Mock>,
    /// Capture time of the testcase.
    captured_at: Timestamp,
    /// Latch the replay driver awaits.
    completion: oneshot::Sender<HttpResponse>,
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Id-keyed replay map.
#[derive(Debug, Clone, Default)]
pub struct ReplayRegistry {
    /// Pending entries keyed by testcase id.
    entries: Arc<Mutex<HashMap<TestcaseId, PendingReplay>>>,
}

impl ReplayRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `testcase` and returns the receiver its response lands on.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Duplicate`] when the id is already pending.
    pub fn register(
        &self,
        testcase: &Testcase,
    ) -> Result<oneshot::Receiver<HttpResponse>, RegistryError> {
        let mut entries = self.lock()?;
        if entries.contains_key(&testcase.id) {
            return Err(RegistryError::Duplicate(testcase.id.to_string()));
        }
        let (completion, receiver) = oneshot::channel();
        entries.insert(
            testcase.id.clone(),
            PendingReplay {
                deps: testcase.deps.clone(),
                mocks: testcase.mocks.clone(),
                captured_at: testcase.captured_at,
                completion,
            },
        );
        drop(entries);
        Ok(receiver)
    }

    /// Removes the entry for `id` and builds its replay context.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Poisoned`] when the mutex is poisoned.
    pub fn take(&self, id: &TestcaseId) -> Result<Option<RequestContext>, RegistryError> {
        let entry = self.lock()?.remove(id);
        Ok(entry.map(|entry| {
            RequestContext::replay(id.clone(), entry.captured_at, entry.deps, entry.mocks)
                .with_completion(entry.completion)
        }))
    }

    /// Drops the entry for `id` without releasing its latch.
    ///
    /// Returns true when an entry was removed.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Poisoned`] when the mutex is poisoned.
    pub fn abandon(&self, id: &TestcaseId) -> Result<bool, RegistryError> {
        Ok(self.lock()?.remove(id).is_some())
    }

    /// Returns the number of pending entries.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Poisoned`] when the mutex is poisoned.
    pub fn pending(&self) -> Result<usize, RegistryError> {
        Ok(self.lock()?.len())
    }

    /// Locks the entry map.
    fn lock(&self) -> Result<MutexGuard<'_, HashMap<TestcaseId, PendingReplay>>, RegistryError> {
        self.entries.lock().map_err(|err| RegistryError::Poisoned(err.to_string()))
    }
}
