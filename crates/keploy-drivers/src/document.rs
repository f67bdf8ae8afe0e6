// crates/keploy-drivers/src/document.rs
// ============================================================================
// Module: Keploy Document Store Driver
// Description: Record/replay wrapper around an async document database.
// Purpose: Capture cursors, single results, and inserts as dependencies.
// Dependencies: keploy-core, async-trait, serde_json, thiserror
// ============================================================================

//! ## Overview
//! [`KeployDocuments`] wraps a [`DocumentBackend`]. Documents are JSON
//! values and are recorded as JSON text.
//!
//! - `Find` returns a [`Cursor`]; each `Next` and the final `Close` are
//!   separate dependencies. `Next` answers `bool` and keeps the current
//!   document for [`Cursor::decode`]. An unmatched `Next` in `Test` mode is
//!   the end of the cursor.
//! - `FindOne` returns a [`SingleResult`] that can be decoded once. An
//!   unmatched call is [`DocumentError::NoDocuments`].
//! - `InsertOne` records the inserted id.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use keploy_core::CursorState;
use keploy_core::DependencyKind;
use keploy_core::DependencyMeta;
use keploy_core::DriverError;
use keploy_core::Interception;
use keploy_core::RecordedError;
use keploy_core::SingleResultState;
use keploy_core::intercept;
use keploy_core::replay_outcome;
use keploy_core::report_stream_end;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Dependency name used for document store calls.
pub const DOCUMENT_DEPENDENCY_NAME: &str = "mongodb";
/// Cursor query operation.
pub const FIND_OP: &str = "Find";
/// Cursor advance operation.
pub const FIND_NEXT_OP: &str = "Find.Next";
/// Cursor close operation.
pub const FIND_CLOSE_OP: &str = "Find.Close";
/// Single document query operation.
pub const FIND_ONE_OP: &str = "FindOne";
/// Insert operation.
pub const INSERT_ONE_OP: &str = "InsertOne";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Document store errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentError {
    /// The query matched no document. Also returned for unmatched replays.
    #[error("mongo: no documents in result")]
    NoDocuments,
    /// The cursor was used after close.
    #[error("cursor is closed")]
    CursorClosed,
    /// A document could not be decoded into the requested type.
    #[error("document decode error: {0}")]
    Decode(String),
    /// Any other backend failure.
    #[error("{0}")]
    Backend(String),
}

impl DriverError for DocumentError {
    fn mock_not_found() -> Self {
        Self::NoDocuments
    }

    fn to_recorded(&self) -> RecordedError {
        RecordedError::new(self.to_string())
    }

    fn from_recorded(recorded: RecordedError) -> Self {
        [Self::NoDocuments, Self::CursorClosed]
            .into_iter()
            .find(|sentinel| sentinel.to_string() == recorded.err_string)
            .unwrap_or(Self::Backend(recorded.err_string))
    }
}

// ============================================================================
// SECTION: Backend Contracts
// ============================================================================

/// Async document database.
#[async_trait]
pub trait DocumentBackend: Send + Sync {
    /// Opens a cursor over documents matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError`] when the query fails.
    async fn find(
        &self,
        collection: &str,
        filter: &Value,
    ) -> Result<Box<dyn DocumentCursor>, DocumentError>;

    /// Returns the first document matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::NoDocuments`] when nothing matches.
    async fn find_one(&self, collection: &str, filter: &Value) -> Result<Value, DocumentError>;

    /// Inserts a document and returns its id.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError`] when the insert fails.
    async fn insert_one(&self, collection: &str, document: &Value) -> Result<String, DocumentError>;
}

/// Live cursor returned by a backend.
#[async_trait]
pub trait DocumentCursor: Send {
    /// Returns the next document, or `None` when exhausted.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError`] when the backend fails mid-iteration.
    async fn next(&mut self) -> Result<Option<Value>, DocumentError>;

    /// Releases the cursor.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError`] when the backend fails to release it.
    async fn close(&mut self) -> Result<(), DocumentError>;
}

// ============================================================================
// SECTION: Instrumented Handle
// ============================================================================

/// Instrumented document store handle.
#[derive(Clone)]
pub struct KeployDocuments {
    /// Wrapped backend, untouched in `Test` mode.
    backend: Arc<dyn DocumentBackend>,
}

impl KeployDocuments {
    /// Wraps `backend`.
    #[must_use]
    pub fn new(backend: Arc<dyn DocumentBackend>) -> Self {
        Self {
            backend,
        }
    }

    /// Opens a cursor over `collection`.
    ///
    /// # Errors
    ///
    /// Returns the backend's [`DocumentError`], or its recorded form.
    pub async fn find(&self, collection: &str, filter: &Value) -> Result<Cursor, DocumentError> {
        let interception = Interception::current();
        let meta = collection_meta(FIND_OP, collection).with("filter", filter.to_string());
        let backend = &self.backend;
        let mut live = None;
        let slot = &mut live;
        interception
            .call(meta.clone(), move || async move {
                *slot = Some(backend.find(collection, filter).await?);
                Ok::<(), DocumentError>(())
            })
            .await?;
        Ok(Cursor {
            meta,
            interception,
            inner: live,
            state: CursorState::Open,
            current: None,
            err: None,
        })
    }

    /// Finds one document in `collection`.
    ///
    /// Lookup failures are carried by the returned result, as the driver's
    /// single-result handle does.
    pub async fn find_one(&self, collection: &str, filter: &Value) -> SingleResult {
        let meta = collection_meta(FIND_ONE_OP, collection).with("filter", filter.to_string());
        let outcome: Result<String, DocumentError> = intercept(meta, move || async move {
            self.backend.find_one(collection, filter).await.map(|document| document.to_string())
        })
        .await;
        SingleResult {
            document: outcome.and_then(|text| parse_document(&text)),
            state: SingleResultState::Pending,
        }
    }

    /// Inserts `document` into `collection` and returns its id.
    ///
    /// # Errors
    ///
    /// Returns the backend's [`DocumentError`], or its recorded form.
    pub async fn insert_one(&self, collection: &str, document: &Value) -> Result<String, DocumentError> {
        intercept(collection_meta(INSERT_ONE_OP, collection), move || async move {
            self.backend.insert_one(collection, document).await
        })
        .await
    }
}

impl fmt::Debug for KeployDocuments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeployDocuments").finish_non_exhaustive()
    }
}

// ============================================================================
// SECTION: Cursor
// ============================================================================

/// Instrumented cursor.
pub struct Cursor {
    /// Meta of the originating `Find`.
    meta: DependencyMeta,
    /// Interception resolved when the cursor opened.
    interception: Interception,
    /// Live backend cursor; absent in `Test` mode.
    inner: Option<Box<dyn DocumentCursor>>,
    /// Iteration state.
    state: CursorState,
    /// Document produced by the last successful `next`.
    current: Option<Value>,
    /// Error that ended iteration, if any.
    err: Option<DocumentError>,
}

impl Cursor {
    /// Advances the cursor. Returns false once exhausted or failed.
    pub async fn next(&mut self) -> bool {
        if self.state.is_done() {
            self.current = None;
            return false;
        }
        let meta = self.meta.for_operation(FIND_NEXT_OP);
        let outcome: Result<Option<String>, DocumentError> = match &self.interception {
            Interception::Replay(ctx) => replay_outcome(ctx, &meta).unwrap_or_else(|err| {
                report_stream_end(ctx, &err);
                Ok(None)
            }),
            live => {
                let inner = &mut self.inner;
                live.call(meta, move || async move {
                    let cursor = inner.as_mut().ok_or(DocumentError::CursorClosed)?;
                    Ok(cursor.next().await?.map(|document| document.to_string()))
                })
                .await
            }
        };
        let document = match outcome.and_then(|text| text.map(|text| parse_document(&text)).transpose()) {
            Ok(document) => document,
            Err(err) => {
                self.err = Some(err);
                None
            }
        };
        let has_row = document.is_some();
        self.current = document;
        self.state = self.state.next(has_row).unwrap_or(CursorState::Closed);
        has_row
    }

    /// Returns the current document.
    #[must_use]
    pub const fn current(&self) -> Option<&Value> {
        self.current.as_ref()
    }

    /// Decodes the current document.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::Decode`] when there is no current document
    /// or it does not match `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, DocumentError> {
        let document = self
            .current
            .as_ref()
            .ok_or_else(|| DocumentError::Decode("no current document".to_string()))?;
        serde_json::from_value(document.clone()).map_err(|err| DocumentError::Decode(err.to_string()))
    }

    /// Returns the error that ended iteration, if any.
    #[must_use]
    pub const fn err(&self) -> Option<&DocumentError> {
        self.err.as_ref()
    }

    /// Returns the iteration state.
    #[must_use]
    pub const fn state(&self) -> CursorState {
        self.state
    }

    /// Closes the cursor. Closing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns the backend's [`DocumentError`].
    pub async fn close(&mut self) -> Result<(), DocumentError> {
        if self.state == CursorState::Closed {
            return Ok(());
        }
        let meta = self.meta.for_operation(FIND_CLOSE_OP);
        let inner = &mut self.inner;
        let result = self
            .interception
            .call(meta, move || async move {
                match inner {
                    Some(cursor) => cursor.close().await,
                    None => Ok(()),
                }
            })
            .await;
        self.state = self.state.close();
        self.current = None;
        result
    }
}

impl fmt::Debug for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("meta", &self.meta)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// SECTION: Single Result
// ============================================================================

/// Result of `FindOne`.
#[derive(Debug, Clone)]
pub struct SingleResult {
    /// Found document or the lookup error.
    document: Result<Value, DocumentError>,
    /// Decode state.
    state: SingleResultState,
}

impl SingleResult {
    /// Returns the lookup error, if any.
    #[must_use]
    pub fn err(&self) -> Option<&DocumentError> {
        self.document.as_ref().err()
    }

    /// Returns the decode state.
    #[must_use]
    pub const fn state(&self) -> SingleResultState {
        self.state
    }

    /// Decodes the document. A result can be decoded once.
    ///
    /// # Errors
    ///
    /// Returns the lookup error, or [`DocumentError::Decode`] when the
    /// document does not match `T` or was already decoded.
    pub fn decode<T: DeserializeOwned>(&mut self) -> Result<T, DocumentError> {
        self.state = self.state.decode().map_err(|err| DocumentError::Decode(err.to_string()))?;
        let document = self.document.as_ref().map_err(Clone::clone)?;
        serde_json::from_value(document.clone()).map_err(|err| DocumentError::Decode(err.to_string()))
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Meta for a call on `collection`.
fn collection_meta(operation: &str, collection: &str) -> DependencyMeta {
    DependencyMeta::new(DOCUMENT_DEPENDENCY_NAME, DependencyKind::NoSqlDb, operation)
        .with("collection", collection)
}

/// Parses recorded JSON text.
fn parse_document(text: &str) -> Result<Value, DocumentError> {
    serde_json::from_str(text).map_err(|err| DocumentError::Decode(err.to_string()))
}
