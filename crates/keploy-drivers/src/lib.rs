// crates/keploy-drivers/src/lib.rs
// ============================================================================
// Module: Keploy Drivers Library
// Description: Instrumented driver wrappers built on the dependency kernel.
// Purpose: Record and replay outbound calls from SQL, document, key-value,
//          and HTTP clients.
// Dependencies: keploy-core, rusqlite, reqwest, async-trait
// ============================================================================

//! ## Overview
//! Each wrapper holds the real client and routes every call through
//! [`keploy_core::Interception`]. Outside a request context, or with the
//! mode off, calls go straight to the backend. Each wrapper's error type
//! implements [`keploy_core::DriverError`] so recorded failures come back as
//! the same sentinel values on replay.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod document;
pub mod http_client;
pub mod kv;
pub mod sql;
pub mod sqlite;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use document::Cursor;
pub use document::DocumentBackend;
pub use document::DocumentCursor;
pub use document::DocumentError;
pub use document::KeployDocuments;
pub use document::SingleResult;
pub use http_client::ClientResponse;
pub use http_client::HttpClientError;
pub use http_client::KeployHttpClient;
pub use kv::KeployKv;
pub use kv::KvBackend;
pub use kv::KvError;
pub use sql::BufferedRows;
pub use sql::ExecResult;
pub use sql::KeploySql;
pub use sql::Row;
pub use sql::Rows;
pub use sql::SqlBackend;
pub use sql::SqlError;
pub use sql::SqlRows;
pub use sql::SqlTx;
pub use sql::SqlValue;
pub use sql::Tx;
pub use sqlite::SqliteBackend;
