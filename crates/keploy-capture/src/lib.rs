// crates/keploy-capture/src/lib.rs
// ============================================================================
// Module: Keploy Capture Library
// Description: Inbound HTTP capture for record and replay.
// Purpose: Expose the router contract, response tee, pipeline, and adapters.
// Dependencies: keploy-core, keploy-config, axum
// ============================================================================

//! ## Overview
//! The capture layer sits in front of a service's handlers. In record mode
//! it snapshots each allowed request and response together with the
//! dependency calls the handler issued; in test mode it serves replay
//! requests tagged with the `keploy_test_id` header against their recorded
//! dependencies and hands the produced response back to the replay driver.
//!
//! Frameworks integrate by implementing [`Router`]; axum services can use
//! [`instrument`] directly.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod adapter;
pub mod filter;
pub mod pipeline;
pub mod router;
pub mod tee;


// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use adapter::AxumExchange;
pub use adapter::capture_middleware;
pub use adapter::instrument;
pub use filter::CaptureFilter;
pub use pipeline::CapturePipeline;
pub use pipeline::DEFAULT_MAX_BODY_BYTES;
pub use router::CaptureError;
pub use router::ResponseWriter;
pub use router::Router;
pub use router::TEST_ID_HEADER;
pub use tee::BufferWriter;
pub use tee::ResponseCapture;
pub use tee::SharedCapture;
pub use tee::TeeWriter;
pub use tee::header_map_to_headers;
