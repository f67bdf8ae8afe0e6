// crates/keploy-client/src/lib.rs
// ============================================================================
// Module: Keploy Client Library
// Description: Control-plane implementations for the record/replay SDK.
// Purpose: Reach the testcase server over HTTP or persist to local YAML.
// Dependencies: keploy-core, keploy-config, reqwest, serde_yaml
// ============================================================================

//! ## Overview
//! Both clients implement [`keploy_core::ControlPlane`]. Pick one with
//! [`control_plane_from_config`]: `file_export = true` selects the YAML
//! exporter, anything else the HTTP server client.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod file;
pub mod http;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

use std::sync::Arc;

pub use file::Document;
pub use file::FileControlPlane;
pub use file::REPORT_KIND;
pub use http::API_KEY_HEADER;
pub use http::EOF_HEADER;
pub use http::HttpControlPlane;
use keploy_config::KeployConfig;
use keploy_core::ControlPlane;
use keploy_core::ControlPlaneError;

// ============================================================================
// SECTION: Selection
// ============================================================================

/// Builds the control plane selected by configuration.
///
/// # Errors
///
/// Returns [`ControlPlaneError`] when the selected client cannot be built.
pub fn control_plane_from_config(
    config: &KeployConfig,
) -> Result<Arc<dyn ControlPlane>, ControlPlaneError> {
    if config.app.file_export {
        Ok(Arc::new(FileControlPlane::from_config(&config.app)?))
    } else {
        Ok(Arc::new(HttpControlPlane::new(&config.server)?))
    }
}
