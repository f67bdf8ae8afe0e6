// crates/keploy-capture/src/filter.rs
// ============================================================================
// Module: Keploy Capture Filter
// Description: Regex gates deciding which inbound requests are recorded.
// Purpose: Keep health checks and internal routes out of testcases.
// Dependencies: regex, axum (http types)
// ============================================================================

//! ## Overview
//! A request is recorded only when every configured pattern matches: the
//! URL pattern is tested against the path and query, the header pattern
//! against each `name: value` line. Unfiltered requests still reach the
//! handler; they simply run without a request context.

// ============================================================================
// SECTION: Imports
// ============================================================================

use axum::http::HeaderMap;
use axum::http::Uri;
use keploy_config::FilterConfig;
use regex::Regex;

use crate::router::CaptureError;

// ============================================================================
// SECTION: Filter
// ============================================================================

/// Compiled capture filter.
#[derive(Debug, Clone, Default)]
pub struct CaptureFilter {
    /// Pattern the path and query must match.
    url: Option<Regex>,
    /// Pattern at least one header line must match.
    header: Option<Regex>,
}

impl CaptureFilter {
    /// Compiles the configured patterns.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::Config`] when a pattern does not compile.
    pub fn from_config(config: &FilterConfig) -> Result<Self, CaptureError> {
        Ok(Self {
            url: compile(config.url_regex.as_deref())?,
            header: compile(config.header_regex.as_deref())?,
        })
    }

    /// Returns true when the request should be recorded.
    #[must_use]
    pub fn allows(&self, uri: &Uri, headers: &HeaderMap) -> bool {
        let url_ok = self.url.as_ref().is_none_or(|pattern| {
            pattern.is_match(uri.path_and_query().map_or_else(|| uri.path(), |pq| pq.as_str()))
        });
        let header_ok = self.header.as_ref().is_none_or(|pattern| {
            headers.iter().any(|(name, value)| {
                let line = format!("{}: {}", name.as_str(), String::from_utf8_lossy(value.as_bytes()));
                pattern.is_match(&line)
            })
        });
        url_ok && header_ok
    }
}

/// Compiles an optional pattern.
fn compile(pattern: Option<&str>) -> Result<Option<Regex>, CaptureError> {
    pattern
        .map(|pattern| {
            Regex::new(pattern)
                .map_err(|err| CaptureError::Config(format!("capture filter: {err}")))
        })
        .transpose()
}
