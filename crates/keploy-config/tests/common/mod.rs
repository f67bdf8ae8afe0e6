// crates/keploy-config/tests/common/mod.rs
// =============================================================================
// Module: Config Test Helpers
// Description: Shared helpers for config validation tests.
// Purpose: Reduce duplication across integration tests for keploy-config.
// =============================================================================

#![allow(dead_code, reason = "Test helpers are selectively used across suites.")]

use keploy_config::ConfigError;
use keploy_config::KeployConfig;

/// Result type used by config tests.
pub type TestResult = Result<(), String>;

/// Parses a TOML string into a `KeployConfig` for tests.
pub fn config_from_toml(toml_str: &str) -> Result<KeployConfig, String> {
    KeployConfig::parse(toml_str).map_err(|err| err.to_string())
}

/// Returns a minimal record-mode config.
pub fn record_config() -> Result<KeployConfig, String> {
    config_from_toml("mode = \"record\"\n[app]\nid = \"svc\"\n")
}

/// Asserts that `result` is an error whose message contains `needle`.
pub fn assert_invalid(result: Result<(), ConfigError>, needle: &str) -> TestResult {
    match result {
        Err(error) => {
            let message = error.to_string();
            if message.contains(needle) {
                Ok(())
            } else {
                Err(format!("error {message} did not contain {needle}"))
            }
        }
        Ok(()) => Err("expected invalid config".to_string()),
    }
}
