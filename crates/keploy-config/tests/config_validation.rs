//! Cross-field validation and file loading tests for keploy-config.
// crates/keploy-config/tests/config_validation.rs
// =============================================================================
// Module: Config Validation Tests
// Description: Validate cross-field rules, limits, and file loading.
// Purpose: Ensure invalid configurations fail closed.
// =============================================================================

use std::fs;

use keploy_config::ConfigError;
use keploy_config::KeployConfig;

mod common;

use common::TestResult;

#[test]
fn record_mode_requires_app_id() -> TestResult {
    let config = common::config_from_toml("mode = \"record\"\n")?;
    common::assert_invalid(config.validate(), "app.id must be set")
}

#[test]
fn test_mode_requires_port() -> TestResult {
    let config = common::config_from_toml("mode = \"test\"\n[app]\nid = \"svc\"\n")?;
    common::assert_invalid(config.validate(), "app.port must be set")
}

#[test]
fn file_export_requires_paths() -> TestResult {
    let mut config = common::record_config()?;
    config.app.file_export = true;
    common::assert_invalid(config.validate(), "app.test_case_path")?;
    config.app.test_case_path = Some("keploy/tests".to_string());
    common::assert_invalid(config.validate(), "app.mock_path")?;
    config.app.mock_path = Some("keploy/tests/".to_string());
    common::assert_invalid(config.validate(), "must differ")?;
    config.app.mock_path = Some("keploy/mocks".to_string());
    config.validate().map_err(|err| err.to_string())
}

#[test]
fn filter_regex_must_compile() -> TestResult {
    let mut config = common::record_config()?;
    config.app.filter.url_regex = Some("^/users/(".to_string());
    common::assert_invalid(config.validate(), "app.filter.url_regex")
}

#[test]
fn timeout_bounds_are_enforced() -> TestResult {
    let mut config = common::record_config()?;
    config.app.timeout_seconds = 0;
    common::assert_invalid(config.validate(), "app.timeout_seconds")?;
    config.app.timeout_seconds = 60;
    config.server.timeout_ms = 10;
    common::assert_invalid(config.validate(), "server.timeout_ms")
}

#[test]
fn server_url_must_be_http() -> TestResult {
    let mut config = common::record_config()?;
    config.server.url = "ftp://keploy.example".to_string();
    common::assert_invalid(config.validate(), "http or https")?;
    config.server.url = "not a url".to_string();
    common::assert_invalid(config.validate(), "server.url is invalid")
}

#[test]
fn page_size_zero_is_rejected() -> TestResult {
    let mut config = common::record_config()?;
    config.server.page_size = 0;
    common::assert_invalid(config.validate(), "server.page_size")
}

#[test]
fn read_loads_file_from_disk() -> TestResult {
    let dir = tempfile::tempdir().map_err(|err| err.to_string())?;
    let path = dir.path().join("keploy.toml");
    fs::write(&path, "mode = \"record\"\n[app]\nid = \"svc\"\nport = 8080\n")
        .map_err(|err| err.to_string())?;
    let config = KeployConfig::read(&path).map_err(|err| err.to_string())?;
    config.validate().map_err(|err| err.to_string())?;
    if config.app.port != 8080 {
        return Err("port not loaded".to_string());
    }
    Ok(())
}

#[test]
fn read_rejects_oversized_file() -> TestResult {
    let dir = tempfile::tempdir().map_err(|err| err.to_string())?;
    let path = dir.path().join("keploy.toml");
    let padding = format!("# {}\n", "x".repeat(1024 * 1024));
    fs::write(&path, padding).map_err(|err| err.to_string())?;
    match KeployConfig::read(&path) {
        Err(ConfigError::Invalid(message)) if message.contains("size limit") => Ok(()),
        Err(other) => Err(format!("unexpected error {other}")),
        Ok(_) => Err("expected oversized file to be rejected".to_string()),
    }
}

#[test]
fn read_reports_missing_file_as_io() -> TestResult {
    let dir = tempfile::tempdir().map_err(|err| err.to_string())?;
    match KeployConfig::read(&dir.path().join("absent.toml")) {
        Err(ConfigError::Io(_)) => Ok(()),
        Err(other) => Err(format!("unexpected error {other}")),
        Ok(_) => Err("expected missing file to fail".to_string()),
    }
}
