// crates/keploy-config/src/config.rs
// ============================================================================
// Module: Keploy Configuration
// Description: Configuration loading and validation for the Keploy SDK.
// Purpose: Provide strict config parsing with hard limits and env overrides.
// Dependencies: keploy-core, regex, serde, toml, url
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with size and path limits, then
//! `KEPLOY_*` environment overrides are applied and the result is validated.
//! When no file is named and the default file is absent, defaults are used.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use keploy_core::Mode;
use regex::Regex;
use serde::Deserialize;
use serde::Deserializer;
use thiserror::Error;
use url::Url;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "keploy.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "KEPLOY_CONFIG";
/// Environment variable overriding `mode`.
pub const MODE_ENV_VAR: &str = "KEPLOY_MODE";
/// Environment variable overriding `app.id`.
pub const APP_ID_ENV_VAR: &str = "KEPLOY_APP_ID";
/// Environment variable overriding `server.url`.
pub const SERVER_URL_ENV_VAR: &str = "KEPLOY_SERVER_URL";
/// Maximum configuration file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum application id length.
pub(crate) const MAX_APP_ID_LENGTH: usize = 256;
/// Maximum API key length.
pub(crate) const MAX_API_KEY_LENGTH: usize = 256;
/// Maximum number of noise entries.
pub(crate) const MAX_NOISE_FIELDS: usize = 256;
/// Maximum startup delay before replay begins, in seconds.
pub(crate) const MAX_DELAY_SECONDS: u64 = 600;
/// Maximum per-testcase replay deadline, in seconds.
pub(crate) const MAX_TIMEOUT_SECONDS: u64 = 3600;
/// Minimum control-plane request timeout in milliseconds.
pub(crate) const MIN_SERVER_TIMEOUT_MS: u64 = 100;
/// Maximum control-plane request timeout in milliseconds.
pub(crate) const MAX_SERVER_TIMEOUT_MS: u64 = 120_000;
/// Minimum control-plane response size limit in bytes.
pub(crate) const MIN_RESPONSE_BYTES: usize = 1024;
/// Maximum control-plane response size limit in bytes.
pub(crate) const MAX_RESPONSE_BYTES: usize = 256 * 1024 * 1024;
/// Maximum testcase page size.
pub(crate) const MAX_PAGE_SIZE: usize = 1000;

// ============================================================================
// SECTION: Configuration Types
// ============================================================================

/// Keploy SDK configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeployConfig {
    /// Process-wide mode.
    #[serde(default, deserialize_with = "deserialize_mode")]
    pub mode: Mode,
    /// Application under record/replay.
    #[serde(default)]
    pub app: AppConfig,
    /// Control-plane connection.
    #[serde(default)]
    pub server: ServerConfig,
}

impl KeployConfig {
    /// Loads configuration using the default resolution rules and the
    /// process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match resolve_path(path)? {
            Some(resolved) => Self::read(&resolved)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a config file without overrides or validation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read or parsed.
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        validate_path(path)?;
        let bytes = fs::read(path).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        Self::parse(content)
    }

    /// Parses TOML content without overrides or validation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the content is not a valid config.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Applies `KEPLOY_*` overrides looked up through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when an override mode is unknown.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(mode) = lookup(MODE_ENV_VAR) {
            self.mode = mode
                .parse()
                .map_err(|err| ConfigError::Invalid(format!("{MODE_ENV_VAR}: {err}")))?;
        }
        if let Some(app_id) = lookup(APP_ID_ENV_VAR) {
            self.app.id = app_id;
        }
        if let Some(url) = lookup(SERVER_URL_ENV_VAR) {
            self.server.url = url;
        }
        Ok(())
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.app.validate(self.mode)?;
        self.server.validate()?;
        Ok(())
    }
}

/// Application settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Application identifier passed to the control plane.
    #[serde(default)]
    pub id: String,
    /// Host of the local service the replay driver dispatches to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port of the local service the replay driver dispatches to.
    #[serde(default)]
    pub port: u16,
    /// Startup grace period before replay begins.
    #[serde(default = "default_delay_seconds")]
    pub delay_seconds: u64,
    /// Deadline for each replayed request.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    /// Persist testcases and mocks as individual files.
    #[serde(default)]
    pub file_export: bool,
    /// Directory for exported testcases.
    #[serde(default)]
    pub test_case_path: Option<String>,
    /// Directory for exported mocks.
    #[serde(default)]
    pub mock_path: Option<String>,
    /// Field paths stored on testcases for the server-side diff to ignore.
    #[serde(default)]
    pub noise: Vec<String>,
    /// Capture filters.
    #[serde(default)]
    pub filter: FilterConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            host: default_host(),
            port: 0,
            delay_seconds: default_delay_seconds(),
            timeout_seconds: default_timeout_seconds(),
            file_export: false,
            test_case_path: None,
            mock_path: None,
            noise: Vec::new(),
            filter: FilterConfig::default(),
        }
    }
}

impl AppConfig {
    /// Returns the base URL of the local service.
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// Returns the startup delay.
    #[must_use]
    pub const fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_seconds)
    }

    /// Returns the per-testcase replay deadline.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Validates application settings against the active mode.
    fn validate(&self, mode: Mode) -> Result<(), ConfigError> {
        let id = self.id.trim();
        if mode != Mode::Off && id.is_empty() {
            return Err(ConfigError::Invalid(format!("app.id must be set when mode={mode}")));
        }
        if id.len() > MAX_APP_ID_LENGTH {
            return Err(ConfigError::Invalid("app.id exceeds max length".to_string()));
        }
        if self.host.trim().is_empty() {
            return Err(ConfigError::Invalid("app.host must be non-empty".to_string()));
        }
        if mode == Mode::Test && self.port == 0 {
            return Err(ConfigError::Invalid("app.port must be set when mode=test".to_string()));
        }
        if self.delay_seconds > MAX_DELAY_SECONDS {
            return Err(ConfigError::Invalid(format!(
                "app.delay_seconds must be at most {MAX_DELAY_SECONDS}"
            )));
        }
        if self.timeout_seconds == 0 || self.timeout_seconds > MAX_TIMEOUT_SECONDS {
            return Err(ConfigError::Invalid(format!(
                "app.timeout_seconds must be between 1 and {MAX_TIMEOUT_SECONDS}"
            )));
        }
        if self.noise.len() > MAX_NOISE_FIELDS {
            return Err(ConfigError::Invalid("app.noise has too many entries".to_string()));
        }
        if self.file_export {
            let test_case_path = self.test_case_path.as_deref().ok_or_else(|| {
                ConfigError::Invalid("app.file_export=true requires app.test_case_path".to_string())
            })?;
            let mock_path = self.mock_path.as_deref().ok_or_else(|| {
                ConfigError::Invalid("app.file_export=true requires app.mock_path".to_string())
            })?;
            validate_path_string("app.test_case_path", test_case_path)?;
            validate_path_string("app.mock_path", mock_path)?;
            if test_case_path.trim_end_matches('/') == mock_path.trim_end_matches('/') {
                return Err(ConfigError::Invalid(
                    "app.mock_path must differ from app.test_case_path".to_string(),
                ));
            }
        }
        self.filter.validate()
    }
}

/// Regex gates deciding which inbound requests are captured.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterConfig {
    /// Requests whose path does not match are served uncaptured.
    #[serde(default)]
    pub url_regex: Option<String>,
    /// Requests with no header line (`name: value`) matching are served
    /// uncaptured.
    #[serde(default)]
    pub header_regex: Option<String>,
}

impl FilterConfig {
    /// Validates that configured patterns compile.
    fn validate(&self) -> Result<(), ConfigError> {
        for (field, pattern) in
            [("app.filter.url_regex", &self.url_regex), ("app.filter.header_regex", &self.header_regex)]
        {
            if let Some(pattern) = pattern {
                Regex::new(pattern)
                    .map_err(|err| ConfigError::Invalid(format!("{field} is invalid: {err}")))?;
            }
        }
        Ok(())
    }
}

/// Control-plane connection settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Base URL of the control plane API.
    #[serde(default = "default_server_url")]
    pub url: String,
    /// Optional API key sent with every request.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Request timeout in milliseconds.
    #[serde(default = "default_server_timeout_ms")]
    pub timeout_ms: u64,
    /// Maximum accepted response body size in bytes.
    #[serde(default = "default_max_response_bytes")]
    pub max_response_bytes: usize,
    /// Testcases fetched per page.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: default_server_url(),
            api_key: None,
            timeout_ms: default_server_timeout_ms(),
            max_response_bytes: default_max_response_bytes(),
            page_size: default_page_size(),
        }
    }
}

impl ServerConfig {
    /// Returns the request timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Validates control-plane settings.
    fn validate(&self) -> Result<(), ConfigError> {
        let url = Url::parse(self.url.trim())
            .map_err(|err| ConfigError::Invalid(format!("server.url is invalid: {err}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid("server.url must use http or https".to_string()));
        }
        if let Some(key) = &self.api_key
            && (key.trim().is_empty() || key.len() > MAX_API_KEY_LENGTH)
        {
            return Err(ConfigError::Invalid(format!(
                "server.api_key must be 1-{MAX_API_KEY_LENGTH} characters"
            )));
        }
        if !(MIN_SERVER_TIMEOUT_MS ..= MAX_SERVER_TIMEOUT_MS).contains(&self.timeout_ms) {
            return Err(ConfigError::Invalid(format!(
                "server.timeout_ms must be between {MIN_SERVER_TIMEOUT_MS} and \
                 {MAX_SERVER_TIMEOUT_MS}"
            )));
        }
        if !(MIN_RESPONSE_BYTES ..= MAX_RESPONSE_BYTES).contains(&self.max_response_bytes) {
            return Err(ConfigError::Invalid(format!(
                "server.max_response_bytes must be between {MIN_RESPONSE_BYTES} and \
                 {MAX_RESPONSE_BYTES}"
            )));
        }
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(ConfigError::Invalid(format!(
                "server.page_size must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading or validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from the caller or environment defaults.
///
/// Returns `None` when neither names a file and the default file is absent.
fn resolve_path(path: Option<&Path>) -> Result<Option<PathBuf>, ConfigError> {
    if let Some(path) = path {
        return Ok(Some(path.to_path_buf()));
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(Some(PathBuf::from(env_path)));
    }
    let default = PathBuf::from(DEFAULT_CONFIG_NAME);
    Ok(default.is_file().then_some(default))
}

/// Validates the resolved path against length limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a configured directory string against length constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in Path::new(trimmed).components() {
        if component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}

/// Parses `mode` through `FromStr` so `capture` is accepted.
fn deserialize_mode<'de, D>(deserializer: D) -> Result<Mode, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    raw.parse().map_err(serde::de::Error::custom)
}

/// Default local service host.
fn default_host() -> String {
    "127.0.0.1".to_string()
}

/// Default startup delay in seconds.
const fn default_delay_seconds() -> u64 {
    5
}

/// Default per-testcase replay deadline in seconds.
const fn default_timeout_seconds() -> u64 {
    60
}

/// Default control-plane URL.
fn default_server_url() -> String {
    "http://localhost:6789/api".to_string()
}

/// Default control-plane request timeout in milliseconds.
const fn default_server_timeout_ms() -> u64 {
    10_000
}

/// Default control-plane response size limit in bytes.
const fn default_max_response_bytes() -> usize {
    16 * 1024 * 1024
}

/// Default testcase page size.
const fn default_page_size() -> usize {
    25
}
