//! Configuration resolution: JSON config file merged with environment
//! overrides into one immutable `Configuration`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::core::error::{Error, Result};
use crate::core::logger::LogLevel;

pub const ENV_USERNAME: &str = "SFDELTA_USERNAME";
pub const ENV_CLIENT_ID: &str = "SFDELTA_CLIENT_ID";
pub const ENV_KEY_FILE: &str = "SFDELTA_KEY_FILE";
pub const ENV_INSTANCE_URL: &str = "SFDELTA_INSTANCE_URL";

const DEFAULT_RETRY_COUNT: u32 = 3;
const DEFAULT_RETRY_DELAY_SECS: u64 = 5;
const DEFAULT_SOURCE_ROOT: &str = "src";
const DEFAULT_CLI_PATH: &str = "sfdx";
const DEFAULT_API_VERSION: &str = "52.0";

/// On-disk configuration shape. Every key is optional; environment
/// variables override the credential fields.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigFile {
    pub username: Option<String>,
    pub client_id: Option<String>,
    pub key_file: Option<String>,
    pub instance_url: Option<String>,
    pub test_patterns: Option<Vec<String>>,
    pub retry_count: Option<u32>,
    pub retry_delay_secs: Option<u64>,
    pub test_batch_count: Option<u32>,
    pub source_root: Option<String>,
    pub cli_path: Option<String>,
    pub api_version: Option<String>,
}

/// Immutable, fully validated run configuration.
#[derive(Debug, Clone)]
pub struct Configuration {
    pub username: String,
    pub client_id: String,
    pub key_file: PathBuf,
    pub instance_url: String,
    /// Ordered filename patterns; first match wins during classification.
    pub test_patterns: Vec<String>,
    pub retry_count: u32,
    pub retry_delay: Duration,
    /// Accepted and logged, but reserved: nothing batches tests in parallel.
    pub test_batch_count: Option<u32>,
    pub source_root: String,
    pub cli_path: String,
    pub api_version: String,
    pub dry_run: bool,
    pub log_level: LogLevel,
}

/// Resolve configuration from an optional file plus the process environment.
pub fn resolve(
    config_path: Option<&Path>,
    dry_run: bool,
    log_level: LogLevel,
) -> Result<Configuration> {
    let file = match config_path {
        Some(path) => load_file(path)?,
        None => ConfigFile::default(),
    };
    resolve_with(file, |key| std::env::var(key).ok(), dry_run, log_level)
}

fn load_file(path: &Path) -> Result<ConfigFile> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        Error::internal_io(
            e.to_string(),
            Some(format!("read config file {}", path.display())),
        )
    })?;
    serde_json::from_str(&raw).map_err(|e| Error::config_invalid_json(path.display().to_string(), e))
}

/// Merge file values with environment overrides and validate.
///
/// Environment lookup is injected so tests can exercise precedence without
/// mutating process-global state.
pub fn resolve_with(
    file: ConfigFile,
    env: impl Fn(&str) -> Option<String>,
    dry_run: bool,
    log_level: LogLevel,
) -> Result<Configuration> {
    let username = env(ENV_USERNAME).or(file.username).unwrap_or_default();
    let client_id = env(ENV_CLIENT_ID).or(file.client_id).unwrap_or_default();
    let key_file = env(ENV_KEY_FILE).or(file.key_file).unwrap_or_default();
    let instance_url = env(ENV_INSTANCE_URL).or(file.instance_url).unwrap_or_default();

    let mut missing = Vec::new();
    if username.trim().is_empty() {
        missing.push("username");
    }
    if client_id.trim().is_empty() {
        missing.push("clientId");
    }
    if key_file.trim().is_empty() {
        missing.push("keyFile");
    }
    if instance_url.trim().is_empty() {
        missing.push("instanceUrl");
    }
    if !missing.is_empty() {
        return Err(Error::config_missing_key(missing.join(", "), None)
            .with_hint("Set the key in the config file or via SFDELTA_* environment variables"));
    }

    if file.test_batch_count == Some(0) {
        return Err(Error::config_invalid_value(
            "testBatchCount",
            "must be a positive integer",
        ));
    }

    let key_file = PathBuf::from(key_file);
    if !key_file.exists() {
        return Err(Error::config_key_file_not_found(
            key_file.display().to_string(),
        ));
    }

    Ok(Configuration {
        username,
        client_id,
        key_file,
        instance_url,
        test_patterns: file.test_patterns.unwrap_or_default(),
        retry_count: file.retry_count.unwrap_or(DEFAULT_RETRY_COUNT).max(1),
        retry_delay: Duration::from_secs(
            file.retry_delay_secs.unwrap_or(DEFAULT_RETRY_DELAY_SECS),
        ),
        test_batch_count: file.test_batch_count,
        source_root: file.source_root.unwrap_or_else(|| DEFAULT_SOURCE_ROOT.to_string()),
        cli_path: file.cli_path.unwrap_or_else(|| DEFAULT_CLI_PATH.to_string()),
        api_version: file.api_version.unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
        dry_run,
        log_level,
    })
}
