//! Runtime configuration.
//!
//! Every section has defaults, so a partial JSON/TOML document or a bare
//! environment is enough to build a working stack.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_PROVIDER_ID: &str = "username";
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080/auth";
pub const DEFAULT_STORAGE_PATH: &str = "auth_session.json";
pub const DEFAULT_LOG_FILTER: &str = "authkit=info,warn";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub username_provider: UsernameProviderConfig,
    pub storage: StorageConfig,
    pub retry: RetryConfig,
    pub log_filter: LogFilter,
}

/// Settings for the HTTP username/password provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UsernameProviderConfig {
    /// Id the provider registers under
    pub provider_id: String,
    /// Base URL of the authentication backend, without trailing slash
    pub base_url: String,
    /// Per-request timeout
    pub timeout_secs: u64,
}

impl Default for UsernameProviderConfig {
    fn default() -> Self {
        Self {
            provider_id: DEFAULT_PROVIDER_ID.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: 30,
        }
    }
}

/// Where the current session is persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_STORAGE_PATH),
        }
    }
}

/// Transport retry policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, including the first one
    pub max_attempts: usize,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 100,
            max_delay_ms: 5000,
        }
    }
}

/// `EnvFilter` directive used when `RUST_LOG` is unset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogFilter(pub String);

impl Default for LogFilter {
    fn default() -> Self {
        Self(DEFAULT_LOG_FILTER.to_string())
    }
}

impl AuthConfig {
    /// Defaults overlaid with `AUTH_*` environment variables (and a `.env` file, if any)
    pub fn from_env() -> Result<Self> {
        match dotenvy::dotenv() {
            Ok(path) => debug!("Loaded environment variables from {}", path.display()),
            Err(_) => debug!("No .env file found. Using existing environment variables."),
        }

        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Overlay `AUTH_*` environment variables onto this configuration
    pub fn apply_env(&mut self) -> Result<()> {
        if let Some(id) = env_string("AUTH_PROVIDER_ID") {
            self.username_provider.provider_id = id;
        }
        if let Some(url) = env_string("AUTH_BASE_URL") {
            self.username_provider.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(secs) = env_parse::<u64>("AUTH_HTTP_TIMEOUT_SECS")? {
            self.username_provider.timeout_secs = secs;
        }
        if let Some(path) = env_string("AUTH_STORAGE_PATH") {
            self.storage.path = PathBuf::from(path);
        }
        if let Some(attempts) = env_parse::<usize>("AUTH_RETRY_MAX_ATTEMPTS")? {
            self.retry.max_attempts = attempts;
        }
        if let Some(filter) = env_string("AUTH_LOG") {
            self.log_filter = LogFilter(filter);
        }
        Ok(())
    }

    /// Parse a JSON document; missing sections take their defaults
    pub fn from_json_str(input: &str) -> Result<Self> {
        serde_json::from_str(input).context("Failed to parse auth configuration")
    }

    pub fn validate(&self) -> Result<()> {
        if self.username_provider.provider_id.is_empty() {
            return Err(anyhow!("username_provider.provider_id must not be empty"));
        }
        reqwest::Url::parse(&self.username_provider.base_url).with_context(|| {
            format!(
                "username_provider.base_url '{}' is not a valid URL",
                self.username_provider.base_url
            )
        })?;
        if self.retry.max_attempts == 0 {
            return Err(anyhow!("retry.max_attempts must be at least 1"));
        }
        Ok(())
    }
}

fn env_string(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.is_empty())
}

fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_string(key) {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow!("Invalid value '{}' for {}: {}", raw, key, e)),
        None => Ok(None),
    }
}
