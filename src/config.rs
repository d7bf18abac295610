//! Runtime configuration
//!
//! Credentials and endpoints come from environment variables. Cache and retry
//! tuning use the defaults in [`CachePolicy`] and [`RetryPolicy`].

use std::time::Duration;

use thiserror::Error;

use crate::cache::CachePolicy;
use crate::providers::primary::{PRIMARY_BASE_URL, PRIMARY_TOKEN_VAR};
use crate::providers::secondary::{SECONDARY_API_HOST, SECONDARY_KEY_VAR};
use crate::retry::RetryPolicy;

/// Environment variable for the secondary API host
pub const SECONDARY_HOST_VAR: &str = "SECONDARY_API_HOST";

/// Environment variable overriding the primary base URL
pub const PRIMARY_URL_VAR: &str = "PRIMARY_BASE_URL";

/// Environment variable overriding the secondary base URL
pub const SECONDARY_URL_VAR: &str = "SECONDARY_BASE_URL";

/// Environment variable for the HTTP client timeout in seconds
pub const TIMEOUT_VAR: &str = "HTTP_TIMEOUT_SECS";

/// Default HTTP client timeout
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Error types for configuration loading
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} must be a whole number of seconds, got '{value}'")]
    InvalidNumber { var: &'static str, value: String },
}

/// Everything needed to build an engine
#[derive(Debug, Clone)]
pub struct Config {
    pub primary_token: Option<String>,
    pub secondary_key: Option<String>,
    pub secondary_host: String,
    pub primary_base_url: String,
    pub secondary_base_url: String,
    pub http_timeout: Duration,
    pub cache: CachePolicy,
    pub retry: RetryPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            primary_token: None,
            secondary_key: None,
            secondary_host: SECONDARY_API_HOST.to_string(),
            primary_base_url: PRIMARY_BASE_URL.to_string(),
            secondary_base_url: format!("https://{}", SECONDARY_API_HOST),
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            cache: CachePolicy::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl Config {
    /// Reads configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads configuration through `lookup`; blank values count as unset
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let secondary_host =
            get(SECONDARY_HOST_VAR).unwrap_or_else(|| SECONDARY_API_HOST.to_string());
        let secondary_base_url =
            get(SECONDARY_URL_VAR).unwrap_or_else(|| format!("https://{}", secondary_host));

        let http_timeout = match get(TIMEOUT_VAR) {
            Some(value) => {
                let secs = value.parse::<u64>().map_err(|_| ConfigError::InvalidNumber {
                    var: TIMEOUT_VAR,
                    value: value.clone(),
                })?;
                Duration::from_secs(secs)
            }
            None => DEFAULT_HTTP_TIMEOUT,
        };

        Ok(Self {
            primary_token: get(PRIMARY_TOKEN_VAR),
            secondary_key: get(SECONDARY_KEY_VAR),
            primary_base_url: get(PRIMARY_URL_VAR).unwrap_or_else(|| PRIMARY_BASE_URL.to_string()),
            secondary_host,
            secondary_base_url,
            http_timeout,
            ..Self::default()
        })
    }
}
