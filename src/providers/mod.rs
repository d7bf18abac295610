//! Upstream provider clients
//!
//! Each provider knows one API's endpoint, auth header shape and parameters. It
//! routes its HTTP calls through the [`RetryExecutor`] and its payload through
//! the matching normalizer.
//!
//! [`RetryExecutor`]: crate::retry::RetryExecutor

pub mod primary;
pub mod secondary;

pub use primary::PrimaryClient;
pub use secondary::SecondaryClient;

use async_trait::async_trait;
use thiserror::Error;

use crate::data::FetchResult;
use crate::http::HttpResponse;
use crate::retry::RetryError;

/// Smallest page size accepted by the providers
pub const MIN_RESULTS: u32 = 5;

/// Largest page size accepted by the providers
pub const MAX_RESULTS: u32 = 100;

/// Longest slice of an upstream error body kept in error messages
const MAX_ERROR_BODY: usize = 200;

/// Errors that can occur when fetching from a single provider
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// The username does not exist upstream
    #[error("user not found: {0}")]
    UserNotFound(String),

    /// No credential is configured for this provider
    #[error("missing credential: {0} is not set")]
    AuthMissing(&'static str),

    /// The provider kept answering 429 after all retries
    #[error("rate limited by upstream")]
    RateLimited,

    /// Any other non-2xx answer, or a 2xx answer that could not be understood
    #[error("upstream error (status {status}): {message}")]
    UpstreamError { status: u16, message: String },

    /// Network-level failure
    #[error("transport error: {0}")]
    TransportError(String),
}

impl ProviderError {
    /// Whether this failure indicates the provider is rate limiting us
    pub fn is_rate_limit(&self) -> bool {
        match self {
            ProviderError::RateLimited => true,
            ProviderError::UpstreamError { status, message } => {
                let message = message.to_lowercase();
                *status == 429
                    || message.contains("rate limit")
                    || message.contains("too many requests")
            }
            _ => false,
        }
    }

    /// Builds an `UpstreamError` from a non-2xx response
    pub(crate) fn from_response(response: &HttpResponse) -> Self {
        ProviderError::UpstreamError {
            status: response.status,
            message: truncate(&response.body, MAX_ERROR_BODY),
        }
    }
}

impl From<RetryError> for ProviderError {
    fn from(err: RetryError) -> Self {
        match err {
            RetryError::RateLimited { .. } => ProviderError::RateLimited,
            RetryError::Transport(e) => ProviderError::TransportError(e.0),
        }
    }
}

/// A source of posts-with-media for a username
#[async_trait]
pub trait MediaProvider: Send + Sync {
    /// Short name used in logs and error messages
    fn name(&self) -> &'static str;

    /// Fetches and normalizes up to `max_results` posts for `username`
    async fn fetch(&self, username: &str, max_results: u32) -> Result<FetchResult, ProviderError>;
}

/// Parses a 2xx JSON body or maps the response to an error
pub(crate) fn parse_json_body(response: &HttpResponse) -> Result<serde_json::Value, ProviderError> {
    if !response.is_success() {
        return Err(ProviderError::from_response(response));
    }
    response.json().map_err(|e| ProviderError::UpstreamError {
        status: response.status,
        message: format!("invalid JSON body: {}", e),
    })
}

/// Longest handle either provider accepts
pub const MAX_HANDLE_LEN: usize = 15;

/// Whether `username` is a well-formed handle: 1 to 15 ASCII letters, digits or `_`
pub fn is_valid_handle(username: &str) -> bool {
    (1..=MAX_HANDLE_LEN).contains(&username.len())
        && username
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

/// Clamps a caller's page size into the range providers accept
pub fn clamp_max_results(max_results: u32) -> u32 {
    max_results.clamp(MIN_RESULTS, MAX_RESULTS)
}

/// Shortens `s` to at most `max` characters
fn truncate(s: &str, max: usize) -> String {
    let trimmed = s.trim();
    match trimmed.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}
