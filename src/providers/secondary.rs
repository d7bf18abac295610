//! Secondary provider client
//!
//! A marketplace-hosted scraper API with a single media endpoint. Used only when
//! the primary provider is unavailable; its payload shape varies, see
//! [`normalize_secondary`].

use async_trait::async_trait;
use tracing::info;

use super::{clamp_max_results, parse_json_body, MediaProvider, ProviderError};
use crate::data::FetchResult;
use crate::http::HttpRequest;
use crate::normalize::normalize_secondary;
use crate::retry::RetryExecutor;

/// Default API host, also sent as the host header
pub const SECONDARY_API_HOST: &str = "twitter-api45.p.rapidapi.com";

/// Environment variable holding the API key
pub const SECONDARY_KEY_VAR: &str = "SECONDARY_API_KEY";

const MEDIA_ENDPOINT: &str = "/usermedia.php";

/// Client for the secondary (fallback) provider
#[derive(Clone)]
pub struct SecondaryClient {
    executor: RetryExecutor,
    api_key: Option<String>,
    api_host: String,
    base_url: String,
}

impl SecondaryClient {
    /// Creates a client for `api_host`, reached over HTTPS at the same host
    pub fn new(
        executor: RetryExecutor,
        api_key: Option<String>,
        api_host: impl Into<String>,
    ) -> Self {
        let api_host = api_host.into();
        Self {
            executor,
            api_key,
            base_url: format!("https://{}", api_host),
            api_host,
        }
    }

    /// Overrides the base URL while keeping the host header
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn api_key(&self) -> Result<&str, ProviderError> {
        self.api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or(ProviderError::AuthMissing(SECONDARY_KEY_VAR))
    }
}

#[async_trait]
impl MediaProvider for SecondaryClient {
    fn name(&self) -> &'static str {
        "secondary"
    }

    async fn fetch(&self, username: &str, max_results: u32) -> Result<FetchResult, ProviderError> {
        let api_key = self.api_key()?;

        let request = HttpRequest::get(format!("{}{}", self.base_url, MEDIA_ENDPOINT))
            .query("screenname", username)
            .query("count", clamp_max_results(max_results).to_string())
            .header("X-RapidAPI-Key", api_key)
            .header("X-RapidAPI-Host", self.api_host.as_str());

        let response = self.executor.execute(&request).await?;
        let raw = parse_json_body(&response)?;
        let result = normalize_secondary(&raw, username);

        info!(username, posts = result.len(), "fetched from secondary provider");
        Ok(result)
    }
}
