//! Primary provider client
//!
//! Talks to the official v2-style API: the username is first resolved to an
//! internal user id, then that id's timeline is fetched with media expansions.

use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use super::{clamp_max_results, is_valid_handle, parse_json_body, MediaProvider, ProviderError};
use crate::data::FetchResult;
use crate::http::HttpRequest;
use crate::normalize::normalize_primary;
use crate::retry::RetryExecutor;

/// Default base URL for the primary API
pub const PRIMARY_BASE_URL: &str = "https://api.twitter.com/2";

/// Environment variable holding the bearer token
pub const PRIMARY_TOKEN_VAR: &str = "PRIMARY_BEARER_TOKEN";

const EXPANSIONS: &str = "attachments.media_keys";
const TWEET_FIELDS: &str = "created_at,attachments";
const MEDIA_FIELDS: &str = "media_key,type,url,preview_image_url,variants";

/// Response from the user lookup endpoint
#[derive(Debug, Default, Deserialize)]
struct UserLookup {
    data: Option<UserData>,
    #[serde(default)]
    errors: Vec<ApiError>,
}

#[derive(Debug, Deserialize)]
struct UserData {
    id: String,
}

/// One entry of an `errors` array
#[derive(Debug, Default, Deserialize)]
struct ApiError {
    #[serde(default)]
    title: String,
    #[serde(default, rename = "type")]
    kind: String,
    #[serde(default)]
    detail: String,
}

impl ApiError {
    fn is_not_found(&self) -> bool {
        let title = self.title.to_lowercase();
        let kind = self.kind.to_lowercase();
        title.contains("not found") || kind.contains("resource-not-found")
    }
}

/// Client for the primary (authoritative) provider
#[derive(Clone)]
pub struct PrimaryClient {
    executor: RetryExecutor,
    bearer_token: Option<String>,
    base_url: String,
}

impl PrimaryClient {
    pub fn new(executor: RetryExecutor, bearer_token: Option<String>) -> Self {
        Self {
            executor,
            bearer_token,
            base_url: PRIMARY_BASE_URL.to_string(),
        }
    }

    /// Overrides the base URL
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn token(&self) -> Result<&str, ProviderError> {
        self.bearer_token
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or(ProviderError::AuthMissing(PRIMARY_TOKEN_VAR))
    }

    /// Joins `segments` onto the base URL, percent-encoding each one
    fn endpoint(&self, segments: &[&str]) -> Result<String, ProviderError> {
        let invalid =
            || ProviderError::TransportError(format!("invalid base URL: {}", self.base_url));

        let mut url = Url::parse(&self.base_url).map_err(|_| invalid())?;
        url.path_segments_mut()
            .map_err(|_| invalid())?
            .pop_if_empty()
            .extend(segments);
        Ok(url.into())
    }

    fn authorized(&self, request: HttpRequest, token: &str) -> HttpRequest {
        request.header("Authorization", format!("Bearer {}", token))
    }

    /// Resolves a username to the provider's internal user id
    async fn resolve_user_id(&self, username: &str, token: &str) -> Result<String, ProviderError> {
        let request = self.authorized(
            HttpRequest::get(self.endpoint(&["users", "by", "username", username])?),
            token,
        );
        let response = self.executor.execute(&request).await?;

        if response.status == 404 {
            return Err(ProviderError::UserNotFound(username.to_string()));
        }
        if !response.is_success() {
            return Err(ProviderError::from_response(&response));
        }

        let lookup: UserLookup = serde_json::from_str(&response.body).unwrap_or_default();
        if let Some(user) = lookup.data {
            return Ok(user.id);
        }

        if lookup.errors.iter().any(ApiError::is_not_found) {
            return Err(ProviderError::UserNotFound(username.to_string()));
        }

        let detail = lookup
            .errors
            .first()
            .map(|e| e.detail.clone())
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| "user lookup returned no id".to_string());
        Err(ProviderError::UpstreamError {
            status: response.status,
            message: detail,
        })
    }

    /// Fetches the raw timeline payload for a user id
    async fn fetch_timeline(
        &self,
        user_id: &str,
        max_results: u32,
        token: &str,
    ) -> Result<Value, ProviderError> {
        let request = self.authorized(
            HttpRequest::get(self.endpoint(&["users", user_id, "tweets"])?)
                .query("max_results", clamp_max_results(max_results).to_string())
                .query("expansions", EXPANSIONS)
                .query("tweet.fields", TWEET_FIELDS)
                .query("media.fields", MEDIA_FIELDS),
            token,
        );
        let response = self.executor.execute(&request).await?;
        parse_json_body(&response)
    }
}

#[async_trait]
impl MediaProvider for PrimaryClient {
    fn name(&self) -> &'static str {
        "primary"
    }

    async fn fetch(&self, username: &str, max_results: u32) -> Result<FetchResult, ProviderError> {
        // anything else could not name an account and would reshape the request path
        if !is_valid_handle(username) {
            return Err(ProviderError::UserNotFound(username.to_string()));
        }
        let token = self.token()?;

        let user_id = self.resolve_user_id(username, token).await?;
        debug!(username, user_id = %user_id, "resolved primary user id");

        let raw = self.fetch_timeline(&user_id, max_results, token).await?;
        let result = normalize_primary(&raw, username);

        info!(username, posts = result.len(), "fetched from primary provider");
        Ok(result)
    }
}
