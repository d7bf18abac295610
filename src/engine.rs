//! Aggregation engine
//!
//! Decides, per request, whether cached data can be served or the provider
//! fallback chain has to run, and keeps the cache and rate-limit marker up to
//! date afterwards. Callers only see an error when nothing was ever cached for
//! the username and both providers failed.

use std::fmt;
use std::sync::Arc;

use chrono::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::backup::BackupDispatcher;
use crate::cache::{CachePolicy, CacheService, CacheState};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::data::FetchResult;
use crate::fallback::{CancelFlag, FallbackError, FallbackOrchestrator, Source};
use crate::http::{HttpTransport, ReqwestTransport, TransportError};
use crate::providers::{is_valid_handle, PrimaryClient, SecondaryClient};
use crate::retry::RetryExecutor;

/// Page size used when the caller does not ask for one
pub const DEFAULT_MAX_RESULTS: u32 = 100;

/// Errors surfaced to callers of the engine
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid username: '{0}'")]
    InvalidUsername(String),

    /// Nothing cached for the username and every provider failed
    #[error("no media available for '{username}': {source}")]
    AllSourcesFailed {
        username: String,
        #[source]
        source: FallbackError,
    },
}

/// How a request was answered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServedFrom {
    /// Repeated request inside the per-username cooldown
    Throttled,
    /// Cached data inside the freshness window
    Fresh,
    /// Cached data past the freshness window but inside the stale window
    Stale,
    /// Cached data of any age, served because the primary is rate limited
    RateLimitedCache,
    /// New data from a provider
    Fetched(Source),
    /// Cached data of any age, served because every provider failed
    LastResort,
}

impl fmt::Display for ServedFrom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServedFrom::Throttled => f.write_str("cache (throttled)"),
            ServedFrom::Fresh => f.write_str("cache (fresh)"),
            ServedFrom::Stale => f.write_str("cache (stale)"),
            ServedFrom::RateLimitedCache => f.write_str("cache (rate limited)"),
            ServedFrom::Fetched(source) => write!(f, "{} provider", source),
            ServedFrom::LastResort => f.write_str("cache (last resort)"),
        }
    }
}

/// Data plus where it came from
#[derive(Debug, Clone)]
pub struct FetchReport {
    pub data: Arc<FetchResult>,
    pub served_from: ServedFrom,
}

/// Cached, rate-limit aware front for the provider fallback chain
pub struct AggregationEngine {
    orchestrator: FallbackOrchestrator,
    cache: CacheService,
    backup: Option<BackupDispatcher>,
}

impl AggregationEngine {
    pub fn new(
        orchestrator: FallbackOrchestrator,
        policy: CachePolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            orchestrator,
            cache: CacheService::new(policy, clock),
            backup: None,
        }
    }

    /// Builds an engine talking to the real providers
    pub fn from_config(config: &Config) -> Result<Self, TransportError> {
        let transport: Arc<dyn HttpTransport> =
            Arc::new(ReqwestTransport::with_timeout(config.http_timeout)?);
        let executor = RetryExecutor::new(transport, config.retry);

        let primary = PrimaryClient::new(executor.clone(), config.primary_token.clone())
            .with_base_url(config.primary_base_url.as_str());
        let secondary = SecondaryClient::new(
            executor,
            config.secondary_key.clone(),
            config.secondary_host.as_str(),
        )
        .with_base_url(config.secondary_base_url.as_str());

        let orchestrator = FallbackOrchestrator::new(Arc::new(primary), Arc::new(secondary));
        Ok(Self::new(orchestrator, config.cache, Arc::new(SystemClock)))
    }

    /// Sends every successful fetch to `dispatcher` for backup
    pub fn with_backup(mut self, dispatcher: BackupDispatcher) -> Self {
        self.backup = Some(dispatcher);
        self
    }

    /// Fetches media posts for `username`, serving cached data whenever possible
    ///
    /// # Arguments
    /// * `username` - Account handle, with or without a leading `@`
    /// * `max_results` - Requested page size; providers clamp it to 5..=100
    ///
    /// # Returns
    /// * `Ok(Arc<FetchResult>)` - Fresh, stale or newly fetched data; repeated
    ///   cache hits return the same `Arc`
    /// * `Err(EngineError::InvalidUsername)` - If the handle is empty or malformed
    /// * `Err(EngineError::AllSourcesFailed)` - If nothing is cached and both providers failed
    pub async fn fetch_media(
        &self,
        username: &str,
        max_results: u32,
    ) -> Result<Arc<FetchResult>, EngineError> {
        self.fetch_media_with_cancel(username, max_results, &CancelFlag::new())
            .await
    }

    pub async fn fetch_media_default(
        &self,
        username: &str,
    ) -> Result<Arc<FetchResult>, EngineError> {
        self.fetch_media(username, DEFAULT_MAX_RESULTS).await
    }

    /// Like [`fetch_media`](Self::fetch_media), but stops before the secondary
    /// provider once `cancel` is set
    pub async fn fetch_media_with_cancel(
        &self,
        username: &str,
        max_results: u32,
        cancel: &CancelFlag,
    ) -> Result<Arc<FetchResult>, EngineError> {
        let report = self.fetch_media_detailed(username, max_results, cancel).await?;
        Ok(report.data)
    }

    /// Fetches media posts and reports how the request was answered
    pub async fn fetch_media_detailed(
        &self,
        username: &str,
        max_results: u32,
        cancel: &CancelFlag,
    ) -> Result<FetchReport, EngineError> {
        let username = clean_username(username)?;

        if let Some(report) = self.serve_cached(&username).await {
            return Ok(report);
        }

        // one upstream fetch per username at a time; whoever waited re-checks
        let _gate = self.cache.acquire_gate(&username).await;
        if let Some(report) = self.serve_cached(&username).await {
            debug!(username = %username, "served from cache after waiting for another fetch");
            return Ok(report);
        }

        info!(username = %username, max_results, "fetching from providers");
        let outcome = self
            .orchestrator
            .fetch_with_cancel(&username, max_results, cancel)
            .await;

        let mut state = self.cache.lock().await;
        state.throttle.record(&username);

        match outcome {
            Ok(outcome) => {
                if outcome.source == Source::Primary {
                    state.store.clear_rate_limit();
                } else if outcome.primary_rate_limited {
                    state.store.mark_rate_limited();
                }
                let data = state.store.put(&username, outcome.result);
                drop(state);

                info!(
                    username = %username,
                    source = %outcome.source,
                    posts = data.len(),
                    media = data.media_count(),
                    "fetched media"
                );
                if let Some(backup) = &self.backup {
                    backup.dispatch(Arc::clone(&data));
                }

                Ok(FetchReport {
                    data,
                    served_from: ServedFrom::Fetched(outcome.source),
                })
            }
            Err(err) => {
                if err.primary_rate_limited {
                    state.store.mark_rate_limited();
                }
                match state.store.get(&username) {
                    Some(cached) => {
                        warn!(
                            username = %username,
                            fetched_at = %cached.fetched_at,
                            error = %err,
                            "all providers failed, serving cached data"
                        );
                        Ok(FetchReport {
                            data: cached.data,
                            served_from: ServedFrom::LastResort,
                        })
                    }
                    None => Err(EngineError::AllSourcesFailed {
                        username,
                        source: err,
                    }),
                }
            }
        }
    }

    /// Whether the primary provider is currently considered rate limited
    pub async fn is_rate_limited(&self) -> bool {
        self.cache.lock().await.store.is_rate_limited()
    }

    /// Current freshness window
    pub async fn freshness_window(&self) -> Duration {
        self.cache.lock().await.store.freshness_window()
    }

    /// Stops the backup worker after it drains queued jobs
    pub async fn shutdown(self) {
        if let Some(backup) = self.backup {
            backup.shutdown().await;
        }
    }

    async fn serve_cached(&self, username: &str) -> Option<FetchReport> {
        let mut state = self.cache.lock().await;
        let served_from = cache_decision(&state, username)?;
        if served_from != ServedFrom::Throttled {
            state.throttle.record(username);
        }

        let cached = state.store.get(username)?;
        debug!(username, served_from = %served_from, "cache hit");
        Some(FetchReport {
            data: cached.data,
            served_from,
        })
    }
}

/// Picks the cache tier that can answer, if any
fn cache_decision(state: &CacheState, username: &str) -> Option<ServedFrom> {
    let store = &state.store;
    if !store.has_data(username) {
        return None;
    }

    if state.throttle.within_cooldown(username) {
        Some(ServedFrom::Throttled)
    } else if store.is_fresh(username) {
        Some(ServedFrom::Fresh)
    } else if store.is_stale_but_usable(username) {
        Some(ServedFrom::Stale)
    } else if store.is_rate_limited() {
        Some(ServedFrom::RateLimitedCache)
    } else {
        None
    }
}

/// Trims whitespace and a leading `@`, then checks the handle alphabet
fn clean_username(raw: &str) -> Result<String, EngineError> {
    let trimmed = raw.trim();
    let name = trimmed.strip_prefix('@').unwrap_or(trimmed).trim();
    if !is_valid_handle(name) {
        return Err(EngineError::InvalidUsername(raw.to_string()));
    }
    Ok(name.to_string())
}
