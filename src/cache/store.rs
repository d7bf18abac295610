//! In-memory cache of fetch results with a rate-limit aware freshness policy
//!
//! Entries are keyed by lowercase username. A single process-wide
//! rate-limit marker records when the primary provider last pushed back;
//! while it is active, the freshness window stretches so fewer requests reach
//! upstream.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::clock::Clock;
use crate::data::FetchResult;

/// Normal freshness window in hours
pub const FRESH_TTL_HOURS: i64 = 3;

/// Freshness window while rate limited, in hours
pub const RATE_LIMITED_TTL_HOURS: i64 = 6;

/// Outer window in which stale data is still served instead of calling upstream
pub const STALE_TTL_HOURS: i64 = 12;

/// How long a rate-limit signal from the primary provider is honored
pub const RATE_LIMIT_COOLDOWN_MINUTES: i64 = 15;

/// Per-username request cooldown
pub const THROTTLE_COOLDOWN_MINUTES: i64 = 5;

/// Cache and throttle tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    /// Normal freshness window
    pub fresh_ttl: Duration,
    /// Freshness window while rate limited
    pub rate_limited_ttl: Duration,
    /// Stale-but-usable window
    pub stale_ttl: Duration,
    /// Rate-limit marker lifetime
    pub rate_limit_cooldown: Duration,
    /// Per-username request cooldown
    pub throttle_cooldown: Duration,
    /// Maximum number of usernames tracked by the throttle
    pub throttle_capacity: usize,
    /// Maximum number of cached usernames
    pub max_entries: usize,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            fresh_ttl: Duration::hours(FRESH_TTL_HOURS),
            rate_limited_ttl: Duration::hours(RATE_LIMITED_TTL_HOURS),
            stale_ttl: Duration::hours(STALE_TTL_HOURS),
            rate_limit_cooldown: Duration::minutes(RATE_LIMIT_COOLDOWN_MINUTES),
            throttle_cooldown: Duration::minutes(THROTTLE_COOLDOWN_MINUTES),
            throttle_capacity: 1024,
            max_entries: 256,
        }
    }
}

/// Cached result for one username
#[derive(Debug, Clone)]
struct CacheEntry {
    data: Arc<FetchResult>,
    fetched_at: DateTime<Utc>,
}

/// Result of reading from the cache, including freshness metadata
#[derive(Debug, Clone)]
pub struct CachedData {
    /// The cached data
    pub data: Arc<FetchResult>,
    /// When the data was fetched from upstream
    pub fetched_at: DateTime<Utc>,
    /// Whether the entry is outside the current freshness window
    pub is_expired: bool,
}

/// Per-username result cache plus the global rate-limit marker
pub struct CacheStore {
    entries: HashMap<String, CacheEntry>,
    rate_limited_until: Option<DateTime<Utc>>,
    policy: CachePolicy,
    clock: Arc<dyn Clock>,
}

impl CacheStore {
    pub fn new(policy: CachePolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: HashMap::new(),
            rate_limited_until: None,
            policy,
            clock,
        }
    }

    /// Returns the cache key for a username
    pub fn cache_key(username: &str) -> String {
        username.trim().to_lowercase()
    }

    /// Whether the primary provider is currently considered rate limited
    pub fn is_rate_limited(&self) -> bool {
        self.rate_limited_until
            .is_some_and(|until| self.clock.now() < until)
    }

    pub fn rate_limited_until(&self) -> Option<DateTime<Utc>> {
        self.rate_limited_until
    }

    /// Starts (or restarts) the rate-limit cooldown from now
    pub fn mark_rate_limited(&mut self) {
        self.rate_limited_until = Some(self.clock.now() + self.policy.rate_limit_cooldown);
    }

    pub fn clear_rate_limit(&mut self) {
        self.rate_limited_until = None;
    }

    /// Current freshness window; longer while rate limited
    pub fn freshness_window(&self) -> Duration {
        if self.is_rate_limited() {
            self.policy.rate_limited_ttl
        } else {
            self.policy.fresh_ttl
        }
    }

    /// Whether cached data for `username` is within the freshness window
    pub fn is_fresh(&self, username: &str) -> bool {
        self.age(username)
            .is_some_and(|age| age < self.freshness_window())
    }

    /// Whether cached data for `username` is within the stale-but-usable window
    pub fn is_stale_but_usable(&self, username: &str) -> bool {
        self.age(username)
            .is_some_and(|age| age < self.policy.stale_ttl)
    }

    /// Whether any data is cached for `username`, regardless of age
    pub fn has_data(&self, username: &str) -> bool {
        self.entries.contains_key(&Self::cache_key(username))
    }

    /// Age of the cached entry for `username`
    pub fn age(&self, username: &str) -> Option<Duration> {
        let entry = self.entries.get(&Self::cache_key(username))?;
        Some(self.clock.now() - entry.fetched_at)
    }

    /// Reads the cached entry for `username`, whatever its age
    pub fn get(&self, username: &str) -> Option<CachedData> {
        let entry = self.entries.get(&Self::cache_key(username))?;
        let is_expired = self.clock.now() - entry.fetched_at >= self.freshness_window();

        Some(CachedData {
            data: Arc::clone(&entry.data),
            fetched_at: entry.fetched_at,
            is_expired,
        })
    }

    /// Replaces the entry for `username` with a freshly fetched result
    pub fn put(&mut self, username: &str, result: FetchResult) -> Arc<FetchResult> {
        let data = Arc::new(result);
        let key = Self::cache_key(username);

        let full = self.entries.len() >= self.policy.max_entries.max(1);
        if full && !self.entries.contains_key(&key) {
            self.evict_oldest();
        }

        self.entries.insert(
            key,
            CacheEntry {
                data: Arc::clone(&data),
                fetched_at: self.clock.now(),
            },
        );
        data
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.fetched_at)
            .map(|(key, _)| key.clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }
}
