//! Per-username request cooldown
//!
//! Suppresses repeated upstream work caused by callers asking for the same
//! username in quick succession. The map is bounded: once full, entries past
//! their cooldown are dropped first, then the least recently seen.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::clock::Clock;

/// Tracks when each username was last requested
pub struct RequestThrottle {
    last_request: HashMap<String, DateTime<Utc>>,
    cooldown: Duration,
    capacity: usize,
    clock: Arc<dyn Clock>,
}

impl RequestThrottle {
    pub fn new(cooldown: Duration, capacity: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            last_request: HashMap::new(),
            cooldown,
            capacity: capacity.max(1),
            clock,
        }
    }

    fn key(username: &str) -> String {
        username.trim().to_lowercase()
    }

    /// Whether `username` was recorded within the cooldown period
    pub fn within_cooldown(&self, username: &str) -> bool {
        let now = self.clock.now();
        self.last_request
            .get(&Self::key(username))
            .is_some_and(|last| now - *last < self.cooldown)
    }

    /// Records a request for `username` at the current time
    pub fn record(&mut self, username: &str) {
        let key = Self::key(username);
        if !self.last_request.contains_key(&key) && self.last_request.len() >= self.capacity {
            self.evict();
        }
        self.last_request.insert(key, self.clock.now());
    }

    pub fn len(&self) -> usize {
        self.last_request.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_request.is_empty()
    }

    /// Makes room for one new entry
    fn evict(&mut self) {
        let now = self.clock.now();
        let cooldown = self.cooldown;
        self.last_request.retain(|_, last| now - *last < cooldown);

        if self.last_request.len() >= self.capacity {
            let oldest = self
                .last_request
                .iter()
                .min_by_key(|(_, last)| **last)
                .map(|(key, _)| key.clone());
            if let Some(key) = oldest {
                self.last_request.remove(&key);
            }
        }
    }
}
