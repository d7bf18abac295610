//! Cache module for fetch results and request throttling
//!
//! [`CacheService`] owns the per-username [`CacheStore`] and the
//! [`RequestThrottle`] behind a single async lock, plus a set of per-username
//! fetch gates. The state lock is only held for short decide/write sections;
//! a gate is held across the upstream fetch so concurrent requests for the
//! same username queue up behind one fetch instead of duplicating it.

mod store;
mod throttle;

pub use store::{
    CachePolicy, CacheStore, CachedData, FRESH_TTL_HOURS, RATE_LIMITED_TTL_HOURS,
    RATE_LIMIT_COOLDOWN_MINUTES, STALE_TTL_HOURS, THROTTLE_COOLDOWN_MINUTES,
};
pub use throttle::RequestThrottle;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, MutexGuard, OwnedMutexGuard};

use crate::clock::Clock;

/// Everything guarded by the state lock
pub struct CacheState {
    pub store: CacheStore,
    pub throttle: RequestThrottle,
}

type GateMap = HashMap<String, Arc<AsyncMutex<()>>>;

/// Process-wide cache and throttle, constructed once and shared
pub struct CacheService {
    state: AsyncMutex<CacheState>,
    gates: Arc<Mutex<GateMap>>,
}

impl CacheService {
    pub fn new(policy: CachePolicy, clock: Arc<dyn Clock>) -> Self {
        let store = CacheStore::new(policy, Arc::clone(&clock));
        let throttle =
            RequestThrottle::new(policy.throttle_cooldown, policy.throttle_capacity, clock);

        Self {
            state: AsyncMutex::new(CacheState { store, throttle }),
            gates: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Locks the cache state; do not hold the guard across upstream I/O
    pub async fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().await
    }

    /// Waits for exclusive fetch rights for `username`
    pub async fn acquire_gate(&self, username: &str) -> FetchGate {
        let key = CacheStore::cache_key(username);
        let gate = {
            let mut gates = self.gates.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(gates.entry(key.clone()).or_default())
        };

        let guard = gate.lock_owned().await;
        FetchGate {
            key,
            guard: Some(guard),
            gates: Arc::clone(&self.gates),
        }
    }

    /// Number of usernames with a live gate
    pub fn active_gates(&self) -> usize {
        self.gates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Exclusive fetch rights for one username; released on drop
pub struct FetchGate {
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
    gates: Arc<Mutex<GateMap>>,
}

impl Drop for FetchGate {
    fn drop(&mut self) {
        // release the gate before deciding whether anyone else still wants it
        self.guard.take();

        let mut gates = self.gates.lock().unwrap_or_else(PoisonError::into_inner);
        let unused = gates
            .get(&self.key)
            .is_some_and(|gate| Arc::strong_count(gate) == 1);
        if unused {
            gates.remove(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::time::Duration;

    fn service() -> Arc<CacheService> {
        Arc::new(CacheService::new(
            CachePolicy::default(),
            Arc::new(ManualClock::default()),
        ))
    }

    #[tokio::test]
    async fn test_gate_is_pruned_after_use() {
        let service = service();
        {
            let _gate = service.acquire_gate("alice").await;
            assert_eq!(service.active_gates(), 1);
        }
        assert_eq!(service.active_gates(), 0);
    }

    #[tokio::test]
    async fn test_gate_serializes_same_username() {
        let service = service();
        let first = service.acquire_gate("Alice").await;

        let waiter = {
            let service = Arc::clone(&service);
            tokio::spawn(async move {
                let _gate = service.acquire_gate("alice").await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished(), "second request waits behind the first");

        drop(first);
        waiter.await.unwrap();
        assert_eq!(service.active_gates(), 0);
    }

    #[tokio::test]
    async fn test_gates_for_different_usernames_are_independent() {
        let service = service();
        let _alice = service.acquire_gate("alice").await;
        let _bob = service.acquire_gate("bob").await;
        assert_eq!(service.active_gates(), 2);
    }

    #[tokio::test]
    async fn test_state_lock_shares_store_and_throttle() {
        let service = service();
        {
            let mut state = service.lock().await;
            state.throttle.record("alice");
            state.store.mark_rate_limited();
        }

        let state = service.lock().await;
        assert!(state.throttle.within_cooldown("alice"));
        assert!(state.store.is_rate_limited());
    }
}
