//! Per-key in-flight gates.
//!
//! Concurrent misses on one key queue behind a single async mutex so only
//! the first caller computes; the rest re-check the store once it is free.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::keys::CacheKey;

#[derive(Default)]
pub struct InFlight {
    gates: DashMap<CacheKey, Arc<Mutex<()>>>,
}

/// Held while a computation for `key` runs.
pub struct FlightGuard<'a> {
    owner: &'a InFlight,
    key: CacheKey,
    gate: Arc<Mutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`.
    pub async fn acquire(&self, key: &CacheKey) -> FlightGuard<'_> {
        let gate = Arc::clone(self.gates.entry(key.clone()).or_default().value());
        let guard = Arc::clone(&gate).lock_owned().await;
        FlightGuard {
            owner: self,
            key: key.clone(),
            gate,
            guard: Some(guard),
        }
    }

    /// Number of keys with a computation running or queued.
    pub fn len(&self) -> usize {
        self.gates.len()
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        // The map and this guard hold the only references when nobody waits.
        self.owner
            .gates
            .remove_if(&self.key, |_, gate| {
                Arc::ptr_eq(gate, &self.gate) && Arc::strong_count(gate) <= 2
            });
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn gate_is_removed_after_last_holder() {
        let flights = InFlight::new();
        let key = CacheKey::pages();
        {
            let _guard = flights.acquire(&key).await;
            assert_eq!(flights.len(), 1);
        }
        assert_eq!(flights.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn second_caller_waits_for_first() {
        let flights = Arc::new(InFlight::new());
        let key = CacheKey::pages();

        let guard = flights.acquire(&key).await;
        let waiter = {
            let flights = Arc::clone(&flights);
            let key = key.clone();
            tokio::spawn(async move {
                let _guard = flights.acquire(&key).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        waiter.await.expect("waiter completes");
        assert_eq!(flights.len(), 0);
    }

    #[tokio::test]
    async fn different_keys_do_not_block() {
        let flights = InFlight::new();
        let _a = flights.acquire(&CacheKey::pages()).await;
        let _b = flights.acquire(&CacheKey::blog_posts()).await;
        assert_eq!(flights.len(), 2);
    }
}
