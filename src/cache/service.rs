//! Read-through cache service.
//!
//! `CacheService` ties the entry store, tag registry, event queue and
//! in-flight gates together behind `cached`, the get-or-compute entry point.

use std::any::Any;
use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::config::CacheConfig;
use super::consumer::CacheConsumer;
use super::events::{Epoch, EventQueue};
use super::flight::InFlight;
use super::keys::{CacheKey, Tag};
use super::lock::MutexRecover;
use super::registry::TagRegistry;
use super::store::{CachedValue, EntryStore};
use super::trigger::CacheTrigger;

const METRIC_CACHE_HITS: &str = "folio_cache_hits_total";
const METRIC_CACHE_MISSES: &str = "folio_cache_misses_total";
const METRIC_CACHE_COMPUTE_MS: &str = "folio_cache_compute_ms";
const METRIC_CACHE_STALE_DISCARDS: &str = "folio_cache_stale_discards_total";
const METRIC_CACHE_ENTRIES: &str = "folio_cache_entries";

/// Point-in-time view of the cache, served by the stats endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub enabled: bool,
    pub entries: usize,
    pub tags: usize,
    pub in_flight: usize,
    pub pending_events: usize,
    pub epoch: Epoch,
    pub hits: u64,
    pub misses: u64,
}

pub struct CacheService {
    config: CacheConfig,
    store: Arc<EntryStore>,
    registry: Arc<TagRegistry>,
    queue: Arc<EventQueue>,
    consumer: Arc<CacheConsumer>,
    trigger: CacheTrigger,
    flights: InFlight,
    apply_lock: Arc<Mutex<Epoch>>,
    shut_down: AtomicBool,
    hits: AtomicU64,
    misses: AtomicU64,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl CacheService {
    /// Build the service without background work.
    pub fn new(config: CacheConfig) -> Self {
        let store = Arc::new(EntryStore::new(config.expiry.ttl()));
        let registry = Arc::new(TagRegistry::new());
        let queue = Arc::new(EventQueue::new());
        let apply_lock = Arc::new(Mutex::new(0));
        let consumer = Arc::new(CacheConsumer::new(
            config.clone(),
            Arc::clone(&store),
            Arc::clone(&registry),
            Arc::clone(&queue),
            Arc::clone(&apply_lock),
        ));
        let trigger = CacheTrigger::new(config.enabled, Arc::clone(&queue), Arc::clone(&consumer));

        Self {
            config,
            store,
            registry,
            queue,
            consumer,
            trigger,
            flights: InFlight::new(),
            apply_lock,
            shut_down: AtomicBool::new(false),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            sweeper: Mutex::new(None),
        }
    }

    /// Build the service and start the expiry sweeper when one is needed.
    ///
    /// The sweeper only starts inside a tokio runtime.
    pub fn init(config: CacheConfig) -> Arc<Self> {
        let service = Arc::new(Self::new(config));
        if service.config.needs_sweeper() {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    let task = handle.spawn(sweep(
                        Arc::downgrade(&service),
                        service.config.sweep_interval,
                    ));
                    *service.sweeper.lock_recover("service.init") = Some(task);
                }
                Err(_) => warn!("No tokio runtime; cache sweeper not started"),
            }
        }
        info!(
            enabled = service.config.enabled,
            expiry = ?service.config.expiry,
            dedupe_inflight = service.config.dedupe_inflight,
            "Cache service initialized"
        );
        service
    }

    /// Stop background work and drop every entry.
    ///
    /// Later `cached` calls compute without storing.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(task) = self.sweeper.lock_recover("service.shutdown").take() {
            task.abort();
        }
        let dropped = {
            let _applying = self.apply_lock.lock_recover("service.shutdown");
            self.registry.clear();
            self.store.clear()
        };
        info!(dropped, "Cache service shut down");
    }

    pub fn is_active(&self) -> bool {
        self.config.enabled && !self.shut_down.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Return the value stored under `key`, computing and storing it on a miss.
    ///
    /// Failed computations are returned as-is and not stored. A value
    /// computed while an invalidation covering `key` or one of `tags` was
    /// published is returned but not stored.
    pub async fn cached<T, E, F, Fut>(
        &self,
        key: &CacheKey,
        tags: &[Tag],
        compute: F,
    ) -> Result<Arc<T>, E>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.is_active() {
            return compute().await.map(Arc::new);
        }

        if let Some(value) = self.lookup::<T>(key) {
            self.record_hit(key);
            return Ok(value);
        }

        let _flight = if self.config.dedupe_inflight {
            let guard = self.flights.acquire(key).await;
            if let Some(value) = self.lookup::<T>(key) {
                debug!(key = %key, "Cache hit after waiting for in-flight computation");
                self.record_hit(key);
                return Ok(value);
            }
            Some(guard)
        } else {
            None
        };

        self.misses.fetch_add(1, Ordering::Relaxed);
        counter!(METRIC_CACHE_MISSES).increment(1);

        let started_epoch = self.queue.current_epoch();
        let started_at = Instant::now();
        let value = Arc::new(compute().await?);
        histogram!(METRIC_CACHE_COMPUTE_MS).record(started_at.elapsed().as_secs_f64() * 1000.0);

        let erased: CachedValue = Arc::clone(&value) as CachedValue;
        self.store_if_current(key, tags, erased, started_epoch);
        Ok(value)
    }

    fn lookup<T: Any + Send + Sync>(&self, key: &CacheKey) -> Option<Arc<T>> {
        let value = self.store.get(key)?;
        match value.downcast::<T>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(
                    key = %key,
                    expected = std::any::type_name::<T>(),
                    "Cached value has unexpected type; recomputing"
                );
                None
            }
        }
    }

    fn store_if_current(&self, key: &CacheKey, tags: &[Tag], value: CachedValue, started: Epoch) {
        let _applying = self.apply_lock.lock_recover("service.store");
        if self.shut_down.load(Ordering::SeqCst) {
            return;
        }
        if self.queue.invalidated_since(key, tags, started) {
            debug!(key = %key, "Invalidation during computation; result not stored");
            counter!(METRIC_CACHE_STALE_DISCARDS).increment(1);
            return;
        }
        self.registry
            .register(key.clone(), tags.iter().cloned().collect::<HashSet<_>>());
        self.store.insert(key.clone(), value);
        gauge!(METRIC_CACHE_ENTRIES).set(self.store.len() as f64);
    }

    fn record_hit(&self, key: &CacheKey) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        counter!(METRIC_CACHE_HITS).increment(1);
        debug!(key = %key, "Cache hit");
    }

    /// Invalidate every entry tagged `tag`; returns the number evicted.
    pub fn invalidate_tag(&self, tag: &Tag) -> usize {
        self.trigger.tag(tag)
    }

    pub fn invalidate_tags(&self, tags: &[Tag]) -> usize {
        self.trigger.tags(tags)
    }

    pub fn invalidate_key(&self, key: &CacheKey) -> usize {
        self.trigger.key(key)
    }

    pub fn invalidate_all(&self) -> usize {
        self.trigger.all()
    }

    /// Apply any pending invalidation events.
    pub fn consume(&self) -> usize {
        self.consumer.consume_all().evicted
    }

    /// Drop expired entries from the store and the registry.
    pub fn purge_expired(&self) -> usize {
        let _applying = self.apply_lock.lock_recover("service.purge");
        let expired = self.store.purge_expired();
        for key in &expired {
            self.registry.unregister(key);
        }
        if !expired.is_empty() {
            gauge!(METRIC_CACHE_ENTRIES).set(self.store.len() as f64);
        }
        expired.len()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            enabled: self.is_active(),
            entries: self.store.len(),
            tags: self.registry.tag_count(),
            in_flight: self.flights.len(),
            pending_events: self.queue.len(),
            epoch: self.queue.current_epoch(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

impl Drop for CacheService {
    fn drop(&mut self) {
        if let Some(task) = self.sweeper.lock_recover("service.drop").take() {
            task.abort();
        }
    }
}

async fn sweep(service: Weak<CacheService>, period: std::time::Duration) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    interval.tick().await;

    loop {
        interval.tick().await;
        let Some(service) = service.upgrade() else {
            break;
        };
        let purged = service.purge_expired();
        let evicted = service.consume();
        if purged > 0 || evicted > 0 {
            debug!(purged, evicted, "Cache sweep complete");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use super::*;

    fn counting(calls: &AtomicUsize, value: u32) -> impl Future<Output = Result<u32, Infallible>> {
        calls.fetch_add(1, Ordering::SeqCst);
        async move { Ok(value) }
    }

    #[tokio::test]
    async fn second_call_hits_cache() {
        let cache = CacheService::new(CacheConfig::tag_only());
        let calls = AtomicUsize::new(0);
        let key = CacheKey::pages();

        let first = cache
            .cached(&key, &[Tag::cms_data()], || counting(&calls, 1))
            .await
            .unwrap();
        let second = cache
            .cached(&key, &[Tag::cms_data()], || counting(&calls, 2))
            .await
            .unwrap();

        assert_eq!((*first, *second), (1, 1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().misses, 1);
    }

    #[tokio::test]
    async fn tag_invalidation_forces_recompute() {
        let cache = CacheService::new(CacheConfig::tag_only());
        let calls = AtomicUsize::new(0);
        let key = CacheKey::pages();

        cache.cached(&key, &[Tag::cms_data()], || counting(&calls, 1)).await.unwrap();
        assert_eq!(cache.invalidate_tag(&Tag::cms_data()), 1);
        let value = cache
            .cached(&key, &[Tag::cms_data()], || counting(&calls, 2))
            .await
            .unwrap();

        assert_eq!(*value, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failures_are_not_stored() {
        let cache = CacheService::new(CacheConfig::tag_only());
        let key = CacheKey::pages();

        let failed: Result<Arc<u32>, &str> = cache.cached(&key, &[], || async { Err("down") }).await;
        assert_eq!(failed.unwrap_err(), "down");
        assert_eq!(cache.stats().entries, 0);

        let ok: Result<Arc<u32>, &str> = cache.cached(&key, &[], || async { Ok(5) }).await;
        assert_eq!(*ok.unwrap(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn time_bounded_entries_expire() {
        let cache = CacheService::new(CacheConfig::time_bounded(Duration::from_secs(300)));
        let calls = AtomicUsize::new(0);
        let key = CacheKey::blog_posts();

        cache.cached(&key, &[], || counting(&calls, 1)).await.unwrap();
        tokio::time::advance(Duration::from_secs(299)).await;
        cache.cached(&key, &[], || counting(&calls, 1)).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(2)).await;
        cache.cached(&key, &[], || counting(&calls, 1)).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_purges_expired_entries() {
        let config = CacheConfig {
            sweep_interval: Duration::from_secs(10),
            ..CacheConfig::time_bounded(Duration::from_secs(30))
        };
        let cache = CacheService::init(config);
        cache
            .cached(&CacheKey::pages(), &[Tag::cms_data()], || async {
                Ok::<_, Infallible>(1u8)
            })
            .await
            .unwrap();
        assert_eq!(cache.stats().entries, 1);

        tokio::time::sleep(Duration::from_secs(45)).await;
        assert_eq!(cache.stats().entries, 0);
        assert_eq!(cache.stats().tags, 0);
        cache.shutdown();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_misses_compute_once() {
        let cache = Arc::new(CacheService::new(CacheConfig::tag_only()));
        let calls = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let calls = Arc::clone(&calls);
                tokio::spawn(async move {
                    cache
                        .cached(&CacheKey::pages(), &[], || async {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            Ok::<_, Infallible>(7u32)
                        })
                        .await
                        .map(|v| *v)
                })
            })
            .collect();

        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap(), 7);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats().in_flight, 0);
    }

    #[tokio::test]
    async fn computation_straddling_invalidation_is_not_stored() {
        let cache = CacheService::new(CacheConfig::tag_only());
        let key = CacheKey::pages();

        let value = cache
            .cached(&key, &[Tag::cms_data()], || async {
                cache.invalidate_tag(&Tag::cms_data());
                Ok::<_, Infallible>(1u8)
            })
            .await
            .unwrap();

        assert_eq!(*value, 1);
        assert_eq!(cache.stats().entries, 0);
    }

    #[tokio::test]
    async fn unrelated_invalidation_during_computation_keeps_result() {
        let cache = CacheService::new(CacheConfig::tag_only());
        let key = CacheKey::pages();

        cache
            .cached(&key, &[Tag::cms_data()], || async {
                cache.invalidate_tag(&Tag::page_content("other"));
                cache.invalidate_key(&CacheKey::blog_posts());
                Ok::<_, Infallible>(1u8)
            })
            .await
            .unwrap();

        assert_eq!(cache.stats().entries, 1);
    }

    #[tokio::test]
    async fn shutdown_drops_entries_and_bypasses_cache() {
        let cache = CacheService::init(CacheConfig::tag_only());
        let calls = AtomicUsize::new(0);
        let key = CacheKey::pages();

        cache.cached(&key, &[], || counting(&calls, 1)).await.unwrap();
        cache.shutdown();
        assert_eq!(cache.stats().entries, 0);

        cache.cached(&key, &[], || counting(&calls, 1)).await.unwrap();
        cache.cached(&key, &[], || counting(&calls, 1)).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(!cache.stats().enabled);
    }

    #[tokio::test]
    async fn disabled_cache_always_computes() {
        let config = CacheConfig {
            enabled: false,
            ..CacheConfig::default()
        };
        let cache = CacheService::new(config);
        let calls = AtomicUsize::new(0);

        cache.cached(&CacheKey::pages(), &[], || counting(&calls, 1)).await.unwrap();
        cache.cached(&CacheKey::pages(), &[], || counting(&calls, 1)).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
