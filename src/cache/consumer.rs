//! Cache consumer for applying invalidation plans.
//!
//! Drains events from the queue, merges them into a plan and evicts the
//! affected entries from the store and the tag registry.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::config::CacheConfig;
use super::events::{Epoch, EventQueue};
use super::keys::CacheKey;
use super::lock::MutexRecover;
use super::planner::InvalidationPlan;
use super::registry::TagRegistry;
use super::store::EntryStore;

const METRIC_CACHE_CONSUME_MS: &str = "folio_cache_consume_ms";
const METRIC_CACHE_EVICTIONS: &str = "folio_cache_evictions_total";
const METRIC_CACHE_ENTRIES: &str = "folio_cache_entries";

/// Outcome of one consumption batch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ConsumeOutcome {
    pub events: usize,
    pub evicted: usize,
}

pub struct CacheConsumer {
    config: CacheConfig,
    store: Arc<EntryStore>,
    registry: Arc<TagRegistry>,
    queue: Arc<EventQueue>,
    /// Serializes plan application against conditional inserts.
    apply_lock: Arc<Mutex<Epoch>>,
}

impl CacheConsumer {
    pub fn new(
        config: CacheConfig,
        store: Arc<EntryStore>,
        registry: Arc<TagRegistry>,
        queue: Arc<EventQueue>,
        apply_lock: Arc<Mutex<Epoch>>,
    ) -> Self {
        Self {
            config,
            store,
            registry,
            queue,
            apply_lock,
        }
    }

    /// Consume every pending event, batch by batch.
    pub fn consume_all(&self) -> ConsumeOutcome {
        let mut total = ConsumeOutcome::default();
        loop {
            let outcome = self.consume();
            if outcome.events == 0 {
                return total;
            }
            total.events += outcome.events;
            total.evicted += outcome.evicted;
        }
    }

    /// Consume one batch of pending events.
    #[instrument(skip(self))]
    pub fn consume(&self) -> ConsumeOutcome {
        let started_at = Instant::now();
        let mut applied = self.apply_lock.lock_recover("consumer.consume");

        let events = self.queue.drain(self.config.consume_batch_limit.max(1));
        if events.is_empty() {
            return ConsumeOutcome::default();
        }

        let event_count = events.len();
        let event_ids: Vec<Uuid> = events.iter().map(|e| e.id).collect();
        let plan = InvalidationPlan::from_events(events);

        info!(
            event_count,
            event_ids = ?event_ids,
            plan = %plan,
            "Cache consumption starting"
        );

        let evicted = self.apply(&plan);
        *applied = (*applied).max(plan.max_epoch);
        drop(applied);

        info!(event_count, evicted, "Cache consumption complete");
        counter!(METRIC_CACHE_EVICTIONS).increment(evicted as u64);
        gauge!(METRIC_CACHE_ENTRIES).set(self.store.len() as f64);
        histogram!(METRIC_CACHE_CONSUME_MS).record(started_at.elapsed().as_secs_f64() * 1000.0);

        ConsumeOutcome {
            events: event_count,
            evicted,
        }
    }

    fn apply(&self, plan: &InvalidationPlan) -> usize {
        if plan.clear_all {
            self.registry.clear();
            return self.store.clear();
        }

        let mut keys: Vec<CacheKey> = plan.keys.iter().cloned().collect();
        for tag in &plan.tags {
            let tagged = self.registry.keys_for_tag(tag);
            debug!(tag = %tag, keys = tagged.len(), "Invalidating tag");
            keys.extend(tagged);
        }
        keys.sort();
        keys.dedup();

        let mut evicted = 0;
        for key in &keys {
            if self.store.remove(key) {
                evicted += 1;
            }
            self.registry.unregister(key);
        }
        evicted
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::cache::events::EventKind;
    use crate::cache::keys::Tag;

    struct Fixture {
        store: Arc<EntryStore>,
        registry: Arc<TagRegistry>,
        queue: Arc<EventQueue>,
        consumer: CacheConsumer,
    }

    fn fixture(batch_limit: usize) -> Fixture {
        let store = Arc::new(EntryStore::new(None));
        let registry = Arc::new(TagRegistry::new());
        let queue = Arc::new(EventQueue::new());
        let config = CacheConfig {
            consume_batch_limit: batch_limit,
            ..CacheConfig::tag_only()
        };
        let consumer = CacheConsumer::new(
            config,
            Arc::clone(&store),
            Arc::clone(&registry),
            Arc::clone(&queue),
            Arc::new(Mutex::new(0)),
        );
        Fixture {
            store,
            registry,
            queue,
            consumer,
        }
    }

    fn seed(f: &Fixture, key: CacheKey, tags: &[&str]) {
        f.store.insert(key.clone(), Arc::new(()));
        f.registry
            .register(key, tags.iter().map(|t| Tag::new(*t)).collect::<HashSet<_>>());
    }

    #[test]
    fn empty_queue_is_a_no_op() {
        let f = fixture(10);
        assert_eq!(f.consumer.consume(), ConsumeOutcome::default());
    }

    #[test]
    fn tag_event_evicts_tagged_entries_only() {
        let f = fixture(10);
        seed(&f, CacheKey::pages(), &["cms-data"]);
        seed(&f, CacheKey::blog_posts(), &["cms-data"]);
        seed(&f, CacheKey::page_content("p"), &["cms-page-p"]);

        f.queue.publish(EventKind::Tag(Tag::cms_data()));
        let outcome = f.consumer.consume();

        assert_eq!(outcome, ConsumeOutcome { events: 1, evicted: 2 });
        assert_eq!(f.store.len(), 1);
        assert!(f.registry.keys_for_tag(&Tag::cms_data()).is_empty());
    }

    #[test]
    fn key_event_evicts_single_entry() {
        let f = fixture(10);
        seed(&f, CacheKey::pages(), &["cms-data"]);
        seed(&f, CacheKey::blog_posts(), &["cms-data"]);

        f.queue.publish(EventKind::Key(CacheKey::pages()));
        assert_eq!(f.consumer.consume().evicted, 1);
        assert_eq!(f.registry.keys_for_tag(&Tag::cms_data()).len(), 1);
    }

    #[test]
    fn clear_all_empties_store_and_registry() {
        let f = fixture(10);
        seed(&f, CacheKey::pages(), &["cms-data"]);
        seed(&f, CacheKey::page_content("p"), &["cms-page-p"]);

        f.queue.publish(EventKind::All);
        assert_eq!(f.consumer.consume().evicted, 2);
        assert!(f.store.is_empty());
        assert_eq!(f.registry.key_count(), 0);
    }

    #[test]
    fn consume_all_drains_multiple_batches() {
        let f = fixture(1);
        seed(&f, CacheKey::pages(), &["a"]);
        seed(&f, CacheKey::blog_posts(), &["b"]);

        f.queue.publish(EventKind::Tag(Tag::new("a")));
        f.queue.publish(EventKind::Tag(Tag::new("b")));

        let outcome = f.consumer.consume_all();
        assert_eq!(outcome, ConsumeOutcome { events: 2, evicted: 2 });
        assert!(f.queue.is_empty());
    }

    #[test]
    fn records_applied_epoch() {
        let f = fixture(10);
        let epoch = f.queue.publish(EventKind::All);
        f.consumer.consume();
        assert_eq!(*f.consumer.apply_lock.lock_recover("test"), epoch);
    }
}
