//! Cache trigger.
//!
//! Publishes invalidation events and consumes them immediately, so callers
//! observe the eviction as soon as the call returns.

use std::sync::Arc;

use metrics::counter;
use tracing::debug;

use super::consumer::CacheConsumer;
use super::events::{EventKind, EventQueue};
use super::keys::{CacheKey, Tag};

const METRIC_CACHE_INVALIDATIONS: &str = "folio_cache_invalidations_total";

pub struct CacheTrigger {
    enabled: bool,
    queue: Arc<EventQueue>,
    consumer: Arc<CacheConsumer>,
}

impl CacheTrigger {
    pub fn new(enabled: bool, queue: Arc<EventQueue>, consumer: Arc<CacheConsumer>) -> Self {
        Self {
            enabled,
            queue,
            consumer,
        }
    }

    /// Publish `kinds` and consume them; returns the number of evicted entries.
    pub fn trigger(&self, kinds: impl IntoIterator<Item = EventKind>) -> usize {
        if !self.enabled {
            debug!("Cache trigger skipped: cache disabled");
            return 0;
        }

        for kind in kinds {
            let scope = match &kind {
                EventKind::Tag(_) => "tag",
                EventKind::Key(_) => "key",
                EventKind::All => "all",
            };
            counter!(METRIC_CACHE_INVALIDATIONS, "scope" => scope).increment(1);
            self.queue.publish(kind);
        }
        self.consumer.consume_all().evicted
    }

    pub fn tag(&self, tag: &Tag) -> usize {
        self.trigger([EventKind::Tag(tag.clone())])
    }

    pub fn tags<'a>(&self, tags: impl IntoIterator<Item = &'a Tag>) -> usize {
        self.trigger(tags.into_iter().cloned().map(EventKind::Tag))
    }

    pub fn key(&self, key: &CacheKey) -> usize {
        self.trigger([EventKind::Key(key.clone())])
    }

    pub fn all(&self) -> usize {
        self.trigger([EventKind::All])
    }
}
