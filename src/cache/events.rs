//! Cache event system.
//!
//! Invalidation requests are published as events and applied by the
//! consumer in batches.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use time::OffsetDateTime;
use tracing::info;
use uuid::Uuid;

use super::keys::{CacheKey, Tag};
use super::lock::MutexRecover;

/// Monotonic epoch for ordering events within this process.
pub type Epoch = u64;

#[derive(Debug, Clone)]
pub struct CacheEvent {
    /// Unique identifier for idempotency (UUIDv4).
    pub id: Uuid,
    pub epoch: Epoch,
    pub kind: EventKind,
    pub timestamp: OffsetDateTime,
}

impl CacheEvent {
    pub fn new(kind: EventKind, epoch: Epoch) -> Self {
        Self {
            id: Uuid::new_v4(),
            epoch,
            kind,
            timestamp: OffsetDateTime::now_utc(),
        }
    }
}

/// What an event invalidates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// Every entry stored with this tag.
    Tag(Tag),
    /// A single entry.
    Key(CacheKey),
    /// The whole cache.
    All,
}

/// In-memory FIFO of pending invalidation events.
pub struct EventQueue {
    queue: Mutex<VecDeque<CacheEvent>>,
    scopes: Mutex<ScopeEpochs>,
    epoch_counter: AtomicU64,
}

/// Latest epoch published for each invalidation scope.
#[derive(Default)]
struct ScopeEpochs {
    all: Epoch,
    tags: HashMap<Tag, Epoch>,
    keys: HashMap<CacheKey, Epoch>,
}

impl ScopeEpochs {
    fn record(&mut self, kind: &EventKind, epoch: Epoch) {
        match kind {
            EventKind::Tag(tag) => {
                self.tags.insert(tag.clone(), epoch);
            }
            EventKind::Key(key) => {
                self.keys.insert(key.clone(), epoch);
            }
            EventKind::All => self.all = epoch,
        }
    }
}

impl EventQueue {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            scopes: Mutex::new(ScopeEpochs::default()),
            epoch_counter: AtomicU64::new(0),
        }
    }

    fn next_epoch(&self) -> Epoch {
        self.epoch_counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Epoch of the most recently published event, zero before the first.
    pub fn current_epoch(&self) -> Epoch {
        self.epoch_counter.load(Ordering::SeqCst)
    }

    /// Publish an event and return its epoch.
    pub fn publish(&self, kind: EventKind) -> Epoch {
        let mut queue = self.queue.lock_recover("events.publish");
        let event = CacheEvent::new(kind, self.next_epoch());

        info!(
            event_id = %event.id,
            event_epoch = event.epoch,
            event_kind = ?event.kind,
            "Cache event enqueued"
        );

        let epoch = event.epoch;
        self.scopes
            .lock_recover("events.publish")
            .record(&event.kind, epoch);
        queue.push_back(event);
        epoch
    }

    /// Whether an event published after `epoch` covers `key` or any of `tags`.
    pub fn invalidated_since(&self, key: &CacheKey, tags: &[Tag], epoch: Epoch) -> bool {
        let scopes = self.scopes.lock_recover("events.invalidated_since");
        scopes.all > epoch
            || scopes.keys.get(key).is_some_and(|published| *published > epoch)
            || tags
                .iter()
                .any(|tag| scopes.tags.get(tag).is_some_and(|published| *published > epoch))
    }

    /// Drain up to `limit` events in FIFO order.
    pub fn drain(&self, limit: usize) -> Vec<CacheEvent> {
        let mut queue = self.queue.lock_recover("events.drain");
        let count = limit.min(queue.len());
        queue.drain(..count).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.lock_recover("events.len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use super::*;

    #[test]
    fn epochs_increase_with_each_publish() {
        let queue = EventQueue::new();
        assert_eq!(queue.current_epoch(), 0);

        let first = queue.publish(EventKind::All);
        let second = queue.publish(EventKind::Tag(Tag::cms_data()));

        assert!(first < second);
        assert_eq!(queue.current_epoch(), second);
    }

    #[test]
    fn publish_and_drain_in_order() {
        let queue = EventQueue::new();
        queue.publish(EventKind::Tag(Tag::cms_data()));
        queue.publish(EventKind::Key(CacheKey::pages()));
        queue.publish(EventKind::All);

        let events = queue.drain(2);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, EventKind::Tag(Tag::cms_data()));
        assert_eq!(events[1].kind, EventKind::Key(CacheKey::pages()));
        assert_eq!(queue.len(), 1);
        assert!(!events[0].id.is_nil());
    }

    #[test]
    fn drain_more_than_available() {
        let queue = EventQueue::new();
        queue.publish(EventKind::All);

        assert_eq!(queue.drain(100).len(), 1);
        assert!(queue.is_empty());
    }

    #[test]
    fn invalidations_are_tracked_per_scope() {
        let queue = EventQueue::new();
        let started = queue.current_epoch();
        let pages = CacheKey::pages();
        let tags = [Tag::cms_data()];

        queue.publish(EventKind::Tag(Tag::page_content("p1")));
        assert!(!queue.invalidated_since(&pages, &tags, started));

        queue.publish(EventKind::Key(CacheKey::blog_posts()));
        assert!(!queue.invalidated_since(&pages, &tags, started));

        let tagged = queue.current_epoch();
        queue.publish(EventKind::Tag(Tag::cms_data()));
        assert!(queue.invalidated_since(&pages, &tags, started));
        assert!(queue.invalidated_since(&pages, &tags, tagged));
        assert!(!queue.invalidated_since(&pages, &tags, queue.current_epoch()));

        let keyed = queue.current_epoch();
        queue.publish(EventKind::Key(CacheKey::pages()));
        assert!(queue.invalidated_since(&pages, &[], keyed));

        let cleared = queue.current_epoch();
        queue.publish(EventKind::All);
        assert!(queue.invalidated_since(&CacheKey::new("any"), &[], cleared));
    }

    #[test]
    fn event_queue_recovers_from_poisoned_lock() {
        let queue = EventQueue::new();

        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = queue.queue.lock().expect("queue lock should be acquired");
            panic!("poison queue lock");
        }));

        queue.publish(EventKind::All);
        assert_eq!(queue.len(), 1);
    }
}
