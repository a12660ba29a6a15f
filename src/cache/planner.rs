//! Invalidation plan generation.
//!
//! Merges a batch of cache events into the set of tags and keys to evict.

use std::collections::HashSet;
use std::fmt;

use super::events::{CacheEvent, EventKind};
use super::keys::{CacheKey, Tag};

#[derive(Debug, Default, PartialEq, Eq)]
pub struct InvalidationPlan {
    /// Evict everything; the tag and key sets are empty when set.
    pub clear_all: bool,
    pub tags: HashSet<Tag>,
    pub keys: HashSet<CacheKey>,
    /// Highest epoch covered by this plan.
    pub max_epoch: u64,
}

impl fmt::Display for InvalidationPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "InvalidationPlan {{ clear_all: {}, tags: {}, keys: {}, max_epoch: {} }}",
            self.clear_all,
            self.tags.len(),
            self.keys.len(),
            self.max_epoch,
        )
    }
}

impl InvalidationPlan {
    /// Merge `events`, ignoring duplicates by event id.
    pub fn from_events(events: Vec<CacheEvent>) -> Self {
        let mut plan = Self::default();
        let mut seen_ids = HashSet::new();

        for event in events.into_iter().filter(|e| seen_ids.insert(e.id)) {
            plan.max_epoch = plan.max_epoch.max(event.epoch);
            if plan.clear_all {
                continue;
            }
            match event.kind {
                EventKind::All => {
                    plan.clear_all = true;
                    plan.tags.clear();
                    plan.keys.clear();
                }
                EventKind::Tag(tag) => {
                    plan.tags.insert(tag);
                }
                EventKind::Key(key) => {
                    plan.keys.insert(key);
                }
            }
        }

        plan
    }

    pub fn is_empty(&self) -> bool {
        !self.clear_all && self.tags.is_empty() && self.keys.is_empty()
    }
}
