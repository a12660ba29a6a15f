//! Type-erased entry storage.
//!
//! Values are stored behind `Arc<dyn Any>` so that one store can hold every
//! cached collection; readers downcast to the type they computed with.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::time::Instant;

use super::keys::CacheKey;
use super::lock::RwLockRecover;

pub type CachedValue = Arc<dyn Any + Send + Sync>;

struct Entry {
    value: CachedValue,
    stored_at: Instant,
}

impl Entry {
    fn is_fresh(&self, ttl: Option<Duration>, now: Instant) -> bool {
        match ttl {
            Some(ttl) => now.saturating_duration_since(self.stored_at) < ttl,
            None => true,
        }
    }
}

/// Key → value storage with optional time-based expiry.
pub struct EntryStore {
    entries: RwLock<HashMap<CacheKey, Entry>>,
    ttl: Option<Duration>,
}

impl EntryStore {
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Fresh value for `key`, if any.
    pub fn get(&self, key: &CacheKey) -> Option<CachedValue> {
        let now = Instant::now();
        self.entries
            .read_recover("store.get")
            .get(key)
            .filter(|entry| entry.is_fresh(self.ttl, now))
            .map(|entry| Arc::clone(&entry.value))
    }

    pub fn insert(&self, key: CacheKey, value: CachedValue) {
        let entry = Entry {
            value,
            stored_at: Instant::now(),
        };
        self.entries.write_recover("store.insert").insert(key, entry);
    }

    /// Remove `key`; returns whether an entry was present.
    pub fn remove(&self, key: &CacheKey) -> bool {
        self.entries
            .write_recover("store.remove")
            .remove(key)
            .is_some()
    }

    /// Remove everything; returns how many entries were dropped.
    pub fn clear(&self) -> usize {
        let mut entries = self.entries.write_recover("store.clear");
        let count = entries.len();
        entries.clear();
        count
    }

    /// Drop expired entries and return their keys.
    pub fn purge_expired(&self) -> Vec<CacheKey> {
        if self.ttl.is_none() {
            return Vec::new();
        }
        let now = Instant::now();
        let mut entries = self.entries.write_recover("store.purge_expired");
        let expired: Vec<CacheKey> = entries
            .iter()
            .filter(|(_, entry)| !entry.is_fresh(self.ttl, now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            entries.remove(key);
        }
        expired
    }

    pub fn len(&self) -> usize {
        self.entries.read_recover("store.len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
