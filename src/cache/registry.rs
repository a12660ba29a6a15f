//! Bidirectional tag registry.
//!
//! Tracks which cache keys carry which tags so that invalidating a tag can
//! find every affected entry, and evicting an entry can clean up its tags.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use super::keys::{CacheKey, Tag};
use super::lock::RwLockRecover;

#[derive(Default)]
struct Maps {
    tag_to_keys: HashMap<Tag, HashSet<CacheKey>>,
    key_to_tags: HashMap<CacheKey, HashSet<Tag>>,
}

/// Tracks tag → keys and key → tags mappings.
#[derive(Default)]
pub struct TagRegistry {
    maps: RwLock<Maps>,
}

impl TagRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Associate `key` with exactly `tags`, replacing any earlier association.
    pub fn register(&self, key: CacheKey, tags: HashSet<Tag>) {
        let mut maps = self.maps.write_recover("registry.register");
        detach(&mut maps, &key);
        for tag in &tags {
            maps.tag_to_keys
                .entry(tag.clone())
                .or_default()
                .insert(key.clone());
        }
        maps.key_to_tags.insert(key, tags);
    }

    /// All keys currently carrying `tag`.
    pub fn keys_for_tag(&self, tag: &Tag) -> HashSet<CacheKey> {
        self.maps
            .read_recover("registry.keys_for_tag")
            .tag_to_keys
            .get(tag)
            .cloned()
            .unwrap_or_default()
    }

    pub fn tags_for_key(&self, key: &CacheKey) -> HashSet<Tag> {
        self.maps
            .read_recover("registry.tags_for_key")
            .key_to_tags
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    /// Remove `key` and drop tags that no longer reference anything.
    pub fn unregister(&self, key: &CacheKey) {
        let mut maps = self.maps.write_recover("registry.unregister");
        detach(&mut maps, key);
    }

    pub fn clear(&self) {
        let mut maps = self.maps.write_recover("registry.clear");
        maps.tag_to_keys.clear();
        maps.key_to_tags.clear();
    }

    pub fn tag_count(&self) -> usize {
        self.maps.read_recover("registry.tag_count").tag_to_keys.len()
    }

    pub fn key_count(&self) -> usize {
        self.maps.read_recover("registry.key_count").key_to_tags.len()
    }
}

fn detach(maps: &mut Maps, key: &CacheKey) {
    let Some(tags) = maps.key_to_tags.remove(key) else {
        return;
    };
    for tag in tags {
        if let Some(keys) = maps.tag_to_keys.get_mut(&tag) {
            keys.remove(key);
            if keys.is_empty() {
                maps.tag_to_keys.remove(&tag);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(names: &[&str]) -> HashSet<Tag> {
        names.iter().map(|name| Tag::new(*name)).collect()
    }

    #[test]
    fn register_and_lookup() {
        let registry = TagRegistry::new();
        registry.register(CacheKey::pages(), tags(&["cms-data"]));
        registry.register(CacheKey::blog_posts(), tags(&["cms-data"]));

        let keys = registry.keys_for_tag(&Tag::cms_data());
        assert_eq!(keys.len(), 2);
        assert!(keys.contains(&CacheKey::pages()));
        assert_eq!(registry.tags_for_key(&CacheKey::pages()), tags(&["cms-data"]));
    }

    #[test]
    fn register_replaces_previous_tags() {
        let registry = TagRegistry::new();
        let key = CacheKey::new("k");
        registry.register(key.clone(), tags(&["a", "b"]));
        registry.register(key.clone(), tags(&["c"]));

        assert!(registry.keys_for_tag(&Tag::new("a")).is_empty());
        assert!(registry.keys_for_tag(&Tag::new("c")).contains(&key));
        assert_eq!(registry.tag_count(), 1);
    }

    #[test]
    fn unregister_cleans_up_empty_tags() {
        let registry = TagRegistry::new();
        let key = CacheKey::page_content("p1");
        registry.register(key.clone(), tags(&["cms-page-p1"]));

        registry.unregister(&key);

        assert_eq!(registry.tag_count(), 0);
        assert_eq!(registry.key_count(), 0);
    }

    #[test]
    fn unknown_tag_has_no_keys() {
        let registry = TagRegistry::new();
        assert!(registry.keys_for_tag(&Tag::new("nothing")).is_empty());
    }
}
