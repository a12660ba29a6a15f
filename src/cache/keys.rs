//! Cache key and tag definitions.

use std::fmt;

use serde::Serialize;

/// Tag attached to every entry derived from CMS database queries.
pub const TAG_CMS_DATA: &str = "cms-data";

/// Identifies one cache entry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct CacheKey(String);

/// Label for bulk invalidation of every entry stored with it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Tag(String);

impl CacheKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn pages() -> Self {
        Self::new("cms-pages")
    }

    pub fn blog_posts() -> Self {
        Self::new("cms-blog-posts")
    }

    pub fn blog_tags() -> Self {
        Self::new("cms-blog-tags")
    }

    pub fn business_ideas() -> Self {
        Self::new("cms-business-ideas-pages")
    }

    pub fn page_content(block_id: &str) -> Self {
        Self::new(format!("cms-page-{block_id}"))
    }
}

impl Tag {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn cms_data() -> Self {
        Self::new(TAG_CMS_DATA)
    }

    /// Tag of the cached body of one CMS page.
    pub fn page_content(block_id: &str) -> Self {
        Self::new(format!("cms-page-{block_id}"))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Tag {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Tag {
    fn from(value: String) -> Self {
        Self(value)
    }
}
