//! Domain objects projected from CMS records.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;

use crate::domain::types::Locale;

/// A localized site page (about, legal notice, landing pages, ...).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page {
    pub title: String,
    pub subtitle: Option<String>,
    pub lang: Locale,
    pub slug: String,
    pub description: String,
    pub sitemap_priority: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub last_edited: OffsetDateTime,
    /// CMS page id; doubles as the block id for fetching the page body.
    pub block_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlogPost {
    pub title: String,
    pub slug: String,
    pub lang: Locale,
    pub meta_description: String,
    #[serde(with = "time::serde::rfc3339")]
    pub publish_date: OffsetDateTime,
    pub tags: BTreeSet<String>,
    pub og_image: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub last_edited: OffsetDateTime,
    pub block_id: String,
}

/// One entry of the business-ideas listicle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BusinessIdea {
    pub title: String,
    pub slug: String,
    pub lang: Locale,
    pub description: String,
    pub subtitle: Option<String>,
    pub position: Option<f64>,
    pub og_image: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub last_edited: OffsetDateTime,
    pub block_id: String,
}

/// A first-level child block of a CMS page, kept opaque apart from its header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentBlock {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub has_children: bool,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl ContentBlock {
    /// The type-specific body, e.g. the `paragraph` object of a paragraph block.
    pub fn body(&self) -> Option<&Value> {
        self.payload.get(&self.kind)
    }
}
