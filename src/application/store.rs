//! Document store port: the two CMS operations this crate consumes.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::domain::entities::ContentBlock;

/// Upper bound the CMS accepts for a single result page.
pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document store transport error: {0}")]
    Transport(String),
    #[error("document store rejected request ({status}): {code}: {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },
    #[error("document store protocol violation: {0}")]
    Protocol(String),
    #[error("document store is not configured: missing `{key}`")]
    Configuration { key: &'static str },
}

impl StoreError {
    pub fn transport(err: impl std::fmt::Display) -> Self {
        Self::Transport(err.to_string())
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }
}

/// A database row as returned by the store. Read-only to this crate.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawRecord {
    pub id: String,
    #[serde(default)]
    pub last_edited_time: Option<String>,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

/// One page of a paginated store listing.
#[derive(Debug, Clone, Deserialize)]
pub struct ResultPage<T> {
    pub results: Vec<T>,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            SortDirection::Ascending => "ascending",
            SortDirection::Descending => "descending",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    pub property: String,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyFilter {
    Checkbox { property: String, equals: bool },
}

/// Which records of a database to fetch and in which order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterSpec {
    database_id: String,
    filter: Option<PropertyFilter>,
    sorts: Vec<SortSpec>,
    page_size: u32,
}

impl FilterSpec {
    pub fn database(database_id: impl Into<String>) -> Self {
        Self {
            database_id: database_id.into(),
            filter: None,
            sorts: Vec::new(),
            page_size: MAX_PAGE_SIZE,
        }
    }

    /// Only return records whose checkbox `property` is ticked.
    pub fn only_checked(mut self, property: impl Into<String>) -> Self {
        self.filter = Some(PropertyFilter::Checkbox {
            property: property.into(),
            equals: true,
        });
        self
    }

    pub fn sorted_by(mut self, property: impl Into<String>, direction: SortDirection) -> Self {
        self.sorts.push(SortSpec {
            property: property.into(),
            direction,
        });
        self
    }

    /// Clamped to `1..=MAX_PAGE_SIZE`.
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        self
    }

    pub fn database_id(&self) -> &str {
        &self.database_id
    }

    pub fn filter(&self) -> Option<&PropertyFilter> {
        self.filter.as_ref()
    }

    pub fn sorts(&self) -> &[SortSpec] {
        &self.sorts
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }
}

/// The external CMS client. Implementations only serve single pages;
/// draining a listing is the fetcher's job.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn query_database(
        &self,
        spec: &FilterSpec,
        cursor: Option<&str>,
    ) -> Result<ResultPage<RawRecord>, StoreError>;

    async fn block_children(
        &self,
        block_id: &str,
        page_size: u32,
        cursor: Option<&str>,
    ) -> Result<ResultPage<ContentBlock>, StoreError>;
}
