//! Content service: the cached accessors page handlers consume.

use std::sync::Arc;

use futures::future::try_join4;
use metrics::{counter, histogram};
use thiserror::Error;
use tracing::{info, instrument};

use crate::application::fetch::{fetch_all, fetch_block_children};
use crate::application::records::Transform;
use crate::application::store::{DocumentStore, FilterSpec, MAX_PAGE_SIZE, SortDirection, StoreError};
use crate::application::views::{self, BlogTag, Canonical, LocalizedPage};
use crate::cache::{CacheKey, CacheService, Tag};
use crate::config::CmsSettings;
use crate::domain::entities::{BlogPost, BusinessIdea, ContentBlock, Page};
use crate::domain::types::Locale;

const PUBLIC_PROPERTY: &str = "public";
const PUBLISH_DATE_PROPERTY: &str = "publish-date";

const METRIC_STORE_FETCH_MS: &str = "folio_store_fetch_ms";
const METRIC_STORE_ERRORS: &str = "folio_store_errors_total";

#[derive(Debug, Error)]
pub enum ContentError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("content source is not configured: missing `{key}`")]
    MissingConfiguration { key: &'static str },
}

/// Database ids of the CMS collections. Unset ids fail at first use.
#[derive(Debug, Clone)]
pub struct CmsSources {
    pub pages_db: Option<String>,
    pub blog_posts_db: Option<String>,
    pub business_ideas_db: Option<String>,
    pub page_size: u32,
}

impl Default for CmsSources {
    fn default() -> Self {
        Self {
            pages_db: None,
            blog_posts_db: None,
            business_ideas_db: None,
            page_size: MAX_PAGE_SIZE,
        }
    }
}

impl From<&CmsSettings> for CmsSources {
    fn from(settings: &CmsSettings) -> Self {
        Self {
            pages_db: settings.pages_db_id.clone(),
            blog_posts_db: settings.blog_posts_db_id.clone(),
            business_ideas_db: settings.business_ideas_db_id.clone(),
            page_size: settings.page_size.get(),
        }
    }
}

/// Collection counts after a warmup; `None` for unconfigured collections.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WarmReport {
    pub pages: Option<usize>,
    pub blog_posts: Option<usize>,
    pub blog_tags: Option<usize>,
    pub business_ideas: Option<usize>,
}

#[derive(Clone)]
pub struct ContentService {
    store: Arc<dyn DocumentStore>,
    cache: Arc<CacheService>,
    sources: CmsSources,
    default_locale: Locale,
}

impl ContentService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        cache: Arc<CacheService>,
        sources: CmsSources,
        default_locale: Locale,
    ) -> Self {
        Self {
            store,
            cache,
            sources,
            default_locale,
        }
    }

    pub fn cache(&self) -> &Arc<CacheService> {
        &self.cache
    }

    pub fn default_locale(&self) -> Locale {
        self.default_locale
    }

    pub async fn pages(&self) -> Result<Arc<Vec<Page>>, ContentError> {
        let spec = FilterSpec::database(require(&self.sources.pages_db, "cms.pages_db_id")?)
            .with_page_size(self.sources.page_size);
        self.cache
            .cached(&CacheKey::pages(), &[Tag::cms_data()], || {
                self.fetch_collection::<Page>(spec)
            })
            .await
    }

    pub async fn localized_pages(&self) -> Result<Vec<LocalizedPage>, ContentError> {
        Ok(views::localize_pages(&self.pages().await?))
    }

    /// The page published under `slug` in `lang`.
    pub async fn page(&self, lang: Locale, slug: &str) -> Result<Option<LocalizedPage>, ContentError> {
        let pages = self.pages().await?;
        Ok(pages
            .iter()
            .find(|page| page.lang == lang && page.slug == slug)
            .map(views::localize_page))
    }

    /// Ordered first-level blocks of a page body.
    pub async fn page_content(&self, block_id: &str) -> Result<Arc<Vec<ContentBlock>>, ContentError> {
        let page_size = self.sources.page_size;
        self.cache
            .cached(
                &CacheKey::page_content(block_id),
                &[Tag::page_content(block_id)],
                || async move {
                    let started_at = std::time::Instant::now();
                    let blocks = fetch_block_children(self.store.as_ref(), block_id, page_size)
                        .await
                        .inspect_err(|_| record_store_error("blocks"))?;
                    record_fetch("blocks", started_at);
                    Ok::<_, ContentError>(blocks)
                },
            )
            .await
    }

    pub async fn business_ideas(&self) -> Result<Arc<Vec<BusinessIdea>>, ContentError> {
        let spec = FilterSpec::database(require(
            &self.sources.business_ideas_db,
            "cms.business_ideas_db_id",
        )?)
        .only_checked(PUBLIC_PROPERTY)
        .with_page_size(self.sources.page_size);
        self.cache
            .cached(&CacheKey::business_ideas(), &[Tag::cms_data()], || {
                self.fetch_collection::<BusinessIdea>(spec)
            })
            .await
    }

    pub async fn business_idea(
        &self,
        slug: &str,
    ) -> Result<Option<Canonical<BusinessIdea>>, ContentError> {
        let ideas = self.business_ideas().await?;
        Ok(ideas
            .iter()
            .find(|idea| idea.slug == slug)
            .map(|idea| views::canonical_idea(idea, self.default_locale)))
    }

    /// Public blog posts, newest first.
    pub async fn blog_posts(&self) -> Result<Arc<Vec<BlogPost>>, ContentError> {
        let spec = self.blog_posts_spec(false)?;
        self.cache
            .cached(&CacheKey::blog_posts(), &[Tag::cms_data()], || {
                self.fetch_collection::<BlogPost>(spec)
            })
            .await
    }

    pub async fn blog_post(&self, slug: &str) -> Result<Option<Canonical<BlogPost>>, ContentError> {
        let posts = self.blog_posts().await?;
        Ok(posts
            .iter()
            .find(|post| post.slug == slug)
            .map(|post| views::canonical_post(post, self.default_locale)))
    }

    /// Every tag used by a public post.
    pub async fn blog_tags(&self) -> Result<Arc<Vec<BlogTag>>, ContentError> {
        self.cache
            .cached(&CacheKey::blog_tags(), &[Tag::cms_data()], || async {
                let posts = self.blog_posts().await?;
                Ok::<_, ContentError>(views::distinct_tags(&posts, self.default_locale))
            })
            .await
    }

    pub async fn blog_posts_tagged(&self, tag: &str) -> Result<Vec<BlogPost>, ContentError> {
        Ok(views::posts_tagged(&self.blog_posts().await?, tag))
    }

    /// All posts including unpublished ones, always fetched fresh.
    #[instrument(skip(self))]
    pub async fn blog_posts_draft(&self) -> Result<Vec<BlogPost>, ContentError> {
        let spec = self.blog_posts_spec(true)?;
        self.fetch_collection::<BlogPost>(spec).await
    }

    /// Populate every configured collection concurrently.
    #[instrument(skip(self))]
    pub async fn warm(&self) -> Result<WarmReport, ContentError> {
        let (pages, blog_posts, blog_tags, business_ideas) = try_join4(
            self.warm_one(self.sources.pages_db.is_some(), self.pages()),
            self.warm_one(self.sources.blog_posts_db.is_some(), self.blog_posts()),
            self.warm_one(self.sources.blog_posts_db.is_some(), self.blog_tags()),
            self.warm_one(
                self.sources.business_ideas_db.is_some(),
                self.business_ideas(),
            ),
        )
        .await?;

        let report = WarmReport {
            pages,
            blog_posts,
            blog_tags,
            business_ideas,
        };
        info!(?report, "Content cache warmed");
        Ok(report)
    }

    async fn warm_one<T>(
        &self,
        configured: bool,
        load: impl Future<Output = Result<Arc<Vec<T>>, ContentError>>,
    ) -> Result<Option<usize>, ContentError> {
        if !configured {
            return Ok(None);
        }
        Ok(Some(load.await?.len()))
    }

    /// Invalidate `tags`; returns the number of evicted entries.
    pub fn revalidate(&self, tags: &[Tag]) -> usize {
        let evicted = self.cache.invalidate_tags(tags);
        info!(tags = ?tags, evicted, "Revalidated content cache");
        evicted
    }

    fn blog_posts_spec(&self, include_drafts: bool) -> Result<FilterSpec, ContentError> {
        let spec = FilterSpec::database(require(&self.sources.blog_posts_db, "cms.blog_posts_db_id")?)
            .sorted_by(PUBLISH_DATE_PROPERTY, SortDirection::Descending)
            .with_page_size(self.sources.page_size);
        Ok(if include_drafts {
            spec
        } else {
            spec.only_checked(PUBLIC_PROPERTY)
        })
    }

    async fn fetch_collection<T: Transform>(&self, spec: FilterSpec) -> Result<Vec<T>, ContentError> {
        let started_at = std::time::Instant::now();
        let items = fetch_all::<T>(self.store.as_ref(), &spec)
            .await
            .inspect_err(|_| record_store_error(T::KIND))?;
        record_fetch(T::KIND, started_at);
        Ok(items)
    }
}

fn require<'a>(value: &'a Option<String>, key: &'static str) -> Result<&'a str, ContentError> {
    value
        .as_deref()
        .filter(|id| !id.trim().is_empty())
        .ok_or(ContentError::MissingConfiguration { key })
}

fn record_fetch(kind: &'static str, started_at: std::time::Instant) {
    histogram!(METRIC_STORE_FETCH_MS, "kind" => kind)
        .record(started_at.elapsed().as_secs_f64() * 1000.0);
}

fn record_store_error(kind: &'static str) {
    counter!(METRIC_STORE_ERRORS, "kind" => kind).increment(1);
}
