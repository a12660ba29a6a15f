use std::collections::HashSet;
use std::convert::Infallible;
use std::sync::Arc;

use folio::application::content::{CmsSources, ContentService};
use folio::cache::{CacheConfig, CacheKey, CacheService, Tag};
use folio::domain::types::Locale;
use folio::infra::memory::MemoryStore;
use metrics_util::debugging::DebuggingRecorder;

#[tokio::test]
async fn cache_and_store_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    // Hit, miss, stale discard and eviction through the cache service.
    let cache = Arc::new(CacheService::new(CacheConfig::tag_only()));
    let key = CacheKey::new("metrics");
    let tags = [Tag::cms_data()];
    cache
        .cached(&key, &tags, || async { Ok::<_, Infallible>(1u32) })
        .await
        .expect("first compute");
    cache
        .cached(&key, &tags, || async { Ok::<_, Infallible>(2u32) })
        .await
        .expect("cache hit");
    cache
        .cached(&CacheKey::new("straddle"), &tags, || {
            let cache = Arc::clone(&cache);
            async move {
                cache.invalidate_tag(&Tag::cms_data());
                Ok::<_, Infallible>(3u32)
            }
        })
        .await
        .expect("straddling compute");
    cache.invalidate_tag(&Tag::cms_data());

    // Store fetch timing and errors through the content service.
    let store = Arc::new(MemoryStore::new());
    store.insert_records("pages", Vec::new());
    let content = ContentService::new(
        store,
        Arc::clone(&cache),
        CmsSources {
            pages_db: Some("pages".to_string()),
            blog_posts_db: Some("posts".to_string()),
            ..CmsSources::default()
        },
        Locale::En,
    );
    content.pages().await.expect("pages load");
    assert!(content.blog_posts().await.is_err());

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    let expected = [
        "folio_cache_hits_total",
        "folio_cache_misses_total",
        "folio_cache_compute_ms",
        "folio_cache_stale_discards_total",
        "folio_cache_invalidations_total",
        "folio_cache_evictions_total",
        "folio_cache_entries",
        "folio_cache_consume_ms",
        "folio_store_fetch_ms",
        "folio_store_errors_total",
    ];

    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
}
