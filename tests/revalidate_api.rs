use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use folio::application::content::{CmsSources, ContentService};
use folio::application::store::RawRecord;
use folio::cache::{CacheConfig, CacheService};
use folio::domain::types::Locale;
use folio::infra::http::{HttpState, RevalidateResponse, build_router};
use folio::infra::memory::MemoryStore;
use serde_json::{Value, json};
use tower::ServiceExt;

const SECRET: &str = "s3cret";

fn page(id: &str, slug: &str) -> RawRecord {
    let properties = json!({
        "Name": { "type": "title", "title": [{ "plain_text": slug }] },
        "lang": { "type": "select", "select": { "name": "en" } },
        "slug": { "type": "rich_text", "rich_text": [{ "plain_text": slug }] },
        "description": { "type": "rich_text", "rich_text": [{ "plain_text": "d" }] },
        "sitemap-priority": { "type": "number", "number": 1 }
    });
    RawRecord {
        id: id.to_string(),
        last_edited_time: Some("2024-01-01T00:00:00.000Z".to_string()),
        properties: properties.as_object().cloned().unwrap_or_default(),
    }
}

fn content() -> ContentService {
    let store = Arc::new(MemoryStore::new());
    store.insert_records("pages", vec![page("p1", "home")]);
    let sources = CmsSources {
        pages_db: Some("pages".to_string()),
        ..CmsSources::default()
    };
    ContentService::new(
        store,
        Arc::new(CacheService::new(CacheConfig::tag_only())),
        sources,
        Locale::En,
    )
}

fn app(content: ContentService, secret: Option<&str>) -> Router {
    build_router(HttpState::new(content, secret.map(str::to_string)))
}

fn revalidate_request(token: Option<&str>, body: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri("/api/revalidate")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder
        .body(Body::from(body.to_string()))
        .expect("request should build")
}

async fn body_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body should read");
    serde_json::from_slice(&bytes).expect("body should be json")
}

#[tokio::test]
async fn health_returns_no_content() {
    let response = app(content(), None)
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .expect("request should build"),
        )
        .await
        .expect("router should respond");

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn caller_request_id_is_echoed() {
    let response = app(content(), None)
        .oneshot(
            Request::builder()
                .uri("/health")
                .header("x-request-id", "deploy-42")
                .body(Body::empty())
                .expect("request should build"),
        )
        .await
        .expect("router should respond");

    assert_eq!(
        response
            .headers()
            .get("x-request-id")
            .and_then(|value| value.to_str().ok()),
        Some("deploy-42")
    );
}

#[tokio::test]
async fn webhook_is_hidden_without_secret() {
    let response = app(content(), None)
        .oneshot(revalidate_request(Some(SECRET), ""))
        .await
        .expect("router should respond");

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn wrong_secret_is_rejected_and_cache_kept() {
    let content = content();
    content.pages().await.expect("pages load");

    let response = app(content.clone(), Some(SECRET))
        .oneshot(revalidate_request(Some("guess"), ""))
        .await
        .expect("router should respond");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(content.cache().stats().entries, 1);
}

#[tokio::test]
async fn valid_secret_evicts_cms_data_by_default() {
    let content = content();
    content.pages().await.expect("pages load");

    let response = app(content.clone(), Some(SECRET))
        .oneshot(revalidate_request(Some(SECRET), ""))
        .await
        .expect("router should respond");

    assert_eq!(response.status(), StatusCode::OK);
    let payload: RevalidateResponse = body_json(response).await;
    assert!(payload.revalidated);
    assert_eq!(payload.tags, vec!["cms-data".to_string()]);
    assert_eq!(payload.evicted, 1);
    assert_eq!(content.cache().stats().entries, 0);
}

#[tokio::test]
async fn explicit_tags_are_normalized() {
    let content = content();
    content.pages().await.expect("pages load");

    let response = app(content.clone(), Some(SECRET))
        .oneshot(revalidate_request(
            Some(SECRET),
            r#"{"tags":[" cms-page-p1 ", "cms-page-p1", ""]}"#,
        ))
        .await
        .expect("router should respond");

    assert_eq!(response.status(), StatusCode::OK);
    let payload: RevalidateResponse = body_json(response).await;
    assert_eq!(payload.tags, vec!["cms-page-p1".to_string()]);
    assert_eq!(payload.evicted, 0);
    assert_eq!(content.cache().stats().entries, 1);
}

#[tokio::test]
async fn malformed_body_is_a_bad_request() {
    let response = app(content(), Some(SECRET))
        .oneshot(revalidate_request(Some(SECRET), "{not json"))
        .await
        .expect("router should respond");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn cache_stats_report_entries_and_tags() {
    let content = content();
    content.pages().await.expect("pages load");

    let response = app(content, None)
        .oneshot(
            Request::builder()
                .uri("/api/cache")
                .body(Body::empty())
                .expect("request should build"),
        )
        .await
        .expect("router should respond");

    assert_eq!(response.status(), StatusCode::OK);
    let stats: Value = body_json(response).await;
    assert_eq!(stats["enabled"], json!(true));
    assert_eq!(stats["entries"], json!(1));
    assert_eq!(stats["tags"], json!(1));
    assert_eq!(stats["misses"], json!(1));
}
