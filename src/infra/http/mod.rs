//! HTTP surface: health probe, revalidation webhook and cache statistics.

mod cache;
mod middleware;
mod revalidate;

use std::sync::Arc;

use axum::{
    Router,
    http::StatusCode,
    middleware as axum_middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};

use crate::application::content::ContentService;

use middleware::{log_responses, set_request_context};

pub use middleware::RequestContext;
pub use revalidate::{RevalidateRequest, RevalidateResponse};

#[derive(Clone)]
pub struct HttpState {
    pub content: ContentService,
    /// The webhook answers 404 while unset.
    pub revalidate_secret: Option<Arc<str>>,
}

impl HttpState {
    pub fn new(content: ContentService, revalidate_secret: Option<String>) -> Self {
        Self {
            content,
            revalidate_secret: revalidate_secret.map(Arc::from),
        }
    }
}

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/revalidate", post(revalidate::revalidate))
        .route("/api/cache", get(cache::cache_stats))
        .with_state(state)
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}

async fn health() -> Response {
    StatusCode::NO_CONTENT.into_response()
}
