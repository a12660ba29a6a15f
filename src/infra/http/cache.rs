use axum::{Json, extract::State};

use crate::cache::CacheStats;

use super::HttpState;

pub(super) async fn cache_stats(State(state): State<HttpState>) -> Json<CacheStats> {
    Json(state.content.cache().stats())
}
