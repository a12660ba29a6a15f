//! Content-update webhook.
//!
//! The CMS automation posts here after an edit; the listed cache tags are
//! invalidated so the next render refetches.

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use time::OffsetDateTime;

use crate::application::error::HttpError;
use crate::cache::{TAG_CMS_DATA, Tag};

use super::HttpState;

const SOURCE: &str = "infra::http::revalidate";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RevalidateRequest {
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevalidateResponse {
    pub revalidated: bool,
    pub tags: Vec<String>,
    pub evicted: usize,
    #[serde(with = "time::serde::rfc3339")]
    pub now: OffsetDateTime,
}

impl RevalidateRequest {
    /// Trimmed, de-duplicated tags; `cms-data` when none are given.
    fn into_tags(self) -> Vec<String> {
        let mut tags: Vec<String> = self
            .tags
            .into_iter()
            .map(|tag| tag.trim().to_string())
            .filter(|tag| !tag.is_empty())
            .collect();
        tags.sort();
        tags.dedup();
        if tags.is_empty() {
            tags.push(TAG_CMS_DATA.to_string());
        }
        tags
    }
}

pub(super) async fn revalidate(
    State(state): State<HttpState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<RevalidateResponse>, HttpError> {
    let Some(secret) = state.revalidate_secret.as_deref() else {
        return Err(HttpError::new(
            SOURCE,
            StatusCode::NOT_FOUND,
            "Not found",
            "revalidation webhook is disabled: no secret configured",
        ));
    };

    let presented = bearer_token(&headers).unwrap_or_default();
    if !secrets_match(presented, secret) {
        return Err(HttpError::new(
            SOURCE,
            StatusCode::UNAUTHORIZED,
            "Invalid secret",
            "revalidation secret missing or wrong",
        ));
    }

    let request: RevalidateRequest = if body.iter().all(u8::is_ascii_whitespace) {
        RevalidateRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|err| {
            HttpError::from_error(SOURCE, StatusCode::BAD_REQUEST, "Invalid request body", &err)
        })?
    };

    let tags = request.into_tags();
    let cache_tags: Vec<Tag> = tags.iter().map(|tag| Tag::new(tag.as_str())).collect();
    let evicted = state.content.revalidate(&cache_tags);

    Ok(Json(RevalidateResponse {
        revalidated: true,
        tags,
        evicted,
        now: OffsetDateTime::now_utc(),
    }))
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

fn secrets_match(presented: &str, expected: &str) -> bool {
    presented.as_bytes().ct_eq(expected.as_bytes()).unwrap_u8() == 1
}
