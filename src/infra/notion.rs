//! Notion API adapter for the document store port.

use async_trait::async_trait;
use axum::http::{HeaderValue, header::AUTHORIZATION};
use metrics::counter;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, instrument};
use url::Url;

use crate::application::store::{
    DocumentStore, FilterSpec, PropertyFilter, RawRecord, ResultPage, StoreError,
};
use crate::config::CmsSettings;
use crate::domain::entities::ContentBlock;

use super::error::InfraError;

const NOTION_VERSION_HEADER: &str = "Notion-Version";
const METRIC_STORE_REQUESTS: &str = "folio_store_requests_total";

pub struct NotionClient {
    http: Client,
    base: Url,
    token: Option<String>,
    version: String,
}

#[derive(Debug, Serialize)]
struct QueryBody<'a> {
    page_size: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    start_cursor: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    sorts: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

impl NotionClient {
    pub fn new(settings: &CmsSettings) -> Result<Self, InfraError> {
        let http = Client::builder()
            .user_agent(Self::user_agent())
            .timeout(settings.timeout)
            .build()
            .map_err(|err| InfraError::configuration(format!("failed to build CMS client: {err}")))?;

        Ok(Self {
            http,
            base: settings.api_base_url.clone(),
            token: settings.access_token.clone(),
            version: settings.notion_version.clone(),
        })
    }

    pub fn user_agent() -> &'static str {
        concat!("folio/", env!("CARGO_PKG_VERSION"))
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, StoreError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::protocol(format!("CMS base URL `{}` cannot be a base", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn auth_header(&self) -> Result<HeaderValue, StoreError> {
        let token = self
            .token
            .as_deref()
            .ok_or(StoreError::Configuration {
                key: "cms.access_token",
            })?;
        HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| StoreError::Configuration {
                key: "cms.access_token",
            })
    }

    fn authorize(&self, request: RequestBuilder) -> Result<RequestBuilder, StoreError> {
        Ok(request
            .header(AUTHORIZATION, self.auth_header()?)
            .header(NOTION_VERSION_HEADER, self.version.as_str()))
    }

    async fn send<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<T, StoreError> {
        counter!(METRIC_STORE_REQUESTS, "op" => operation).increment(1);
        let response = self
            .authorize(request)?
            .send()
            .await
            .map_err(StoreError::transport)?;
        Self::handle(response).await
    }

    async fn handle<T: DeserializeOwned>(response: Response) -> Result<T, StoreError> {
        let status = response.status();
        let bytes = response.bytes().await.map_err(StoreError::transport)?;
        if !status.is_success() {
            let body: ApiErrorBody = serde_json::from_slice(&bytes).unwrap_or(ApiErrorBody {
                code: String::new(),
                message: String::from_utf8_lossy(&bytes).into_owned(),
            });
            return Err(StoreError::Api {
                status: status.as_u16(),
                code: if body.code.is_empty() {
                    "unknown".to_string()
                } else {
                    body.code
                },
                message: body.message,
            });
        }
        serde_json::from_slice(&bytes)
            .map_err(|err| StoreError::protocol(format!("failed to parse CMS response: {err}")))
    }
}

fn query_body<'a>(spec: &FilterSpec, cursor: Option<&'a str>) -> QueryBody<'a> {
    let filter = spec.filter().map(|filter| match filter {
        PropertyFilter::Checkbox { property, equals } => json!({
            "property": property,
            "checkbox": { "equals": equals },
        }),
    });
    let sorts = spec
        .sorts()
        .iter()
        .map(|sort| json!({ "property": sort.property, "direction": sort.direction.as_str() }))
        .collect();

    QueryBody {
        page_size: spec.page_size(),
        start_cursor: cursor,
        filter,
        sorts,
    }
}

#[async_trait]
impl DocumentStore for NotionClient {
    #[instrument(skip(self, spec), fields(database_id = spec.database_id()))]
    async fn query_database(
        &self,
        spec: &FilterSpec,
        cursor: Option<&str>,
    ) -> Result<ResultPage<RawRecord>, StoreError> {
        let url = self.endpoint(&["databases", spec.database_id(), "query"])?;
        let body = query_body(spec, cursor);
        debug!(url = %url, "querying CMS database");
        self.send("query_database", self.http.post(url).json(&body))
            .await
    }

    #[instrument(skip(self))]
    async fn block_children(
        &self,
        block_id: &str,
        page_size: u32,
        cursor: Option<&str>,
    ) -> Result<ResultPage<ContentBlock>, StoreError> {
        let mut url = self.endpoint(&["blocks", block_id, "children"])?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("page_size", &page_size.to_string());
            if let Some(cursor) = cursor {
                query.append_pair("start_cursor", cursor);
            }
        }
        debug!(url = %url, "listing CMS block children");
        self.send("block_children", self.http.get(url)).await
    }
}
