//! Notion REST client used by the reconciler.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::check_response;
use super::traits::{IdentityProvider, NotionApi, Service};
use crate::error::Result;
use crate::sync::types::{NotionTaskRecord, PropertyBag};

pub const NOTION_API_BASE: &str = "https://api.notion.com/v1";
pub const NOTION_VERSION: &str = "2022-06-28";

const PAGE_SIZE: u32 = 100;

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    results: Vec<NotionTaskRecord>,
    #[serde(default)]
    has_more: bool,
    #[serde(default)]
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DatabaseResponse {
    #[serde(default)]
    properties: PropertyBag,
}

#[derive(Debug, Deserialize)]
struct PageResponse {
    id: String,
}

pub struct NotionClient {
    http: Client,
    base_url: String,
    version: String,
    identity: Arc<dyn IdentityProvider>,
}

impl NotionClient {
    pub fn new(identity: Arc<dyn IdentityProvider>) -> Self {
        Self::with_base_url(identity, NOTION_API_BASE, NOTION_VERSION, Duration::from_secs(30))
    }

    /// Point the client at another base URL (mock servers, proxies).
    pub fn with_base_url(
        identity: Arc<dyn IdentityProvider>,
        base_url: &str,
        version: &str,
        timeout: Duration,
    ) -> Self {
        Self {
            http: Client::builder().timeout(timeout).build().unwrap_or_default(),
            base_url: base_url.trim_end_matches('/').to_string(),
            version: version.to_string(),
            identity,
        }
    }

    async fn request(&self, method: reqwest::Method, path: &str) -> Result<reqwest::RequestBuilder> {
        let token = self.identity.access_token(Service::Notion).await?;
        Ok(self
            .http
            .request(method, format!("{}{path}", self.base_url))
            .bearer_auth(token)
            .header("Notion-Version", &self.version))
    }
}

#[async_trait]
impl NotionApi for NotionClient {
    async fn list_pages(&self, database_id: &str) -> Result<Vec<NotionTaskRecord>> {
        let path = format!("/databases/{database_id}/query");
        let mut pages = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut body = json!({ "page_size": PAGE_SIZE });
            if let Some(c) = &cursor {
                body["start_cursor"] = json!(c);
            }

            let resp = self
                .request(reqwest::Method::POST, &path)
                .await?
                .json(&body)
                .send()
                .await?;
            let page: QueryResponse = check_response(Service::Notion, resp).await?.json().await?;
            pages.extend(page.results);

            match page.next_cursor {
                Some(next) if page.has_more => cursor = Some(next),
                _ => break,
            }
        }

        tracing::debug!(database = database_id, count = pages.len(), "Fetched Notion pages");
        Ok(pages)
    }

    async fn get_schema(&self, database_id: &str) -> Result<PropertyBag> {
        let resp = self
            .request(reqwest::Method::GET, &format!("/databases/{database_id}"))
            .await?
            .send()
            .await?;
        let db: DatabaseResponse = check_response(Service::Notion, resp).await?.json().await?;
        Ok(db.properties)
    }

    async fn create_page(&self, database_id: &str, properties: PropertyBag) -> Result<String> {
        let body = json!({
            "parent": { "database_id": database_id },
            "properties": properties,
        });
        let resp = self
            .request(reqwest::Method::POST, "/pages")
            .await?
            .json(&body)
            .send()
            .await?;
        let page: PageResponse = check_response(Service::Notion, resp).await?.json().await?;
        Ok(page.id)
    }

    async fn update_page(&self, page_id: &str, properties: PropertyBag) -> Result<()> {
        let resp = self
            .request(reqwest::Method::PATCH, &format!("/pages/{page_id}"))
            .await?
            .json(&json!({ "properties": properties }))
            .send()
            .await?;
        check_response(Service::Notion, resp).await?;
        Ok(())
    }
}
