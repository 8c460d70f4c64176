//! Document API client (Notion) with cursor pagination support.
//!
//! The pipeline talks to the API through the [`DocumentApi`] trait so tests
//! can substitute an in-memory fake; [`NotionClient`] is the production
//! implementation over reqwest.

use crate::{Block, Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://api.notion.com";
const API_VERSION: &str = "2022-06-28";

/// One page of database query results.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryPage {
    /// Raw page records; shape is property-dependent, so they stay untyped
    /// until [`crate::Page::from_record`] extracts the fields the pipeline
    /// needs.
    pub results: Vec<Value>,
    /// Whether another page of results exists.
    pub has_more: bool,
    /// Cursor for the next page, when `has_more` is set.
    pub next_cursor: Option<String>,
}

/// One page of block children.
#[derive(Debug, Clone, Deserialize)]
pub struct ChildrenPage {
    /// Child blocks in API order.
    pub results: Vec<Block>,
    /// Whether another page of results exists.
    pub has_more: bool,
    /// Cursor for the next page, when `has_more` is set.
    pub next_cursor: Option<String>,
}

/// Abstraction over the document API used by the lister and block fetcher.
#[async_trait]
pub trait DocumentApi: Send + Sync {
    /// Query a database for published pages, optionally resuming at a cursor.
    async fn query_database(&self, database_id: &str, cursor: Option<&str>) -> Result<QueryPage>;

    /// List the direct children of a block, optionally resuming at a cursor.
    async fn list_children(&self, block_id: &str, cursor: Option<&str>) -> Result<ChildrenPage>;

    /// Retrieve a single block record.
    async fn retrieve_block(&self, block_id: &str) -> Result<Block>;
}

/// Production document API client.
pub struct NotionClient {
    client: Client,
    base_url: String,
    token: String,
}

impl NotionClient {
    /// Creates a client against the public API endpoint.
    pub fn new(token: impl Into<String>) -> Result<Self> {
        Self::with_base_url(token, DEFAULT_BASE_URL)
    }

    /// Creates a client against a custom endpoint (tests point this at a
    /// mock server).
    pub fn with_base_url(token: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("pagesync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(Error::Network)?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    /// Filter for the database query: published pages dated on or before now.
    fn published_filter() -> Value {
        json!({
            "and": [
                { "property": "Published", "checkbox": { "equals": true } },
                { "property": "Date", "date": { "on_or_before": Utc::now().to_rfc3339() } },
            ]
        })
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .bearer_auth(&self.token)
            .header("Notion-Version", API_VERSION)
    }
}

/// Turn a non-success response into [`Error::Api`] with the body text.
async fn into_api_result(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response
        .text()
        .await
        .unwrap_or_else(|_| status.to_string());
    Err(Error::Api {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl DocumentApi for NotionClient {
    async fn query_database(&self, database_id: &str, cursor: Option<&str>) -> Result<QueryPage> {
        let url = format!("{}/v1/databases/{database_id}/query", self.base_url);
        let mut body = json!({ "filter": Self::published_filter() });
        if let Some(cursor) = cursor {
            body["start_cursor"] = Value::String(cursor.to_string());
        }
        debug!(database_id, cursor, "querying database");

        let response = self.request(self.client.post(&url)).json(&body).send().await?;
        let page = into_api_result(response).await?.json::<QueryPage>().await?;
        Ok(page)
    }

    async fn list_children(&self, block_id: &str, cursor: Option<&str>) -> Result<ChildrenPage> {
        let url = format!("{}/v1/blocks/{block_id}/children", self.base_url);
        let mut request = self.request(self.client.get(&url));
        if let Some(cursor) = cursor {
            request = request.query(&[("start_cursor", cursor)]);
        }
        debug!(block_id, cursor, "listing block children");

        let response = request.send().await?;
        let page = into_api_result(response)
            .await?
            .json::<ChildrenPage>()
            .await?;
        Ok(page)
    }

    async fn retrieve_block(&self, block_id: &str) -> Result<Block> {
        let url = format!("{}/v1/blocks/{block_id}", self.base_url);
        debug!(block_id, "retrieving block");

        let response = self.request(self.client.get(&url)).send().await?;
        let block = into_api_result(response).await?.json::<Block>().await?;
        Ok(block)
    }
}
