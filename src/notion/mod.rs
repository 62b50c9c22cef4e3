//! Notion API client and the pagination cursor walk.
//!
//! [`NotionClient`] owns the HTTP transport and auth headers. The sync
//! engine never talks to it directly; it goes through the [`RecordSource`]
//! trait so tests can substitute a scripted source.

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde_json::{json, Value};
use std::fmt;
use tracing::warn;

use crate::error::SyncError;

pub mod model;

pub use model::{PageEnvelope, RecordPage};

const NOTION_API_BASE: &str = "https://api.notion.com/";

#[derive(Clone)]
pub struct NotionClient {
    http: Client,
    base_url: Url,
    token: String,
    version: String,
}

impl fmt::Debug for NotionClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotionClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

/// Paginated remote source of records and their nested block content.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Fetch one page of records, resuming from `cursor` when given.
    async fn query_page(
        &self,
        page_size: u32,
        cursor: Option<&str>,
    ) -> Result<RecordPage, SyncError>;

    /// Fetch one page of a record's child blocks.
    async fn blocks_page(
        &self,
        record_id: &str,
        cursor: Option<&str>,
    ) -> Result<RecordPage, SyncError>;
}

impl NotionClient {
    pub fn new(token: String, version: String) -> Self {
        let base_url = Url::parse(NOTION_API_BASE).expect("valid default Notion URL");
        Self::with_base_url(token, version, base_url)
    }

    pub fn with_base_url(token: String, version: String, base_url: Url) -> Self {
        let http = Client::builder()
            .user_agent("studyhub/0.1")
            .no_proxy()
            .build()
            .expect("reqwest client");
        Self {
            http,
            base_url,
            token,
            version,
        }
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header("Authorization", format!("Bearer {}", self.token))
            .header("Notion-Version", &self.version)
    }

    /// POST `v1/databases/{id}/query` with a page-size hint and optional
    /// continuation cursor; returns the validated pagination envelope.
    pub async fn query_database_page(
        &self,
        database_id: &str,
        page_size: u32,
        cursor: Option<&str>,
    ) -> Result<RecordPage, SyncError> {
        let url = self
            .base_url
            .join(&format!("v1/databases/{database_id}/query"))
            .map_err(|e| SyncError::Transport(anyhow!(e).context("invalid Notion base URL")))?;

        let mut body = json!({ "page_size": page_size });
        if let Some(cursor) = cursor {
            body["start_cursor"] = Value::String(cursor.to_string());
        }

        let context = format!("query page of database {database_id}");
        let res = self
            .authed(self.http.post(url).json(&body))
            .send()
            .await
            .map_err(|e| SyncError::Transport(anyhow!(e).context("failed to reach Notion")))?;
        self.read_envelope(res, &context).await
    }

    /// GET `v1/blocks/{id}/children`, optionally resuming from a cursor.
    pub async fn block_children_page(
        &self,
        block_id: &str,
        cursor: Option<&str>,
    ) -> Result<RecordPage, SyncError> {
        let mut url = self
            .base_url
            .join(&format!("v1/blocks/{block_id}/children"))
            .map_err(|e| SyncError::Transport(anyhow!(e).context("invalid Notion base URL")))?;
        if let Some(cursor) = cursor {
            url.query_pairs_mut().append_pair("start_cursor", cursor);
        }

        let context = format!("block children of {block_id}");
        let res = self
            .authed(self.http.get(url))
            .send()
            .await
            .map_err(|e| SyncError::Transport(anyhow!(e).context("failed to reach Notion")))?;
        self.read_envelope(res, &context).await
    }

    async fn read_envelope(
        &self,
        res: reqwest::Response,
        context: &str,
    ) -> Result<RecordPage, SyncError> {
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            warn!(%status, context, body, "Notion API error");
            return Err(SyncError::Transport(anyhow!(
                "notion error {status} during {context}: {body}"
            )));
        }
        let envelope: PageEnvelope = res
            .json()
            .await
            .map_err(|e| SyncError::protocol(format!("{context}: invalid JSON body ({e})")))?;
        envelope.validate(context)
    }

    /// Authenticated pass-through to an arbitrary Notion API path. Returns
    /// the upstream status together with the JSON body so the router can
    /// forward both verbatim.
    pub async fn proxy(
        &self,
        method: &str,
        path: &str,
        body: Option<&Value>,
    ) -> anyhow::Result<(StatusCode, Value)> {
        let url = self
            .base_url
            .join(&format!("v1{path}"))
            .context("invalid Notion proxy path")?;
        let method =
            reqwest::Method::from_bytes(method.as_bytes()).context("invalid HTTP method")?;

        let mut req = self.authed(self.http.request(method, url));
        if let Some(body) = body {
            req = req.json(body);
        }
        let res = req.send().await.context("failed to reach Notion")?;

        let status = res.status();
        let body = res
            .json::<Value>()
            .await
            .unwrap_or_else(|_| json!({ "error": "Notion API request failed" }));
        Ok((status, body))
    }
}

/// The configured Notion database, seen through [`RecordSource`].
#[derive(Debug, Clone)]
pub struct NotionSource {
    client: NotionClient,
    database_id: String,
}

impl NotionSource {
    pub fn new(client: NotionClient, database_id: String) -> Self {
        Self {
            client,
            database_id,
        }
    }
}

#[async_trait]
impl RecordSource for NotionSource {
    async fn query_page(
        &self,
        page_size: u32,
        cursor: Option<&str>,
    ) -> Result<RecordPage, SyncError> {
        self.client
            .query_database_page(&self.database_id, page_size, cursor)
            .await
    }

    async fn blocks_page(
        &self,
        record_id: &str,
        cursor: Option<&str>,
    ) -> Result<RecordPage, SyncError> {
        self.client.block_children_page(record_id, cursor).await
    }
}

/// Walk the full record set of the source, following continuation cursors
/// until the source reports no more pages. Delivery order is preserved and
/// never re-sorted. An empty first page yields an empty Vec.
pub async fn collect_records(
    source: &dyn RecordSource,
    page_size: u32,
) -> Result<Vec<Value>, SyncError> {
    let mut all = Vec::new();
    let mut cursor: Option<String> = None;
    loop {
        let page = source.query_page(page_size, cursor.as_deref()).await?;
        all.extend(page.results);
        if !page.has_more {
            break;
        }
        // A page claiming more data but carrying no cursor would silently
        // desynchronize the walk; refuse to continue past it.
        cursor = Some(page.next_cursor.ok_or_else(|| {
            SyncError::protocol("page reported has_more but carried no next_cursor")
        })?);
    }
    Ok(all)
}

/// Walk one record's full child-block list, same cursor protocol as
/// [`collect_records`].
pub async fn collect_blocks(
    source: &dyn RecordSource,
    record_id: &str,
) -> Result<Vec<Value>, SyncError> {
    let mut all = Vec::new();
    let mut cursor: Option<String> = None;
    loop {
        let page = source.blocks_page(record_id, cursor.as_deref()).await?;
        all.extend(page.results);
        if !page.has_more {
            break;
        }
        cursor = Some(page.next_cursor.ok_or_else(|| {
            SyncError::protocol(format!(
                "block page of {record_id} reported has_more but carried no next_cursor"
            ))
        })?);
    }
    Ok(all)
}
