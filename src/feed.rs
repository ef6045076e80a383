// src/feed.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

/// One upstream news item. Transient: fetched, compared, announced (or not),
/// then discarded within a single poll cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewsItem {
    /// Source-assigned identifier, strictly increasing across items
    /// (not necessarily contiguous).
    pub id: u64,
    pub title: String,
    pub body: String,
    pub image_url: String,
    pub canonical_url: String,
}

#[async_trait]
pub trait FeedClient: Send + Sync {
    /// Latest known item, or `None` when the upstream has nothing to report.
    /// Errors are recoverable fetch failures (network/parse), never fatal.
    async fn fetch_latest(&self) -> Result<Option<NewsItem>>;
    fn name(&self) -> &'static str;
}

// Upstream wire shape: `{"Data":[{...}, ...]}` with the newest entry first
// and `id` arriving as a JSON string.
#[derive(Debug, Deserialize)]
struct FeedResponse {
    #[serde(rename = "Data", default)]
    data: Vec<FeedEntry>,
}

#[derive(Debug, Deserialize)]
struct FeedEntry {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    body: String,
    #[serde(rename = "imageurl", default)]
    image_url: String,
    #[serde(rename = "guid", default)]
    guid: String,
}

impl FeedEntry {
    fn into_item(self) -> Result<NewsItem> {
        let id: u64 = self
            .id
            .parse()
            .with_context(|| format!("feed item id is not an integer: {:?}", self.id))?;
        Ok(NewsItem {
            id,
            title: self.title,
            body: self.body,
            image_url: self.image_url,
            canonical_url: self.guid,
        })
    }
}

/// HTTP feed client for the JSON news endpoint.
pub struct HttpFeedClient {
    url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpFeedClient {
    pub fn new(url: String) -> Self {
        Self {
            url,
            client: reqwest::Client::new(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }
}

#[async_trait]
impl FeedClient for HttpFeedClient {
    async fn fetch_latest(&self) -> Result<Option<NewsItem>> {
        let resp = self
            .client
            .get(&self.url)
            .timeout(self.timeout)
            .send()
            .await
            .context("feed request failed")?
            .error_for_status()
            .context("feed returned non-2xx")?;

        let parsed: FeedResponse = resp.json().await.context("parsing feed json")?;

        match parsed.data.into_iter().next() {
            Some(entry) => Ok(Some(entry.into_item()?)),
            None => Ok(None),
        }
    }

    fn name(&self) -> &'static str {
        "http-feed"
    }
}
