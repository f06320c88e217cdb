//! Web search capability.
//!
//! The engine only needs an ordered list of candidate URLs per query. The
//! bundled implementation scrapes the DuckDuckGo HTML endpoint.

use crate::config::SearchConfig;
use async_trait::async_trait;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

/// Failures of a single search request.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Search request failed: {0}")]
    Request(String),

    #[error("Search engine returned HTTP {0}")]
    Status(u16),

    #[error("Search results could not be parsed: {0}")]
    Parse(String),
}

/// Returns up to `count` unique result URLs for `query`, in engine order.
#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, query: &str, count: usize) -> Result<Vec<String>, SearchError>;
}

/// DuckDuckGo HTML search with a region hint.
pub struct DuckDuckGoSearch {
    client: reqwest::Client,
    endpoint: String,
    region: String,
}

impl DuckDuckGoSearch {
    pub fn new(config: &SearchConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create search client: {}", e))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            region: config.region.clone(),
        })
    }
}

#[async_trait]
impl WebSearch for DuckDuckGoSearch {
    async fn search(&self, query: &str, count: usize) -> Result<Vec<String>, SearchError> {
        debug!("Searching for {:?} (want {})", query, count);

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("q", query), ("kl", self.region.as_str())])
            .send()
            .await
            .map_err(|e| SearchError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SearchError::Status(response.status().as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| SearchError::Request(e.to_string()))?;

        let urls = parse_result_links(&body, count)?;
        debug!("Search for {:?} returned {} urls", query, urls.len());
        Ok(urls)
    }
}

/// Pull result URLs out of a DuckDuckGo HTML result page.
///
/// Redirect links (`/l/?uddg=...`) are unwrapped, ads and engine-internal
/// links are skipped, and duplicates keep their first position.
pub fn parse_result_links(html: &str, count: usize) -> Result<Vec<String>, SearchError> {
    let document = Html::parse_document(html);
    let selector =
        Selector::parse("a.result__a").map_err(|e| SearchError::Parse(e.to_string()))?;
    let base = Url::parse("https://duckduckgo.com/").map_err(|e| SearchError::Parse(e.to_string()))?;

    let mut seen = HashSet::new();
    let mut urls = Vec::new();

    for href in document
        .select(&selector)
        .filter_map(|anchor| anchor.value().attr("href"))
    {
        if urls.len() >= count {
            break;
        }

        let Some(target) = resolve_result_href(&base, href) else {
            continue;
        };

        if seen.insert(target.clone()) {
            urls.push(target);
        }
    }

    Ok(urls)
}

fn resolve_result_href(base: &Url, href: &str) -> Option<String> {
    let url = base.join(href).ok()?;

    let target = if url.domain() == Some("duckduckgo.com") && url.path() == "/l/" {
        let (_, value) = url.query_pairs().find(|(key, _)| key == "uddg")?;
        Url::parse(&value).ok()?
    } else {
        url
    };

    let internal = target
        .domain()
        .map(|domain| domain.ends_with("duckduckgo.com"))
        .unwrap_or(true);

    if internal || !matches!(target.scheme(), "http" | "https") {
        return None;
    }

    Some(target.to_string())
}
