//! Web search through Jina's search endpoint.

use async_trait::async_trait;
use reqwest::{header, Client, Url};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::domain::models::RetrievalConfig;
use crate::domain::ports::{RetrievalError, Retriever, SearchHit};

const SOURCE_NAME: &str = "jina";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default, alias = "results")]
    data: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    content: Option<String>,
}

impl From<SearchItem> for SearchHit {
    fn from(item: SearchItem) -> Self {
        let snippet = item
            .description
            .filter(|d| !d.is_empty())
            .or(item.content)
            .unwrap_or_default();
        Self {
            title: item.title,
            url: item.url,
            snippet,
            source: SOURCE_NAME.to_string(),
        }
    }
}

/// Jina works without a key at a lower rate limit.
pub struct JinaRetriever {
    http_client: Client,
    base_url: Url,
    api_key: Option<String>,
}

impl JinaRetriever {
    pub fn from_config(config: &RetrievalConfig) -> Result<Self, RetrievalError> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| RetrievalError::Request(format!("invalid search URL {}: {e}", config.base_url)))?;
        if base_url.cannot_be_a_base() {
            return Err(RetrievalError::Request(format!(
                "search URL cannot take a path: {}",
                config.base_url
            )));
        }
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RetrievalError::Request(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http_client,
            base_url,
            api_key: std::env::var(&config.api_key_env)
                .ok()
                .filter(|key| !key.trim().is_empty()),
        })
    }

    fn search_url(&self, query: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(query);
        }
        url
    }
}

#[async_trait]
impl Retriever for JinaRetriever {
    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    #[instrument(skip(self))]
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>, RetrievalError> {
        let url = self.search_url(query);
        debug!(%url, "GET search");

        let mut request = self
            .http_client
            .get(url)
            .header(header::ACCEPT, "application/json");
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| RetrievalError::Request(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "search API error");
            return Err(RetrievalError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| RetrievalError::InvalidResponse(e.to_string()))?;
        Ok(body
            .data
            .into_iter()
            .take(max_results)
            .map(SearchHit::from)
            .collect())
    }
}
