//! Retrieval port.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One normalized search result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub snippet: String,
    #[serde(default = "default_source")]
    pub source: String,
}

fn default_source() -> String {
    "web".to_string()
}

impl SearchHit {
    pub fn new(title: impl Into<String>, url: impl Into<String>, snippet: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            snippet: snippet.into(),
            source: default_source(),
        }
    }
}

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("Search request failed: {0}")]
    Request(String),

    #[error("Search API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Invalid search response: {0}")]
    InvalidResponse(String),
}

#[async_trait]
pub trait Retriever: Send + Sync {
    fn name(&self) -> &'static str;

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>, RetrievalError>;
}
