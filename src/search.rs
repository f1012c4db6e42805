use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::SearchConfig;

macro_rules! debug_println {
    ($($arg:tt)*) => {
        if std::env::var("FATHOM_DEBUG").is_ok() {
            eprintln!($($arg)*);
        }
    };
}

/// One result from the search provider. Immutable once received; the
/// relevance score is not guaranteed to be present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

/// The search side of the pipeline. A failed or timed-out search yields an
/// empty list; the refinement loops treat that as "no evidence", never as an
/// error.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(
        &self,
        query: &str,
        max_results: usize,
        timeout: Duration,
    ) -> Vec<SearchResult>;
}

#[derive(Debug, Serialize)]
struct TavilyRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    search_depth: &'a str,
    include_answer: bool,
    include_raw_content: bool,
    max_results: usize,
    include_images: bool,
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
    score: Option<f64>,
}

pub struct TavilyClient {
    endpoint: String,
    api_key: String,
    search_depth: String,
    client: reqwest::Client,
}

impl TavilyClient {
    pub fn with_config(endpoint: String, api_key: String, search_depth: String) -> Self {
        TavilyClient {
            endpoint,
            api_key,
            search_depth,
            client: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &SearchConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| anyhow!("{} is not set", config.api_key_env))?;
        Ok(Self::with_config(
            config.endpoint.clone(),
            api_key,
            config.search_depth.clone(),
        ))
    }

    async fn try_search(
        &self,
        query: &str,
        max_results: usize,
        timeout: Duration,
    ) -> Result<Vec<SearchResult>> {
        let request = TavilyRequest {
            api_key: &self.api_key,
            query,
            search_depth: &self.search_depth,
            include_answer: true,
            include_raw_content: false,
            max_results,
            include_images: false,
        };

        debug_println!("[search] POST {} query={:?}", self.endpoint, query);

        let response = tokio::time::timeout(
            timeout,
            self.client.post(&self.endpoint).json(&request).send(),
        )
        .await
        .map_err(|_| anyhow!("search timed out after {}s", timeout.as_secs()))??;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("search API error ({}): {}", status, body));
        }

        let parsed: TavilyResponse = response.json().await?;
        Ok(parsed
            .results
            .into_iter()
            .map(|r| SearchResult {
                title: r.title,
                url: r.url,
                content: r.content,
                score: r.score,
            })
            .collect())
    }
}

#[async_trait]
impl SearchProvider for TavilyClient {
    async fn search(
        &self,
        query: &str,
        max_results: usize,
        timeout: Duration,
    ) -> Vec<SearchResult> {
        match self.try_search(query, max_results, timeout).await {
            Ok(results) => results,
            Err(e) => {
                eprintln!("[search] search failed: {}", e);
                Vec::new()
            }
        }
    }
}
