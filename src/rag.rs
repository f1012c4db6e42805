use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::RagConfig;
use crate::search::{SearchProvider, SearchResult};

// Embeddings are computed over a bounded prefix of each result; full page
// contents blow past embedding-model context windows.
const MAX_EMBED_CHARS: usize = 2000;

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

/// Reranks search results by embedding similarity to the query, keeping the
/// top-k. Uses Ollama's embedding API.
pub struct EmbeddingReranker {
    host: String,
    model: String,
    top_k: usize,
    client: reqwest::Client,
}

impl EmbeddingReranker {
    pub fn from_config(config: &RagConfig) -> Self {
        EmbeddingReranker {
            host: config.host.clone(),
            model: config.embedding_model.clone(),
            top_k: config.top_k,
            client: reqwest::Client::new(),
        }
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let truncated: String = text.chars().take(MAX_EMBED_CHARS).collect();
        let url = format!("{}/api/embeddings", self.host);

        let request = EmbeddingRequest {
            model: &self.model,
            prompt: &truncated,
        };

        let response = self.client.post(&url).json(&request).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("embedding API error ({}): {}", status, body));
        }

        let embedding_response: EmbeddingResponse = response.json().await?;
        Ok(embedding_response.embedding)
    }

    async fn rerank(&self, query: &str, results: &[SearchResult]) -> Result<Vec<SearchResult>> {
        let query_embedding = self.embed(query).await?;

        let mut scores = Vec::with_capacity(results.len());
        for result in results {
            let text = format!("{}\n{}", result.title, result.content);
            let embedding = self.embed(&text).await?;
            scores.push(cosine_similarity(&query_embedding, &embedding));
        }

        let order = rank_by_score(&scores, self.top_k);
        Ok(order.into_iter().map(|i| results[i].clone()).collect())
    }
}

/// Indices of the `top_k` highest scores, best first. Stable for ties.
fn rank_by_score(scores: &[f32], top_k: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].partial_cmp(&scores[a]).unwrap_or(std::cmp::Ordering::Equal));
    order.truncate(top_k);
    order
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let magnitude_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let magnitude_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return 0.0;
    }

    dot_product / (magnitude_a * magnitude_b)
}

/// Search provider decorator: searches through the inner provider, then
/// reranks by embedding similarity. Rerank failures degrade to the raw
/// result order.
pub struct RagSearchProvider<P> {
    inner: P,
    reranker: EmbeddingReranker,
}

impl<P: SearchProvider> RagSearchProvider<P> {
    pub fn new(inner: P, reranker: EmbeddingReranker) -> Self {
        RagSearchProvider { inner, reranker }
    }
}

#[async_trait]
impl<P: SearchProvider> SearchProvider for RagSearchProvider<P> {
    async fn search(
        &self,
        query: &str,
        max_results: usize,
        timeout: Duration,
    ) -> Vec<SearchResult> {
        let results = self.inner.search(query, max_results, timeout).await;
        if results.is_empty() {
            return results;
        }

        match self.reranker.rerank(query, &results).await {
            Ok(ranked) => ranked,
            Err(e) => {
                eprintln!("[rag] rerank failed: {}, using raw result order", e);
                results
            }
        }
    }
}
