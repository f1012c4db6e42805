//! Scripted provider doubles shared by the loop and orchestrator tests.

use anyhow::anyhow;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use crate::llm::TextGenerator;
use crate::search::{SearchProvider, SearchResult};

/// Replays a scripted sequence of responses, then keeps returning the
/// configured default once the script runs out.
pub struct ScriptedGenerator {
    script: Mutex<VecDeque<Result<String, String>>>,
    default: Option<Result<String, String>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new(script: Vec<Result<String, String>>) -> Self {
        ScriptedGenerator {
            script: Mutex::new(script.into()),
            default: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn with_default(script: Vec<Result<String, String>>, default: &str) -> Self {
        let mut generator = Self::new(script);
        generator.default = Some(Ok(default.to_string()));
        generator
    }

    pub fn with_failing_default(script: Vec<Result<String, String>>, message: &str) -> Self {
        let mut generator = Self::new(script);
        generator.default = Some(Err(message.to_string()));
        generator
    }

    /// Same response to every prompt.
    pub fn always(response: &str) -> Self {
        Self::with_default(Vec::new(), response)
    }

    /// Every call fails.
    pub fn failing(message: &str) -> Self {
        Self::with_failing_default(Vec::new(), message)
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, prompt: &str) -> anyhow::Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let next = self.script.lock().unwrap().pop_front();
        match next.or_else(|| self.default.clone()) {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(anyhow!("{}", message)),
            None => Err(anyhow!("scripted generator ran out of responses")),
        }
    }
}

/// Returns the same fixed result set for every query and records the queries
/// it saw.
pub struct ScriptedSearch {
    results: Vec<SearchResult>,
    queries: Mutex<Vec<String>>,
}

impl ScriptedSearch {
    pub fn with_results(results: Vec<SearchResult>) -> Self {
        ScriptedSearch {
            results,
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn empty() -> Self {
        Self::with_results(Vec::new())
    }

    pub fn query_count(&self) -> usize {
        self.queries.lock().unwrap().len()
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl SearchProvider for ScriptedSearch {
    async fn search(
        &self,
        query: &str,
        max_results: usize,
        _timeout: Duration,
    ) -> Vec<SearchResult> {
        self.queries.lock().unwrap().push(query.to_string());
        self.results.iter().take(max_results).cloned().collect()
    }
}

pub fn sample_results(n: usize) -> Vec<SearchResult> {
    (0..n)
        .map(|i| SearchResult {
            title: format!("result {}", i),
            url: format!("https://example.com/{}", i),
            content: format!("content for result {}", i),
            score: Some(1.0 - i as f64 * 0.1),
        })
        .collect()
}
