use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::LlmConfig;

macro_rules! debug_println {
    ($($arg:tt)*) => {
        if std::env::var("FATHOM_DEBUG").is_ok() {
            eprintln!($($arg)*);
        }
    };
}

/// The text-generation side of the pipeline. Implementations are stateless
/// request/response clients and can be shared across concurrent workers.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

/// Chat-completions client for DeepSeek (OpenAI-compatible wire format).
pub struct DeepSeekClient {
    base_url: String,
    model: String,
    api_key: String,
    temperature: f32,
    max_tokens: Option<u32>,
    timeout: Duration,
    client: reqwest::Client,
}

impl DeepSeekClient {
    pub fn with_config(base_url: String, model: String, api_key: String) -> Self {
        DeepSeekClient {
            base_url,
            model,
            api_key,
            temperature: 0.3,
            max_tokens: None,
            timeout: Duration::from_secs(120),
            client: reqwest::Client::new(),
        }
    }

    /// Builds a client from config; the API key is read from the environment
    /// variable named in the config.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| anyhow!("{} is not set", config.api_key_env))?;
        let mut client = Self::with_config(config.base_url.clone(), config.model.clone(), api_key);
        client.temperature = config.temperature;
        client.max_tokens = config.max_tokens;
        client.timeout = Duration::from_secs(config.timeout_secs);
        Ok(client)
    }
}

#[async_trait]
impl TextGenerator for DeepSeekClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/v1/chat/completions", self.base_url);

        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream: false,
        };

        debug_println!("[llm] POST {} ({} chars)", url, prompt.len());

        let response = tokio::time::timeout(
            self.timeout,
            self.client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&request)
                .send(),
        )
        .await
        .map_err(|_| anyhow!("generation timed out after {}s", self.timeout.as_secs()))??;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("generation API error ({}): {}", status, body));
        }

        let parsed: ChatResponse = response.json().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();

        if content.trim().is_empty() {
            return Err(anyhow!("generator returned an empty response"));
        }

        Ok(content)
    }
}

/// Calls the generator up to `max_attempts` times with a fixed delay between
/// attempts. An empty response counts as a failure.
pub async fn generate_with_retry(
    generator: &dyn TextGenerator,
    prompt: &str,
    max_attempts: u32,
    delay: Duration,
) -> Result<String> {
    let mut last_err = None;

    for attempt in 1..=max_attempts.max(1) {
        match generator.generate(prompt).await {
            Ok(text) if !text.trim().is_empty() => return Ok(text),
            Ok(_) => last_err = Some(anyhow!("generator returned an empty response")),
            Err(e) => last_err = Some(e),
        }
        if attempt < max_attempts {
            eprintln!(
                "[llm] generation failed, retrying... (attempt {}/{})",
                attempt, max_attempts
            );
            tokio::time::sleep(delay).await;
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow!("generation failed")))
}
