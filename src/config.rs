use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub llm: LlmConfig,
    pub search: SearchConfig,
    pub research: ResearchConfig,
    pub extraction: ExtractionConfig,
    pub rag: RagConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        LlmConfig {
            base_url: "https://api.deepseek.com".to_string(),
            model: "deepseek-chat".to_string(),
            api_key_env: "DEEPSEEK_API_KEY".to_string(),
            temperature: 0.3,
            max_tokens: None,
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SearchConfig {
    pub endpoint: String,
    pub api_key_env: String,
    pub search_depth: String,
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            endpoint: "https://api.tavily.com/search".to_string(),
            api_key_env: "TAVILY_API_KEY".to_string(),
            search_depth: "advanced".to_string(),
            timeout_secs: 240,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ResearchConfig {
    /// Reflection rounds per section, after the initial pass. Fixed, not
    /// quality-gated.
    pub max_reflections: usize,
    pub max_search_results: usize,
    /// Per-result content cap (in characters) when formatting search
    /// results into a prompt.
    pub max_content_length: usize,
    pub generation_retries: u32,
    pub retry_delay_secs: u64,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        ResearchConfig {
            max_reflections: 2,
            max_search_results: 5,
            max_content_length: 20_000,
            generation_retries: 3,
            retry_delay_secs: 2,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Attempt ceiling per chart shape before falling back to canned data.
    pub max_attempts: u32,
    pub max_results_per_query: usize,
    /// Pause between consecutive search queries within one attempt.
    pub query_delay_ms: u64,
    pub generation_retries: u32,
    pub retry_delay_secs: u64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        ExtractionConfig {
            max_attempts: 3,
            max_results_per_query: 3,
            query_delay_ms: 1000,
            generation_retries: 3,
            retry_delay_secs: 2,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RagConfig {
    pub enabled: bool,
    pub host: String,
    pub embedding_model: String,
    pub top_k: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        RagConfig {
            enabled: false,
            host: "http://localhost:11434".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            top_k: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OutputConfig {
    pub output_dir: String,
    pub save_intermediate_states: bool,
    pub record_history: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            output_dir: "output".to_string(),
            save_intermediate_states: true,
            record_history: true,
        }
    }
}

impl Config {
    pub fn load() -> Self {
        let config_path = Self::get_config_path();

        if config_path.exists() {
            match fs::read_to_string(&config_path) {
                Ok(contents) => match toml::from_str(&contents) {
                    Ok(config) => return config,
                    Err(e) => eprintln!("Error parsing config.toml: {}. Using defaults.", e),
                },
                Err(e) => eprintln!("Error reading config.toml: {}. Using defaults.", e),
            }
        } else {
            // Create config directory if it doesn't exist
            if let Some(parent) = config_path.parent() {
                let _ = fs::create_dir_all(parent);
            }
        }

        Config::default()
    }

    pub fn get_config_path() -> PathBuf {
        if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home).join(".config/fathom/config.toml")
        } else {
            PathBuf::from("config.toml")
        }
    }

    pub fn get_config_dir() -> PathBuf {
        if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home).join(".config/fathom")
        } else {
            PathBuf::from(".")
        }
    }
}
