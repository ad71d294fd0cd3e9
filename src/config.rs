//! TOML configuration parsing and validation.
//!
//! Configuration is loaded once at startup by [`load_config`] and passed
//! by reference into every adapter constructor. All sections are optional;
//! a handful of environment variables override the file after parsing:
//!
//! | Variable | Overrides |
//! |----------|-----------|
//! | `ELASTICSEARCH_URL` | `search.url` |
//! | `OLLAMA_HOST` | `model.url` |
//! | `DEFAULT_MODEL` | `model.default_model` |
//! | `RAGD_BIND` | `server.bind` |

use anyhow::{Context, Result};
use rag_harness_core::admin::SeedMode;
use rag_harness_core::retrieve::RetrievalParams;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub seed: SeedConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Allowed CORS origins. Empty or `["*"]` allows any origin.
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            cors_origins: default_cors_origins(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8000".to_string()
}
fn default_cors_origins() -> Vec<String> {
    vec!["http://localhost:3000".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_search_url")]
    pub url: String,
    #[serde(default = "default_index")]
    pub index: String,
    /// Hits requested from the engine per query.
    #[serde(default = "default_search_size")]
    pub search_size: usize,
    /// Maximum documents returned when listing the corpus.
    #[serde(default = "default_list_limit")]
    pub list_limit: usize,
    /// Make writes visible to search before returning.
    #[serde(default = "default_true")]
    pub refresh_on_write: bool,
    #[serde(default = "default_search_timeout")]
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            url: default_search_url(),
            index: default_index(),
            search_size: default_search_size(),
            list_limit: default_list_limit(),
            refresh_on_write: true,
            timeout_secs: default_search_timeout(),
        }
    }
}

fn default_search_url() -> String {
    "http://elasticsearch:9200".to_string()
}
fn default_index() -> String {
    "context".to_string()
}
fn default_search_size() -> usize {
    10
}
fn default_list_limit() -> usize {
    100
}
fn default_true() -> bool {
    true
}
fn default_search_timeout() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    #[serde(default = "default_model_url")]
    pub url: String,
    #[serde(default = "default_model_name")]
    pub default_model: String,
    /// Whole-request timeout for non-streaming generation. Streaming
    /// requests only apply it to connection setup.
    #[serde(default = "default_model_timeout")]
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            url: default_model_url(),
            default_model: default_model_name(),
            timeout_secs: default_model_timeout(),
        }
    }
}

fn default_model_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_model_name() -> String {
    "llama2".to_string()
}
fn default_model_timeout() -> u64 {
    300
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    /// Model turns allowed before the agent gives up on a final answer.
    #[serde(default = "default_agent_max_steps")]
    pub max_steps: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: default_agent_max_steps(),
        }
    }
}

fn default_agent_max_steps() -> usize {
    6
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SeedConfig {
    /// Seed the sample corpus when `ragd serve` starts.
    #[serde(default)]
    pub on_startup: bool,
    #[serde(default)]
    pub mode: SeedMode,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// `tracing` filter directive; `RUST_LOG` takes precedence.
    #[serde(default = "default_log_filter")]
    pub filter: String,
    /// Directory for a daily-rolling log file, in addition to stdout.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            dir: None,
        }
    }
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Config {
    pub fn retrieval_params(&self) -> RetrievalParams {
        RetrievalParams {
            index: self.search.index.clone(),
            search_size: self.search.search_size,
            top_k: self.retrieval.top_k,
        }
    }

    /// Apply overrides from process environment variables.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let set = |target: &mut String, key: &str| {
            if let Some(value) = lookup(key).filter(|v| !v.trim().is_empty()) {
                *target = value;
            }
        };
        set(&mut self.search.url, "ELASTICSEARCH_URL");
        set(&mut self.model.url, "OLLAMA_HOST");
        set(&mut self.model.default_model, "DEFAULT_MODEL");
        set(&mut self.server.bind, "RAGD_BIND");
    }

    pub fn validate(&self) -> Result<()> {
        if self.search.url.trim().is_empty() {
            anyhow::bail!("search.url must not be empty");
        }
        if self.search.index.trim().is_empty() {
            anyhow::bail!("search.index must not be empty");
        }
        if self.search.search_size == 0 {
            anyhow::bail!("search.search_size must be >= 1");
        }
        if self.search.list_limit == 0 {
            anyhow::bail!("search.list_limit must be >= 1");
        }
        if self.model.url.trim().is_empty() {
            anyhow::bail!("model.url must not be empty");
        }
        if self.model.default_model.trim().is_empty() {
            anyhow::bail!("model.default_model must not be empty");
        }
        if self.retrieval.top_k == 0 {
            anyhow::bail!("retrieval.top_k must be >= 1");
        }
        if self.agent.max_steps == 0 {
            anyhow::bail!("agent.max_steps must be >= 1");
        }
        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    config.apply_env_overrides();
    config.validate()?;

    Ok(config)
}
