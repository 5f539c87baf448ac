//! Configuration management

use crate::error::{KbgateError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Upstream chat completion service
    #[serde(default)]
    pub llm_service: LLMServiceConfig,

    /// Default generation parameters for gateway requests
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Knowledge base and instruction sources
    #[serde(default)]
    pub knowledge: KnowledgeConfig,

    /// Gateway listen address
    #[serde(default)]
    pub server: ServerConfig,
}

/// Upstream LLM service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMServiceConfig {
    /// Full URL of the chat completions endpoint
    #[serde(default = "default_llm_url")]
    pub url: String,

    /// Model identifier sent with every request
    #[serde(default = "default_chat_model")]
    pub model: String,

    /// Bearer credential (required for `serve` and `ask`)
    #[serde(default = "default_api_key")]
    pub api_key: Option<String>,

    /// Per-attempt timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Total attempts per logical request, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base backoff delay; attempt `n` waits `base * 2^n`
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
}

impl LLMServiceConfig {
    /// Configuration for an explicit endpoint and credential, everything else default
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: Some(api_key.into()),
            ..Self::default()
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}

impl Default for LLMServiceConfig {
    fn default() -> Self {
        Self {
            url: default_llm_url(),
            model: default_chat_model(),
            api_key: default_api_key(),
            timeout_secs: default_timeout(),
            max_attempts: default_max_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
        }
    }
}

fn default_llm_url() -> String {
    std::env::var("KBGATE_LLM_URL")
        .unwrap_or_else(|_| "https://api.deepseek.com/v1/chat/completions".to_string())
}

fn default_chat_model() -> String {
    std::env::var("KBGATE_LLM_MODEL").unwrap_or_else(|_| "deepseek-chat".to_string())
}

fn default_api_key() -> Option<String> {
    std::env::var("KBGATE_API_KEY")
        .or_else(|_| std::env::var("DEEPSEEK_API_KEY"))
        .ok()
        .filter(|k| !k.trim().is_empty())
}

fn default_timeout() -> u64 {
    60
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    1000
}

/// Generation parameters applied to gateway requests
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    4000
}

/// Where the knowledge blob and base instructions come from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    /// Directory of `.txt` / `.pdf` documents
    #[serde(default = "default_knowledge_dir")]
    pub dir: PathBuf,

    /// Optional file overriding the built-in base instructions
    #[serde(default = "default_instructions_file")]
    pub instructions_file: PathBuf,

    /// Ingestion label the model must never reveal
    #[serde(default = "default_internal_marker")]
    pub internal_marker: String,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            dir: default_knowledge_dir(),
            instructions_file: default_instructions_file(),
            internal_marker: default_internal_marker(),
        }
    }
}

fn default_knowledge_dir() -> PathBuf {
    std::env::var("KBGATE_KNOWLEDGE_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("knowledge"))
}

fn default_instructions_file() -> PathBuf {
    std::env::var("KBGATE_INSTRUCTIONS_FILE")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("prompts").join("system_prompt.txt"))
}

fn default_internal_marker() -> String {
    "B1C_".to_string()
}

/// Gateway listen address
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string())
}

fn default_port() -> u16 {
    std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8000)
}

impl Config {
    /// Load config from default path
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path())
    }

    /// Load config from `path`, falling back to defaults when it does not exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = serde_yaml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Get default config path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(crate::CONFIG_DIR_NAME)
            .join("config.yml")
    }

    /// Check the settings needed to talk to the upstream service
    pub fn validate(&self) -> Result<()> {
        if self.llm_service.api_key.is_none() {
            return Err(KbgateError::Config(
                "API key not set (llm_service.api_key, KBGATE_API_KEY or DEEPSEEK_API_KEY)"
                    .to_string(),
            ));
        }
        if self.llm_service.max_attempts == 0 {
            return Err(KbgateError::Config(
                "llm_service.max_attempts must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.generation.temperature) {
            return Err(KbgateError::Config(format!(
                "generation.temperature must be within [0, 1], got {}",
                self.generation.temperature
            )));
        }
        if self.generation.max_tokens == 0 {
            return Err(KbgateError::Config(
                "generation.max_tokens must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
