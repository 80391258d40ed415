//! Configuration management for Botcast

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};
use crate::scheduling::parse_interval;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub schedule: ScheduleConfig,
    pub content: ContentConfig,
    #[serde(default)]
    pub gate: GateConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    pub generation: GenerationConfig,
    pub platform: PlatformConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Time between cycle completions, e.g. "1h" or "90m"
    #[serde(default = "default_interval")]
    pub interval: String,
    /// Upper bound of the random delay before the first cycle
    #[serde(default = "default_jitter")]
    pub startup_jitter: String,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            startup_jitter: default_jitter(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentConfig {
    pub brand: String,
    #[serde(default)]
    pub site_link: Option<String>,
    #[serde(default = "default_max_length")]
    pub max_length: usize,
    #[serde(default = "default_min_length")]
    pub min_length: usize,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub min_tags: usize,
    pub prompts: Vec<String>,
    /// Total budget for a thread; `None` disables threading
    #[serde(default)]
    pub thread_max_length: Option<usize>,
    #[serde(default = "default_preview_length")]
    pub preview_length: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
    #[serde(default = "default_recent_window")]
    pub recent_window: usize,
    #[serde(default = "default_overlap_threshold")]
    pub overlap_threshold: usize,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            recent_window: default_recent_window(),
            overlap_threshold: default_overlap_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// OpenAI-compatible chat completions URL
    pub endpoint: String,
    pub model: String,
    /// Name of the environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default = "default_generation_timeout")]
    pub timeout: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_token_url")]
    pub token_url: String,
    #[serde(default = "default_authorize_url")]
    pub authorize_url: String,
    pub client_id: String,
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
    #[serde(default = "default_platform_timeout")]
    pub timeout: String,
}

fn default_interval() -> String {
    "1h".to_string()
}

fn default_jitter() -> String {
    "0s".to_string()
}

fn default_max_length() -> usize {
    280
}

fn default_min_length() -> usize {
    40
}

fn default_preview_length() -> usize {
    120
}

fn default_max_attempts() -> usize {
    8
}

fn default_recent_window() -> usize {
    20
}

fn default_overlap_threshold() -> usize {
    12
}

fn default_data_dir() -> String {
    "~/.local/share/botcast".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_generation_timeout() -> String {
    "60s".to_string()
}

fn default_api_base() -> String {
    "https://api.twitter.com/2".to_string()
}

fn default_token_url() -> String {
    "https://api.twitter.com/2/oauth2/token".to_string()
}

fn default_authorize_url() -> String {
    "https://twitter.com/i/oauth2/authorize".to_string()
}

fn default_redirect_uri() -> String {
    "http://127.0.0.1:8080/callback".to_string()
}

fn default_scopes() -> Vec<String> {
    vec![
        "tweet.read".to_string(),
        "tweet.write".to_string(),
        "users.read".to_string(),
        "offline.access".to_string(),
    ]
}

fn default_platform_timeout() -> String {
    "30s".to_string()
}

fn humantime_field(field: &str, value: &str) -> Result<Duration> {
    humantime::parse_duration(value).map_err(|e| {
        ConfigError::InvalidValue {
            field: field.to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load and validate configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make every cycle fail
    pub fn validate(&self) -> Result<()> {
        self.interval()?;
        self.startup_jitter()?;
        self.generation_timeout()?;
        self.platform_timeout()?;

        let invalid = |field: &str, reason: &str| -> Result<()> {
            Err(ConfigError::InvalidValue {
                field: field.to_string(),
                reason: reason.to_string(),
            }
            .into())
        };

        if self.content.max_length == 0 {
            return invalid("content.max_length", "must be greater than zero");
        }
        if self.content.prompts.iter().all(|p| p.trim().is_empty()) {
            return invalid("content.prompts", "at least one prompt is required");
        }
        if self.content.brand.trim().is_empty() {
            return invalid("content.brand", "must not be empty");
        }
        if self.gate.max_attempts == 0 {
            return invalid("gate.max_attempts", "must be at least 1");
        }
        if let Some(budget) = self.content.thread_max_length {
            if budget < self.content.max_length {
                return invalid(
                    "content.thread_max_length",
                    "must not be smaller than content.max_length",
                );
            }
        }
        if self.platform.client_id.trim().is_empty() {
            return Err(ConfigError::MissingField("platform.client_id".to_string()).into());
        }
        Ok(())
    }

    /// Posting interval with the 60 second floor applied
    pub fn interval(&self) -> Result<Duration> {
        parse_interval(&self.schedule.interval)
    }

    pub fn startup_jitter(&self) -> Result<Duration> {
        humantime_field("schedule.startup_jitter", &self.schedule.startup_jitter)
    }

    pub fn generation_timeout(&self) -> Result<Duration> {
        humantime_field("generation.timeout", &self.generation.timeout)
    }

    pub fn platform_timeout(&self) -> Result<Duration> {
        humantime_field("platform.timeout", &self.platform.timeout)
    }

    /// Data directory with `~` expanded
    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.storage.data_dir).to_string())
    }

    pub fn tokens_path(&self) -> PathBuf {
        self.data_dir().join("tokens.json")
    }

    pub fn history_path(&self) -> PathBuf {
        self.data_dir().join("history.jsonl")
    }

    pub fn site_usage_path(&self) -> PathBuf {
        self.data_dir().join("site_usage.json")
    }

    /// Minimal configuration used as a template by `botcast-auth --init`
    pub fn example() -> Self {
        Self {
            schedule: ScheduleConfig::default(),
            content: ContentConfig {
                brand: "Acme".to_string(),
                site_link: Some("https://acme.example".to_string()),
                max_length: default_max_length(),
                min_length: default_min_length(),
                tags: vec!["#acme".to_string(), "#rust".to_string()],
                min_tags: 1,
                prompts: vec!["Write one upbeat sentence about building software.".to_string()],
                thread_max_length: None,
                preview_length: default_preview_length(),
            },
            gate: GateConfig::default(),
            storage: StorageConfig::default(),
            generation: GenerationConfig {
                endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
                model: "gpt-4o-mini".to_string(),
                api_key_env: default_api_key_env(),
                system_prompt: None,
                timeout: default_generation_timeout(),
            },
            platform: PlatformConfig {
                api_base: default_api_base(),
                token_url: default_token_url(),
                authorize_url: default_authorize_url(),
                client_id: "your-client-id".to_string(),
                redirect_uri: default_redirect_uri(),
                scopes: default_scopes(),
                timeout: default_platform_timeout(),
            },
        }
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| {
            ConfigError::InvalidValue {
                field: "config".to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }
}

/// Resolve the configuration file path following the XDG layout
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("BOTCAST_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("botcast").join("config.toml"))
}
