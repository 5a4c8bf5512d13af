use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub gmail: GmailConfig,
    #[serde(default)]
    pub classification: ClassificationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GmailConfig {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_limit")]
    pub default_limit: u32,
    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for GmailConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            default_limit: default_limit(),
            max_concurrent_fetches: default_max_concurrent_fetches(),
            request_timeout_secs: default_request_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

impl GmailConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Override for the OpenAI-compatible endpoint; `None` uses the provider default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            temperature: default_temperature(),
            api_base: None,
        }
    }
}

fn default_api_base_url() -> String {
    "https://gmail.googleapis.com/gmail/v1".to_string()
}

fn default_limit() -> u32 {
    15
}

fn default_max_concurrent_fetches() -> usize {
    5
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    2
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

impl Config {
    pub async fn load(path: &Path) -> Result<Self> {
        // If file doesn't exist, return default config with warning
        if !path.exists() {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            let mut config = Self::default();
            config.apply_env_overrides();
            config.validate()?;
            return Ok(config);
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| PipelineError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let mut config: Self = toml::from_str(&content)
            .map_err(|e| PipelineError::ConfigError(format!("Failed to parse config file: {}", e)))?;

        config.apply_env_overrides();
        config.validate()?;

        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                PipelineError::ConfigError(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| PipelineError::ConfigError(format!("Failed to serialize config: {}", e)))?;

        tokio::fs::write(path, content)
            .await
            .map_err(|e| PipelineError::ConfigError(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Environment variables win over file values:
    /// `OPENAI_MODEL`, `OPENAI_API_BASE`, `GMAIL_API_BASE`.
    pub fn apply_env_overrides(&mut self) {
        if let Some(model) = non_empty_env("OPENAI_MODEL") {
            self.classification.model = model;
        }
        if let Some(api_base) = non_empty_env("OPENAI_API_BASE") {
            self.classification.api_base = Some(api_base);
        }
        if let Some(base_url) = non_empty_env("GMAIL_API_BASE") {
            self.gmail.api_base_url = base_url;
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if !self.gmail.api_base_url.starts_with("http://")
            && !self.gmail.api_base_url.starts_with("https://")
        {
            return Err(PipelineError::ConfigError(format!(
                "gmail.api_base_url must be an http(s) URL, got '{}'",
                self.gmail.api_base_url
            )));
        }

        if self.gmail.default_limit == 0 {
            return Err(PipelineError::ConfigError(
                "gmail.default_limit must be at least 1".to_string(),
            ));
        }

        if self.gmail.max_concurrent_fetches == 0 {
            return Err(PipelineError::ConfigError(
                "gmail.max_concurrent_fetches must be at least 1".to_string(),
            ));
        }
        if self.gmail.max_concurrent_fetches > 50 {
            return Err(PipelineError::ConfigError(
                "gmail.max_concurrent_fetches cannot exceed 50 (to stay under Gmail API rate limits)"
                    .to_string(),
            ));
        }

        if self.gmail.request_timeout_secs == 0 {
            return Err(PipelineError::ConfigError(
                "gmail.request_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.gmail.max_retries > 10 {
            return Err(PipelineError::ConfigError(
                "gmail.max_retries cannot exceed 10".to_string(),
            ));
        }

        if self.classification.model.trim().is_empty() {
            return Err(PipelineError::ConfigError(
                "classification.model cannot be empty".to_string(),
            ));
        }

        if !(0.0..=2.0).contains(&self.classification.temperature) {
            return Err(PipelineError::ConfigError(format!(
                "classification.temperature must be between 0.0 and 2.0, got {}",
                self.classification.temperature
            )));
        }

        tracing::debug!("Configuration validation passed");
        Ok(())
    }

    /// Create an example configuration file
    pub async fn create_example(path: &Path) -> Result<()> {
        let config = Self::default();
        config.save(path).await
    }
}

/// API key for the classification model: explicit value first, then `OPENAI_API_KEY`
pub fn resolve_api_key(explicit: Option<&str>) -> Option<String> {
    explicit
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .or_else(|| non_empty_env("OPENAI_API_KEY"))
}

fn non_empty_env(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}
