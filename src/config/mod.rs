mod options;

pub use options::{change_summary, ConfigField, FieldValue};

use crate::util::is_local_endpoint_url;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "config.json";
const CONFIG_PATH_ENV: &str = "RIPTIDE_CONFIG_PATH";
const API_KEY_ENV: &str = "DEEPSEEK_API_KEY";
const API_URL_ENV: &str = "DEEPSEEK_API_URL";
const MODEL_ENV: &str = "DEEPSEEK_MODEL";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(skip)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub ui: UiConfig,
    #[serde(default)]
    pub file_operations: FileOperationsConfig,
    #[serde(skip)]
    pub working_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub model: String,
    pub max_completion_tokens: u32,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct UiConfig {
    pub theme: String,
    pub enable_emoji: bool,
    pub max_history_messages: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FileOperationsConfig {
    pub max_file_size_mb: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.deepseek.com/v1".to_string(),
            model: "deepseek-reasoner".to_string(),
            max_completion_tokens: 64_000,
            timeout_seconds: 300,
        }
    }
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            theme: "default".to_string(),
            enable_emoji: true,
            max_history_messages: 15,
        }
    }
}

impl Default for FileOperationsConfig {
    fn default() -> Self {
        Self {
            max_file_size_mb: 5,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            api: ApiConfig::default(),
            ui: UiConfig::default(),
            file_operations: FileOperationsConfig::default(),
            working_dir: PathBuf::from("."),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Reads `path` if it exists, falling back to defaults, then applies env overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let data = std::fs::read_to_string(path)
                .with_context(|| format!("reading config file {}", path.display()))?;
            serde_json::from_str::<Config>(&data)
                .with_context(|| format!("parsing config file {}", path.display()))?
        } else {
            Config::default()
        };

        config.api_key = std::env::var(API_KEY_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty());
        if let Ok(url) = std::env::var(API_URL_ENV) {
            if !url.trim().is_empty() {
                config.api.base_url = url.trim().to_string();
            }
        }
        if let Ok(model) = std::env::var(MODEL_ENV) {
            if !model.trim().is_empty() {
                config.api.model = model.trim().to_string();
            }
        }
        config.working_dir = std::env::current_dir()?;

        Ok(config)
    }

    pub fn config_path() -> PathBuf {
        std::env::var(CONFIG_PATH_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    pub fn validate(&self) -> Result<()> {
        let url = &self.api.base_url;
        if !url.starts_with("http://") && !url.starts_with("https://") {
            bail!("Invalid API base URL '{url}': expected http:// or https:// URL");
        }

        if !self.is_local_endpoint() && self.api_key.is_none() {
            bail!("{API_KEY_ENV} must be set for non-local endpoints (url: '{url}')");
        }

        if self.api.model.trim().is_empty() {
            bail!("Model name must not be empty");
        }

        if self.ui.max_history_messages == 0 {
            bail!("max_history_messages must be at least 1");
        }

        Ok(())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).context("creating config directory")?;
        }
        let data = serde_json::to_string_pretty(self).context("serializing config")?;
        std::fs::write(path, data)
            .with_context(|| format!("writing config file {}", path.display()))
    }

    /// End-to-end request timeout; `None` when `timeout_seconds` is 0.
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.api.timeout_seconds > 0).then(|| Duration::from_secs(self.api.timeout_seconds))
    }

    pub fn is_local_endpoint(&self) -> bool {
        is_local_endpoint_url(&self.api.base_url)
    }
}
