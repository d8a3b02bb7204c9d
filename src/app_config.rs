use anyhow::{Context, Result, anyhow};
use log::warn;
use serde::{Deserialize, Serialize};
use std::default::Default;
use std::path::{Path, PathBuf};
use url::Url;

use crate::providers::AiConfig;
use crate::providers::catalog::ProviderKind;

/// Application configuration module
/// This module handles the application configuration including loading,
/// environment overrides, validation and saving of configuration settings.
pub const DEFAULT_CONFIG_FILE: &str = "docglot.json";

/// Represents the application configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Config {
    /// GitHub App identity and API location
    #[serde(default)]
    pub github: GitHubConfig,

    /// Translation provider selection
    #[serde(default)]
    pub ai: ProviderSettings,

    /// Chunking and sampling parameters
    #[serde(default)]
    pub translation: TranslationSettings,

    /// Defaults for committing finished tasks
    #[serde(default)]
    pub commit: CommitSettings,

    /// SQLite file; the user data directory is used when unset
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// Seconds between polls in `watch` mode
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// GitHub App settings
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct GitHubConfig {
    #[serde(default)]
    pub app_id: String,

    /// PEM encoded RSA key downloaded from the App settings page
    #[serde(default)]
    pub private_key_path: PathBuf,

    #[serde(default = "default_github_api_url")]
    pub api_url: String,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            app_id: String::new(),
            private_key_path: PathBuf::new(),
            api_url: default_github_api_url(),
        }
    }
}

/// Settings for a vendor with a fixed base URL
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct HostedSettings {
    #[serde(default)]
    pub api_key: String,

    /// Overrides the first catalog model
    #[serde(default)]
    pub model: Option<String>,
}

/// OpenRouter additionally wants attribution headers
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct OpenRouterSettings {
    #[serde(default)]
    pub api_key: String,

    #[serde(default)]
    pub model: Option<String>,

    #[serde(default = "default_site_url")]
    pub site_url: String,

    #[serde(default = "default_site_name")]
    pub site_name: String,
}

impl Default for OpenRouterSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: None,
            site_url: default_site_url(),
            site_name: default_site_name(),
        }
    }
}

/// Any OpenAI-compatible endpoint
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct CustomSettings {
    #[serde(default)]
    pub base_url: String,

    #[serde(default)]
    pub api_key: String,

    #[serde(default)]
    pub model: String,
}

/// Provider choice, tagged by `type` in the config file
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProviderSettings {
    OpenRouter(OpenRouterSettings),
    DeepSeek(HostedSettings),
    Doubao(HostedSettings),
    Qwen(HostedSettings),
    Custom(CustomSettings),
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self::OpenRouter(OpenRouterSettings::default())
    }
}

impl ProviderSettings {
    pub fn kind(&self) -> ProviderKind {
        match self {
            Self::OpenRouter(_) => ProviderKind::OpenRouter,
            Self::DeepSeek(_) => ProviderKind::DeepSeek,
            Self::Doubao(_) => ProviderKind::Doubao,
            Self::Qwen(_) => ProviderKind::Qwen,
            Self::Custom(_) => ProviderKind::Custom,
        }
    }

    pub fn api_key(&self) -> &str {
        match self {
            Self::OpenRouter(s) => &s.api_key,
            Self::DeepSeek(s) | Self::Doubao(s) | Self::Qwen(s) => &s.api_key,
            Self::Custom(s) => &s.api_key,
        }
    }

    pub fn set_api_key(&mut self, key: impl Into<String>) {
        let key = key.into();
        match self {
            Self::OpenRouter(s) => s.api_key = key,
            Self::DeepSeek(s) | Self::Doubao(s) | Self::Qwen(s) => s.api_key = key,
            Self::Custom(s) => s.api_key = key,
        }
    }

    pub fn set_model(&mut self, model: impl Into<String>) {
        let model = model.into();
        match self {
            Self::OpenRouter(s) => s.model = Some(model),
            Self::DeepSeek(s) | Self::Doubao(s) | Self::Qwen(s) => s.model = Some(model),
            Self::Custom(s) => s.model = model,
        }
    }

    /// Same settings for another vendor; only the API key carries over
    pub fn switched_to(&self, kind: ProviderKind) -> Self {
        if kind == self.kind() {
            return self.clone();
        }
        let api_key = self.api_key().to_string();
        let hosted = || HostedSettings {
            api_key: api_key.clone(),
            model: None,
        };
        match kind {
            ProviderKind::OpenRouter => Self::OpenRouter(OpenRouterSettings {
                api_key: api_key.clone(),
                ..OpenRouterSettings::default()
            }),
            ProviderKind::DeepSeek => Self::DeepSeek(hosted()),
            ProviderKind::Doubao => Self::Doubao(hosted()),
            ProviderKind::Qwen => Self::Qwen(hosted()),
            ProviderKind::Custom => Self::Custom(CustomSettings {
                api_key: api_key.clone(),
                ..CustomSettings::default()
            }),
        }
    }

    /// Turn the stored selection into a concrete endpoint, key and model
    pub fn resolve(&self) -> Result<AiConfig> {
        let kind = self.kind();
        if self.api_key().trim().is_empty() {
            return Err(anyhow!(
                "Translation API key is required for the {} provider",
                kind.display_name()
            ));
        }

        let (base_url, model, headers) = match self {
            Self::OpenRouter(s) => (
                catalog_base_url(kind)?,
                hosted_model(kind, s.model.as_deref())?,
                vec![
                    ("HTTP-Referer".to_string(), s.site_url.clone()),
                    ("X-Title".to_string(), s.site_name.clone()),
                ],
            ),
            Self::DeepSeek(s) | Self::Doubao(s) | Self::Qwen(s) => (
                catalog_base_url(kind)?,
                hosted_model(kind, s.model.as_deref())?,
                Vec::new(),
            ),
            Self::Custom(s) => {
                if s.base_url.trim().is_empty() {
                    return Err(anyhow!("A base_url is required for the custom provider"));
                }
                Url::parse(&s.base_url)
                    .with_context(|| format!("Invalid custom provider base_url: {}", s.base_url))?;
                if s.model.trim().is_empty() {
                    return Err(anyhow!("A model is required for the custom provider"));
                }
                (s.base_url.clone(), s.model.clone(), Vec::new())
            }
        };

        Ok(AiConfig {
            provider: kind,
            base_url,
            api_key: self.api_key().to_string(),
            model,
            headers,
        })
    }
}

fn catalog_base_url(kind: ProviderKind) -> Result<String> {
    kind.default_base_url()
        .map(str::to_string)
        .ok_or_else(|| anyhow!("No base URL known for provider {}", kind))
}

fn hosted_model(kind: ProviderKind, configured: Option<&str>) -> Result<String> {
    match configured.map(str::trim).filter(|m| !m.is_empty()) {
        Some(model) => Ok(model.to_string()),
        None => kind
            .default_model()
            .map(str::to_string)
            .ok_or_else(|| anyhow!("No default model for provider {}", kind)),
    }
}

/// Chunking and sampling parameters
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TranslationSettings {
    /// Upper bound on characters per translation request
    #[serde(default = "default_max_chunk_chars")]
    pub max_chunk_chars: usize,

    /// Temperature parameter for text generation
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for TranslationSettings {
    fn default() -> Self {
        Self {
            max_chunk_chars: default_max_chunk_chars(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Commit defaults, each overridable per commit
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CommitSettings {
    #[serde(default = "default_true")]
    pub create_pull_request: bool,

    /// Document that receives the translations table
    #[serde(default = "default_index_document")]
    pub index_document: String,
}

impl Default for CommitSettings {
    fn default() -> Self {
        Self {
            create_pull_request: true,
            index_document: default_index_document(),
        }
    }
}

/// Log verbosity level
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

fn default_github_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_site_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_site_name() -> String {
    "docglot".to_string()
}

fn default_max_chunk_chars() -> usize {
    8000
}

fn default_temperature() -> f32 {
    0.3
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_poll_interval_secs() -> u64 {
    300
}

fn default_index_document() -> String {
    "README.md".to_string()
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load the configuration file, writing a default one when it does not exist
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to open config file: {}", path.display()))?;
            let config: Config = serde_json::from_str(&raw)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
            Ok(config)
        } else {
            warn!(
                "Config file not found at '{}', creating default config.",
                path.display()
            );
            let config = Config::default();
            config.save(path)?;
            Ok(config)
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .context("Failed to serialize config to JSON")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write config to file: {}", path.display()))
    }

    /// Apply process environment overrides
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup, empty values are ignored
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(app_id) = get("GITHUB_APP_ID") {
            self.github.app_id = app_id;
        }
        if let Some(key_path) = get("GITHUB_APP_PRIVATE_KEY_PATH") {
            self.github.private_key_path = PathBuf::from(key_path);
        }
        if let Some(api_url) = get("GITHUB_API_URL") {
            self.github.api_url = api_url;
        }
        if let Some(api_key) = get("DOCGLOT_AI_API_KEY") {
            self.ai.set_api_key(api_key);
        }
        if let ProviderSettings::OpenRouter(settings) = &mut self.ai {
            if let Some(site_url) = get("OPENROUTER_SITE_URL") {
                settings.site_url = site_url;
            }
            if let Some(site_name) = get("OPENROUTER_SITE_NAME") {
                settings.site_name = site_name;
            }
        }
    }

    /// Validate the configuration for consistency and required values
    pub fn validate(&self) -> Result<()> {
        if self.translation.max_chunk_chars == 0 {
            return Err(anyhow!("translation.max_chunk_chars must be greater than zero"));
        }
        if !(0.0..=2.0).contains(&self.translation.temperature) {
            return Err(anyhow!(
                "translation.temperature must be between 0.0 and 2.0, got {}",
                self.translation.temperature
            ));
        }
        if self.translation.max_tokens == 0 {
            return Err(anyhow!("translation.max_tokens must be greater than zero"));
        }
        if self.poll_interval_secs == 0 {
            return Err(anyhow!("poll_interval_secs must be greater than zero"));
        }
        Url::parse(&self.github.api_url)
            .with_context(|| format!("Invalid github.api_url: {}", self.github.api_url))?;
        if self.commit.index_document.trim().is_empty() {
            return Err(anyhow!("commit.index_document cannot be empty"));
        }
        Ok(())
    }

    /// Checks needed before talking to GitHub
    pub fn validate_github(&self) -> Result<()> {
        if self.github.app_id.trim().is_empty() {
            return Err(anyhow!(
                "github.app_id is not set (config file or GITHUB_APP_ID)"
            ));
        }
        if self.github.private_key_path.as_os_str().is_empty() {
            return Err(anyhow!(
                "github.private_key_path is not set (config file or GITHUB_APP_PRIVATE_KEY_PATH)"
            ));
        }
        Ok(())
    }
}

/// Default implementation for Config
impl Default for Config {
    fn default() -> Self {
        Config {
            github: GitHubConfig::default(),
            ai: ProviderSettings::default(),
            translation: TranslationSettings::default(),
            commit: CommitSettings::default(),
            database_path: None,
            poll_interval_secs: default_poll_interval_secs(),
            log_level: LogLevel::default(),
        }
    }
}
