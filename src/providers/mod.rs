/*!
 * Provider implementations for translation services.
 *
 * Every supported vendor speaks the OpenAI chat-completions protocol, so a
 * single client covers them; vendors differ only in base URL, model
 * catalog and extra headers.
 * - `catalog`: vendor identities, base URLs and model lists
 * - `openai`: OpenAI-compatible chat-completions client
 * - `mock`: scripted provider used by tests
 */

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::Arc;

use crate::app_config::{ProviderSettings, TranslationSettings};
use crate::errors::ProviderError;
use catalog::ProviderKind;

pub mod catalog;
pub mod mock;
pub mod openai;

/// One turn of a chat conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Fully resolved connection settings for one provider
#[derive(Debug, Clone, PartialEq)]
pub struct AiConfig {
    pub provider: ProviderKind,
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    /// Extra headers sent with every request
    pub headers: Vec<(String, String)>,
}

/// Common trait for all LLM providers
///
/// Implementations send a conversation and return the assistant's reply text.
#[async_trait]
pub trait Provider: Send + Sync + Debug {
    async fn chat(&self, messages: Vec<ChatMessage>) -> Result<String, ProviderError>;

    /// Model identifier used for requests
    fn model(&self) -> &str;
}

/// Supplies a provider when a task starts
pub trait ProviderFactory: Send + Sync {
    fn create(&self) -> Result<Arc<dyn Provider>>;
}

/// Resolves provider settings from configuration on every call
#[derive(Debug, Clone)]
pub struct ConfiguredProviders {
    settings: ProviderSettings,
    translation: TranslationSettings,
}

impl ConfiguredProviders {
    pub fn new(settings: ProviderSettings, translation: TranslationSettings) -> Self {
        Self {
            settings,
            translation,
        }
    }
}

impl ProviderFactory for ConfiguredProviders {
    fn create(&self) -> Result<Arc<dyn Provider>> {
        let config = self.settings.resolve()?;
        Ok(Arc::new(openai::OpenAI::from_config(&config, &self.translation)))
    }
}

/// Always hands out the same provider instance
#[derive(Debug, Clone)]
pub struct StaticProvider(pub Arc<dyn Provider>);

impl ProviderFactory for StaticProvider {
    fn create(&self) -> Result<Arc<dyn Provider>> {
        Ok(self.0.clone())
    }
}
