/*!
 * Known OpenAI-compatible vendors: their base URLs and model lists.
 */

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A selectable model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelInfo {
    pub id: &'static str,
    pub name: &'static str,
}

const OPENROUTER_MODELS: &[ModelInfo] = &[
    ModelInfo { id: "openai/gpt-4o-mini", name: "GPT-4o Mini" },
    ModelInfo { id: "openai/gpt-4o", name: "GPT-4o" },
    ModelInfo { id: "anthropic/claude-3.5-sonnet", name: "Claude 3.5 Sonnet" },
    ModelInfo { id: "google/gemini-pro-1.5", name: "Gemini Pro 1.5" },
];

const DEEPSEEK_MODELS: &[ModelInfo] = &[
    ModelInfo { id: "deepseek-chat", name: "DeepSeek Chat" },
    ModelInfo { id: "deepseek-coder", name: "DeepSeek Coder" },
];

const DOUBAO_MODELS: &[ModelInfo] = &[
    ModelInfo { id: "doubao-pro-32k", name: "Doubao Pro 32K" },
    ModelInfo { id: "doubao-lite-32k", name: "Doubao Lite 32K" },
];

const QWEN_MODELS: &[ModelInfo] = &[
    ModelInfo { id: "qwen-turbo", name: "Qwen Turbo" },
    ModelInfo { id: "qwen-plus", name: "Qwen Plus" },
    ModelInfo { id: "qwen-max", name: "Qwen Max" },
    ModelInfo { id: "qwen-coder-turbo", name: "Qwen Coder Turbo" },
];

/// Provider identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenRouter,
    DeepSeek,
    Doubao,
    Qwen,
    Custom,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 5] = [
        Self::OpenRouter,
        Self::DeepSeek,
        Self::Doubao,
        Self::Qwen,
        Self::Custom,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::OpenRouter => "OpenRouter",
            Self::DeepSeek => "DeepSeek",
            Self::Doubao => "Doubao",
            Self::Qwen => "Qwen",
            Self::Custom => "Custom",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenRouter => "openrouter",
            Self::DeepSeek => "deepseek",
            Self::Doubao => "doubao",
            Self::Qwen => "qwen",
            Self::Custom => "custom",
        }
    }

    /// Fixed base URL, `None` for custom endpoints
    pub fn default_base_url(&self) -> Option<&'static str> {
        match self {
            Self::OpenRouter => Some("https://openrouter.ai/api/v1"),
            Self::DeepSeek => Some("https://api.deepseek.com/v1"),
            Self::Doubao => Some("https://ark.cn-beijing.volces.com/api/v3"),
            Self::Qwen => Some("https://dashscope.aliyuncs.com/compatible-mode/v1"),
            Self::Custom => None,
        }
    }

    pub fn models(&self) -> &'static [ModelInfo] {
        match self {
            Self::OpenRouter => OPENROUTER_MODELS,
            Self::DeepSeek => DEEPSEEK_MODELS,
            Self::Doubao => DOUBAO_MODELS,
            Self::Qwen => QWEN_MODELS,
            Self::Custom => &[],
        }
    }

    /// First catalog entry
    pub fn default_model(&self) -> Option<&'static str> {
        self.models().first().map(|m| m.id)
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| anyhow!("Invalid provider type: {}", s))
    }
}
