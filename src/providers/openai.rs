use async_trait::async_trait;
use log::{debug, error};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::app_config::TranslationSettings;
use crate::errors::ProviderError;
use crate::providers::{AiConfig, ChatMessage, Provider};

/// Client for OpenAI-compatible chat-completions endpoints
pub struct OpenAI {
    /// HTTP client for API requests
    client: Client,
    /// API key for authentication
    api_key: String,
    /// Base URL, e.g. `https://api.deepseek.com/v1`
    endpoint: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    /// Vendor specific headers
    headers: Vec<(String, String)>,
}

impl std::fmt::Debug for OpenAI {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAI")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

/// Chat completion request
#[derive(Debug, Serialize, Default)]
pub struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,

    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

/// Message in a chat completion request
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OpenAIMessage {
    pub role: String,
    pub content: String,
}

/// Token usage information
#[derive(Debug, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Deserialize)]
pub struct OpenAIResponse {
    pub choices: Vec<OpenAIChoice>,
    #[serde(default)]
    pub usage: Option<TokenUsage>,
}

#[derive(Debug, Deserialize)]
pub struct OpenAIChoice {
    pub message: OpenAIResponseMessage,
}

#[derive(Debug, Deserialize)]
pub struct OpenAIResponseMessage {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

/// Error envelope used by OpenAI-compatible vendors
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    /// Numeric on some vendors, a string on others
    #[serde(default)]
    code: Option<serde_json::Value>,
    #[serde(default, rename = "type")]
    error_type: Option<String>,
}

impl OpenAIRequest {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }

    pub fn add_message(mut self, role: impl Into<String>, content: impl Into<String>) -> Self {
        self.messages.push(OpenAIMessage {
            role: role.into(),
            content: content.into(),
        });
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

impl OpenAI {
    /// Create a new client with default sampling settings
    pub fn new(
        api_key: impl Into<String>,
        endpoint: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        let defaults = TranslationSettings::default();
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(defaults.timeout_secs))
                .build()
                .unwrap_or_default(),
            api_key: api_key.into(),
            endpoint: endpoint.into(),
            model: model.into(),
            temperature: defaults.temperature,
            max_tokens: defaults.max_tokens,
            headers: Vec::new(),
        }
    }

    pub fn from_config(config: &AiConfig, settings: &TranslationSettings) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(settings.timeout_secs))
                .build()
                .unwrap_or_default(),
            api_key: config.api_key.clone(),
            endpoint: config.base_url.clone(),
            model: config.model.clone(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            headers: config.headers.clone(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Complete a chat request
    pub async fn complete(&self, request: &OpenAIRequest) -> Result<OpenAIResponse, ProviderError> {
        let api_url = format!("{}/chat/completions", self.endpoint.trim_end_matches('/'));

        let mut builder = self
            .client
            .post(&api_url)
            .bearer_auth(&self.api_key)
            .json(request);
        for (name, value) in &self.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() || e.is_connect() {
                ProviderError::ConnectionError(e.to_string())
            } else {
                ProviderError::RequestFailed(e.to_string())
            }
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::ConnectionError(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            error!("Chat completion error ({}) from {}", status, self.endpoint);
            return Err(api_error(status.as_u16(), &body));
        }

        match serde_json::from_str::<OpenAIResponse>(&body) {
            Ok(parsed) => {
                if let Some(usage) = &parsed.usage {
                    debug!(
                        "Token usage: {} prompt + {} completion = {}",
                        usage.prompt_tokens, usage.completion_tokens, usage.total_tokens
                    );
                }
                Ok(parsed)
            }
            // Some gateways answer 200 with an error envelope
            Err(parse_error) => match serde_json::from_str::<ErrorEnvelope>(&body) {
                Ok(envelope) => Err(envelope_error(status.as_u16(), envelope.error)),
                Err(_) => Err(ProviderError::ParseError(parse_error.to_string())),
            },
        }
    }

    /// Extract the reply text from the first choice
    pub fn extract_text(response: &OpenAIResponse) -> Result<String, ProviderError> {
        let choice = response
            .choices
            .first()
            .ok_or_else(|| ProviderError::ParseError("Response contained no choices".to_string()))?;
        choice
            .message
            .content
            .clone()
            .ok_or_else(|| ProviderError::ParseError("Response message had no content".to_string()))
    }
}

fn api_error(status: u16, body: &str) -> ProviderError {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => envelope_error(status, envelope.error),
        Err(_) => ProviderError::ApiError {
            status_code: status,
            code: None,
            message: body.trim().to_string(),
        },
    }
}

fn envelope_error(status: u16, body: ErrorBody) -> ProviderError {
    let code = match body.code {
        Some(serde_json::Value::String(code)) => Some(code),
        Some(serde_json::Value::Number(code)) => Some(code.to_string()),
        _ => body.error_type,
    };
    // A numeric code in the body is the real status behind a 200 envelope
    let status_code = match code.as_deref().and_then(|c| c.parse::<u16>().ok()) {
        Some(numeric) if status < 400 => numeric,
        _ => status,
    };
    ProviderError::ApiError {
        status_code,
        code,
        message: body.message.unwrap_or_default(),
    }
}

#[async_trait]
impl Provider for OpenAI {
    async fn chat(&self, messages: Vec<ChatMessage>) -> Result<String, ProviderError> {
        let request = messages
            .into_iter()
            .fold(OpenAIRequest::new(&self.model), |request, message| {
                request.add_message(message.role, message.content)
            })
            .temperature(self.temperature)
            .max_tokens(self.max_tokens);

        let response = self.complete(&request).await?;
        Self::extract_text(&response)
    }

    fn model(&self) -> &str {
        &self.model
    }
}
