/*!
 * Maps provider failures onto a closed set of user-facing error kinds.
 *
 * Status codes win over error codes, error codes win over message text.
 * Anything unrecognised keeps the provider's own message.
 */

use std::fmt;

use crate::errors::ProviderError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    InsufficientCredits,
    RateLimited,
    InvalidApiKey,
    Forbidden,
    ServerError,
    ServiceUnavailable,
    QuotaExhausted,
    Network(String),
    MalformedResponse(String),
    Other(String),
}

impl ErrorKind {
    /// Message stored on failed results and shown to users
    pub fn user_message(&self) -> String {
        match self {
            Self::InsufficientCredits => "Insufficient API credits, please top up".to_string(),
            Self::RateLimited => "Rate limit exceeded, please try again later".to_string(),
            Self::InvalidApiKey => "Invalid API key, please check configuration".to_string(),
            Self::Forbidden => "Access forbidden, please check API key permissions".to_string(),
            Self::ServerError => "API server internal error".to_string(),
            Self::ServiceUnavailable => "API service temporarily unavailable".to_string(),
            Self::QuotaExhausted => "API quota exhausted, please top up".to_string(),
            Self::Network(detail) => {
                format!("Network error while contacting the AI provider: {}", detail)
            }
            Self::MalformedResponse(detail) => {
                format!("The AI provider returned an unreadable response: {}", detail)
            }
            Self::Other(message) => message.clone(),
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.user_message())
    }
}

pub fn classify(error: &ProviderError) -> ErrorKind {
    match error {
        ProviderError::ApiError {
            status_code,
            code,
            message,
        } => from_status(*status_code)
            .or_else(|| code.as_deref().and_then(from_code))
            .or_else(|| from_message(message))
            .unwrap_or_else(|| ErrorKind::Other(message.clone())),
        ProviderError::ConnectionError(detail) => ErrorKind::Network(detail.clone()),
        ProviderError::ParseError(detail) => ErrorKind::MalformedResponse(detail.clone()),
        ProviderError::RequestFailed(message) => {
            from_message(message).unwrap_or_else(|| ErrorKind::Other(message.clone()))
        }
    }
}

/// Shorthand for `classify(error).user_message()`
pub fn user_message(error: &ProviderError) -> String {
    classify(error).user_message()
}

fn from_status(status: u16) -> Option<ErrorKind> {
    match status {
        402 => Some(ErrorKind::InsufficientCredits),
        429 => Some(ErrorKind::RateLimited),
        401 => Some(ErrorKind::InvalidApiKey),
        403 => Some(ErrorKind::Forbidden),
        500 => Some(ErrorKind::ServerError),
        503 => Some(ErrorKind::ServiceUnavailable),
        _ => None,
    }
}

fn from_code(code: &str) -> Option<ErrorKind> {
    let code = code.to_lowercase();
    if code == "insufficient_quota" {
        Some(ErrorKind::QuotaExhausted)
    } else if code.starts_with("rate_limit") {
        Some(ErrorKind::RateLimited)
    } else {
        None
    }
}

fn from_message(message: &str) -> Option<ErrorKind> {
    let lower = message.to_lowercase();
    if lower.contains("402") {
        Some(ErrorKind::InsufficientCredits)
    } else if lower.contains("429") {
        Some(ErrorKind::RateLimited)
    } else if lower.contains("401") {
        Some(ErrorKind::InvalidApiKey)
    } else if lower.contains("rate_limit") {
        Some(ErrorKind::RateLimited)
    } else if lower.contains("quota") {
        Some(ErrorKind::QuotaExhausted)
    } else {
        None
    }
}
