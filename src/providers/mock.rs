/*!
 * Mock provider implementations for testing.
 *
 * This module provides mock providers that simulate different behaviors:
 * - `MockProvider::working()` - Always succeeds, echoing the source block
 * - `MockProvider::intermittent(n)` - Every nth request fails
 * - `MockProvider::failing(status)` - Always fails with the given HTTP status
 * - `MockProvider::slow(ms)` - Succeeds after a delay
 */

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::errors::ProviderError;
use crate::providers::{ChatMessage, Provider};

/// What the mock saw for one request
#[derive(Debug, Clone)]
pub struct MockRequest {
    /// The full user prompt
    pub prompt: String,
    /// Text between the prompt's source fences
    pub source: String,
}

/// Behavior mode for the mock provider
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MockBehavior {
    /// Always succeeds with a proper translation
    Working,
    /// Fails intermittently (every Nth request) with a 503
    Intermittent { fail_every: usize },
    /// Always fails with the given HTTP status
    Failing { status_code: u16 },
    /// Fails with the given status when the prompt contains `needle`
    FailWhenPromptContains { needle: &'static str, status_code: u16 },
    /// Connection never succeeds
    Unreachable,
    /// Returns empty response
    Empty,
    /// Simulates slow response
    Slow { delay_ms: u64 },
}

/// Mock provider for testing translation behavior
#[derive(Debug)]
pub struct MockProvider {
    behavior: MockBehavior,
    /// Request counter for intermittent failures
    request_count: Arc<AtomicUsize>,
    /// Custom response generator (optional)
    custom_response: Option<fn(&MockRequest) -> String>,
    /// Every request received, in order
    requests: Arc<Mutex<Vec<MockRequest>>>,
}

impl MockProvider {
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            request_count: Arc::new(AtomicUsize::new(0)),
            custom_response: None,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn working() -> Self {
        Self::new(MockBehavior::Working)
    }

    pub fn intermittent(fail_every: usize) -> Self {
        Self::new(MockBehavior::Intermittent { fail_every })
    }

    pub fn failing(status_code: u16) -> Self {
        Self::new(MockBehavior::Failing { status_code })
    }

    pub fn failing_when(needle: &'static str, status_code: u16) -> Self {
        Self::new(MockBehavior::FailWhenPromptContains {
            needle,
            status_code,
        })
    }

    pub fn unreachable() -> Self {
        Self::new(MockBehavior::Unreachable)
    }

    pub fn empty() -> Self {
        Self::new(MockBehavior::Empty)
    }

    pub fn slow(delay_ms: u64) -> Self {
        Self::new(MockBehavior::Slow { delay_ms })
    }

    /// Set a custom response generator
    pub fn with_custom_response(mut self, generator: fn(&MockRequest) -> String) -> Self {
        self.custom_response = Some(generator);
        self
    }

    pub fn call_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<MockRequest> {
        self.requests.lock().clone()
    }

    fn reply(&self, request: &MockRequest) -> String {
        match self.custom_response {
            Some(generator) => generator(request),
            None => format!("[TRANSLATED] {}", request.source),
        }
    }
}

impl Clone for MockProvider {
    fn clone(&self) -> Self {
        Self {
            behavior: self.behavior,
            request_count: Arc::clone(&self.request_count),
            custom_response: self.custom_response,
            requests: Arc::clone(&self.requests),
        }
    }
}

/// Text between the first `---` line and the last `---` line of a prompt
pub fn source_block(prompt: &str) -> &str {
    let Some(start) = prompt.find("---\n") else {
        return prompt;
    };
    let body = &prompt[start + 4..];
    match body.rfind("\n---") {
        Some(end) => &body[..end],
        None => body,
    }
}

fn simulated_error(status_code: u16, message: String) -> ProviderError {
    ProviderError::ApiError {
        status_code,
        code: None,
        message,
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn chat(&self, messages: Vec<ChatMessage>) -> Result<String, ProviderError> {
        let count = self.request_count.fetch_add(1, Ordering::SeqCst);
        let prompt = messages
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .map(|m| m.content.clone())
            .unwrap_or_default();
        let request = MockRequest {
            source: source_block(&prompt).to_string(),
            prompt,
        };
        self.requests.lock().push(request.clone());

        match self.behavior {
            MockBehavior::Working => Ok(self.reply(&request)),

            MockBehavior::Intermittent { fail_every } => {
                if fail_every > 0 && count % fail_every == fail_every - 1 {
                    Err(simulated_error(
                        503,
                        format!("Simulated intermittent failure (request #{})", count + 1),
                    ))
                } else {
                    Ok(self.reply(&request))
                }
            }

            MockBehavior::Failing { status_code } => Err(simulated_error(
                status_code,
                "Simulated provider failure".to_string(),
            )),

            MockBehavior::FailWhenPromptContains {
                needle,
                status_code,
            } => {
                if request.prompt.contains(needle) {
                    Err(simulated_error(
                        status_code,
                        format!("Simulated failure for prompt containing {}", needle),
                    ))
                } else {
                    Ok(self.reply(&request))
                }
            }

            MockBehavior::Unreachable => Err(ProviderError::ConnectionError(
                "Simulated connection refused".to_string(),
            )),

            MockBehavior::Empty => Ok(String::new()),

            MockBehavior::Slow { delay_ms } => {
                tokio::time::sleep(tokio::time::Duration::from_millis(delay_ms)).await;
                Ok(self.reply(&request))
            }
        }
    }

    fn model(&self) -> &str {
        "mock-model"
    }
}
