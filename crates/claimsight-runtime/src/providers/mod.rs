//! Model provider abstractions.
//!
//! Modality processors and the adjudicator talk to models only through
//! [`LlmProvider`]. Messages are multimodal: a user turn may carry media
//! bytes next to its text.
//!
//! ## Security
//!
//! All providers hold their keys in [`ApiCredential`]; see [`secrets`].

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

mod factory;
mod retry;
pub mod secrets;

#[cfg(feature = "gemini")]
mod gemini;

pub use factory::{ProviderFactory, ProviderRegistry};
pub use retry::{RetryPolicy, RetryingProvider};
pub use secrets::{ApiCredential, CredentialSource};

#[cfg(feature = "gemini")]
pub use gemini::{GeminiProvider, GeminiProviderFactory, GEMINI_API_KEY_ENV};

/// Errors from model providers.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    #[error("Rate limit exceeded, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("Response parse error: {0}")]
    ParseError(String),

    #[error("Authentication failed")]
    AuthError,

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

impl ProviderError {
    /// Transient failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::HttpError(_)
            | ProviderError::RateLimited { .. }
            | ProviderError::Timeout(_) => true,
            ProviderError::ApiError { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Output format requested from the model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResponseFormat {
    #[default]
    Text,
    /// Ask the model to constrain output to JSON, where supported.
    Json,
}

/// Configuration for a completion request.
#[derive(Debug, Clone)]
pub struct CompletionConfig {
    /// Model to use
    pub model: String,

    /// Maximum tokens to generate
    pub max_tokens: u32,

    /// Temperature (0.0 for deterministic)
    pub temperature: f32,

    /// Request timeout
    pub timeout: Duration,

    /// Output format constraint
    pub response_format: ResponseFormat,

    /// Billing and trace labels forwarded to the provider
    pub labels: BTreeMap<String, String>,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash".to_string(),
            max_tokens: 8192,
            temperature: 0.0,
            timeout: Duration::from_secs(120),
            response_format: ResponseFormat::Text,
            labels: BTreeMap::new(),
        }
    }
}

/// One part of a chat message.
#[derive(Debug, Clone, PartialEq)]
pub enum MessagePart {
    Text(String),
    Media { mime_type: String, data: Vec<u8> },
}

/// A chat message for completion.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    /// Role: "system", "user", or "assistant"
    pub role: String,

    /// Message parts, in order
    pub parts: Vec<MessagePart>,
}

impl ChatMessage {
    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            parts: vec![MessagePart::Text(content.into())],
        }
    }

    /// Create a text-only user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            parts: vec![MessagePart::Text(content.into())],
        }
    }

    /// Create a user message from explicit parts.
    pub fn user_parts(parts: Vec<MessagePart>) -> Self {
        Self {
            role: "user".to_string(),
            parts,
        }
    }

    /// Concatenated text parts.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                MessagePart::Text(text) => Some(text.as_str()),
                MessagePart::Media { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Total media bytes attached.
    pub fn media_bytes(&self) -> usize {
        self.parts
            .iter()
            .map(|part| match part {
                MessagePart::Media { data, .. } => data.len(),
                MessagePart::Text(_) => 0,
            })
            .sum()
    }
}

/// Response from a completion.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    /// Generated content
    pub content: String,

    /// Token usage
    pub usage: TokenUsage,

    /// Model used
    pub model: String,

    /// Stop reason
    pub stop_reason: Option<String>,
}

/// Token usage from a completion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenUsage {
    /// Tokens in the prompt (media included)
    pub prompt_tokens: u32,

    /// Tokens in the completion
    pub completion_tokens: u32,
}

impl TokenUsage {
    /// Total tokens used, capped at `u32::MAX`.
    pub fn total(&self) -> u32 {
        self.prompt_tokens.saturating_add(self.completion_tokens)
    }
}

/// Provider abstraction allows swapping model backends.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Execute a chat completion.
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError>;

    /// Get provider name for logs.
    fn name(&self) -> &str;
}
