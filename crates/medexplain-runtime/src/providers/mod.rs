//! LLM provider abstractions for medexplain-runtime.
//!
//! This module defines the trait every vendor adapter implements, the
//! resolver that picks one from configuration, and the adapters themselves
//! (behind the `anthropic` and `openai` features).
//!
//! ## Security
//!
//! All providers use the [`secrets`] module for credential handling.
//! Prompts passed to a provider must already be redacted.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

mod factory;
pub mod secrets;

#[cfg(any(feature = "anthropic", feature = "openai"))]
mod http;

#[cfg(feature = "anthropic")]
mod anthropic;

#[cfg(feature = "openai")]
mod openai;

pub use factory::{ProviderFactory, ProviderResolver};
pub use secrets::{ApiCredential, CredentialSource};

#[cfg(feature = "anthropic")]
pub use anthropic::{AnthropicProvider, AnthropicProviderFactory, ANTHROPIC_API_KEY_ENV};

#[cfg(feature = "openai")]
pub use openai::{
    OpenAiCompatibleProvider, OpenAiFlavour, OpenAiProviderFactory, GROQ_API_KEY_ENV,
    OPENAI_API_KEY_ENV,
};

/// Errors from LLM providers.
///
/// `ApiError::message` holds the head of the vendor's error body, which can
/// echo prompt text. It is kept for inspection but never rendered by
/// `Display`.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    #[error("Rate limit exceeded, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("API error: status {status}")]
    ApiError { status: u16, message: String },

    #[error("response body could not be decoded")]
    ParseError(String),

    #[error("Authentication failed")]
    AuthError,

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

impl ProviderError {
    /// Stable name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::HttpError(_) => "http_error",
            ProviderError::RateLimited { .. } => "rate_limited",
            ProviderError::ApiError { .. } => "api_error",
            ProviderError::ParseError(_) => "parse_error",
            ProviderError::AuthError => "auth_error",
            ProviderError::Timeout(_) => "timeout",
            ProviderError::NotConfigured(_) => "not_configured",
        }
    }

    /// HTTP status behind the error, where one is known.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            ProviderError::ApiError { status, .. } => Some(*status),
            ProviderError::RateLimited { .. } => Some(429),
            ProviderError::AuthError => Some(401),
            _ => None,
        }
    }

    /// Whether an adapter may retry the same request.
    ///
    /// Only transport-level failures qualify. A response that arrived but
    /// could not be used is never retried here.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::HttpError(_)
            | ProviderError::RateLimited { .. }
            | ProviderError::Timeout(_) => true,
            ProviderError::ApiError { status, .. } => *status >= 500,
            ProviderError::ParseError(_)
            | ProviderError::AuthError
            | ProviderError::NotConfigured(_) => false,
        }
    }
}

/// Settings for single-turn JSON completions.
#[derive(Debug, Clone)]
pub struct CompletionConfig {
    /// Model to use
    pub model: String,

    /// Maximum tokens to generate
    pub max_tokens: u32,

    /// Temperature (0.0 for deterministic)
    pub temperature: f32,

    /// Per-HTTP-request timeout
    pub timeout: Duration,

    /// Transport retries after the first request
    pub max_retries: usize,
}

impl CompletionConfig {
    /// Defaults with a vendor-specific model name.
    pub fn for_model(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Self::default()
        }
    }

    /// Apply `max_tokens`, `temperature`, `model` and `timeout_ms` from a
    /// provider config object, keeping defaults for anything absent.
    pub fn merge_json(mut self, config: &serde_json::Value) -> Self {
        if let Some(model) = config["model"].as_str() {
            self.model = model.to_string();
        }
        if let Some(n) = config["max_tokens"].as_u64() {
            self.max_tokens = u32::try_from(n).unwrap_or(u32::MAX);
        }
        if let Some(t) = config["temperature"].as_f64() {
            self.temperature = t as f32;
        }
        if let Some(ms) = config["timeout_ms"].as_u64() {
            self.timeout = Duration::from_millis(ms);
        }
        if let Some(n) = config["max_retries"].as_u64() {
            self.max_retries = n as usize;
        }
        self
    }
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            model: String::new(),
            max_tokens: 4096,
            temperature: 0.2,
            timeout: Duration::from_secs(45),
            max_retries: 2,
        }
    }
}

/// Upper bounds applied to caller-supplied chat options.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatCaps {
    pub max_temperature: f32,
    pub max_output_tokens: u32,
}

impl Default for ChatCaps {
    fn default() -> Self {
        Self {
            max_temperature: 1.0,
            max_output_tokens: 1024,
        }
    }
}

impl ChatCaps {
    pub fn merge_json(mut self, config: &serde_json::Value) -> Self {
        if let Some(t) = config["max_temperature"].as_f64() {
            self.max_temperature = t as f32;
        }
        if let Some(n) = config["max_output_tokens"].as_u64() {
            self.max_output_tokens = u32::try_from(n).unwrap_or(u32::MAX);
        }
        self
    }
}

/// Options for a multi-turn chat call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChatOptions {
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            max_output_tokens: 512,
        }
    }
}

impl ChatOptions {
    /// Clamp into `[0, caps]`. A NaN temperature becomes 0.
    pub fn clamped(&self, caps: &ChatCaps) -> Self {
        let temperature = if self.temperature.is_nan() {
            0.0
        } else {
            self.temperature.clamp(0.0, caps.max_temperature.max(0.0))
        };
        Self {
            temperature,
            max_output_tokens: self.max_output_tokens.min(caps.max_output_tokens),
        }
    }
}

/// A chat message for LLM completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role: "system", "user", or "assistant"
    pub role: String,

    /// Message content
    pub content: String,
}

impl ChatMessage {
    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Response from an LLM completion.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    /// Generated content. For `complete` this is the extracted JSON span.
    pub content: String,

    /// Token usage
    pub usage: TokenUsage,

    /// Model used
    pub model: String,

    /// Stop reason
    pub stop_reason: Option<String>,
}

/// Token usage from a completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    /// Tokens in the prompt
    pub prompt_tokens: u32,

    /// Tokens in the completion
    pub completion_tokens: u32,
}

impl TokenUsage {
    /// Total tokens used.
    pub fn total(&self) -> u32 {
        self.prompt_tokens.saturating_add(self.completion_tokens)
    }
}

/// Provider abstraction allows swapping LLM backends.
///
/// Adapters retry internally on transport errors only. Whether a response
/// is usable is the pipeline's decision, not the adapter's.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Single-turn JSON generation.
    ///
    /// The returned content has code fences removed and is cut to the
    /// outermost `{...}` span (see [`extract_json_text`]).
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<CompletionResponse, ProviderError>;

    /// Multi-turn free-text generation. `options` are clamped to the
    /// adapter's caps before use.
    async fn chat(
        &self,
        system_prompt: &str,
        history: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<CompletionResponse, ProviderError>;

    /// Check if provider is healthy.
    async fn health_check(&self) -> bool;

    /// Get provider name for logs and `modelInfo`.
    fn name(&self) -> &str;

    /// Model identifier used for `complete`.
    fn model(&self) -> &str;
}

/// Cut vendor wrapping from a completion so only the JSON object remains.
///
/// If no `{` is present the trimmed text is returned as-is and the parser
/// reports it as malformed.
pub fn extract_json_text(text: &str) -> String {
    match medexplain_core::extract_json_span(text) {
        Some(span) => span.to_string(),
        None => text.trim().to_string(),
    }
}
