//! Anthropic Claude provider (Messages API).
//!
//! ## Security
//!
//! The API key is held in an [`ApiCredential`] and only exposed while the
//! `x-api-key` header is built.

use super::{
    extract_json_text,
    factory::ProviderFactory,
    http,
    secrets::{ApiCredential, CredentialSource},
    ChatCaps, ChatMessage, ChatOptions, CompletionConfig, CompletionResponse, LlmProvider,
    ProviderError, TokenUsage,
};
use async_trait::async_trait;
use backon::Retryable;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;

/// Environment variable name for Anthropic API key.
pub const ANTHROPIC_API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const DEFAULT_MODEL: &str = "claude-sonnet-4-5";
const API_VERSION: &str = "2023-06-01";

/// Anthropic Claude provider.
pub struct AnthropicProvider {
    credential: ApiCredential,
    base_url: String,
    settings: CompletionConfig,
    caps: ChatCaps,
    client: reqwest::Client,
}

impl std::fmt::Debug for AnthropicProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicProvider")
            .field("credential", &self.credential)
            .field("base_url", &self.base_url)
            .field("model", &self.settings.model)
            .finish()
    }
}

impl AnthropicProvider {
    /// Create a provider with default settings.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            credential: ApiCredential::new(
                api_key,
                CredentialSource::Programmatic,
                "Anthropic API key",
            ),
            base_url: DEFAULT_BASE_URL.to_string(),
            settings: CompletionConfig::for_model(DEFAULT_MODEL),
            caps: ChatCaps::default(),
            client: reqwest::Client::new(),
        }
    }

    /// Create from a provider config object, falling back to
    /// `ANTHROPIC_API_KEY` for the credential.
    pub fn from_config(config: &JsonValue) -> Result<Self, ProviderError> {
        let credential = ApiCredential::from_config_or_env(
            config,
            "api_key",
            ANTHROPIC_API_KEY_ENV,
            "Anthropic API key",
        )?;

        let base_url = config["base_url"]
            .as_str()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
            .to_string();
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ProviderError::NotConfigured(
                "base_url must start with http:// or https://".to_string(),
            ));
        }

        Ok(Self {
            credential,
            base_url,
            settings: CompletionConfig::for_model(DEFAULT_MODEL).merge_json(config),
            caps: ChatCaps::default().merge_json(config),
            client: reqwest::Client::new(),
        })
    }

    /// Set custom base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    async fn send(&self, request: &MessagesRequest) -> Result<CompletionResponse, ProviderError> {
        let url = format!("{}/messages", self.base_url);
        let (this, url, request) = (self, url.as_str(), request);

        let body: MessagesResponse = (|| async move {
            http::send_json::<MessagesResponse>(
                this.client
                    .post(url)
                    .header("x-api-key", this.credential.expose())
                    .header("anthropic-version", API_VERSION)
                    .json(request),
                this.settings.timeout,
            )
            .await
        })
        .retry(http::backoff(self.settings.max_retries))
        .when(ProviderError::is_transient)
        .notify(|err, delay| http::log_retry("anthropic", err, delay))
        .await?;

        let content = body
            .content
            .into_iter()
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");

        Ok(CompletionResponse {
            content,
            usage: TokenUsage {
                prompt_tokens: body.usage.input_tokens,
                completion_tokens: body.usage.output_tokens,
            },
            model: body.model,
            stop_reason: body.stop_reason,
        })
    }
}

/// Anthropic API request format.
#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<WireMessage>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: String,
    content: String,
}

/// Anthropic API response format.
#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    model: String,
    stop_reason: Option<String>,
    usage: WireUsage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct WireUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

/// System text goes in its own field; only user and assistant turns are
/// allowed in `messages`.
fn wire_history(history: &[ChatMessage]) -> Vec<WireMessage> {
    history
        .iter()
        .filter(|m| m.role == "user" || m.role == "assistant")
        .map(|m| WireMessage {
            role: m.role.clone(),
            content: m.content.clone(),
        })
        .collect()
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<CompletionResponse, ProviderError> {
        let request = MessagesRequest {
            model: self.settings.model.clone(),
            max_tokens: self.settings.max_tokens,
            system: Some(system_prompt.to_string()),
            messages: vec![WireMessage {
                role: "user".to_string(),
                content: user_prompt.to_string(),
            }],
            temperature: self.settings.temperature,
        };

        let mut response = self.send(&request).await?;
        response.content = extract_json_text(&response.content);
        Ok(response)
    }

    async fn chat(
        &self,
        system_prompt: &str,
        history: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<CompletionResponse, ProviderError> {
        let options = options.clamped(&self.caps);
        let request = MessagesRequest {
            model: self.settings.model.clone(),
            max_tokens: options.max_output_tokens,
            system: Some(system_prompt.to_string()),
            messages: wire_history(history),
            temperature: options.temperature,
        };
        self.send(&request).await
    }

    async fn health_check(&self) -> bool {
        !self.credential.is_empty()
    }

    fn name(&self) -> &str {
        "anthropic"
    }

    fn model(&self) -> &str {
        &self.settings.model
    }
}

/// Factory for creating Anthropic providers from configuration.
///
/// ## Configuration Format
/// ```json
/// {
///   "api_key": "sk-ant-...",       // Optional, falls back to ANTHROPIC_API_KEY
///   "base_url": "https://...",     // Optional
///   "model": "claude-sonnet-4-5"   // Optional
/// }
/// ```
pub struct AnthropicProviderFactory;

impl ProviderFactory for AnthropicProviderFactory {
    fn provider_type(&self) -> &'static str {
        "anthropic"
    }

    fn credential_env(&self) -> &'static str {
        ANTHROPIC_API_KEY_ENV
    }

    fn create(&self, config: &JsonValue) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        Ok(Arc::new(AnthropicProvider::from_config(config)?))
    }

    fn description(&self) -> &'static str {
        "Anthropic Claude provider (Messages API)"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_creation() {
        let provider = AnthropicProvider::new("test-key");
        assert_eq!(provider.name(), "anthropic");
        assert_eq!(provider.model(), DEFAULT_MODEL);
    }

    #[test]
    fn test_from_config_reads_settings() {
        let config = serde_json::json!({
            "api_key": "config-api-key",
            "base_url": "https://custom.api.com/v1/",
            "model": "claude-test",
            "max_output_tokens": 64
        });

        let provider = AnthropicProvider::from_config(&config).unwrap();
        assert_eq!(provider.base_url, "https://custom.api.com/v1");
        assert_eq!(provider.model(), "claude-test");
        assert_eq!(provider.caps.max_output_tokens, 64);
        assert_eq!(provider.credential.source(), CredentialSource::Config);
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let config = serde_json::json!({"api_key": "k", "base_url": "ftp://nope"});
        assert!(matches!(
            AnthropicProvider::from_config(&config),
            Err(ProviderError::NotConfigured(_))
        ));
    }

    #[test]
    fn test_api_key_not_in_debug_output() {
        let secret_key = "sk-ant-REDACTED";
        let provider = AnthropicProvider::new(secret_key);

        let debug_output = format!("{:?}", provider);
        assert!(!debug_output.contains(secret_key));
        assert!(debug_output.contains("[REDACTED]"));
    }

    #[tokio::test]
    async fn test_health_check_requires_key() {
        assert!(AnthropicProvider::new("sk-ant-key").health_check().await);
        assert!(!AnthropicProvider::new("").health_check().await);
    }

    #[test]
    fn test_request_shape() {
        let request = MessagesRequest {
            model: "m".into(),
            max_tokens: 10,
            system: Some("sys".into()),
            messages: wire_history(&[
                ChatMessage::system("dropped"),
                ChatMessage::user("hi"),
                ChatMessage::assistant("hello"),
            ]),
            temperature: 0.0,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["system"], "sys");
        assert_eq!(value["messages"].as_array().unwrap().len(), 2);
        assert_eq!(value["messages"][0]["role"], "user");
    }

    #[test]
    fn test_factory() {
        let factory = AnthropicProviderFactory;
        assert_eq!(factory.provider_type(), "anthropic");
        assert_eq!(factory.credential_env(), ANTHROPIC_API_KEY_ENV);
        assert!(factory.is_configured(&serde_json::json!({"api_key": "k"})));
        let provider = factory.create(&serde_json::json!({"api_key": "k"})).unwrap();
        assert_eq!(provider.name(), "anthropic");
    }
}
