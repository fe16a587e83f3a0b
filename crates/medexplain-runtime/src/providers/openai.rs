//! OpenAI-compatible chat-completions provider.
//!
//! One adapter serves every vendor that speaks the `/chat/completions`
//! wire format with bearer auth. A [`OpenAiFlavour`] picks the defaults
//! (base URL, model, credential variable) for each.

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

pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const GROQ_API_KEY_ENV: &str = "GROQ_API_KEY";

/// Vendors served by [`OpenAiCompatibleProvider`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenAiFlavour {
    OpenAi,
    Groq,
}

impl OpenAiFlavour {
    pub fn provider_type(&self) -> &'static str {
        match self {
            OpenAiFlavour::OpenAi => "openai",
            OpenAiFlavour::Groq => "groq",
        }
    }

    pub fn credential_env(&self) -> &'static str {
        match self {
            OpenAiFlavour::OpenAi => OPENAI_API_KEY_ENV,
            OpenAiFlavour::Groq => GROQ_API_KEY_ENV,
        }
    }

    fn credential_name(&self) -> &'static str {
        match self {
            OpenAiFlavour::OpenAi => "OpenAI API key",
            OpenAiFlavour::Groq => "Groq API key",
        }
    }

    fn default_base_url(&self) -> &'static str {
        match self {
            OpenAiFlavour::OpenAi => "https://api.openai.com/v1",
            OpenAiFlavour::Groq => "https://api.groq.com/openai/v1",
        }
    }

    fn default_model(&self) -> &'static str {
        match self {
            OpenAiFlavour::OpenAi => "gpt-4o-mini",
            OpenAiFlavour::Groq => "llama-3.3-70b-versatile",
        }
    }
}

pub struct OpenAiCompatibleProvider {
    flavour: OpenAiFlavour,
    credential: ApiCredential,
    base_url: String,
    settings: CompletionConfig,
    caps: ChatCaps,
    client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiCompatibleProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatibleProvider")
            .field("flavour", &self.flavour)
            .field("credential", &self.credential)
            .field("base_url", &self.base_url)
            .field("model", &self.settings.model)
            .finish()
    }
}

impl OpenAiCompatibleProvider {
    pub fn new(flavour: OpenAiFlavour, api_key: impl Into<String>) -> Self {
        Self {
            flavour,
            credential: ApiCredential::new(
                api_key,
                CredentialSource::Programmatic,
                flavour.credential_name(),
            ),
            base_url: flavour.default_base_url().to_string(),
            settings: CompletionConfig::for_model(flavour.default_model()),
            caps: ChatCaps::default(),
            client: reqwest::Client::new(),
        }
    }

    pub fn from_config(flavour: OpenAiFlavour, config: &JsonValue) -> Result<Self, ProviderError> {
        let credential = ApiCredential::from_config_or_env(
            config,
            "api_key",
            flavour.credential_env(),
            flavour.credential_name(),
        )?;

        let base_url = config["base_url"]
            .as_str()
            .unwrap_or(flavour.default_base_url())
            .trim_end_matches('/')
            .to_string();
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ProviderError::NotConfigured(
                "base_url must start with http:// or https://".to_string(),
            ));
        }

        Ok(Self {
            flavour,
            credential,
            base_url,
            settings: CompletionConfig::for_model(flavour.default_model()).merge_json(config),
            caps: ChatCaps::default().merge_json(config),
            client: reqwest::Client::new(),
        })
    }

    async fn send(&self, request: &ChatRequest) -> Result<CompletionResponse, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let provider = self.flavour.provider_type();
        let (this, url, request) = (self, url.as_str(), request);

        let body: ChatResponse = (|| async move {
            http::send_json::<ChatResponse>(
                this.client
                    .post(url)
                    .bearer_auth(this.credential.expose())
                    .json(request),
                this.settings.timeout,
            )
            .await
        })
        .retry(http::backoff(self.settings.max_retries))
        .when(ProviderError::is_transient)
        .notify(|err, delay| http::log_retry(provider, err, delay))
        .await?;

        let choice = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::ParseError("no choices in response".to_string()))?;

        Ok(CompletionResponse {
            content: choice.message.content.unwrap_or_default(),
            usage: body
                .usage
                .map(|u| TokenUsage {
                    prompt_tokens: u.prompt_tokens,
                    completion_tokens: u.completion_tokens,
                })
                .unwrap_or_default(),
            model: body.model.unwrap_or_else(|| self.settings.model.clone()),
            stop_reason: choice.finish_reason,
        })
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    model: Option<String>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<CompletionResponse, ProviderError> {
        let request = ChatRequest {
            model: self.settings.model.clone(),
            messages: vec![ChatMessage::system(system_prompt), ChatMessage::user(user_prompt)],
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
            response_format: Some(ResponseFormat { kind: "json_object" }),
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
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(ChatMessage::system(system_prompt));
        messages.extend(history.iter().filter(|m| m.role != "system").cloned());

        let request = ChatRequest {
            model: self.settings.model.clone(),
            messages,
            max_tokens: options.max_output_tokens,
            temperature: options.temperature,
            response_format: None,
        };
        self.send(&request).await
    }

    async fn health_check(&self) -> bool {
        !self.credential.is_empty()
    }

    fn name(&self) -> &str {
        self.flavour.provider_type()
    }

    fn model(&self) -> &str {
        &self.settings.model
    }
}

/// Factory for one [`OpenAiFlavour`].
pub struct OpenAiProviderFactory {
    flavour: OpenAiFlavour,
}

impl OpenAiProviderFactory {
    pub fn new(flavour: OpenAiFlavour) -> Self {
        Self { flavour }
    }
}

impl ProviderFactory for OpenAiProviderFactory {
    fn provider_type(&self) -> &'static str {
        self.flavour.provider_type()
    }

    fn credential_env(&self) -> &'static str {
        self.flavour.credential_env()
    }

    fn create(&self, config: &JsonValue) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        Ok(Arc::new(OpenAiCompatibleProvider::from_config(
            self.flavour,
            config,
        )?))
    }

    fn description(&self) -> &'static str {
        match self.flavour {
            OpenAiFlavour::OpenAi => "OpenAI chat-completions provider",
            OpenAiFlavour::Groq => "Groq provider (OpenAI-compatible)",
        }
    }
}
