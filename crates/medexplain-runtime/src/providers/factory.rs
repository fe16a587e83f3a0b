//! Provider factories and the priority-ordered resolver.
//!
//! Each adapter registers a factory that knows its type id, which
//! credential it needs, and how to build an instance from a JSON config
//! object. The resolver walks its factories in order and builds the first
//! one whose credential is available.
//!
//! ```ignore
//! let resolver = ProviderResolver::with_defaults();
//! match resolver.resolve(&config)? {
//!     Some(provider) => { /* live */ }
//!     None => { /* mock mode */ }
//! }
//! ```

use std::sync::Arc;

use serde_json::Value as JsonValue;

use super::{LlmProvider, ProviderError};
use crate::config::PipelineConfig;

/// Factory for creating LLM providers from configuration.
pub trait ProviderFactory: Send + Sync {
    /// Unique identifier, e.g. "openai", "anthropic", "groq".
    fn provider_type(&self) -> &'static str;

    /// Environment variable the credential falls back to.
    fn credential_env(&self) -> &'static str;

    /// Create a provider instance from JSON configuration.
    fn create(&self, config: &JsonValue) -> Result<Arc<dyn LlmProvider>, ProviderError>;

    /// Whether a credential is available in `config` or the environment.
    fn is_configured(&self, config: &JsonValue) -> bool {
        super::ApiCredential::is_available(config, "api_key", self.credential_env())
    }

    /// Human-readable description of this provider.
    fn description(&self) -> &'static str {
        "LLM Provider"
    }
}

/// Factories in fixed priority order.
#[derive(Default)]
pub struct ProviderResolver {
    factories: Vec<Arc<dyn ProviderFactory>>,
}

impl ProviderResolver {
    /// A resolver over the given factories, highest priority first.
    pub fn new(factories: Vec<Arc<dyn ProviderFactory>>) -> Self {
        Self { factories }
    }

    /// The built-in adapters compiled into this build, in the order
    /// openai, anthropic, groq.
    pub fn with_defaults() -> Self {
        #[allow(unused_mut)]
        let mut factories: Vec<Arc<dyn ProviderFactory>> = Vec::new();
        #[cfg(feature = "openai")]
        factories.push(Arc::new(super::OpenAiProviderFactory::new(
            super::OpenAiFlavour::OpenAi,
        )));
        #[cfg(feature = "anthropic")]
        factories.push(Arc::new(super::AnthropicProviderFactory));
        #[cfg(feature = "openai")]
        factories.push(Arc::new(super::OpenAiProviderFactory::new(
            super::OpenAiFlavour::Groq,
        )));
        Self { factories }
    }

    /// Build the first configured provider, or `None` for mock mode.
    ///
    /// A factory whose credential is present but whose construction fails
    /// is an error, not a reason to fall through to the next one.
    pub fn resolve(
        &self,
        config: &PipelineConfig,
    ) -> Result<Option<Arc<dyn LlmProvider>>, ProviderError> {
        for factory in &self.factories {
            let settings = config.provider_settings(factory.provider_type());
            if factory.is_configured(&settings) {
                tracing::debug!(provider = factory.provider_type(), "resolved provider");
                return factory.create(&settings).map(Some);
            }
        }
        tracing::debug!("no provider credential configured");
        Ok(None)
    }

    /// Build a named provider regardless of priority.
    pub fn create(
        &self,
        provider_type: &str,
        config: &PipelineConfig,
    ) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        self.factories
            .iter()
            .find(|f| f.provider_type() == provider_type)
            .ok_or_else(|| {
                ProviderError::NotConfigured(format!(
                    "Unknown provider type: '{}'. Available: {:?}",
                    provider_type,
                    self.available_types()
                ))
            })?
            .create(&config.provider_settings(provider_type))
    }

    /// Provider types in priority order.
    pub fn available_types(&self) -> Vec<&'static str> {
        self.factories.iter().map(|f| f.provider_type()).collect()
    }
}

impl std::fmt::Debug for ProviderResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderResolver")
            .field("providers", &self.available_types())
            .finish()
    }
}
