//! Pipeline configuration loaded from YAML.
//!
//! Every field has a default, so an empty document is a valid config:
//!
//! ```yaml
//! provider_timeout: 60s
//! max_input_chars: 50000
//! allow_mock: true
//! language: en
//! completion:
//!   max_tokens: 4096
//!   temperature: 0.2
//! chat_caps:
//!   max_temperature: 1.0
//!   max_output_tokens: 1024
//! rate_limit:
//!   capacity: 10
//!   window: 60s
//! providers:
//!   openai:
//!     model: gpt-4o-mini
//! ```
//!
//! Keys under `providers` are passed to the matching factory as JSON.
//! Credentials normally come from the environment; an `api_key` here
//! takes precedence.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::providers::{ChatCaps, CompletionConfig};

/// Errors that can occur when loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Settings for single-turn JSON completions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionSettings {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for CompletionSettings {
    fn default() -> Self {
        Self {
            max_tokens: 4096,
            temperature: 0.2,
        }
    }
}

/// Token bucket parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    pub capacity: u32,
    #[serde(with = "humantime_duration")]
    pub window: Duration,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            capacity: 10,
            window: Duration::from_secs(60),
        }
    }
}

/// Top-level pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Upper bound on a single provider call, transport retries included.
    #[serde(with = "humantime_duration")]
    pub provider_timeout: Duration,

    /// Longer input is truncated before redaction.
    pub max_input_chars: usize,

    /// Return a fixture when no provider is configured.
    pub allow_mock: bool,

    /// Written to `meta.language`.
    pub language: String,

    pub completion: CompletionSettings,

    pub chat_caps: ChatCaps,

    pub rate_limit: RateLimitSettings,

    /// Provider type to factory config.
    pub providers: BTreeMap<String, JsonValue>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            provider_timeout: Duration::from_secs(60),
            max_input_chars: 50_000,
            allow_mock: true,
            language: "en".to_string(),
            completion: CompletionSettings::default(),
            chat_caps: ChatCaps::default(),
            rate_limit: RateLimitSettings::default(),
            providers: BTreeMap::new(),
        }
    }
}

impl PipelineConfig {
    /// Parse from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        // An empty document deserializes as null, not as an empty map.
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: PipelineConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.provider_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                field: "provider_timeout",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.max_input_chars == 0 {
            return Err(ConfigError::Invalid {
                field: "max_input_chars",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.rate_limit.capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "rate_limit.capacity",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.rate_limit.window.is_zero() {
            return Err(ConfigError::Invalid {
                field: "rate_limit.window",
                reason: "must be greater than zero".to_string(),
            });
        }
        for (name, value) in &self.providers {
            if !value.is_object() && !value.is_null() {
                return Err(ConfigError::Invalid {
                    field: "providers",
                    reason: format!("entry '{}' must be a mapping", name),
                });
            }
        }
        Ok(())
    }

    /// The JSON object handed to a provider factory: the entry under
    /// `providers`, with completion settings, chat caps and a per-request
    /// timeout filled in where the entry does not set them.
    pub fn provider_settings(&self, provider_type: &str) -> JsonValue {
        let mut settings = match self.providers.get(provider_type) {
            Some(JsonValue::Object(map)) => map.clone(),
            _ => serde_json::Map::new(),
        };

        let max_retries = settings
            .get("max_retries")
            .and_then(JsonValue::as_u64)
            .unwrap_or(CompletionConfig::default().max_retries as u64);
        let request_timeout = self.request_timeout(max_retries);

        let defaults = [
            ("max_tokens", JsonValue::from(self.completion.max_tokens)),
            ("temperature", JsonValue::from(self.completion.temperature)),
            ("max_retries", JsonValue::from(max_retries)),
            (
                "timeout_ms",
                JsonValue::from(u64::try_from(request_timeout.as_millis()).unwrap_or(u64::MAX)),
            ),
            ("max_temperature", JsonValue::from(self.chat_caps.max_temperature)),
            ("max_output_tokens", JsonValue::from(self.chat_caps.max_output_tokens)),
        ];
        for (key, value) in defaults {
            settings.entry(key.to_string()).or_insert(value);
        }

        JsonValue::Object(settings)
    }

    /// Timeout for one HTTP request. `provider_timeout` bounds the whole
    /// call, so it is split across every transport attempt with one extra
    /// share left for backoff waits.
    pub fn request_timeout(&self, max_retries: u64) -> Duration {
        let shares = u32::try_from(max_retries.saturating_add(2)).unwrap_or(u32::MAX);
        (self.provider_timeout / shares).max(Duration::from_millis(1))
    }
}

/// `Duration` as a humantime string ("60s", "1m 30s").
mod humantime_duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(raw.trim()).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.provider_timeout, Duration::from_secs(60));
        assert_eq!(config.max_input_chars, 50_000);
        assert!(config.allow_mock);
        assert_eq!(config.language, "en");
        assert_eq!(config.rate_limit.capacity, 10);
        assert_eq!(config.rate_limit.window, Duration::from_secs(60));
    }

    #[test]
    fn test_empty_yaml_is_default() {
        assert_eq!(PipelineConfig::from_yaml("").unwrap(), PipelineConfig::default());
        assert_eq!(PipelineConfig::from_yaml("{}").unwrap(), PipelineConfig::default());
    }

    #[test]
    fn test_partial_yaml() {
        let yaml = r#"
provider_timeout: 1m 30s
allow_mock: false
rate_limit:
  window: 10s
providers:
  anthropic:
    model: claude-test
"#;
        let config = PipelineConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.provider_timeout, Duration::from_secs(90));
        assert!(!config.allow_mock);
        assert_eq!(config.rate_limit.window, Duration::from_secs(10));
        assert_eq!(config.rate_limit.capacity, 10);
        assert_eq!(config.providers["anthropic"]["model"], "claude-test");
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            PipelineConfig::from_yaml("max_input_chars: 0"),
            Err(ConfigError::Invalid { field: "max_input_chars", .. })
        ));
        assert!(matches!(
            PipelineConfig::from_yaml("provider_timeout: soon"),
            Err(ConfigError::YamlError(_))
        ));
        assert!(matches!(
            PipelineConfig::from_yaml("providers:\n  openai: 3"),
            Err(ConfigError::Invalid { field: "providers", .. })
        ));
    }

    #[test]
    fn test_request_timeout_leaves_room_for_retries() {
        let config = PipelineConfig::default();
        for retries in 0..5u64 {
            let per_request = config.request_timeout(retries);
            let attempts = u32::try_from(retries + 1).unwrap();
            assert!(per_request * attempts < config.provider_timeout);
        }
        assert_eq!(config.request_timeout(2), Duration::from_secs(15));

        let yaml = r#"
provider_timeout: 10s
providers:
  anthropic:
    max_retries: 0
  openai:
    timeout_ms: 9000
"#;
        let config = PipelineConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.provider_settings("anthropic")["timeout_ms"], 5000);
        assert_eq!(config.provider_settings("openai")["timeout_ms"], 9000);
    }

    #[test]
    fn test_provider_settings_fill_defaults() {
        let yaml = r#"
provider_timeout: 5s
providers:
  openai:
    model: gpt-test
    max_tokens: 100
"#;
        let config = PipelineConfig::from_yaml(yaml).unwrap();
        let settings = config.provider_settings("openai");
        assert_eq!(settings["model"], "gpt-test");
        assert_eq!(settings["max_tokens"], 100);
        assert_eq!(settings["max_retries"], 2);
        assert_eq!(settings["timeout_ms"], 1250);
        assert_eq!(settings["max_output_tokens"], 1024);

        let missing = config.provider_settings("groq");
        assert!(missing.get("api_key").is_none());
        assert_eq!(missing["max_tokens"], 4096);
    }

    #[test]
    fn test_roundtrip_through_yaml() {
        let config = PipelineConfig::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        assert_eq!(PipelineConfig::from_yaml(&yaml).unwrap(), config);
    }
}
