//! # medexplain-runtime
//!
//! Runs a medical document through a language model and returns a
//! validated, patient-safe analysis.
//!
//! `medexplain-core` does the deterministic work (redaction, normalization,
//! validation, safety filtering). This crate adds everything that waits on
//! the network or on time:
//!
//! - provider adapters and the resolver that picks one ([`providers`])
//! - prompts, including the retry prompt ([`prompts`])
//! - the two-attempt pipeline ([`pipeline`])
//! - the per-caller rate limiter ([`resilience`])
//! - YAML configuration ([`config`]) and PHI-blind logging ([`telemetry`])
//!
//! With no provider credential configured the pipeline runs in mock mode
//! and returns fixtures without any network call.
//!
//! ## Example
//!
//! ```rust,ignore
//! use medexplain_runtime::{AnalysisPipeline, PipelineConfig};
//! use medexplain_core::{DocumentType, ReadingLevel};
//!
//! let pipeline = AnalysisPipeline::from_config(PipelineConfig::default())?;
//! let result = pipeline
//!     .analyze("Glucose: 95 mg/dL", DocumentType::LabReport, ReadingLevel::Simple)
//!     .await?;
//! ```

pub mod config;
pub mod pipeline;
pub mod prompts;
pub mod providers;
pub mod resilience;
pub mod telemetry;

pub use config::{CompletionSettings, ConfigError, PipelineConfig, RateLimitSettings};
pub use pipeline::{
    AnalysisError, AnalysisPipeline, AnalysisPipelineBuilder, AnalysisRequest, Attempt,
};
pub use prompts::{build_prompts, build_retry_prompt, render_user_prompt, PromptPair};
pub use providers::{
    ChatCaps, ChatMessage, ChatOptions, CompletionResponse, LlmProvider, ProviderError,
    ProviderFactory, ProviderResolver, TokenUsage,
};
pub use resilience::{RateLimitExceeded, RateLimiter};
pub use telemetry::{LogRecord, ALLOWED_LOG_FIELDS};
