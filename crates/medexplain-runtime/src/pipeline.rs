//! The analysis pipeline.
//!
//! One request runs sequentially:
//!
//! ```text
//! prepare -> redact -> (mock fixture | prompts -> attempt loop) -> safety filter
//! ```
//!
//! The attempt loop is a two-state machine. [`Attempt::First`] sends the
//! normal prompts. If its response cannot be parsed or fails validation,
//! [`Attempt::Retry`] sends a prompt listing the problems. A rejection on
//! the retry is terminal, as is a provider failure in either state.
//!
//! Nothing here logs document text, model output or validator messages;
//! see [`crate::telemetry`].

use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::Level;

use medexplain_core::{
    detect_shape_mismatch, mock_analysis_with, normalize, parse_model_json, redact_input, validate,
    AnalysisResult, DocumentType, ModelInfo, NormalizeContext, ProvenanceSource, ReadingLevel,
    RedactionReport, SafetyFilter, ValidationIssue,
};

use crate::config::PipelineConfig;
use crate::prompts::{build_prompts, build_retry_prompt};
use crate::providers::{LlmProvider, ProviderError, ProviderResolver};
use crate::resilience::RateLimiter;
use crate::telemetry::LogRecord;

/// Terminal failures of an analysis.
///
/// `Display` never includes document text, model output or validator
/// messages. Show [`AnalysisError::user_message`] to end users.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),

    #[error("no provider configured and mock mode is disabled")]
    ProviderUnavailable,

    #[error("provider call failed")]
    ProviderCallFailed(#[source] ProviderError),

    #[error("model response could not be parsed")]
    MalformedResponse,

    #[error("analysis failed validation with {issue_count} issues")]
    SchemaViolation { issue_count: usize },

    #[error("rate limit exceeded, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },
}

impl AnalysisError {
    /// One sentence that is safe to show a patient.
    pub fn user_message(&self) -> &'static str {
        match self {
            AnalysisError::InvalidInput(_) => {
                "We could not read any text in this document. Please check the file and try again."
            }
            AnalysisError::RateLimited { .. } => {
                "Too many requests. Please wait a moment and try again."
            }
            AnalysisError::ProviderUnavailable
            | AnalysisError::ProviderCallFailed(_)
            | AnalysisError::MalformedResponse
            | AnalysisError::SchemaViolation { .. } => {
                "We could not analyze this document right now. Please try again later."
            }
        }
    }

    /// Status code for an HTTP boundary.
    pub fn http_status(&self) -> u16 {
        match self {
            AnalysisError::InvalidInput(_) => 400,
            AnalysisError::RateLimited { .. } => 429,
            AnalysisError::ProviderCallFailed(_) | AnalysisError::MalformedResponse => 502,
            AnalysisError::ProviderUnavailable => 503,
            AnalysisError::SchemaViolation { .. } => 422,
        }
    }

    /// Short stable name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            AnalysisError::InvalidInput(_) => "invalid_input",
            AnalysisError::ProviderUnavailable => "provider_unavailable",
            AnalysisError::ProviderCallFailed(_) => "provider_call_failed",
            AnalysisError::MalformedResponse => "malformed_response",
            AnalysisError::SchemaViolation { .. } => "schema_violation",
            AnalysisError::RateLimited { .. } => "rate_limited",
        }
    }
}

/// A document to analyze.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub text: String,
    pub document_type: DocumentType,
    pub reading_level: ReadingLevel,
    pub source: ProvenanceSource,
}

impl AnalysisRequest {
    pub fn new(text: impl Into<String>, document_type: DocumentType, reading_level: ReadingLevel) -> Self {
        Self {
            text: text.into(),
            document_type,
            reading_level,
            source: ProvenanceSource::Text,
        }
    }

    pub fn with_source(mut self, source: ProvenanceSource) -> Self {
        self.source = source;
        self
    }
}

/// State of the attempt loop.
#[derive(Debug, Clone, PartialEq)]
pub enum Attempt {
    First,
    Retry {
        issues: Vec<ValidationIssue>,
        previous_response: String,
    },
}

impl Attempt {
    pub fn number(&self) -> u8 {
        match self {
            Attempt::First => 1,
            Attempt::Retry { .. } => 2,
        }
    }
}

/// Why a response was not accepted.
#[derive(Debug, Clone, PartialEq)]
enum Rejection {
    Malformed(String),
    Schema(Vec<ValidationIssue>),
}

impl Rejection {
    fn issues(&self) -> Vec<ValidationIssue> {
        match self {
            Rejection::Malformed(reason) => vec![ValidationIssue::root(reason.clone())],
            Rejection::Schema(issues) => issues.clone(),
        }
    }

    fn into_error(self) -> AnalysisError {
        match self {
            Rejection::Malformed(_) => AnalysisError::MalformedResponse,
            Rejection::Schema(issues) => AnalysisError::SchemaViolation {
                issue_count: issues.len(),
            },
        }
    }
}

/// Runs analyses against one provider, or against fixtures in mock mode.
pub struct AnalysisPipeline {
    provider: Option<Arc<dyn LlmProvider>>,
    config: PipelineConfig,
    rate_limiter: Arc<RateLimiter>,
    safety: SafetyFilter,
}

impl std::fmt::Debug for AnalysisPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisPipeline")
            .field("provider", &self.provider.as_ref().map(|p| p.name().to_string()))
            .field("config", &self.config)
            .field("rate_limiter", &self.rate_limiter)
            .finish()
    }
}

impl AnalysisPipeline {
    pub fn builder() -> AnalysisPipelineBuilder {
        AnalysisPipelineBuilder::new()
    }

    /// Resolve a provider from the built-in adapters and build a pipeline.
    pub fn from_config(config: PipelineConfig) -> Result<Self, ProviderError> {
        Self::from_config_with(&ProviderResolver::with_defaults(), config)
    }

    /// Resolve a provider with `resolver` and build a pipeline.
    pub fn from_config_with(
        resolver: &ProviderResolver,
        config: PipelineConfig,
    ) -> Result<Self, ProviderError> {
        let provider = resolver.resolve(&config)?;
        let mut builder = AnalysisPipelineBuilder::new().config(config);
        if let Some(provider) = provider {
            builder = builder.provider(provider);
        }
        Ok(builder.build())
    }

    /// Whether requests will be served from fixtures.
    pub fn is_mock(&self) -> bool {
        self.provider.is_none()
    }

    pub fn provider_name(&self) -> Option<&str> {
        self.provider.as_deref().map(|p| p.name())
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    /// Analyze plain text.
    pub async fn analyze(
        &self,
        text: &str,
        document_type: DocumentType,
        reading_level: ReadingLevel,
    ) -> Result<AnalysisResult, AnalysisError> {
        self.run(text, document_type, reading_level, ProvenanceSource::Text)
            .await
    }

    /// Rate-limit `caller_id`, then analyze `request`.
    pub async fn analyze_request(
        &self,
        caller_id: &str,
        request: AnalysisRequest,
    ) -> Result<AnalysisResult, AnalysisError> {
        if let Err(limited) = self.rate_limiter.check(caller_id) {
            LogRecord::new("analysis_rejected")
                .field("outcome", "rate_limited")
                .field(
                    "retry_after_ms",
                    u64::try_from(limited.retry_after.as_millis()).unwrap_or(u64::MAX),
                )
                .emit_at(Level::WARN);
            return Err(AnalysisError::RateLimited {
                retry_after: limited.retry_after,
            });
        }

        self.run(
            &request.text,
            request.document_type,
            request.reading_level,
            request.source,
        )
        .await
    }

    async fn run(
        &self,
        text: &str,
        document_type: DocumentType,
        reading_level: ReadingLevel,
        source: ProvenanceSource,
    ) -> Result<AnalysisResult, AnalysisError> {
        let started = Instant::now();
        let outcome = self
            .run_inner(text, document_type, reading_level, source, started)
            .await;

        if let Err(err) = &outcome {
            LogRecord::new("analysis_failed")
                .field("document_type", document_type.as_str())
                .field("reading_level", reading_level.as_str())
                .field("provider", self.provider_name().unwrap_or("mock"))
                .field("error_kind", err.kind())
                .field("elapsed_ms", elapsed_ms(started))
                .field("outcome", "error")
                .emit_at(Level::WARN);
        }
        outcome
    }

    async fn run_inner(
        &self,
        text: &str,
        document_type: DocumentType,
        reading_level: ReadingLevel,
        source: ProvenanceSource,
        started: Instant,
    ) -> Result<AnalysisResult, AnalysisError> {
        if text.trim().is_empty() {
            return Err(AnalysisError::InvalidInput("document text is empty"));
        }
        let (redacted, redactions) = redact_input(text, self.config.max_input_chars);
        if redacted.trim().is_empty() {
            return Err(AnalysisError::InvalidInput("document has no readable text"));
        }

        let ctx = NormalizeContext::new(document_type, reading_level)
            .with_source(source)
            .with_redaction_applied(true)
            .with_language(self.config.language.clone());

        let Some(provider) = self.provider.as_deref() else {
            if !self.config.allow_mock {
                return Err(AnalysisError::ProviderUnavailable);
            }
            let fixture = mock_analysis_with(&ctx);
            return self.finish(fixture, &redactions, 0, "mock", started);
        };

        let ctx = ctx.with_model_info(ModelInfo::new(provider.name(), provider.model()));
        let prompts = build_prompts(document_type, reading_level);
        let mut attempt = Attempt::First;

        loop {
            let user_prompt = match &attempt {
                Attempt::First => prompts.user_prompt(&redacted),
                Attempt::Retry {
                    issues,
                    previous_response,
                } => build_retry_prompt(&redacted, previous_response, issues),
            };

            LogRecord::new("attempt_started")
                .field("provider", provider.name())
                .field("model", provider.model())
                .field("attempt", attempt.number())
                .field("input_chars", redacted.chars().count())
                .emit_at(Level::DEBUG);

            let response = self.call_provider(provider, &prompts.system, &user_prompt).await?;

            match evaluate(&response, &ctx) {
                Ok(result) => {
                    return self.finish(result, &redactions, attempt.number(), "success", started);
                }
                Err(rejection) => {
                    LogRecord::new("attempt_rejected")
                        .field("provider", provider.name())
                        .field("attempt", attempt.number())
                        .field("output_chars", response.chars().count())
                        .field(
                            "error_kind",
                            match rejection {
                                Rejection::Malformed(_) => "malformed_response",
                                Rejection::Schema(_) => "schema_violation",
                            },
                        )
                        .issues(&rejection.issues())
                        .emit_at(Level::WARN);

                    attempt = match attempt {
                        Attempt::First => Attempt::Retry {
                            issues: rejection.issues(),
                            previous_response: response,
                        },
                        Attempt::Retry { .. } => return Err(rejection.into_error()),
                    };
                }
            }
        }
    }

    async fn call_provider(
        &self,
        provider: &dyn LlmProvider,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, AnalysisError> {
        let timeout = self.config.provider_timeout;
        match tokio::time::timeout(timeout, provider.complete(system_prompt, user_prompt)).await {
            Ok(Ok(response)) => Ok(response.content),
            Ok(Err(err)) => {
                LogRecord::new("provider_call_failed")
                    .field("provider", provider.name())
                    .provider_error(&err)
                    .emit_at(Level::WARN);
                Err(AnalysisError::ProviderCallFailed(err))
            }
            Err(_) => {
                LogRecord::new("provider_call_failed")
                    .field("provider", provider.name())
                    .field("error_kind", "timeout")
                    .field("elapsed_ms", u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX))
                    .emit_at(Level::WARN);
                Err(AnalysisError::ProviderCallFailed(ProviderError::Timeout(timeout)))
            }
        }
    }

    fn finish(
        &self,
        result: AnalysisResult,
        redactions: &RedactionReport,
        attempt: u8,
        outcome: &'static str,
        started: Instant,
    ) -> Result<AnalysisResult, AnalysisError> {
        let document_type = result.document_type();
        let reading_level = result.meta().reading_level;

        let (safe, report) = self.safety.filter_result_with_report(result).map_err(|err| {
            tracing::error!(error_kind = "filtered_result_invalid", line = err.line(), "safety filter broke the result");
            AnalysisError::SchemaViolation { issue_count: 1 }
        })?;

        LogRecord::new("analysis_completed")
            .field("document_type", document_type.as_str())
            .field("reading_level", reading_level.as_str())
            .field("provider", self.provider_name().unwrap_or("mock"))
            .field("attempt", attempt)
            .field("redactions", redactions.total())
            .field("filter_hits", report.tokens_stripped + report.overreach_replaced)
            .field("elapsed_ms", elapsed_ms(started))
            .field("outcome", outcome)
            .emit();

        Ok(safe)
    }
}

/// parse -> shape check -> normalize -> validate.
fn evaluate(response: &str, ctx: &NormalizeContext) -> Result<AnalysisResult, Rejection> {
    let raw = parse_model_json(response).map_err(|e| Rejection::Malformed(e.to_string()))?;

    let mismatch = detect_shape_mismatch(&raw, ctx.document_type);
    if !mismatch.is_empty() {
        return Err(Rejection::Schema(mismatch));
    }

    let candidate = normalize(&raw, ctx).map_err(|e| Rejection::Malformed(e.to_string()))?;
    validate(&candidate).map_err(Rejection::Schema)
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Builder for [`AnalysisPipeline`].
pub struct AnalysisPipelineBuilder {
    provider: Option<Arc<dyn LlmProvider>>,
    config: PipelineConfig,
    rate_limiter: Option<Arc<RateLimiter>>,
}

impl AnalysisPipelineBuilder {
    pub fn new() -> Self {
        Self {
            provider: None,
            config: PipelineConfig::default(),
            rate_limiter: None,
        }
    }

    /// Set the LLM provider. Without one the pipeline runs in mock mode.
    pub fn provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Share a limiter between pipelines. Defaults to one built from
    /// `config.rate_limit`.
    pub fn rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    pub fn build(self) -> AnalysisPipeline {
        let rate_limiter = self
            .rate_limiter
            .unwrap_or_else(|| Arc::new(RateLimiter::from_settings(&self.config.rate_limit)));

        AnalysisPipeline {
            provider: self.provider,
            config: self.config,
            rate_limiter,
            safety: SafetyFilter::new(),
        }
    }
}

impl Default for AnalysisPipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx(dt: DocumentType) -> NormalizeContext {
        NormalizeContext::new(dt, ReadingLevel::Simple)
    }

    #[test]
    fn test_error_status_and_messages() {
        let cases: Vec<(AnalysisError, u16)> = vec![
            (AnalysisError::InvalidInput("empty"), 400),
            (AnalysisError::RateLimited { retry_after: Duration::from_secs(1) }, 429),
            (AnalysisError::ProviderCallFailed(ProviderError::AuthError), 502),
            (AnalysisError::MalformedResponse, 502),
            (AnalysisError::ProviderUnavailable, 503),
            (AnalysisError::SchemaViolation { issue_count: 3 }, 422),
        ];
        for (err, status) in cases {
            assert_eq!(err.http_status(), status);
            assert!(err.user_message().ends_with('.'));
            assert!(!err.user_message().contains("schema"));
        }
    }

    #[test]
    fn test_provider_error_detail_not_displayed() {
        let err = AnalysisError::ProviderCallFailed(ProviderError::ApiError {
            status: 400,
            message: "prompt contained Jane Doe".into(),
        });
        assert!(!err.to_string().contains("Jane"));
    }

    #[test]
    fn test_attempt_numbers() {
        assert_eq!(Attempt::First.number(), 1);
        let retry = Attempt::Retry {
            issues: vec![],
            previous_response: String::new(),
        };
        assert_eq!(retry.number(), 2);
    }

    #[test]
    fn test_evaluate_accepts_sparse_object() {
        let response = json!({"labs": [{"name": "Glucose", "value": "95"}]}).to_string();
        let result = evaluate(&response, &ctx(DocumentType::LabReport)).unwrap();
        assert_eq!(result.document_type(), DocumentType::LabReport);
    }

    #[test]
    fn test_evaluate_rejects_wrong_declared_type() {
        let response = json!({"meta": {"documentType": "discharge_summary"}}).to_string();
        match evaluate(&response, &ctx(DocumentType::LabReport)) {
            Err(Rejection::Schema(issues)) => assert_eq!(issues[0].path, "/meta/documentType"),
            other => panic!("expected schema rejection, got {:?}", other.map(|r| r.document_type())),
        }
    }

    #[test]
    fn test_evaluate_malformed() {
        assert!(matches!(
            evaluate("no json at all", &ctx(DocumentType::LabReport)),
            Err(Rejection::Malformed(_))
        ));
        assert_eq!(
            Rejection::Malformed("x".into()).into_error().kind(),
            "malformed_response"
        );
    }
}
