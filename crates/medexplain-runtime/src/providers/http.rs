//! Shared HTTP plumbing for the vendor adapters.

use backon::ExponentialBuilder;
use serde::de::DeserializeOwned;
use std::time::Duration;

use super::ProviderError;
use crate::telemetry::LogRecord;

/// Vendor error bodies can be long; only the head is kept.
const MAX_ERROR_BODY_CHARS: usize = 300;

/// Backoff for transport retries.
pub(crate) fn backoff(max_retries: usize) -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(500))
        .with_max_delay(Duration::from_secs(8))
        .with_max_times(max_retries)
        .with_jitter()
}

/// Send a prepared request and decode a successful JSON body.
pub(crate) async fn send_json<T: DeserializeOwned>(
    request: reqwest::RequestBuilder,
    timeout: Duration,
) -> Result<T, ProviderError> {
    let response = request.timeout(timeout).send().await.map_err(|e| {
        if e.is_timeout() {
            ProviderError::Timeout(timeout)
        } else {
            ProviderError::HttpError(e.to_string())
        }
    })?;

    let status = response.status();

    if status.as_u16() == 429 {
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        return Err(ProviderError::RateLimited { retry_after });
    }

    if status.as_u16() == 401 || status.as_u16() == 403 {
        return Err(ProviderError::AuthError);
    }

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ProviderError::ApiError {
            status: status.as_u16(),
            message: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
        });
    }

    response
        .json::<T>()
        .await
        .map_err(|e| ProviderError::ParseError(e.to_string()))
}

/// Log a transport failure that is about to be retried.
pub(crate) fn log_retry(provider: &'static str, err: &ProviderError, delay: Duration) {
    LogRecord::new("provider_retry")
        .field("provider", provider)
        .provider_error(err)
        .field("backoff_ms", u64::try_from(delay.as_millis()).unwrap_or(u64::MAX))
        .emit_at(tracing::Level::WARN);
}
