//! Resilience patterns for medexplain-runtime.
//!
//! Transport retries live in the provider adapters (`backon`); the
//! schema-level retry lives in the pipeline. This module holds the
//! per-caller rate limiter that guards the pipeline entry point.

mod rate_limiter;

pub use rate_limiter::{RateLimitExceeded, RateLimiter};
