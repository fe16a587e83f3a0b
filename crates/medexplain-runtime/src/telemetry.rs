//! PHI-blind operator logging.
//!
//! A [`LogRecord`] accepts any `(name, value)` pair but keeps only names on
//! [`ALLOWED_LOG_FIELDS`]. Anything else is counted and discarded, so a
//! field carrying document text cannot reach the log by accident.
//! Validator messages and raw model output are never passed here; issues
//! are logged by JSON pointer path only.

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::Level;

use medexplain_core::ValidationIssue;

use crate::providers::ProviderError;

/// Field names that may appear in operator logs.
pub const ALLOWED_LOG_FIELDS: &[&str] = &[
    "document_type",
    "reading_level",
    "provider",
    "model",
    "attempt",
    "issue_count",
    "issue_paths",
    "elapsed_ms",
    "input_chars",
    "output_chars",
    "redactions",
    "filter_hits",
    "outcome",
    "error_kind",
    "retry_after_ms",
    "backoff_ms",
    "http_status",
];

/// A structured log event restricted to allow-listed fields.
#[derive(Debug, Clone)]
pub struct LogRecord {
    event: &'static str,
    fields: BTreeMap<&'static str, Value>,
    dropped: usize,
}

impl LogRecord {
    pub fn new(event: &'static str) -> Self {
        Self {
            event,
            fields: BTreeMap::new(),
            dropped: 0,
        }
    }

    /// Add a field if its name is allowed; otherwise count it as dropped.
    pub fn field(mut self, name: &str, value: impl Into<Value>) -> Self {
        match ALLOWED_LOG_FIELDS.iter().find(|allowed| **allowed == name) {
            Some(allowed) => {
                self.fields.insert(*allowed, value.into());
            }
            None => self.dropped += 1,
        }
        self
    }

    /// Add `issue_count` and `issue_paths`. Messages are left out.
    pub fn issues(self, issues: &[ValidationIssue]) -> Self {
        let paths: Vec<Value> = issues.iter().map(|i| Value::from(i.path.as_str())).collect();
        self.field("issue_count", issues.len())
            .field("issue_paths", Value::Array(paths))
    }

    /// Add `error_kind` and, when known, `http_status`. The error text
    /// itself is left out.
    pub fn provider_error(self, err: &ProviderError) -> Self {
        let record = self.field("error_kind", err.kind());
        match err.http_status() {
            Some(status) => record.field("http_status", status),
            None => record,
        }
    }

    pub fn event(&self) -> &'static str {
        self.event
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Number of fields rejected by the allow-list.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        for (k, v) in &self.fields {
            map.insert((*k).to_string(), v.clone());
        }
        Value::Object(map)
    }

    pub fn emit(&self) {
        self.emit_at(Level::INFO);
    }

    pub fn emit_at(&self, level: Level) {
        let fields = self.to_json();
        let (event, dropped) = (self.event, self.dropped);
        if level == Level::ERROR {
            tracing::error!(event, %fields, dropped);
        } else if level == Level::WARN {
            tracing::warn!(event, %fields, dropped);
        } else if level == Level::DEBUG || level == Level::TRACE {
            tracing::debug!(event, %fields, dropped);
        } else {
            tracing::info!(event, %fields, dropped);
        }
    }
}
