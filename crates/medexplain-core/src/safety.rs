//! Safety filter for validated analyses.
//!
//! Runs last, over every string leaf of a result. Two passes per string:
//!
//! 1. leftover redaction tokens (`[EMAIL]`, `[DATE]`, ...) are stripped
//! 2. overreach phrasing is replaced with [`FILTERED_MARKER`]
//!
//! Overreach means the model speaking in its own voice about diagnosis or
//! treatment changes. Document-attributed statements ("the report lists
//! ...") and general guidance are left alone. Structure is preserved:
//! numbers, booleans and nulls are untouched, key sets and array order do
//! not change, and a string with no matches comes back byte-for-byte.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use crate::contract::AnalysisResult;

/// Replacement for an overreach match.
pub const FILTERED_MARKER: &str = "[content filtered]";

/// Used when a string consisted only of redaction tokens.
pub const WITHHELD_PLACEHOLDER: &str = "(withheld for privacy)";

lazy_static! {
    static ref REDACTION_ARTIFACT: Regex = Regex::new(
        r"\[(?:EMAIL|PHONE|SSN|DATE|MRN|ADDRESS|REDACTED)\]"
    ).unwrap();

    static ref SPACE_BEFORE_PUNCT: Regex = Regex::new(r"[ \t]+([.,;:!?)])").unwrap();
    static ref MULTI_SPACE: Regex = Regex::new(r"[ \t]{2,}").unwrap();

    // Ordered. Each pattern runs to the end of its clause.
    static ref OVERREACH_PATTERNS: Vec<(&'static str, Regex)> = vec![
        ("speculative diagnosis", Regex::new(
            r"(?i)\byou\s+(?:definitely|clearly|likely|probably|most\s+likely|certainly|possibly)\s+have\b[^.!?\n]*"
        ).unwrap()),
        ("indirect diagnosis", Regex::new(
            r"(?i)\bthis\s+(?:confirms|means|proves|indicates)\s+(?:that\s+)?you\s+have\b[^.!?\n]*"
        ).unwrap()),
        ("diagnosis assertion", Regex::new(
            r"(?i)\byour\s+diagnosis\s+is\b[^.!?\n]*"
        ).unwrap()),
        ("condition label", Regex::new(
            r"(?i)\byou\s+are\s+(?:suffering\s+from|diagnosed\s+with)\b[^.!?\n]*"
        ).unwrap()),
        ("medication change", Regex::new(
            r"(?i)\byou\s+should\s+(?:stop|start|increase|decrease|double|skip|discontinue|reduce|halve|change|switch)\b[^.!?\n]*"
        ).unwrap()),
        ("dose imperative", Regex::new(
            r"(?i)\b(?:increase|decrease|double|halve|reduce|skip|stop\s+taking)\s+your\s+(?:dose|dosage|medications?|medicines?|insulin|pills?)\b[^.!?\n]*"
        ).unwrap()),
        ("first-person recommendation", Regex::new(
            r"(?i)\bI\s+(?:would\s+)?recommend\b[^.!?\n]*"
        ).unwrap()),
        ("first-person advice", Regex::new(
            r"(?i)\bI\s+(?:would\s+)?(?:suggest|advise)\b[^.!?\n]*"
        ).unwrap()),
    ];
}

/// Counts of what the filter changed. Safe to log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FilterReport {
    pub tokens_stripped: usize,
    pub overreach_replaced: usize,
    pub strings_changed: usize,
}

impl FilterReport {
    fn merge(&mut self, other: FilterReport) {
        self.tokens_stripped += other.tokens_stripped;
        self.overreach_replaced += other.overreach_replaced;
        self.strings_changed += other.strings_changed;
    }
}

/// Structure-preserving filter over analyses.
#[derive(Debug, Clone, Copy, Default)]
pub struct SafetyFilter;

impl SafetyFilter {
    pub fn new() -> Self {
        Self
    }

    /// Filter a single string.
    pub fn filter_text(&self, text: &str) -> String {
        self.filter_text_with_report(text).0
    }

    pub fn filter_text_with_report(&self, text: &str) -> (String, FilterReport) {
        let mut report = FilterReport::default();
        let mut out: Option<String> = None;

        let tokens = REDACTION_ARTIFACT.find_iter(text).count();
        if tokens > 0 {
            report.tokens_stripped = tokens;
            let stripped = REDACTION_ARTIFACT.replace_all(text, "");
            let tidied = SPACE_BEFORE_PUNCT.replace_all(&stripped, "$1");
            let tidied = MULTI_SPACE.replace_all(&tidied, " ");
            let tidied = tidied.trim();
            out = Some(if tidied.is_empty() {
                WITHHELD_PLACEHOLDER.to_string()
            } else {
                tidied.to_string()
            });
        }

        for (_, pattern) in OVERREACH_PATTERNS.iter() {
            let current = out.as_deref().unwrap_or(text);
            let hits = pattern.find_iter(current).count();
            if hits > 0 {
                report.overreach_replaced += hits;
                out = Some(
                    pattern
                        .replace_all(current, regex::NoExpand(FILTERED_MARKER))
                        .into_owned(),
                );
            }
        }

        match out {
            Some(changed) => {
                report.strings_changed = 1;
                (changed, report)
            }
            None => (text.to_string(), report),
        }
    }

    /// Filter every string leaf of a JSON value.
    pub fn filter_value(&self, value: Value) -> Value {
        self.filter_value_with_report(value).0
    }

    pub fn filter_value_with_report(&self, value: Value) -> (Value, FilterReport) {
        let mut report = FilterReport::default();
        let filtered = self.walk(value, &mut report);
        (filtered, report)
    }

    fn walk(&self, value: Value, report: &mut FilterReport) -> Value {
        match value {
            Value::String(s) => {
                let (filtered, r) = self.filter_text_with_report(&s);
                report.merge(r);
                Value::String(filtered)
            }
            Value::Array(items) => {
                Value::Array(items.into_iter().map(|v| self.walk(v, report)).collect())
            }
            Value::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k, self.walk(v, report)))
                    .collect(),
            ),
            other => other,
        }
    }

    /// Filter a validated result, keeping its variant.
    pub fn filter_result(&self, result: AnalysisResult) -> Result<AnalysisResult, serde_json::Error> {
        self.filter_result_with_report(result).map(|(r, _)| r)
    }

    pub fn filter_result_with_report(
        &self,
        result: AnalysisResult,
    ) -> Result<(AnalysisResult, FilterReport), serde_json::Error> {
        let value = serde_json::to_value(&result)?;
        let (filtered, report) = self.filter_value_with_report(value);
        let result = serde_json::from_value(filtered)?;
        Ok((result, report))
    }
}

/// Names of the overreach rules, in the order they are applied.
pub fn overreach_rule_names() -> Vec<&'static str> {
    OVERREACH_PATTERNS.iter().map(|(name, _)| *name).collect()
}
