//! Total coercions from untrusted JSON into contract scalars.
//!
//! Nothing here fails. Every function returns either a usable value or
//! `None`/a documented default.

use serde_json::Value;

use crate::types::{AppointmentUrgency, DischargeStatus, Importance, LabFlag};

/// Sub-keys tried, in order, when an object stands in for a string.
const STRING_SUBKEYS: &[&str] = &[
    "text",
    "summary",
    "content",
    "description",
    "value",
    "explanation",
    "message",
];

/// Recursion guard for pathological nesting.
const MAX_DEPTH: usize = 16;

fn is_absent_literal(s: &str) -> bool {
    s.is_empty() || s.eq_ignore_ascii_case("undefined") || s.eq_ignore_ascii_case("null")
}

/// Coerce any JSON value into a non-empty trimmed string.
pub(crate) fn coerce_string(value: &Value) -> Option<String> {
    coerce_string_at(value, 0)
}

fn coerce_string_at(value: &Value, depth: usize) -> Option<String> {
    if depth > MAX_DEPTH {
        return None;
    }
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => {
            let trimmed = s.trim();
            if is_absent_literal(trimmed) {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Value::Array(items) => join_non_empty(items.iter().filter_map(|v| coerce_string_at(v, depth + 1))),
        Value::Object(map) => {
            for key in STRING_SUBKEYS {
                if let Some(s) = map.get(*key).and_then(|v| coerce_string_at(v, depth + 1)) {
                    return Some(s);
                }
            }
            join_non_empty(map.values().filter_map(|v| match v {
                Value::String(_) => coerce_string_at(v, depth + 1),
                _ => None,
            }))
        }
    }
}

fn join_non_empty(parts: impl Iterator<Item = String>) -> Option<String> {
    let joined = parts.collect::<Vec<_>>().join(" ");
    if joined.is_empty() {
        None
    } else {
        Some(joined)
    }
}

/// `coerce_string` on an optional value.
pub(crate) fn opt_string(value: Option<&Value>) -> Option<String> {
    value.and_then(coerce_string)
}

/// Coerce into a list of non-empty strings.
///
/// Arrays are coerced element-wise. A bare string is split into lines with
/// list markers (`-`, `*`, `•`, `1.`, `2)`) stripped.
pub(crate) fn coerce_string_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(coerce_string).collect(),
        Value::String(s) => s
            .lines()
            .map(strip_list_marker)
            .filter(|line| !is_absent_literal(line))
            .map(str::to_string)
            .collect(),
        other => coerce_string(other).into_iter().collect(),
    }
}

pub(crate) fn opt_string_list(value: Option<&Value>) -> Vec<String> {
    value.map(coerce_string_list).unwrap_or_default()
}

fn strip_list_marker(line: &str) -> &str {
    let line = line.trim();
    for marker in ["- ", "* ", "• ", "· "] {
        if let Some(rest) = line.strip_prefix(marker) {
            return rest.trim();
        }
    }
    if matches!(line, "-" | "*" | "•" | "·") {
        return "";
    }

    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 && digits <= 3 {
        let rest = &line[digits..];
        if let Some(rest) = rest.strip_prefix(". ").or_else(|| rest.strip_prefix(") ")) {
            return rest.trim();
        }
    }
    line
}

/// Case-insensitive de-duplication, keeping first occurrences.
pub(crate) fn dedupe(items: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    items
        .into_iter()
        .filter(|s| seen.insert(s.to_lowercase()))
        .collect()
}

/// Truncate to `max`, then pad to `min` from `defaults` without repeating
/// anything already present.
pub(crate) fn bound_list(items: Vec<String>, min: usize, max: usize, defaults: &[&str]) -> Vec<String> {
    let mut items = dedupe(items);
    items.truncate(max);
    for d in defaults {
        if items.len() >= min {
            break;
        }
        if !items.iter().any(|s| s.eq_ignore_ascii_case(d)) {
            items.push((*d).to_string());
        }
    }
    items
}

/// Coerce a confidence score into [0, 1].
///
/// Accepts numbers and numeric strings (with or without `%`). Values in
/// (1, 100] are read as percentages. Non-finite values are dropped.
pub(crate) fn coerce_confidence(value: &Value) -> Option<f64> {
    let (raw, percent) = match value {
        Value::Number(n) => (n.as_f64()?, false),
        Value::String(s) => {
            let s = s.trim();
            match s.strip_suffix('%') {
                Some(num) => (num.trim().parse::<f64>().ok()?, true),
                None => (s.parse::<f64>().ok()?, false),
            }
        }
        Value::Object(map) => return map.get("value").and_then(coerce_confidence),
        _ => return None,
    };
    if !raw.is_finite() {
        return None;
    }
    let scaled = if percent || (raw > 1.0 && raw <= 100.0) {
        raw / 100.0
    } else {
        raw
    };
    Some(scaled.clamp(0.0, 1.0))
}

pub(crate) fn opt_confidence(value: Option<&Value>) -> Option<f64> {
    value.and_then(coerce_confidence)
}

/// Match a free-form label against an exact synonym table, then an ordered
/// substring table, falling back to `default`.
fn match_enum<T: Copy>(
    value: Option<&Value>,
    exact: &[(&str, T)],
    contains: &[(&str, T)],
    default: T,
) -> T {
    let Some(text) = opt_string(value) else {
        return default;
    };
    let text = text.to_lowercase();

    if let Some((_, v)) = exact.iter().find(|(k, _)| *k == text) {
        return *v;
    }
    contains
        .iter()
        .find(|(k, _)| text.contains(k))
        .map(|(_, v)| *v)
        .unwrap_or(default)
}

pub(crate) fn coerce_flag(value: Option<&Value>) -> LabFlag {
    use LabFlag::*;
    match_enum(
        value,
        &[
            ("h", High),
            ("hi", High),
            ("hh", High),
            ("l", Low),
            ("lo", Low),
            ("ll", Low),
            ("n", Normal),
            ("wnl", Normal),
            ("ok", Normal),
        ],
        &[
            ("borderline", Borderline),
            ("abnormal", Unknown),
            ("low", Low),
            ("below", Low),
            ("decreased", Low),
            ("reduced", Low),
            ("high", High),
            ("above", High),
            ("elevated", High),
            ("increased", High),
            ("normal", Normal),
            ("within", Normal),
            ("in range", Normal),
        ],
        Unknown,
    )
}

pub(crate) fn coerce_importance(value: Option<&Value>) -> Importance {
    use Importance::*;
    match_enum(
        value,
        &[("h", High), ("m", Medium), ("l", Low), ("med", Medium)],
        &[
            ("high", High),
            ("critical", High),
            ("urgent", High),
            ("severe", High),
            ("medium", Medium),
            ("moderate", Medium),
            ("low", Low),
            ("minor", Low),
            ("minimal", Low),
        ],
        Unknown,
    )
}

pub(crate) fn coerce_status(value: Option<&Value>) -> DischargeStatus {
    use DischargeStatus::*;
    match_enum(
        value,
        &[("final", Approved), ("signed", Approved)],
        &[
            ("draft", Draft),
            ("prelim", Draft),
            ("pending", Draft),
            ("unapproved", Draft),
            ("not approved", Draft),
            ("approved", Approved),
            ("final", Approved),
        ],
        Draft,
    )
}

pub(crate) fn coerce_urgency(value: Option<&Value>) -> AppointmentUrgency {
    use AppointmentUrgency::*;
    match_enum(
        value,
        &[("asap", Urgent)],
        &[
            ("urgent", Urgent),
            ("emergency", Urgent),
            ("immediate", Urgent),
            ("asap", Urgent),
            ("soon", Soon),
            ("within", Soon),
            ("routine", Routine),
            ("regular", Routine),
            ("scheduled", Routine),
        ],
        Routine,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_string_from_scalars() {
        assert_eq!(coerce_string(&json!("  hi ")), Some("hi".to_string()));
        assert_eq!(coerce_string(&json!(95)), Some("95".to_string()));
        assert_eq!(coerce_string(&json!(true)), Some("true".to_string()));
        assert_eq!(coerce_string(&json!(null)), None);
        assert_eq!(coerce_string(&json!("undefined")), None);
        assert_eq!(coerce_string(&json!("NULL")), None);
        assert_eq!(coerce_string(&json!("   ")), None);
    }

    #[test]
    fn test_string_from_object_subkeys_in_order() {
        let v = json!({ "value": "second", "text": "first" });
        assert_eq!(coerce_string(&v), Some("first".to_string()));

        let v = json!({ "message": "only message" });
        assert_eq!(coerce_string(&v), Some("only message".to_string()));
    }

    #[test]
    fn test_string_from_unrecognized_object_joins_strings() {
        let v = json!({ "a": "one", "b": 2, "c": "two" });
        assert_eq!(coerce_string(&v), Some("one two".to_string()));
        assert_eq!(coerce_string(&json!({ "n": 1 })), None);
    }

    #[test]
    fn test_string_from_array_joins_with_space() {
        assert_eq!(coerce_string(&json!(["x", "y"])), Some("x y".to_string()));
        assert_eq!(coerce_string(&json!(["", null])), None);
    }

    #[test]
    fn test_list_from_bulleted_string() {
        let v = json!("- Rest\n* Drink fluids\n\n1. Walk daily\n2) Sleep\n•");
        assert_eq!(
            coerce_string_list(&v),
            vec!["Rest", "Drink fluids", "Walk daily", "Sleep"]
        );
    }

    #[test]
    fn test_list_drops_empty_elements() {
        let v = json!(["a", "", null, { "text": "b" }, "undefined"]);
        assert_eq!(coerce_string_list(&v), vec!["a", "b"]);
    }

    #[test]
    fn test_bound_list_truncates_and_pads_without_duplicates() {
        let defaults = ["A", "B", "C"];
        let padded = bound_list(vec!["a".to_string()], 3, 5, &defaults);
        assert_eq!(padded, vec!["a", "B", "C"]);

        let many: Vec<String> = (0..9).map(|i| i.to_string()).collect();
        assert_eq!(bound_list(many, 3, 5, &defaults).len(), 5);

        let dupes = vec!["x".to_string(), "X".to_string()];
        assert_eq!(bound_list(dupes, 1, 5, &defaults), vec!["x"]);
    }

    #[test]
    fn test_confidence_coercion() {
        assert_eq!(coerce_confidence(&json!(0.8)), Some(0.8));
        assert_eq!(coerce_confidence(&json!(85)), Some(0.85));
        assert_eq!(coerce_confidence(&json!("70%")), Some(0.7));
        assert_eq!(coerce_confidence(&json!("0.5")), Some(0.5));
        assert_eq!(coerce_confidence(&json!(250)), Some(1.0));
        assert_eq!(coerce_confidence(&json!(-3)), Some(0.0));
        assert_eq!(coerce_confidence(&json!("high")), None);
        assert_eq!(coerce_confidence(&json!("NaN")), None);
        assert_eq!(coerce_confidence(&json!({ "value": 1 })), Some(1.0));
    }

    #[test]
    fn test_flag_matching() {
        assert_eq!(coerce_flag(Some(&json!("H"))), LabFlag::High);
        assert_eq!(coerce_flag(Some(&json!("Slightly Elevated"))), LabFlag::High);
        assert_eq!(coerce_flag(Some(&json!("below range"))), LabFlag::Low);
        assert_eq!(coerce_flag(Some(&json!("Abnormal"))), LabFlag::Unknown);
        assert_eq!(coerce_flag(Some(&json!("within normal limits"))), LabFlag::Normal);
        assert_eq!(coerce_flag(Some(&json!("borderline high"))), LabFlag::Borderline);
        assert_eq!(coerce_flag(Some(&json!(42))), LabFlag::Unknown);
        assert_eq!(coerce_flag(None), LabFlag::Unknown);
    }

    #[test]
    fn test_other_enum_defaults() {
        assert_eq!(coerce_importance(Some(&json!("Critical"))), Importance::High);
        assert_eq!(coerce_importance(Some(&json!("moderate"))), Importance::Medium);
        assert_eq!(coerce_importance(Some(&json!("?"))), Importance::Unknown);

        assert_eq!(coerce_status(Some(&json!("Final"))), DischargeStatus::Approved);
        assert_eq!(coerce_status(Some(&json!("not approved"))), DischargeStatus::Draft);
        assert_eq!(coerce_status(None), DischargeStatus::Draft);

        assert_eq!(coerce_urgency(Some(&json!("ASAP"))), AppointmentUrgency::Urgent);
        assert_eq!(coerce_urgency(Some(&json!("within 2 weeks"))), AppointmentUrgency::Soon);
        assert_eq!(coerce_urgency(Some(&json!("whenever"))), AppointmentUrgency::Routine);
    }
}
