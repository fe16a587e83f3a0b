//! Response normalization.
//!
//! Model output is untrusted: keys drift between names, scalars arrive as
//! objects or arrays, enums arrive as free text and whole sections go
//! missing. [`normalize`] maps any JSON object onto the exact key set of the
//! requested variant, so the strict validator only has to reject what is
//! genuinely wrong.
//!
//! Guarantees for any object input:
//!
//! - sections that are illegal for the document type are never emitted
//! - required sections are always present, empty but valid if omitted
//! - `meta.documentType`, `readingLevel`, `schemaVersion`, `provenance`,
//!   `createdAt` and `modelInfo` come from the caller, never the model
//! - every required string is non-empty and list lengths are in bounds

mod aliases;
mod coerce;
pub mod repair;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::contract::{ModelInfo, ValidationIssue, SCHEMA_VERSION};
use crate::types::{DocumentType, ProvenanceSource, ReadingLevel};

use aliases::*;
use coerce::*;

pub use repair::{extract_json_span, parse_model_json, MalformedJson};

pub const DEFAULT_DISCLAIMER: &str = "This explanation is for educational purposes only and is not medical advice. It does not replace a conversation with your doctor or care team.";
pub const DEFAULT_EMERGENCY_GUIDANCE: &str = "If you have chest pain, trouble breathing, severe bleeding, or feel you are in danger, call 911 or go to the nearest emergency room.";

const DEFAULT_LAB_VALUE: &str = "Not reported";
const DEFAULT_LAB_EXPLANATION: &str = "No plain-language explanation was available for this result. Ask your care team what it means for you.";
const DEFAULT_MED_PURPOSE: &str = "Purpose not stated in the document.";
const DEFAULT_MED_HOW: &str = "Follow the directions on your prescription label.";
const DEFAULT_MED_CAUTIONS: &str = "Ask your pharmacist about side effects and interactions.";
const DEFAULT_SIGN_ACTION: &str = "Contact your care team or seek medical care.";
const DEFAULT_APPT_PROVIDER: &str = "Your care team";
const DEFAULT_APPT_PURPOSE: &str = "Follow-up visit";
const DEFAULT_APPT_TIMEFRAME: &str = "As scheduled";
const DEFAULT_IMAGING_FINDINGS: &str = "Findings were not described in the document.";
const DEFAULT_DISCONTINUED_REASON: &str = "Reason not stated in the document.";
const DEFAULT_IMMUNIZATION_DATE: &str = "Date not stated";

const TAKEAWAYS_MIN: usize = 3;
const TAKEAWAYS_MAX: usize = 7;
const QUESTIONS_MIN: usize = 5;
const QUESTIONS_MAX: usize = 10;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("model response is not a JSON object")]
    NotAnObject,
}

/// Everything the caller already knows, which always overrides the model.
#[derive(Debug, Clone)]
pub struct NormalizeContext {
    pub document_type: DocumentType,
    pub reading_level: ReadingLevel,
    pub source: ProvenanceSource,
    pub redaction_applied: bool,
    pub model_info: Option<ModelInfo>,
    pub created_at: DateTime<Utc>,
    pub language: String,
}

impl NormalizeContext {
    pub fn new(document_type: DocumentType, reading_level: ReadingLevel) -> Self {
        Self {
            document_type,
            reading_level,
            source: ProvenanceSource::Text,
            redaction_applied: true,
            model_info: None,
            created_at: Utc::now(),
            language: "en".to_string(),
        }
    }

    pub fn with_source(mut self, source: ProvenanceSource) -> Self {
        self.source = source;
        self
    }

    pub fn with_redaction_applied(mut self, applied: bool) -> Self {
        self.redaction_applied = applied;
        self
    }

    pub fn with_model_info(mut self, info: ModelInfo) -> Self {
        self.model_info = Some(info);
        self
    }

    pub fn with_created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = at;
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }
}

/// Map an arbitrary model response onto the requested variant.
///
/// Fails only when `raw` is not a JSON object.
pub fn normalize(raw: &Value, ctx: &NormalizeContext) -> Result<Value, NormalizeError> {
    let root = raw.as_object().ok_or(NormalizeError::NotAnObject)?;
    let root = unwrap_envelope(root);
    let dt = ctx.document_type;

    let mut out = Map::new();
    out.insert("meta".into(), build_meta(root, ctx));
    out.insert("patientSummary".into(), build_patient_summary(root, dt));
    out.insert(
        "questionsForDoctor".into(),
        json!(bound_list(
            opt_string_list(lookup(root, QUESTIONS)),
            QUESTIONS_MIN,
            QUESTIONS_MAX,
            default_questions(dt),
        )),
    );
    out.insert(
        "whatWeCouldNotDetermine".into(),
        json!(dedupe(opt_string_list(lookup(root, NOT_DETERMINED)))),
    );

    match dt {
        DocumentType::LabReport => {
            out.insert("labsSection".into(), build_labs_section(root));
        }
        DocumentType::DischargeInstructions => {
            let section = lookup_object(root, DISCHARGE_SECTION).unwrap_or(root);
            out.insert("dischargeSection".into(), build_discharge_section(section));
        }
        DocumentType::DischargeSummary => {
            if has_labs(root) {
                out.insert("labsSection".into(), build_labs_section(root));
            }
            if let Some(section) = lookup_object(root, DISCHARGE_SECTION) {
                out.insert("dischargeSection".into(), build_discharge_section(section));
            } else if !out.contains_key("labsSection") {
                out.insert("dischargeSection".into(), build_discharge_section(root));
            }

            out.insert(
                "imagingAndProcedures".into(),
                json!(object_items(lookup(root, IMAGING), build_imaging_item)),
            );
            out.insert(
                "discontinuedMedications".into(),
                json!(object_items(lookup(root, DISCONTINUED), build_discontinued)),
            );
            out.insert(
                "immunizations".into(),
                json!(object_items(lookup(root, IMMUNIZATIONS), build_immunization)),
            );
            insert_opt(&mut out, "birthHistory", opt_string(lookup(root, BIRTH_HISTORY)));
            insert_opt(&mut out, "hospitalCourse", opt_string(lookup(root, HOSPITAL_COURSE)));
        }
    }

    Ok(Value::Object(out))
}

/// Report a response that was clearly written for a different document
/// type, even though normalization would paper over it.
pub fn detect_shape_mismatch(raw: &Value, expected: DocumentType) -> Vec<ValidationIssue> {
    let Some(root) = raw.as_object() else {
        return Vec::new();
    };
    let root = unwrap_envelope(root);
    let mut issues = Vec::new();

    let declared_meta = lookup_object(root, META).and_then(|m| lookup(m, DOCUMENT_TYPE));
    let (path, declared) = match declared_meta {
        Some(v) => ("/meta/documentType", Some(v)),
        None => ("/documentType", lookup(root, &["documentType", "docType"])),
    };
    if let Some(text) = opt_string(declared) {
        if let Some(found) = classify_document_type(&text) {
            if found != expected {
                issues.push(ValidationIssue::new(
                    path,
                    format!(
                        "declared document type '{}' but a {} analysis was requested",
                        found, expected
                    ),
                ));
            }
        }
    }

    let has_discharge = lookup(root, DISCHARGE_SECTION).is_some();
    match expected {
        DocumentType::LabReport if has_discharge && !has_labs(root) => {
            issues.push(ValidationIssue::new(
                "/labsSection",
                "missing; the response contains a dischargeSection instead",
            ));
        }
        DocumentType::DischargeInstructions if has_labs(root) && !has_discharge => {
            issues.push(ValidationIssue::new(
                "/dischargeSection",
                "missing; the response contains a labsSection instead",
            ));
        }
        _ => {}
    }

    issues
}

/// Exact matches only. An unrecognised label says nothing about the type.
fn classify_document_type(text: &str) -> Option<DocumentType> {
    if let Ok(dt) = text.parse::<DocumentType>() {
        return Some(dt);
    }
    let folded: String = text
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == '-' || c.is_whitespace() { '_' } else { c })
        .collect();
    DOCUMENT_TYPE_LABELS
        .iter()
        .find(|(label, _)| *label == folded)
        .map(|(_, dt)| *dt)
}

/// Names that mark an object as an analysis rather than an envelope.
const KNOWN_TOP_LEVEL: &[&[&str]] = &[
    META,
    PATIENT_SUMMARY,
    QUESTIONS,
    KEY_TAKEAWAYS,
    LABS_SECTION,
    LABS,
    DISCHARGE_SECTION,
    SAFETY,
];

fn unwrap_envelope(root: &Map<String, Value>) -> &Map<String, Value> {
    let known = KNOWN_TOP_LEVEL
        .iter()
        .any(|aliases| lookup(root, aliases).is_some());
    if known {
        return root;
    }
    lookup_object(root, ENVELOPE).unwrap_or(root)
}

fn has_labs(root: &Map<String, Value>) -> bool {
    lookup(root, LABS_SECTION).is_some() || lookup(root, LABS).is_some()
}

fn insert_opt(out: &mut Map<String, Value>, key: &str, value: Option<String>) {
    if let Some(v) = value {
        out.insert(key.to_string(), Value::String(v));
    }
}

fn non_empty_or_default(value: &str, default: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        default.to_string()
    } else {
        trimmed.to_string()
    }
}

fn build_meta(root: &Map<String, Value>, ctx: &NormalizeContext) -> Value {
    let meta = lookup_object(root, META);
    let safety = meta
        .and_then(|m| lookup(m, SAFETY))
        .or_else(|| lookup(root, SAFETY));

    // A bare string in the safety slot is the disclaimer.
    let (safety_disclaimer, safety_emergency) = match safety {
        Some(Value::Object(s)) => (lookup(s, DISCLAIMER), lookup(s, EMERGENCY_GUIDANCE)),
        Some(other) => (Some(other), None),
        None => (None, None),
    };

    let disclaimer = opt_string(safety_disclaimer)
        .or_else(|| opt_string(meta.and_then(|m| lookup(m, DISCLAIMER))))
        .or_else(|| opt_string(lookup(root, DISCLAIMER)))
        .unwrap_or_else(|| DEFAULT_DISCLAIMER.to_string());
    let emergency = opt_string(safety_emergency)
        .or_else(|| opt_string(meta.and_then(|m| lookup(m, EMERGENCY_GUIDANCE))))
        .or_else(|| opt_string(lookup(root, EMERGENCY_GUIDANCE)))
        .unwrap_or_else(|| DEFAULT_EMERGENCY_GUIDANCE.to_string());

    let mut out = Map::new();
    out.insert("schemaVersion".into(), json!(SCHEMA_VERSION));
    out.insert(
        "createdAt".into(),
        json!(ctx.created_at.to_rfc3339_opts(SecondsFormat::Millis, true)),
    );
    out.insert("documentType".into(), json!(ctx.document_type.as_str()));
    out.insert("readingLevel".into(), json!(ctx.reading_level.as_str()));
    out.insert("language".into(), json!(non_empty_or_default(&ctx.language, "en")));
    out.insert(
        "provenance".into(),
        json!({
            "source": ctx.source.as_str(),
            "redactionApplied": ctx.redaction_applied,
        }),
    );
    out.insert(
        "safety".into(),
        json!({
            "disclaimer": disclaimer,
            "emergencyGuidance": emergency,
        }),
    );
    if let Some(info) = &ctx.model_info {
        out.insert(
            "modelInfo".into(),
            json!({
                "provider": non_empty_or_default(&info.provider, "unknown"),
                "model": non_empty_or_default(&info.model, "unknown"),
            }),
        );
    }
    Value::Object(out)
}

fn build_patient_summary(root: &Map<String, Value>, dt: DocumentType) -> Value {
    let summary = lookup(root, PATIENT_SUMMARY);
    let summary_obj = summary.and_then(Value::as_object);

    let overall = match summary {
        Some(Value::Object(s)) => opt_string(lookup(s, OVERALL_SUMMARY)),
        Some(other) => coerce_string(other),
        None => None,
    }
    .or_else(|| opt_string(lookup(root, OVERALL_SUMMARY)))
    .unwrap_or_else(|| default_overall_summary(dt));

    let takeaways = summary_obj
        .and_then(|s| lookup(s, KEY_TAKEAWAYS))
        .or_else(|| lookup(root, KEY_TAKEAWAYS));
    let takeaways = bound_list(
        opt_string_list(takeaways),
        TAKEAWAYS_MIN,
        TAKEAWAYS_MAX,
        default_takeaways(dt),
    );

    let mut out = Map::new();
    out.insert("overallSummary".into(), json!(overall));
    out.insert("keyTakeaways".into(), json!(takeaways));

    let confidence = summary_obj
        .and_then(|s| lookup_object(s, FIELD_CONFIDENCE))
        .or_else(|| lookup_object(root, FIELD_CONFIDENCE));
    if let Some(map) = confidence {
        let scores: Map<String, Value> = map
            .iter()
            .filter_map(|(k, v)| coerce_confidence(v).map(|c| (k.clone(), json!(c))))
            .collect();
        if !scores.is_empty() {
            out.insert("fieldConfidence".into(), Value::Object(scores));
        }
    }

    Value::Object(out)
}

fn build_labs_section(root: &Map<String, Value>) -> Value {
    let (section, labs) = match lookup(root, LABS_SECTION) {
        Some(Value::Object(s)) => (Some(s), lookup(s, LABS)),
        Some(list @ Value::Array(_)) => (None, Some(list)),
        _ => (None, lookup(root, LABS)),
    };

    let mut out = Map::new();
    let note = section.and_then(|s| opt_string(lookup(s, OVERALL_LAB_NOTE)));
    insert_opt(&mut out, "overallLabNote", note);
    out.insert("labs".into(), json!(object_items(labs, build_lab_item)));
    Value::Object(out)
}

/// Build each element of a list with `build`, treating a bare string as an
/// object whose first field is that string. Elements `build` rejects are
/// dropped.
fn object_items(value: Option<&Value>, build: fn(&Map<String, Value>) -> Option<Value>) -> Vec<Value> {
    let items: Vec<&Value> = match value {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(single @ Value::Object(_)) => vec![single],
        _ => Vec::new(),
    };

    items
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(obj) => build(obj),
            other => {
                let name = coerce_string(other)?;
                let mut obj = Map::new();
                obj.insert("name".into(), Value::String(name));
                build(&obj)
            }
        })
        .collect()
}

fn build_lab_item(item: &Map<String, Value>) -> Option<Value> {
    let name = opt_string(lookup(item, LAB_NAME))?;

    let mut out = Map::new();
    out.insert("name".into(), json!(name));
    out.insert(
        "value".into(),
        json!(opt_string(lookup(item, LAB_VALUE)).unwrap_or_else(|| DEFAULT_LAB_VALUE.to_string())),
    );
    insert_opt(&mut out, "unit", opt_string(lookup(item, LAB_UNIT)));
    insert_opt(&mut out, "referenceRange", opt_string(lookup(item, LAB_RANGE)));
    out.insert("flag".into(), json!(coerce_flag(lookup(item, LAB_FLAG)).as_str()));
    out.insert(
        "importance".into(),
        json!(coerce_importance(lookup(item, IMPORTANCE)).as_str()),
    );
    out.insert(
        "explanation".into(),
        json!(opt_string(lookup(item, EXPLANATION))
            .unwrap_or_else(|| DEFAULT_LAB_EXPLANATION.to_string())),
    );

    if let Some(Value::Array(points)) = lookup(item, TREND) {
        let trend: Vec<Value> = points
            .iter()
            .filter_map(Value::as_object)
            .filter_map(|p| {
                let date = opt_string(lookup(p, TREND_DATE))?;
                let value = opt_string(lookup(p, LAB_VALUE))?;
                Some(json!({ "date": date, "value": value }))
            })
            .collect();
        if !trend.is_empty() {
            out.insert("trend".into(), Value::Array(trend));
        }
    }
    insert_opt(
        &mut out,
        "trendInterpretation",
        opt_string(lookup(item, TREND_INTERPRETATION)),
    );
    if let Some(c) = opt_confidence(lookup(item, CONFIDENCE)) {
        out.insert("confidence".into(), json!(c));
    }

    Some(Value::Object(out))
}

fn build_discharge_section(section: &Map<String, Value>) -> Value {
    let mut out = Map::new();
    out.insert("status".into(), json!(coerce_status(lookup(section, STATUS)).as_str()));
    out.insert(
        "homeCareSteps".into(),
        json!(opt_string_list(lookup(section, HOME_CARE))),
    );
    out.insert(
        "medications".into(),
        json!(object_items(lookup(section, MEDICATIONS), build_medication)),
    );
    out.insert("followUp".into(), json!(opt_string_list(lookup(section, FOLLOW_UP))));
    out.insert(
        "warningSigns".into(),
        json!(object_items(lookup(section, WARNING_SIGNS), build_warning_sign)),
    );
    out.insert(
        "generalRedFlags".into(),
        json!(opt_string_list(lookup(section, RED_FLAGS))),
    );
    out.insert(
        "diagnosesMentioned".into(),
        json!(opt_string_list(lookup(section, DIAGNOSES))),
    );

    if let Some(v) = lookup(section, APPOINTMENTS) {
        out.insert(
            "followUpAppointments".into(),
            json!(object_items(Some(v), build_appointment)),
        );
    }
    for (key, aliases) in [
        ("diet", DIET),
        ("activity", ACTIVITY),
        ("feedingPlan", FEEDING_PLAN),
        ("safeSleep", SAFE_SLEEP),
        ("woundCare", WOUND_CARE),
        ("respiratoryPrecautions", RESPIRATORY),
        ("developmentalGuidance", DEVELOPMENTAL),
    ] {
        insert_opt(&mut out, key, opt_string(lookup(section, aliases)));
    }
    if let Some(v) = lookup(section, DAILY_MONITORING) {
        out.insert("dailyMonitoring".into(), json!(coerce_string_list(v)));
    }

    Value::Object(out)
}

fn build_medication(item: &Map<String, Value>) -> Option<Value> {
    let name = opt_string(lookup(item, MED_NAME))?;
    let mut out = Map::new();
    out.insert("name".into(), json!(name));
    out.insert(
        "purpose".into(),
        json!(opt_string(lookup(item, MED_PURPOSE)).unwrap_or_else(|| DEFAULT_MED_PURPOSE.to_string())),
    );
    out.insert(
        "howToTake".into(),
        json!(opt_string(lookup(item, MED_HOW)).unwrap_or_else(|| DEFAULT_MED_HOW.to_string())),
    );
    out.insert(
        "cautions".into(),
        json!(opt_string(lookup(item, MED_CAUTIONS))
            .unwrap_or_else(|| DEFAULT_MED_CAUTIONS.to_string())),
    );
    insert_opt(&mut out, "timing", opt_string(lookup(item, MED_TIMING)));
    Some(Value::Object(out))
}

fn build_warning_sign(item: &Map<String, Value>) -> Option<Value> {
    // Bare strings arrive keyed as "name".
    let symptom = opt_string(lookup(item, SIGN_SYMPTOM)).or_else(|| opt_string(item.get("name")))?;
    let action = opt_string(lookup(item, SIGN_ACTION)).unwrap_or_else(|| DEFAULT_SIGN_ACTION.to_string());
    Some(json!({ "symptom": symptom, "action": action }))
}

fn build_appointment(item: &Map<String, Value>) -> Option<Value> {
    let provider = opt_string(lookup(item, APPT_PROVIDER));
    let purpose = opt_string(lookup(item, APPT_PURPOSE)).or_else(|| opt_string(item.get("name")));
    let timeframe = opt_string(lookup(item, APPT_TIMEFRAME));
    if provider.is_none() && purpose.is_none() && timeframe.is_none() {
        return None;
    }
    Some(json!({
        "provider": provider.unwrap_or_else(|| DEFAULT_APPT_PROVIDER.to_string()),
        "purpose": purpose.unwrap_or_else(|| DEFAULT_APPT_PURPOSE.to_string()),
        "timeframe": timeframe.unwrap_or_else(|| DEFAULT_APPT_TIMEFRAME.to_string()),
        "urgency": coerce_urgency(lookup(item, APPT_URGENCY)).as_str(),
    }))
}

fn build_imaging_item(item: &Map<String, Value>) -> Option<Value> {
    let name = opt_string(lookup(item, IMAGING_NAME))?;
    let mut out = Map::new();
    out.insert("name".into(), json!(name));
    insert_opt(&mut out, "date", opt_string(lookup(item, DATE)));
    out.insert(
        "findings".into(),
        json!(opt_string(lookup(item, IMAGING_FINDINGS))
            .unwrap_or_else(|| DEFAULT_IMAGING_FINDINGS.to_string())),
    );
    if let Some(m) = lookup_object(item, MEASUREMENTS) {
        let measurements: Map<String, Value> = m
            .iter()
            .filter_map(|(k, v)| coerce_string(v).map(|s| (k.clone(), Value::String(s))))
            .collect();
        if !measurements.is_empty() {
            out.insert("measurements".into(), Value::Object(measurements));
        }
    }
    if let Some(c) = opt_confidence(lookup(item, CONFIDENCE)) {
        out.insert("confidence".into(), json!(c));
    }
    Some(Value::Object(out))
}

fn build_discontinued(item: &Map<String, Value>) -> Option<Value> {
    let name = opt_string(lookup(item, MED_NAME))?;
    let mut out = Map::new();
    out.insert("name".into(), json!(name));
    out.insert(
        "reason".into(),
        json!(opt_string(lookup(item, DISCONTINUED_REASON))
            .unwrap_or_else(|| DEFAULT_DISCONTINUED_REASON.to_string())),
    );
    insert_opt(&mut out, "replacement", opt_string(lookup(item, REPLACEMENT)));
    Some(Value::Object(out))
}

fn build_immunization(item: &Map<String, Value>) -> Option<Value> {
    let name = opt_string(lookup(item, VACCINE_NAME))?;
    let mut out = Map::new();
    out.insert("name".into(), json!(name));
    out.insert(
        "date".into(),
        json!(opt_string(lookup(item, DATE)).unwrap_or_else(|| DEFAULT_IMMUNIZATION_DATE.to_string())),
    );
    insert_opt(&mut out, "notes", opt_string(lookup(item, NOTES)));
    Some(Value::Object(out))
}

fn default_overall_summary(dt: DocumentType) -> String {
    format!(
        "We reviewed your {} but could not produce a complete plain-language summary. Please go over the original document with your care team.",
        dt.label()
    )
}

fn default_takeaways(dt: DocumentType) -> &'static [&'static str] {
    match dt {
        DocumentType::LabReport => &[
            "Lab results are one part of the picture and are best read together with your history.",
            "Values outside a reference range are not always a cause for concern.",
            "Your care team can explain what these results mean for you.",
        ],
        DocumentType::DischargeInstructions => &[
            "Follow the home care steps your care team gave you.",
            "Take medications exactly as prescribed.",
            "Know the warning signs that mean you should get help.",
        ],
        DocumentType::DischargeSummary => &[
            "This summary describes your hospital stay and the care you received.",
            "Keep your follow-up appointments.",
            "Bring this summary to your next visit with your doctor.",
        ],
    }
}

fn default_questions(dt: DocumentType) -> &'static [&'static str] {
    match dt {
        DocumentType::LabReport => &[
            "What do these results mean for my health?",
            "Are any of these values something I should be concerned about?",
            "Do I need any follow-up tests?",
            "Could any of my medications affect these results?",
            "Is there anything I can do to improve these numbers?",
            "When should I have these tests repeated?",
        ],
        DocumentType::DischargeInstructions => &[
            "What symptoms should make me call you or go to the emergency room?",
            "How should I take each of my medications?",
            "When is my follow-up appointment?",
            "Are there any activities I should avoid while I recover?",
            "Are there any foods or drinks I should avoid?",
            "Who should I call if I have questions after I get home?",
        ],
        DocumentType::DischargeSummary => &[
            "What was the main reason for my hospital stay?",
            "Which of my medications changed, and why?",
            "What follow-up care do I need, and when?",
            "Are there test results still pending that I should know about?",
            "What warning signs should I watch for at home?",
            "How will this hospital stay affect my ongoing care?",
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::validate;

    fn ctx(dt: DocumentType) -> NormalizeContext {
        NormalizeContext::new(dt, ReadingLevel::Simple)
    }

    #[test]
    fn test_not_an_object() {
        assert_eq!(
            normalize(&json!([1, 2]), &ctx(DocumentType::LabReport)),
            Err(NormalizeError::NotAnObject)
        );
        assert_eq!(
            normalize(&json!("text"), &ctx(DocumentType::LabReport)),
            Err(NormalizeError::NotAnObject)
        );
    }

    #[test]
    fn test_empty_object_becomes_valid_for_every_type() {
        for dt in DocumentType::ALL {
            let out = normalize(&json!({}), &ctx(*dt)).unwrap();
            let result = validate(&out).unwrap();
            assert_eq!(result.document_type(), *dt);
        }
    }

    #[test]
    fn test_disclaimers_array_is_joined() {
        let raw = json!({ "disclaimers": ["x", "y"] });
        let out = normalize(&raw, &ctx(DocumentType::LabReport)).unwrap();
        assert_eq!(out["meta"]["safety"]["disclaimer"], "x y");
    }

    #[test]
    fn test_meta_is_never_trusted() {
        let raw = json!({
            "meta": {
                "documentType": "discharge_summary",
                "readingLevel": "standard",
                "schemaVersion": "9.9",
                "provenance": { "source": "pdf", "redactionApplied": false },
                "modelInfo": { "provider": "someone", "model": "else" }
            }
        });
        let c = ctx(DocumentType::LabReport).with_model_info(ModelInfo::new("openai", "gpt-4o-mini"));
        let out = normalize(&raw, &c).unwrap();
        let meta = &out["meta"];
        assert_eq!(meta["documentType"], "lab_report");
        assert_eq!(meta["readingLevel"], "simple");
        assert_eq!(meta["schemaVersion"], SCHEMA_VERSION);
        assert_eq!(meta["provenance"]["source"], "text");
        assert_eq!(meta["provenance"]["redactionApplied"], true);
        assert_eq!(meta["modelInfo"]["provider"], "openai");
    }

    #[test]
    fn test_illegal_sections_dropped() {
        let raw = json!({
            "labsSection": { "labs": [{ "name": "Glucose", "value": 95 }] },
            "dischargeSection": null,
            "imagingAndProcedures": [{ "name": "X-ray" }]
        });
        let out = normalize(&raw, &ctx(DocumentType::DischargeInstructions)).unwrap();
        assert!(out.get("labsSection").is_none());
        assert!(out.get("imagingAndProcedures").is_none());
        assert!(out.get("dischargeSection").is_some());

        let out = normalize(&raw, &ctx(DocumentType::LabReport)).unwrap();
        assert!(out.get("dischargeSection").is_none());
        assert_eq!(out["labsSection"]["labs"][0]["value"], "95");
    }

    #[test]
    fn test_lab_item_aliases_and_enums() {
        let raw = json!({
            "labResults": [
                {
                    "testName": "LDL Cholesterol",
                    "result": { "value": "160" },
                    "units": "mg/dL",
                    "normalRange": "<100",
                    "status": "H",
                    "priority": "Moderate",
                    "whatItMeans": "Higher than the usual range.",
                    "confidence": "90%",
                    "trend": [{ "date": "last year", "value": 150 }, { "value": 1 }]
                },
                { "value": "no name" },
                "Potassium"
            ]
        });
        let out = normalize(&raw, &ctx(DocumentType::LabReport)).unwrap();
        let labs = out["labsSection"]["labs"].as_array().unwrap();
        assert_eq!(labs.len(), 2);

        let ldl = &labs[0];
        assert_eq!(ldl["name"], "LDL Cholesterol");
        assert_eq!(ldl["value"], "160");
        assert_eq!(ldl["unit"], "mg/dL");
        assert_eq!(ldl["referenceRange"], "<100");
        assert_eq!(ldl["flag"], "high");
        assert_eq!(ldl["importance"], "medium");
        assert_eq!(ldl["confidence"], 0.9);
        assert_eq!(ldl["trend"], json!([{ "date": "last year", "value": "150" }]));

        assert_eq!(labs[1]["name"], "Potassium");
        assert_eq!(labs[1]["flag"], "unknown");
        assert_eq!(labs[1]["value"], DEFAULT_LAB_VALUE);

        assert!(validate(&out).is_ok());
    }

    #[test]
    fn test_list_bounds_enforced() {
        let questions: Vec<String> = (0..15).map(|i| format!("Question {i}?")).collect();
        let raw = json!({
            "questions": questions,
            "patientSummary": { "summary": "All good.", "keyPoints": ["one"] }
        });
        let out = normalize(&raw, &ctx(DocumentType::LabReport)).unwrap();
        assert_eq!(out["questionsForDoctor"].as_array().unwrap().len(), QUESTIONS_MAX);
        assert_eq!(out["patientSummary"]["overallSummary"], "All good.");
        let takeaways = out["patientSummary"]["keyTakeaways"].as_array().unwrap();
        assert_eq!(takeaways.len(), TAKEAWAYS_MIN);
        assert_eq!(takeaways[0], "one");
    }

    #[test]
    fn test_padding_has_no_duplicates() {
        let first_default = default_questions(DocumentType::LabReport)[0];
        let raw = json!({ "questionsForDoctor": [first_default.to_uppercase()] });
        let out = normalize(&raw, &ctx(DocumentType::LabReport)).unwrap();
        let qs: Vec<String> = out["questionsForDoctor"]
            .as_array()
            .unwrap()
            .iter()
            .map(|q| q.as_str().unwrap().to_lowercase())
            .collect();
        let mut unique = qs.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(qs.len(), QUESTIONS_MIN);
        assert_eq!(unique.len(), qs.len());
    }

    #[test]
    fn test_envelope_unwrapped() {
        let raw = json!({ "analysis": { "questionsForDoctor": ["Is this OK?"] } });
        let out = normalize(&raw, &ctx(DocumentType::LabReport)).unwrap();
        assert_eq!(out["questionsForDoctor"][0], "Is this OK?");
    }

    #[test]
    fn test_discharge_fields_at_top_level() {
        let raw = json!({
            "homeCare": "- Rest\n- Keep the incision dry",
            "meds": [{ "drug": "Amoxicillin", "dose": "500 mg twice a day", "frequency": "every 12 hours" }],
            "whenToCall": ["Fever over 101F"],
            "appointments": [{ "with": "Dr. Lee", "when": "in 1 week", "urgency": "soon" }],
            "status": "final"
        });
        let out = normalize(&raw, &ctx(DocumentType::DischargeInstructions)).unwrap();
        let section = &out["dischargeSection"];
        assert_eq!(section["status"], "approved");
        assert_eq!(section["homeCareSteps"], json!(["Rest", "Keep the incision dry"]));
        assert_eq!(section["medications"][0]["name"], "Amoxicillin");
        assert_eq!(section["medications"][0]["howToTake"], "500 mg twice a day");
        assert_eq!(section["medications"][0]["timing"], "every 12 hours");
        assert_eq!(section["warningSigns"][0]["symptom"], "Fever over 101F");
        assert_eq!(section["warningSigns"][0]["action"], DEFAULT_SIGN_ACTION);
        assert_eq!(section["followUpAppointments"][0]["urgency"], "soon");
        assert!(validate(&out).is_ok());
    }

    #[test]
    fn test_summary_keeps_present_sections_and_extras() {
        let raw = json!({
            "labs": [{ "name": "Bilirubin", "value": "12", "flag": "elevated" }],
            "imaging": [{ "study": "Head ultrasound", "impression": "Normal", "measurements": { "ventricle": 4 } }],
            "vaccines": ["Hepatitis B"],
            "stoppedMedications": [{ "name": "Ampicillin", "why": "Course complete" }],
            "birthHistory": "Born at 38 weeks."
        });
        let out = normalize(&raw, &ctx(DocumentType::DischargeSummary)).unwrap();
        assert!(out.get("labsSection").is_some());
        assert!(out.get("dischargeSection").is_none());
        assert_eq!(out["imagingAndProcedures"][0]["measurements"]["ventricle"], "4");
        assert_eq!(out["immunizations"][0]["date"], DEFAULT_IMMUNIZATION_DATE);
        assert_eq!(out["discontinuedMedications"][0]["reason"], "Course complete");
        assert_eq!(out["birthHistory"], "Born at 38 weeks.");
        assert!(validate(&out).is_ok());
    }

    #[test]
    fn test_shape_mismatch_on_declared_type() {
        let raw = json!({ "meta": { "documentType": "Discharge Summary" } });
        let issues = detect_shape_mismatch(&raw, DocumentType::LabReport);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].path, "/meta/documentType");

        let raw = json!({ "documentType": "lab_report" });
        assert!(detect_shape_mismatch(&raw, DocumentType::LabReport).is_empty());
    }

    #[test]
    fn test_loose_type_labels_are_not_guessed() {
        let raw = json!({
            "meta": { "documentType": "Lab results summary" },
            "labsSection": { "labs": [] }
        });
        assert!(detect_shape_mismatch(&raw, DocumentType::LabReport).is_empty());

        let raw = json!({ "documentType": "available" });
        assert!(detect_shape_mismatch(&raw, DocumentType::DischargeSummary).is_empty());

        let raw = json!({ "type": "discharge_summary" });
        assert!(detect_shape_mismatch(&raw, DocumentType::LabReport).is_empty());

        let raw = json!({ "docType": "Lab Results" });
        assert!(detect_shape_mismatch(&raw, DocumentType::LabReport).is_empty());
        let issues = detect_shape_mismatch(&raw, DocumentType::DischargeInstructions);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].path, "/documentType");
    }

    #[test]
    fn test_shape_mismatch_on_foreign_section() {
        let raw = json!({ "dischargeSection": { "homeCareSteps": ["Rest"] } });
        let issues = detect_shape_mismatch(&raw, DocumentType::LabReport);
        assert!(issues.iter().any(|i| i.path == "/labsSection"));

        assert!(detect_shape_mismatch(&raw, DocumentType::DischargeSummary).is_empty());
        assert!(detect_shape_mismatch(&json!("nope"), DocumentType::LabReport).is_empty());
    }
}
