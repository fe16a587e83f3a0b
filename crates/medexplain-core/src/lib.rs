//! # medexplain-core
//!
//! Deterministic building blocks for turning a medical document and a
//! model's answer into a validated, patient-safe analysis.
//!
//! This crate never performs I/O and never calls a model. It answers:
//! - What may be sent to a model? ([`redaction`])
//! - What shape must the answer have? ([`contract`])
//! - How is a messy answer mapped onto that shape? ([`normalize`])
//! - What may be shown to a patient? ([`safety`])
//!
//! ## Key Guarantees
//!
//! 1. **Deterministic**: same input, same output (apart from `createdAt`)
//! 2. **Total normalization**: any JSON object maps onto the requested variant
//! 3. **Strict validation**: only schema-valid analyses become [`AnalysisResult`]
//! 4. **PHI-blind reports**: redaction and filter reports carry counts only
//!
//! ## Example
//!
//! ```rust,ignore
//! use medexplain_core::{normalize, parse_model_json, validate, NormalizeContext};
//! use medexplain_core::{DocumentType, ReadingLevel, SafetyFilter};
//!
//! let raw = parse_model_json(model_text)?;
//! let ctx = NormalizeContext::new(DocumentType::LabReport, ReadingLevel::Simple);
//! let candidate = normalize(&raw, &ctx)?;
//! let result = validate(&candidate).map_err(|issues| /* retry */)?;
//! let safe = SafetyFilter::new().filter_result(result)?;
//! ```

pub mod contract;
pub mod fixtures;
pub mod normalize;
pub mod redaction;
pub mod safety;
pub mod types;

// Re-export main types at crate root
pub use contract::{
    check_schema, validate, AnalysisResult, ModelInfo, SchemaError, ValidationIssue,
    SCHEMA_VERSION,
};
pub use fixtures::{mock_analysis, mock_analysis_with};
pub use normalize::{
    detect_shape_mismatch, extract_json_span, normalize, parse_model_json, MalformedJson,
    NormalizeContext, NormalizeError,
};
pub use redaction::{prepare_input, redact, redact_input, redact_with_report, RedactionReport};
pub use safety::{FilterReport, SafetyFilter, FILTERED_MARKER};
pub use types::{
    AppointmentUrgency, DischargeStatus, DocumentType, Importance, LabFlag, ParseEnumError,
    ProvenanceSource, ReadingLevel,
};

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_messy_response_to_safe_result() {
        let model_text = r#"Sure! ```json
{
  "summary": "Your glucose is normal. You probably have nothing to worry about.",
  "labs": [{ "test": "Glucose", "value": 95, "units": "mg/dL", "flag": "N" },],
  "questions": ["Should I retest?"],
  "disclaimers": ["Not medical advice.", "Talk to your doctor."],
}
```"#;
        let raw = parse_model_json(model_text).unwrap();
        assert!(detect_shape_mismatch(&raw, DocumentType::LabReport).is_empty());

        let ctx = NormalizeContext::new(DocumentType::LabReport, ReadingLevel::Simple);
        let candidate = normalize(&raw, &ctx).unwrap();
        let result = validate(&candidate).unwrap();
        let safe = SafetyFilter::new().filter_result(result).unwrap();

        let labs = safe.labs_section().unwrap();
        assert_eq!(labs.labs[0].name, "Glucose");
        assert_eq!(labs.labs[0].flag, LabFlag::Normal);
        assert_eq!(
            safe.meta().safety.disclaimer,
            "Not medical advice. Talk to your doctor."
        );
        assert!(safe.common().patient_summary.overall_summary.contains(FILTERED_MARKER));
        assert_eq!(safe.common().questions_for_doctor.len(), 5);
        assert_eq!(safe.to_value().unwrap()["meta"]["documentType"], json!("lab_report"));
    }
}
