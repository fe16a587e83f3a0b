//! JSON Schema validation for analyses.
//!
//! Analyses are validated against schema/analysis.schema.json, which is
//! embedded at compile time and compiled once on first use.

use std::sync::OnceLock;
use thiserror::Error;

use super::model::SCHEMA_VERSION;
use super::validator::ValidationIssue;

const ANALYSIS_SCHEMA_JSON: &str = include_str!("../../../../schema/analysis.schema.json");

/// Dialect the analysis schema is written in.
const DRAFT_2020_12_URI: &str = "https://json-schema.org/draft/2020-12/schema";

static COMPILED_SCHEMA: OnceLock<Result<jsonschema::Validator, SchemaError>> = OnceLock::new();

/// Why the embedded schema could not be turned into a validator.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("analysis schema is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("analysis schema declares dialect {found:?}, expected draft 2020-12")]
    UnsupportedDraft { found: Option<String> },
    #[error("analysis schema id {id:?} does not match contract version {expected}")]
    VersionMismatch { id: Option<String>, expected: &'static str },
    #[error("analysis schema failed to compile: {0}")]
    Compile(String),
}

/// The raw schema document, as shipped.
pub fn schema_source() -> &'static str {
    ANALYSIS_SCHEMA_JSON
}

/// Compile a schema document for the current contract version.
///
/// The document must declare draft 2020-12 and its `$id` must end in
/// [`SCHEMA_VERSION`], so a schema file bumped without the model (or the
/// other way around) fails here instead of validating the wrong shape.
fn compile_schema(source: &str) -> Result<jsonschema::Validator, SchemaError> {
    let document: serde_json::Value =
        serde_json::from_str(source).map_err(|e| SchemaError::InvalidJson(e.to_string()))?;

    let dialect = document.get("$schema").and_then(|v| v.as_str());
    if dialect.map(|d| d.trim_end_matches('#')) != Some(DRAFT_2020_12_URI) {
        return Err(SchemaError::UnsupportedDraft {
            found: dialect.map(str::to_string),
        });
    }

    let id = document.get("$id").and_then(|v| v.as_str());
    let versioned = id
        .and_then(|id| id.rsplit('/').next())
        .is_some_and(|last| last == SCHEMA_VERSION);
    if !versioned {
        return Err(SchemaError::VersionMismatch {
            id: id.map(str::to_string),
            expected: SCHEMA_VERSION,
        });
    }

    jsonschema::options()
        .with_draft(jsonschema::Draft::Draft202012)
        .build(&document)
        .map_err(|e| SchemaError::Compile(e.to_string()))
}

fn get_validator() -> Result<&'static jsonschema::Validator, SchemaError> {
    COMPILED_SCHEMA
        .get_or_init(|| compile_schema(ANALYSIS_SCHEMA_JSON))
        .as_ref()
        .map_err(Clone::clone)
}

/// Validate a candidate against the schema.
///
/// Issues come back in the order the validator reports them. Paths are
/// JSON pointers, with `/` standing for the document root.
pub fn check_schema(candidate: &serde_json::Value) -> Result<(), Vec<ValidationIssue>> {
    let validator = get_validator().map_err(|e| vec![ValidationIssue::root(e.to_string())])?;

    let issues: Vec<ValidationIssue> = validator
        .iter_errors(candidate)
        .map(|e| ValidationIssue::new(e.instance_path.to_string(), e.to_string()))
        .collect();

    if issues.is_empty() {
        Ok(())
    } else {
        Err(issues)
    }
}

/// Check if a candidate is valid against the schema.
pub fn is_valid_analysis(candidate: &serde_json::Value) -> bool {
    get_validator()
        .map(|v| v.is_valid(candidate))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::mock_analysis;
    use crate::types::{DocumentType, ReadingLevel};

    fn fixture(dt: DocumentType) -> serde_json::Value {
        mock_analysis(dt, ReadingLevel::Standard).to_value().unwrap()
    }

    #[test]
    fn test_embedded_schema_compiles() {
        assert!(get_validator().is_ok());
        let parsed: serde_json::Value = serde_json::from_str(schema_source()).unwrap();
        assert_eq!(parsed["$defs"]["meta"]["properties"]["schemaVersion"]["const"], "1.0.0");
    }

    #[test]
    fn test_schema_id_tracks_contract_version() {
        let parsed: serde_json::Value = serde_json::from_str(schema_source()).unwrap();
        let id = parsed["$id"].as_str().unwrap();
        assert!(id.ends_with(&format!("/{SCHEMA_VERSION}")));
        assert_eq!(parsed["$schema"], DRAFT_2020_12_URI);
    }

    #[test]
    fn test_compile_rejects_wrong_dialect_and_version() {
        let older = r#"{"$schema": "http://json-schema.org/draft-07/schema#",
            "$id": "https://medexplain.dev/schema/analysis/1.0.0", "type": "object"}"#;
        assert_eq!(
            compile_schema(older).unwrap_err(),
            SchemaError::UnsupportedDraft {
                found: Some("http://json-schema.org/draft-07/schema#".to_string())
            }
        );

        let bumped = r#"{"$schema": "https://json-schema.org/draft/2020-12/schema",
            "$id": "https://medexplain.dev/schema/analysis/2.0.0", "type": "object"}"#;
        assert!(matches!(
            compile_schema(bumped).unwrap_err(),
            SchemaError::VersionMismatch { expected: SCHEMA_VERSION, .. }
        ));

        let unversioned = r#"{"$schema": "https://json-schema.org/draft/2020-12/schema", "type": "object"}"#;
        assert!(matches!(
            compile_schema(unversioned).unwrap_err(),
            SchemaError::VersionMismatch { id: None, .. }
        ));

        assert!(matches!(compile_schema("{"), Err(SchemaError::InvalidJson(_))));

        let broken = r#"{"$schema": "https://json-schema.org/draft/2020-12/schema",
            "$id": "https://medexplain.dev/schema/analysis/1.0.0", "type": 7}"#;
        assert!(matches!(compile_schema(broken), Err(SchemaError::Compile(_))));
    }

    #[test]
    fn test_fixtures_pass_schema() {
        for dt in DocumentType::ALL {
            assert!(check_schema(&fixture(*dt)).is_ok(), "fixture for {dt} rejected");
        }
    }

    #[test]
    fn test_lab_report_with_discharge_section_fails() {
        let mut value = fixture(DocumentType::LabReport);
        let discharge = fixture(DocumentType::DischargeInstructions)["dischargeSection"].clone();
        value["dischargeSection"] = discharge;

        let issues = check_schema(&value).unwrap_err();
        assert!(issues.iter().any(|i| i.path.contains("dischargeSection")));
    }

    #[test]
    fn test_instructions_without_discharge_section_fails() {
        let mut value = fixture(DocumentType::DischargeInstructions);
        value.as_object_mut().unwrap().remove("dischargeSection");
        assert!(!is_valid_analysis(&value));
    }

    #[test]
    fn test_summary_needs_one_section() {
        let mut value = fixture(DocumentType::DischargeSummary);
        let obj = value.as_object_mut().unwrap();
        obj.remove("labsSection");
        obj.remove("dischargeSection");
        assert!(!is_valid_analysis(&value));
    }

    #[test]
    fn test_question_count_bounds() {
        let mut value = fixture(DocumentType::LabReport);
        value["questionsForDoctor"] = serde_json::json!(["one", "two"]);
        let issues = check_schema(&value).unwrap_err();
        assert!(issues.iter().any(|i| i.path == "/questionsForDoctor"));

        let eleven: Vec<String> = (0..11).map(|i| format!("Question {i}?")).collect();
        value["questionsForDoctor"] = serde_json::json!(eleven);
        assert!(!is_valid_analysis(&value));
    }

    #[test]
    fn test_empty_required_string_fails() {
        let mut value = fixture(DocumentType::LabReport);
        value["patientSummary"]["overallSummary"] = serde_json::json!("");
        let issues = check_schema(&value).unwrap_err();
        assert_eq!(issues[0].path, "/patientSummary/overallSummary");
    }

    #[test]
    fn test_unknown_schema_version_fails() {
        let mut value = fixture(DocumentType::LabReport);
        value["meta"]["schemaVersion"] = serde_json::json!("2.0.0");
        assert!(!is_valid_analysis(&value));
    }

    #[test]
    fn test_additional_properties_fail() {
        let mut value = fixture(DocumentType::LabReport);
        value["diagnosis"] = serde_json::json!("should fail");
        assert!(!is_valid_analysis(&value));
    }

    #[test]
    fn test_non_object_reports_root_path() {
        let issues = check_schema(&serde_json::json!([1, 2, 3])).unwrap_err();
        assert_eq!(issues[0].path, "/");
    }
}
