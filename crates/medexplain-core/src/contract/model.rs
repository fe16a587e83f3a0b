//! Typed analysis contract.
//!
//! [`AnalysisResult`] is a closed sum over the three document types. Its
//! JSON form is untagged: the discriminator lives at `meta.documentType`,
//! and deserialization dispatches on it rather than guessing from shape.

use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;

use crate::types::{
    AppointmentUrgency, DischargeStatus, DocumentType, Importance, LabFlag, ProvenanceSource,
    ReadingLevel,
};

/// The only schema version this build produces and accepts.
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Where the analysed text came from and whether PII redaction ran.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provenance {
    pub source: ProvenanceSource,
    pub redaction_applied: bool,
}

/// Safety block shown alongside every analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafetyNotice {
    pub disclaimer: String,
    pub emergency_guidance: String,
}

/// Which provider and model produced the analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub provider: String,
    pub model: String,
}

impl ModelInfo {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
        }
    }
}

/// Metadata block. `document_type`, `reading_level`, `schema_version` and
/// `provenance` are always written by the pipeline, never by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meta {
    pub schema_version: String,
    pub created_at: DateTime<Utc>,
    pub document_type: DocumentType,
    pub reading_level: ReadingLevel,
    pub language: String,
    pub provenance: Provenance,
    pub safety: SafetyNotice,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_info: Option<ModelInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientSummary {
    pub overall_summary: String,

    /// Between 3 and 7 entries.
    pub key_takeaways: Vec<String>,

    /// Optional per-field confidence, each in [0, 1].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_confidence: Option<BTreeMap<String, f64>>,
}

/// Fields shared by every variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommonFields {
    pub meta: Meta,
    pub patient_summary: PatientSummary,

    /// Between 5 and 10 entries.
    pub questions_for_doctor: Vec<String>,

    #[serde(default)]
    pub what_we_could_not_determine: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub date: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabItem {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_range: Option<String>,
    pub flag: LabFlag,
    pub importance: Importance,
    pub explanation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trend: Option<Vec<TrendPoint>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trend_interpretation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabsSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overall_lab_note: Option<String>,
    pub labs: Vec<LabItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Medication {
    pub name: String,
    pub purpose: String,
    pub how_to_take: String,
    pub cautions: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timing: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarningSign {
    pub symptom: String,
    pub action: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub provider: String,
    pub purpose: String,
    pub timeframe: String,
    pub urgency: AppointmentUrgency,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DischargeSection {
    pub status: DischargeStatus,
    pub home_care_steps: Vec<String>,
    pub medications: Vec<Medication>,
    pub follow_up: Vec<String>,
    pub warning_signs: Vec<WarningSign>,
    pub general_red_flags: Vec<String>,
    pub diagnoses_mentioned: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follow_up_appointments: Option<Vec<Appointment>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diet: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daily_monitoring: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feeding_plan: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub safe_sleep: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wound_care: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub respiratory_precautions: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub developmental_guidance: Option<String>,
}

impl DischargeSection {
    /// A draft section with every list empty.
    pub fn empty() -> Self {
        Self {
            status: DischargeStatus::Draft,
            home_care_steps: Vec::new(),
            medications: Vec::new(),
            follow_up: Vec::new(),
            warning_signs: Vec::new(),
            general_red_flags: Vec::new(),
            diagnoses_mentioned: Vec::new(),
            follow_up_appointments: None,
            diet: None,
            activity: None,
            daily_monitoring: None,
            feeding_plan: None,
            safe_sleep: None,
            wound_care: None,
            respiratory_precautions: None,
            developmental_guidance: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImagingItem {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    pub findings: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measurements: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscontinuedMedication {
    pub name: String,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replacement: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Immunization {
    pub name: String,
    pub date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabReportAnalysis {
    #[serde(flatten)]
    pub common: CommonFields,
    pub labs_section: LabsSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DischargeInstructionsAnalysis {
    #[serde(flatten)]
    pub common: CommonFields,
    pub discharge_section: DischargeSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DischargeSummaryAnalysis {
    #[serde(flatten)]
    pub common: CommonFields,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labs_section: Option<LabsSection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discharge_section: Option<DischargeSection>,
    #[serde(default)]
    pub imaging_and_procedures: Vec<ImagingItem>,
    #[serde(default)]
    pub discontinued_medications: Vec<DiscontinuedMedication>,
    #[serde(default)]
    pub immunizations: Vec<Immunization>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth_history: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hospital_course: Option<String>,
}

/// A validated analysis, one arm per [`DocumentType`].
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisResult {
    LabReport(LabReportAnalysis),
    DischargeInstructions(DischargeInstructionsAnalysis),
    DischargeSummary(DischargeSummaryAnalysis),
}

impl AnalysisResult {
    pub fn common(&self) -> &CommonFields {
        match self {
            AnalysisResult::LabReport(a) => &a.common,
            AnalysisResult::DischargeInstructions(a) => &a.common,
            AnalysisResult::DischargeSummary(a) => &a.common,
        }
    }

    pub fn meta(&self) -> &Meta {
        &self.common().meta
    }

    pub fn document_type(&self) -> DocumentType {
        match self {
            AnalysisResult::LabReport(_) => DocumentType::LabReport,
            AnalysisResult::DischargeInstructions(_) => DocumentType::DischargeInstructions,
            AnalysisResult::DischargeSummary(_) => DocumentType::DischargeSummary,
        }
    }

    pub fn labs_section(&self) -> Option<&LabsSection> {
        match self {
            AnalysisResult::LabReport(a) => Some(&a.labs_section),
            AnalysisResult::DischargeInstructions(_) => None,
            AnalysisResult::DischargeSummary(a) => a.labs_section.as_ref(),
        }
    }

    pub fn discharge_section(&self) -> Option<&DischargeSection> {
        match self {
            AnalysisResult::LabReport(_) => None,
            AnalysisResult::DischargeInstructions(a) => Some(&a.discharge_section),
            AnalysisResult::DischargeSummary(a) => a.discharge_section.as_ref(),
        }
    }

    /// Convert to the wire representation.
    pub fn to_value(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

impl Serialize for AnalysisResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            AnalysisResult::LabReport(a) => a.serialize(serializer),
            AnalysisResult::DischargeInstructions(a) => a.serialize(serializer),
            AnalysisResult::DischargeSummary(a) => a.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for AnalysisResult {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        let tag = value
            .get("meta")
            .and_then(|m| m.get("documentType"))
            .cloned()
            .ok_or_else(|| D::Error::missing_field("meta.documentType"))?;
        let document_type: DocumentType =
            serde_json::from_value(tag).map_err(D::Error::custom)?;

        let result = match document_type {
            DocumentType::LabReport => {
                serde_json::from_value(value).map(AnalysisResult::LabReport)
            }
            DocumentType::DischargeInstructions => {
                serde_json::from_value(value).map(AnalysisResult::DischargeInstructions)
            }
            DocumentType::DischargeSummary => {
                serde_json::from_value(value).map(AnalysisResult::DischargeSummary)
            }
        };
        result.map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::mock_analysis;

    #[test]
    fn test_untagged_serialization_keeps_discriminator_in_meta() {
        let result = mock_analysis(DocumentType::LabReport, ReadingLevel::Simple);
        let value = result.to_value().unwrap();

        assert_eq!(value["meta"]["documentType"], "lab_report");
        assert!(value.get("labsSection").is_some());
        assert!(value.get("dischargeSection").is_none());
        assert!(value.get("LabReport").is_none());
    }

    #[test]
    fn test_deserialize_dispatches_on_meta_document_type() {
        for dt in DocumentType::ALL {
            let result = mock_analysis(*dt, ReadingLevel::Standard);
            let value = result.to_value().unwrap();
            let back: AnalysisResult = serde_json::from_value(value).unwrap();
            assert_eq!(back.document_type(), *dt);
            assert_eq!(back, result);
        }
    }

    #[test]
    fn test_deserialize_rejects_missing_discriminator() {
        let value = serde_json::json!({ "meta": {} });
        let result: Result<AnalysisResult, _> = serde_json::from_value(value);
        assert!(result.is_err());
    }

    #[test]
    fn test_section_accessors_follow_variant() {
        let labs = mock_analysis(DocumentType::LabReport, ReadingLevel::Simple);
        assert!(labs.labs_section().is_some());
        assert!(labs.discharge_section().is_none());

        let instructions = mock_analysis(DocumentType::DischargeInstructions, ReadingLevel::Simple);
        assert!(instructions.labs_section().is_none());
        assert!(instructions.discharge_section().is_some());
    }
}
