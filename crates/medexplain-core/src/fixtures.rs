//! Canned analyses used when no provider is configured.
//!
//! Every fixture is schema-valid by construction and is checked by tests.
//! They are marked with `modelInfo { provider: "mock", model: "fixture" }`
//! so a caller can tell them apart from real output.

use std::collections::BTreeMap;

use crate::contract::{
    AnalysisResult, Appointment, CommonFields, DischargeInstructionsAnalysis, DischargeSection,
    DischargeSummaryAnalysis, DiscontinuedMedication, ImagingItem, Immunization, LabItem,
    LabReportAnalysis, LabsSection, Medication, Meta, ModelInfo, PatientSummary, Provenance,
    SafetyNotice, TrendPoint, WarningSign, SCHEMA_VERSION,
};
use crate::normalize::{NormalizeContext, DEFAULT_DISCLAIMER, DEFAULT_EMERGENCY_GUIDANCE};
use crate::types::{
    AppointmentUrgency, DischargeStatus, DocumentType, Importance, LabFlag, ReadingLevel,
};

pub const MOCK_PROVIDER: &str = "mock";
pub const MOCK_MODEL: &str = "fixture";

/// A fixture for the given document type and reading level.
pub fn mock_analysis(document_type: DocumentType, reading_level: ReadingLevel) -> AnalysisResult {
    mock_analysis_with(&NormalizeContext::new(document_type, reading_level))
}

/// A fixture whose `meta` reflects `ctx`. The model info is always the
/// mock marker, whatever `ctx` carries.
pub fn mock_analysis_with(ctx: &NormalizeContext) -> AnalysisResult {
    let simple = ctx.reading_level == ReadingLevel::Simple;
    let common = common_fields(ctx);

    match ctx.document_type {
        DocumentType::LabReport => AnalysisResult::LabReport(LabReportAnalysis {
            common,
            labs_section: labs_section(simple),
        }),
        DocumentType::DischargeInstructions => {
            AnalysisResult::DischargeInstructions(DischargeInstructionsAnalysis {
                common,
                discharge_section: discharge_section(simple),
            })
        }
        DocumentType::DischargeSummary => AnalysisResult::DischargeSummary(DischargeSummaryAnalysis {
            common,
            labs_section: Some(labs_section(simple)),
            discharge_section: Some(discharge_section(simple)),
            imaging_and_procedures: vec![ImagingItem {
                name: "Chest X-ray".into(),
                date: Some("Day 2 of stay".into()),
                findings: pick(
                    simple,
                    "The picture of the lungs looked clear.",
                    "The report describes clear lung fields with no acute findings.",
                ),
                measurements: None,
                confidence: Some(0.8),
            }],
            discontinued_medications: vec![DiscontinuedMedication {
                name: "IV antibiotics".into(),
                reason: "The document notes the course was completed in the hospital.".into(),
                replacement: Some("Oral antibiotics".into()),
            }],
            immunizations: vec![Immunization {
                name: "Influenza vaccine".into(),
                date: "During this stay".into(),
                notes: None,
            }],
            birth_history: None,
            hospital_course: Some(pick(
                simple,
                "The document says the stay went as planned and the patient got better each day.",
                "The document describes an uncomplicated stay with steady improvement.",
            )),
        }),
    }
}

fn pick(simple: bool, simple_text: &str, standard_text: &str) -> String {
    (if simple { simple_text } else { standard_text }).to_string()
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn common_fields(ctx: &NormalizeContext) -> CommonFields {
    let simple = ctx.reading_level == ReadingLevel::Simple;
    let label = ctx.document_type.label();

    let mut field_confidence = BTreeMap::new();
    field_confidence.insert("overallSummary".to_string(), 0.9);

    CommonFields {
        meta: Meta {
            schema_version: SCHEMA_VERSION.to_string(),
            created_at: ctx.created_at,
            document_type: ctx.document_type,
            reading_level: ctx.reading_level,
            language: if ctx.language.trim().is_empty() {
                "en".to_string()
            } else {
                ctx.language.clone()
            },
            provenance: Provenance {
                source: ctx.source,
                redaction_applied: ctx.redaction_applied,
            },
            safety: SafetyNotice {
                disclaimer: DEFAULT_DISCLAIMER.to_string(),
                emergency_guidance: DEFAULT_EMERGENCY_GUIDANCE.to_string(),
            },
            model_info: Some(ModelInfo::new(MOCK_PROVIDER, MOCK_MODEL)),
        },
        patient_summary: PatientSummary {
            overall_summary: if simple {
                format!("This is a sample explanation of a {label}. It shows what a real explanation would look like.")
            } else {
                format!("This is a sample analysis of a {label}, produced without a language model so the layout can be reviewed.")
            },
            key_takeaways: strings(&[
                "This is sample content, not an analysis of your document.",
                "Real results would be explained one by one in plain language.",
                "Your care team is the best source for what your document means.",
            ]),
            field_confidence: Some(field_confidence),
        },
        questions_for_doctor: strings(&[
            "What does this document mean for my health?",
            "Is there anything here that needs attention soon?",
            "Do I need any follow-up tests or visits?",
            "Could any of my medications affect these findings?",
            "Who should I contact if I have questions later?",
        ]),
        what_we_could_not_determine: strings(&[
            "This is sample content, so nothing from your document was reviewed.",
        ]),
    }
}

fn labs_section(simple: bool) -> LabsSection {
    LabsSection {
        overall_lab_note: Some(pick(
            simple,
            "Most results are in the usual range.",
            "Most values fall within the listed reference ranges.",
        )),
        labs: vec![
            LabItem {
                name: "Glucose".into(),
                value: "95".into(),
                unit: Some("mg/dL".into()),
                reference_range: Some("70-99".into()),
                flag: LabFlag::Normal,
                importance: Importance::Low,
                explanation: pick(
                    simple,
                    "Blood sugar is in the usual range.",
                    "Fasting glucose is within the reference range.",
                ),
                trend: None,
                trend_interpretation: None,
                confidence: Some(0.95),
            },
            LabItem {
                name: "Hemoglobin A1c".into(),
                value: "5.9".into(),
                unit: Some("%".into()),
                reference_range: Some("4.0-5.6".into()),
                flag: LabFlag::Borderline,
                importance: Importance::Medium,
                explanation: pick(
                    simple,
                    "This shows average blood sugar over a few months. It is a little above the usual range.",
                    "A1c reflects average glucose over roughly three months and is slightly above the reference range.",
                ),
                trend: Some(vec![
                    TrendPoint {
                        date: "Previous test".into(),
                        value: "5.7".into(),
                    },
                    TrendPoint {
                        date: "This test".into(),
                        value: "5.9".into(),
                    },
                ]),
                trend_interpretation: Some(pick(
                    simple,
                    "It went up a little since the last test.",
                    "Slight increase compared with the previous result.",
                )),
                confidence: Some(0.9),
            },
            LabItem {
                name: "LDL Cholesterol".into(),
                value: "130".into(),
                unit: Some("mg/dL".into()),
                reference_range: Some("<100".into()),
                flag: LabFlag::High,
                importance: Importance::Medium,
                explanation: pick(
                    simple,
                    "This is a type of cholesterol. It is above the usual range.",
                    "LDL cholesterol is above the listed reference range.",
                ),
                trend: None,
                trend_interpretation: None,
                confidence: None,
            },
        ],
    }
}

fn discharge_section(simple: bool) -> DischargeSection {
    DischargeSection {
        status: DischargeStatus::Draft,
        home_care_steps: strings(&[
            "Rest as much as you need for the first few days.",
            "Drink plenty of fluids unless the document says otherwise.",
        ]),
        medications: vec![Medication {
            name: "Acetaminophen".into(),
            purpose: pick(simple, "For pain or fever.", "Listed for pain or fever relief."),
            how_to_take: "As written on the discharge paperwork.".into(),
            cautions: "Check other products for acetaminophen so the total stays within the label limit.".into(),
            timing: Some("As needed".into()),
        }],
        follow_up: strings(&["See your primary care clinician within one to two weeks."]),
        warning_signs: vec![WarningSign {
            symptom: "Fever over 101 F (38.3 C)".into(),
            action: "Call your care team.".into(),
        }],
        general_red_flags: strings(&["Trouble breathing", "Chest pain", "Fainting"]),
        diagnoses_mentioned: strings(&["Sample condition listed in the document"]),
        follow_up_appointments: Some(vec![Appointment {
            provider: "Primary care clinician".into(),
            purpose: "Check on recovery".into(),
            timeframe: "Within 1-2 weeks".into(),
            urgency: AppointmentUrgency::Soon,
        }]),
        diet: Some("Regular diet as tolerated.".into()),
        activity: Some("Increase activity slowly as you feel able.".into()),
        ..DischargeSection::empty()
    }
}
