//! Alias tables: every logical field and the incoming key names accepted
//! for it, most preferred first.

use serde_json::{Map, Value};

use crate::types::DocumentType;

pub(crate) const ENVELOPE: &[&str] = &["analysis", "result", "data", "response", "output"];

// Top level
pub(crate) const META: &[&str] = &["meta", "metadata"];
pub(crate) const DOCUMENT_TYPE: &[&str] = &["documentType", "docType"];

/// Declared document-type labels accepted besides the canonical values,
/// already folded to lower case with `_` separators.
pub(crate) const DOCUMENT_TYPE_LABELS: &[(&str, DocumentType)] = &[
    ("lab", DocumentType::LabReport),
    ("labs", DocumentType::LabReport),
    ("lab_results", DocumentType::LabReport),
    ("laboratory_report", DocumentType::LabReport),
    ("discharge_instruction", DocumentType::DischargeInstructions),
    ("discharge_summary_report", DocumentType::DischargeSummary),
];
pub(crate) const SAFETY: &[&str] = &["safety", "safetyInfo", "safetyNotice"];
pub(crate) const DISCLAIMER: &[&str] = &[
    "disclaimer",
    "disclaimers",
    "safetyDisclaimer",
    "safetyNote",
];
pub(crate) const EMERGENCY_GUIDANCE: &[&str] = &[
    "emergencyGuidance",
    "emergency",
    "emergencyInstructions",
    "emergencyNote",
    "whenToSeekEmergencyCare",
];
pub(crate) const PATIENT_SUMMARY: &[&str] = &["patientSummary", "summary", "plainLanguageSummary"];
pub(crate) const OVERALL_SUMMARY: &[&str] = &["overallSummary", "summary", "overview", "plainSummary"];
pub(crate) const KEY_TAKEAWAYS: &[&str] = &[
    "keyTakeaways",
    "takeaways",
    "keyPoints",
    "highlights",
    "mainPoints",
];
pub(crate) const FIELD_CONFIDENCE: &[&str] = &["fieldConfidence", "confidenceByField", "confidenceScores"];
pub(crate) const QUESTIONS: &[&str] = &[
    "questionsForDoctor",
    "questions",
    "doctorQuestions",
    "suggestedQuestions",
    "questionsToAsk",
];
pub(crate) const NOT_DETERMINED: &[&str] = &[
    "whatWeCouldNotDetermine",
    "couldNotDetermine",
    "limitations",
    "unknowns",
    "uncertainties",
];

// Labs
pub(crate) const LABS_SECTION: &[&str] = &["labsSection", "labSection", "labResultsSection", "labsAnalysis"];
pub(crate) const LABS: &[&str] = &["labs", "labResults", "results", "tests", "labValues"];
pub(crate) const OVERALL_LAB_NOTE: &[&str] = &["overallLabNote", "labNote", "overallNote", "note"];
pub(crate) const LAB_NAME: &[&str] = &["name", "testName", "test", "analyte", "label"];
pub(crate) const LAB_VALUE: &[&str] = &["value", "result", "resultValue", "measurement"];
pub(crate) const LAB_UNIT: &[&str] = &["unit", "units"];
pub(crate) const LAB_RANGE: &[&str] = &[
    "referenceRange",
    "normalRange",
    "refRange",
    "range",
    "reference",
];
pub(crate) const LAB_FLAG: &[&str] = &["flag", "status", "interpretation", "abnormalFlag"];
pub(crate) const IMPORTANCE: &[&str] = &["importance", "priority", "significance", "severity"];
pub(crate) const EXPLANATION: &[&str] = &[
    "explanation",
    "whatItMeans",
    "meaning",
    "description",
    "plainLanguage",
];
pub(crate) const TREND: &[&str] = &["trend", "history", "previousValues", "priorValues"];
pub(crate) const TREND_DATE: &[&str] = &["date", "when", "collected", "time"];
pub(crate) const TREND_INTERPRETATION: &[&str] = &["trendInterpretation", "trendSummary", "trendNote"];
pub(crate) const CONFIDENCE: &[&str] = &["confidence", "confidenceScore", "certainty"];

// Discharge
pub(crate) const DISCHARGE_SECTION: &[&str] = &[
    "dischargeSection",
    "discharge",
    "dischargeInstructions",
    "dischargeAnalysis",
];
pub(crate) const STATUS: &[&str] = &["status", "documentStatus", "approvalStatus"];
pub(crate) const HOME_CARE: &[&str] = &[
    "homeCareSteps",
    "homeCare",
    "careInstructions",
    "homeInstructions",
    "instructions",
];
pub(crate) const MEDICATIONS: &[&str] = &["medications", "meds", "medicationList", "currentMedications"];
pub(crate) const FOLLOW_UP: &[&str] = &["followUp", "followUpInstructions", "followUpCare", "nextSteps"];
pub(crate) const WARNING_SIGNS: &[&str] = &[
    "warningSigns",
    "warningSymptoms",
    "whenToSeekHelp",
    "whenToCall",
];
pub(crate) const RED_FLAGS: &[&str] = &["generalRedFlags", "redFlags", "emergencySigns"];
pub(crate) const DIAGNOSES: &[&str] = &["diagnosesMentioned", "diagnoses", "conditions", "diagnosis"];
pub(crate) const APPOINTMENTS: &[&str] = &[
    "followUpAppointments",
    "appointments",
    "scheduledAppointments",
];
pub(crate) const DIET: &[&str] = &["diet", "dietInstructions", "nutrition"];
pub(crate) const ACTIVITY: &[&str] = &["activity", "activityRestrictions", "activityInstructions"];
pub(crate) const DAILY_MONITORING: &[&str] = &["dailyMonitoring", "monitoring", "homeMonitoring"];
pub(crate) const FEEDING_PLAN: &[&str] = &["feedingPlan", "feeding", "feedingInstructions"];
pub(crate) const SAFE_SLEEP: &[&str] = &["safeSleep", "sleepSafety", "sleep"];
pub(crate) const WOUND_CARE: &[&str] = &["woundCare", "incisionCare", "wound"];
pub(crate) const RESPIRATORY: &[&str] = &["respiratoryPrecautions", "breathingPrecautions", "respiratory"];
pub(crate) const DEVELOPMENTAL: &[&str] = &["developmentalGuidance", "development", "developmentalNotes"];

pub(crate) const MED_NAME: &[&str] = &["name", "medication", "medicationName", "drug", "drugName"];
pub(crate) const MED_PURPOSE: &[&str] = &["purpose", "reason", "indication", "use", "usedFor"];
pub(crate) const MED_HOW: &[&str] = &["howToTake", "instructions", "directions", "dosage", "dose"];
pub(crate) const MED_CAUTIONS: &[&str] = &["cautions", "warnings", "precautions", "sideEffects"];
pub(crate) const MED_TIMING: &[&str] = &["timing", "schedule", "frequency", "when"];

pub(crate) const SIGN_SYMPTOM: &[&str] = &["symptom", "sign", "warning", "description"];
pub(crate) const SIGN_ACTION: &[&str] = &["action", "whatToDo", "response", "instructions"];

pub(crate) const APPT_PROVIDER: &[&str] = &["provider", "with", "doctor", "clinic", "specialty"];
pub(crate) const APPT_PURPOSE: &[&str] = &["purpose", "reason", "for"];
pub(crate) const APPT_TIMEFRAME: &[&str] = &["timeframe", "when", "timing", "date", "time"];
pub(crate) const APPT_URGENCY: &[&str] = &["urgency", "priority"];

// Discharge summary extras
pub(crate) const IMAGING: &[&str] = &[
    "imagingAndProcedures",
    "imaging",
    "procedures",
    "imagingResults",
];
pub(crate) const IMAGING_NAME: &[&str] = &["name", "study", "procedure", "test", "type"];
pub(crate) const IMAGING_FINDINGS: &[&str] = &["findings", "impression", "result", "summary"];
pub(crate) const MEASUREMENTS: &[&str] = &["measurements", "values"];
pub(crate) const DATE: &[&str] = &["date", "performed", "when", "dateGiven", "given"];
pub(crate) const DISCONTINUED: &[&str] = &[
    "discontinuedMedications",
    "stoppedMedications",
    "discontinued",
];
pub(crate) const DISCONTINUED_REASON: &[&str] = &["reason", "why", "reasonStopped"];
pub(crate) const REPLACEMENT: &[&str] = &["replacement", "replacedBy", "alternative", "switchedTo"];
pub(crate) const IMMUNIZATIONS: &[&str] = &["immunizations", "vaccines", "vaccinations"];
pub(crate) const VACCINE_NAME: &[&str] = &["name", "vaccine", "immunization"];
pub(crate) const NOTES: &[&str] = &["notes", "note", "comment", "comments"];
pub(crate) const BIRTH_HISTORY: &[&str] = &["birthHistory", "birth", "perinatalHistory"];
pub(crate) const HOSPITAL_COURSE: &[&str] = &["hospitalCourse", "course", "hospitalStay"];

/// Lower-case, alphanumerics only: `follow_up`, `Follow-Up` and `followUp`
/// all fold to `followup`.
fn fold_key(key: &str) -> String {
    key.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Resolve a logical field.
///
/// Tries every alias as an exact key first, then again ignoring case and
/// separators. A `null` value counts as absent.
pub(crate) fn lookup<'a>(obj: &'a Map<String, Value>, aliases: &[&str]) -> Option<&'a Value> {
    for alias in aliases {
        if let Some(v) = obj.get(*alias) {
            if !v.is_null() {
                return Some(v);
            }
        }
    }

    for alias in aliases {
        let wanted = fold_key(alias);
        let hit = obj
            .iter()
            .find(|(k, v)| !v.is_null() && fold_key(k) == wanted)
            .map(|(_, v)| v);
        if hit.is_some() {
            return hit;
        }
    }

    None
}

/// Like [`lookup`], but only accepts an object.
pub(crate) fn lookup_object<'a>(
    obj: &'a Map<String, Value>,
    aliases: &[&str],
) -> Option<&'a Map<String, Value>> {
    lookup(obj, aliases).and_then(Value::as_object)
}
