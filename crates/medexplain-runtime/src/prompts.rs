//! Prompts for document analysis.
//!
//! The system prompt is assembled from fixed blocks:
//! 1. Base role and safety rules (shared by every request)
//! 2. Output format rules (shared)
//! 3. Field checklist for the requested document type
//! 4. Vocabulary guidance for the reading level
//!
//! Document text only ever appears in the user prompt, and only after
//! redaction.

use medexplain_core::{DocumentType, ReadingLevel, ValidationIssue, SCHEMA_VERSION};

/// Placeholder replaced by the redacted document in the user template.
pub const DOCUMENT_PLACEHOLDER: &str = "{{DOCUMENT_TEXT}}";

/// Issues quoted back to the model on retry.
pub const MAX_RETRY_ISSUES: usize = 5;

/// How much of the rejected response is quoted back on retry.
pub const MAX_PREVIOUS_RESPONSE_CHARS: usize = 4000;

/// Shared role and safety rules.
pub const BASE_SYSTEM_PROMPT: &str = r#"
You explain medical documents to patients in plain language.

You describe what the document says. You do not add to it.

## Safety Rules
1. Never diagnose. Do not say the patient has, probably has, or might have a condition.
   Conditions named in the document may be repeated as "the document lists ...".
2. Never recommend starting, stopping, or changing a medication or dose.
3. Never recommend a treatment. Suggest questions for the care team instead.
4. Do not speak in the first person ("I recommend", "I suggest").
5. If something is unclear or missing, say so in whatWeCouldNotDetermine. Do not guess.
6. Always include emergency guidance: in an emergency, call local emergency services.

## Redacted Text
Some details were replaced with tokens such as [EMAIL], [PHONE], [SSN], [MRN],
[DATE] and [ADDRESS]. Write around them. Do not copy the tokens into your answer
and do not try to guess what they replaced.
"#;

/// Shared output format rules.
pub const OUTPUT_FORMAT_PROMPT: &str = r#"
## Output Format
- Respond with a single JSON object and nothing else.
- No code fences, no markdown, no text before or after the object.
- Use exactly the field names listed below, in camelCase.
- Do not add fields that are not listed.
- Every string must be non-empty. Use the listed enum values exactly.
- confidence values are numbers between 0 and 1.

## Always Required
{
  "meta": {
    "schemaVersion": "__SCHEMA_VERSION__",
    "documentType": "__DOCUMENT_TYPE__",
    "safety": { "disclaimer": "string", "emergencyGuidance": "string" }
  },
  "patientSummary": {
    "overallSummary": "string",
    "keyTakeaways": ["3 to 7 strings"]
  },
  "questionsForDoctor": ["5 to 10 strings"],
  "whatWeCouldNotDetermine": ["strings, may be empty"]
}
"#;

/// Fields of `labsSection`.
pub const LABS_SECTION_FIELDS: &str = r#"
"labsSection": {
  "overallLabNote": "string" (optional),
  "labs": [{
    "name": "string",
    "value": "string",
    "unit": "string" (optional),
    "referenceRange": "string" (optional),
    "flag": "low | high | normal | borderline | unknown",
    "importance": "low | medium | high | unknown",
    "explanation": "string",
    "trend": [{ "date": "string", "value": "string" }] (optional),
    "trendInterpretation": "string" (optional),
    "confidence": 0.0-1.0 (optional)
  }]
}
"#;

/// Fields of `dischargeSection`.
pub const DISCHARGE_SECTION_FIELDS: &str = r#"
"dischargeSection": {
  "status": "draft | approved",
  "homeCareSteps": ["strings"],
  "medications": [{ "name", "purpose", "howToTake", "cautions", "timing" (optional) }],
  "followUp": ["strings"],
  "warningSigns": [{ "symptom", "action" }],
  "generalRedFlags": ["strings"],
  "diagnosesMentioned": ["strings, as written in the document"],
  "followUpAppointments": [{ "provider", "purpose", "timeframe", "urgency": "routine | soon | urgent" }] (optional),
  "diet": "string" (optional),
  "activity": "string" (optional),
  "dailyMonitoring": ["strings"] (optional),
  "feedingPlan": "string" (optional),
  "safeSleep": "string" (optional),
  "woundCare": "string" (optional),
  "respiratoryPrecautions": "string" (optional),
  "developmentalGuidance": "string" (optional)
}
Use "status": "draft" unless the document says a clinician approved it.
"#;

/// Field checklist for lab reports.
pub const LAB_REPORT_CHECKLIST: &str = r#"
## Document Type: Lab Report
Include "labsSection". Do NOT include "dischargeSection".
"#;

/// Field checklist for discharge instructions.
pub const DISCHARGE_INSTRUCTIONS_CHECKLIST: &str = r#"
## Document Type: Discharge Instructions
Include "dischargeSection". Do NOT include "labsSection".
"#;

/// Field checklist for discharge summaries.
pub const DISCHARGE_SUMMARY_CHECKLIST: &str = r#"
## Document Type: Discharge Summary
Include "labsSection" if the document has lab results and "dischargeSection"
if it has instructions for home. At least one of the two is required.

Also include:
"imagingAndProcedures": [{ "name", "date" (optional), "findings", "measurements" (optional), "confidence" (optional) }],
"discontinuedMedications": [{ "name", "reason", "replacement" (optional) }],
"immunizations": [{ "name", "date", "notes" (optional) }],
"birthHistory": "string" (optional, newborn summaries only),
"hospitalCourse": "string" (optional)

Use empty arrays when the document has nothing for a list.
"#;

const SIMPLE_LEVEL_GUIDANCE: &str = r#"
## Reading Level: Simple
Write for someone with no medical background, around a 6th grade reading level.
Use short sentences and everyday words. Explain any medical term you must use.
"#;

const STANDARD_LEVEL_GUIDANCE: &str = r#"
## Reading Level: Standard
Write for an interested adult. Common medical terms are fine when briefly explained.
"#;

/// System prompt plus a user template holding [`DOCUMENT_PLACEHOLDER`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptPair {
    pub system: String,
    pub user_template: String,
}

impl PromptPair {
    /// The user prompt for a redacted document.
    pub fn user_prompt(&self, redacted_text: &str) -> String {
        render_user_prompt(&self.user_template, redacted_text)
    }
}

/// Get the field checklist for a document type.
pub fn checklist(document_type: DocumentType) -> String {
    let blocks: &[&str] = match document_type {
        DocumentType::LabReport => &[LAB_REPORT_CHECKLIST, LABS_SECTION_FIELDS],
        DocumentType::DischargeInstructions => {
            &[DISCHARGE_INSTRUCTIONS_CHECKLIST, DISCHARGE_SECTION_FIELDS]
        }
        DocumentType::DischargeSummary => &[
            DISCHARGE_SUMMARY_CHECKLIST,
            LABS_SECTION_FIELDS,
            DISCHARGE_SECTION_FIELDS,
        ],
    };
    blocks
        .iter()
        .map(|block| block.trim())
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn level_guidance(reading_level: ReadingLevel) -> &'static str {
    match reading_level {
        ReadingLevel::Simple => SIMPLE_LEVEL_GUIDANCE,
        ReadingLevel::Standard => STANDARD_LEVEL_GUIDANCE,
    }
}

/// Build the prompts for one document type and reading level.
pub fn build_prompts(document_type: DocumentType, reading_level: ReadingLevel) -> PromptPair {
    let format = OUTPUT_FORMAT_PROMPT
        .replace("__SCHEMA_VERSION__", SCHEMA_VERSION)
        .replace("__DOCUMENT_TYPE__", document_type.as_str());

    let system = [
        BASE_SYSTEM_PROMPT.trim(),
        format.trim(),
        checklist(document_type).as_str(),
        level_guidance(reading_level).trim(),
    ]
    .join("\n\n");

    let user_template = format!(
        "Explain this {} for the patient. Respond with the JSON object only.\n\n\
         --- DOCUMENT START ---\n{}\n--- DOCUMENT END ---",
        document_type.label(),
        DOCUMENT_PLACEHOLDER
    );

    PromptPair {
        system,
        user_template,
    }
}

/// Substitute the redacted document into a user template.
///
/// Only the first placeholder is replaced, so a document that itself
/// contains the placeholder text is inserted verbatim.
pub fn render_user_prompt(template: &str, redacted_text: &str) -> String {
    template.replacen(DOCUMENT_PLACEHOLDER, redacted_text, 1)
}

/// User prompt for the second attempt.
///
/// Quotes at most [`MAX_RETRY_ISSUES`] issues as `- <path>: <message>`, the
/// head of the rejected response, and the redacted document again.
pub fn build_retry_prompt(
    redacted_text: &str,
    previous_response: &str,
    issues: &[ValidationIssue],
) -> String {
    let mut prompt = String::from(
        "Your previous response could not be used. Fix these problems and respond again \
         with a single corrected JSON object only.\n\n## Problems\n",
    );

    if issues.is_empty() {
        prompt.push_str("- /: the response was not a valid JSON object\n");
    }
    for issue in issues.iter().take(MAX_RETRY_ISSUES) {
        prompt.push_str(&format!("- {}: {}\n", issue.path, issue.message));
    }
    if issues.len() > MAX_RETRY_ISSUES {
        prompt.push_str(&format!(
            "- ({} more problems not shown)\n",
            issues.len() - MAX_RETRY_ISSUES
        ));
    }

    let previous = truncate_chars(previous_response, MAX_PREVIOUS_RESPONSE_CHARS);
    prompt.push_str("\n## Previous Response\n");
    prompt.push_str(previous.trim());
    if previous.len() < previous_response.len() {
        prompt.push_str("\n[truncated]");
    }

    prompt.push_str("\n\n--- DOCUMENT START ---\n");
    prompt.push_str(redacted_text);
    prompt.push_str("\n--- DOCUMENT END ---");
    prompt
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
