//! The analysis contract: typed model, embedded JSON Schema and validator.
//!
//! Every analysis returned to a caller is an [`AnalysisResult`] that passed
//! [`validate`]. The JSON form is versioned by [`SCHEMA_VERSION`].

mod model;
mod schema;
mod validator;

pub use model::{
    AnalysisResult, Appointment, CommonFields, DischargeInstructionsAnalysis, DischargeSection,
    DischargeSummaryAnalysis, DiscontinuedMedication, ImagingItem, Immunization, LabItem,
    LabReportAnalysis, LabsSection, Medication, Meta, ModelInfo, PatientSummary, Provenance,
    SafetyNotice, TrendPoint, WarningSign, SCHEMA_VERSION,
};
pub use schema::{check_schema, is_valid_analysis, schema_source, SchemaError};
pub use validator::{validate, ValidationIssue};
