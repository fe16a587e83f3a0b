//! Closed enumerations shared by the contract, the normalizer and the runtime.
//!
//! Every enum serializes in `snake_case` and parses leniently from CLI or
//! config input via [`FromStr`] (case-insensitive, `-`, `_` and spaces are
//! treated alike).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error returned when a string does not name a known enum value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown {kind} '{value}', expected one of: {expected}")]
pub struct ParseEnumError {
    kind: &'static str,
    value: String,
    expected: String,
}

fn canonical(input: &str) -> String {
    input
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == '-' || c == ' ' { '_' } else { c })
        .collect()
}

macro_rules! closed_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $kind:literal {
            $( $(#[$vmeta:meta])* $variant:ident => $text:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl $name {
            /// All values, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// The serialized name.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $( $name::$variant => $text ),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let wanted = canonical(s);
                $name::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str() == wanted)
                    .ok_or_else(|| ParseEnumError {
                        kind: $kind,
                        value: s.to_string(),
                        expected: $name::ALL
                            .iter()
                            .map(|v| v.as_str())
                            .collect::<Vec<_>>()
                            .join(", "),
                    })
            }
        }
    };
}

closed_enum! {
    /// Which kind of document was uploaded. Drives the legal result variant.
    DocumentType, "document type" {
        LabReport => "lab_report",
        DischargeInstructions => "discharge_instructions",
        DischargeSummary => "discharge_summary",
    }
}

closed_enum! {
    /// Vocabulary level for explanations. Never changes the schema.
    ReadingLevel, "reading level" {
        Simple => "simple",
        Standard => "standard",
    }
}

closed_enum! {
    /// Flag attached to a single lab value.
    LabFlag, "lab flag" {
        Low => "low",
        High => "high",
        Normal => "normal",
        Borderline => "borderline",
        Unknown => "unknown",
    }
}

closed_enum! {
    /// How much a lab value matters for the patient conversation.
    Importance, "importance" {
        Low => "low",
        Medium => "medium",
        High => "high",
        Unknown => "unknown",
    }
}

closed_enum! {
    /// Whether discharge content reflects a draft or an approved document.
    DischargeStatus, "discharge status" {
        Draft => "draft",
        Approved => "approved",
    }
}

closed_enum! {
    /// Urgency of a structured follow-up appointment.
    AppointmentUrgency, "appointment urgency" {
        Routine => "routine",
        Soon => "soon",
        Urgent => "urgent",
    }
}

closed_enum! {
    /// Where the document text came from.
    ProvenanceSource, "provenance source" {
        Pdf => "pdf",
        Text => "text",
    }
}

impl DocumentType {
    /// Human-readable label used in prompts.
    pub fn label(&self) -> &'static str {
        match self {
            DocumentType::LabReport => "lab report",
            DocumentType::DischargeInstructions => "discharge instructions",
            DocumentType::DischargeSummary => "discharge summary",
        }
    }
}

impl Default for ReadingLevel {
    fn default() -> Self {
        Self::Standard
    }
}

impl Default for ProvenanceSource {
    fn default() -> Self {
        Self::Text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_type_round_trips_through_str() {
        for dt in DocumentType::ALL {
            assert_eq!(dt.as_str().parse::<DocumentType>().unwrap(), *dt);
        }
    }

    #[test]
    fn test_lenient_parsing() {
        assert_eq!(
            "Lab-Report".parse::<DocumentType>().unwrap(),
            DocumentType::LabReport
        );
        assert_eq!(
            "discharge summary".parse::<DocumentType>().unwrap(),
            DocumentType::DischargeSummary
        );
        assert_eq!(" SIMPLE ".parse::<ReadingLevel>().unwrap(), ReadingLevel::Simple);
    }

    #[test]
    fn test_unknown_value_lists_expected() {
        let err = "radiology".parse::<DocumentType>().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("radiology"));
        assert!(msg.contains("lab_report"));
    }

    #[test]
    fn test_serde_uses_snake_case() {
        let json = serde_json::to_string(&DocumentType::DischargeInstructions).unwrap();
        assert_eq!(json, "\"discharge_instructions\"");
        let flag: LabFlag = serde_json::from_str("\"borderline\"").unwrap();
        assert_eq!(flag, LabFlag::Borderline);
    }
}
