//! Strict validation of a normalized candidate into an [`AnalysisResult`].

use serde::{Deserialize, Serialize};
use std::fmt;

use super::model::AnalysisResult;
use super::schema::check_schema;

/// One reason a candidate was rejected.
///
/// `path` is a JSON pointer into the candidate. The message may quote
/// model output, so it is fed back to the model on retry but never logged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub path: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            path: if path.is_empty() { "/".to_string() } else { path },
            message: message.into(),
        }
    }

    pub fn root(message: impl Into<String>) -> Self {
        Self::new("/", message)
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Validate a candidate against the contract and build the typed result.
///
/// The schema check runs first so issues carry precise paths; typed
/// deserialization afterwards catches anything the schema cannot express.
pub fn validate(candidate: &serde_json::Value) -> Result<AnalysisResult, Vec<ValidationIssue>> {
    check_schema(candidate)?;

    serde_json::from_value::<AnalysisResult>(candidate.clone())
        .map_err(|e| vec![ValidationIssue::root(e.to_string())])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::mock_analysis;
    use crate::types::{DocumentType, ReadingLevel};
    use serde_json::json;

    #[test]
    fn test_fixture_validates_to_same_variant() {
        for dt in DocumentType::ALL {
            let value = mock_analysis(*dt, ReadingLevel::Simple).to_value().unwrap();
            let result = validate(&value).unwrap();
            assert_eq!(result.document_type(), *dt);
        }
    }

    #[test]
    fn test_issues_are_ordered_with_paths() {
        let mut value = mock_analysis(DocumentType::LabReport, ReadingLevel::Simple)
            .to_value()
            .unwrap();
        value["labsSection"]["labs"][0]["flag"] = json!("very high");
        value["questionsForDoctor"] = json!([]);

        let issues = validate(&value).unwrap_err();
        assert!(issues.len() >= 2);
        assert!(issues.iter().any(|i| i.path == "/labsSection/labs/0/flag"));
        assert!(issues.iter().any(|i| i.path == "/questionsForDoctor"));
    }

    #[test]
    fn test_empty_object_rejected_at_root() {
        let issues = validate(&json!({})).unwrap_err();
        assert!(issues.iter().any(|i| i.path == "/"));
    }

    #[test]
    fn test_issue_display() {
        let issue = ValidationIssue::new("", "missing field");
        assert_eq!(issue.to_string(), "/: missing field");
    }
}
