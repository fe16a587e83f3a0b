//! Property tests for redaction, normalization and the safety filter.

use medexplain_core::{
    normalize, redact, validate, DocumentType, NormalizeContext, ReadingLevel, SafetyFilter,
};
use proptest::prelude::*;
use serde_json::{Map, Value};

fn arb_json() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| Value::from(n)),
        (-1.0e6f64..1.0e6).prop_map(|f| Value::from(f)),
        "\\PC{0,24}".prop_map(Value::String),
        prop_oneof![
            Just("undefined"),
            Just("high"),
            Just("Borderline"),
            Just("approved"),
            Just("85%"),
            Just("- one\n- two"),
        ]
        .prop_map(|s| Value::String(s.to_string())),
    ];

    leaf.prop_recursive(4, 48, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            prop::collection::vec((arb_key(), inner), 0..6)
                .prop_map(|entries| Value::Object(entries.into_iter().collect::<Map<_, _>>())),
        ]
    })
}

/// Keys drawn mostly from names the normalizer knows, so nested structure
/// actually reaches the coercion code.
fn arb_key() -> impl Strategy<Value = String> {
    prop_oneof![
        3 => prop_oneof![
            Just("meta"),
            Just("safety"),
            Just("disclaimers"),
            Just("patientSummary"),
            Just("summary"),
            Just("keyTakeaways"),
            Just("questions"),
            Just("labsSection"),
            Just("labs"),
            Just("name"),
            Just("value"),
            Just("flag"),
            Just("trend"),
            Just("confidence"),
            Just("fieldConfidence"),
            Just("dischargeSection"),
            Just("medications"),
            Just("warningSigns"),
            Just("appointments"),
            Just("imaging"),
            Just("measurements"),
            Just("immunizations"),
            Just("analysis"),
        ]
        .prop_map(str::to_string),
        1 => "[a-zA-Z_]{1,12}",
    ]
}

fn arb_object() -> impl Strategy<Value = Value> {
    prop::collection::vec((arb_key(), arb_json()), 0..8)
        .prop_map(|entries| Value::Object(entries.into_iter().collect::<Map<_, _>>()))
}

fn arb_document_type() -> impl Strategy<Value = DocumentType> {
    prop::sample::select(DocumentType::ALL.to_vec())
}

fn arb_pii_text() -> impl Strategy<Value = String> {
    let fragment = prop_oneof![
        Just("jane.doe@example.com".to_string()),
        Just("MRN: 4471-22".to_string()),
        Just("Patient ID 99812".to_string()),
        Just("123-45-6789".to_string()),
        Just("(555) 010-7788".to_string()),
        Just("+1 555.010.7788".to_string()),
        Just("2024-03-15".to_string()),
        Just("3/15/24".to_string()),
        Just("42 Cedar Hill Rd".to_string()),
        Just("Glucose 95 mg/dL".to_string()),
        "[a-zA-Z0-9 ,.:/()-]{0,20}",
    ];
    prop::collection::vec(fragment, 0..8).prop_map(|parts| parts.join(" "))
}

proptest! {
    #[test]
    fn redaction_is_idempotent(text in arb_pii_text()) {
        let once = redact(&text);
        prop_assert_eq!(redact(&once), once);
    }

    #[test]
    fn redaction_is_idempotent_on_arbitrary_text(text in "\\PC{0,64}") {
        let once = redact(&text);
        prop_assert_eq!(redact(&once), once);
    }

    #[test]
    fn normalized_output_always_validates(raw in arb_object(), dt in arb_document_type()) {
        let ctx = NormalizeContext::new(dt, ReadingLevel::Standard);
        let candidate = normalize(&raw, &ctx).unwrap();
        let result = validate(&candidate);
        prop_assert!(result.is_ok(), "rejected: {:?}", result.err());
        prop_assert_eq!(result.unwrap().document_type(), dt);
    }

    #[test]
    fn normalization_only_fails_on_non_objects(raw in arb_json()) {
        let ctx = NormalizeContext::new(DocumentType::LabReport, ReadingLevel::Simple);
        prop_assert_eq!(normalize(&raw, &ctx).is_ok(), raw.is_object());
    }

    #[test]
    fn variant_sections_are_exclusive(raw in arb_object()) {
        let labs = normalize(&raw, &NormalizeContext::new(DocumentType::LabReport, ReadingLevel::Simple)).unwrap();
        prop_assert!(labs.get("labsSection").is_some());
        prop_assert!(labs.get("dischargeSection").is_none());

        let instructions = normalize(
            &raw,
            &NormalizeContext::new(DocumentType::DischargeInstructions, ReadingLevel::Simple),
        ).unwrap();
        prop_assert!(instructions.get("dischargeSection").is_some());
        prop_assert!(instructions.get("labsSection").is_none());
    }

    #[test]
    fn list_lengths_are_bounded(raw in arb_object(), dt in arb_document_type()) {
        let out = normalize(&raw, &NormalizeContext::new(dt, ReadingLevel::Simple)).unwrap();
        let questions = out["questionsForDoctor"].as_array().map(Vec::len).unwrap_or(0);
        let takeaways = out["patientSummary"]["keyTakeaways"].as_array().map(Vec::len).unwrap_or(0);
        prop_assert!((5..=10).contains(&questions));
        prop_assert!((3..=7).contains(&takeaways));
    }

    #[test]
    fn safety_filter_preserves_shape(raw in arb_json()) {
        let filtered = SafetyFilter::new().filter_value(raw.clone());
        prop_assert!(same_shape(&raw, &filtered));
    }
}

fn same_shape(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::String(_), Value::String(_)) => true,
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(p, q)| same_shape(p, q))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .zip(y)
                    .all(|((ka, va), (kb, vb))| ka == kb && same_shape(va, vb))
        }
        _ => a == b,
    }
}
