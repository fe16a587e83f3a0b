//! Property tests for the rate limiter, prompt builder and chat caps.

use medexplain_core::{DocumentType, ReadingLevel, ValidationIssue};
use medexplain_runtime::prompts::MAX_RETRY_ISSUES;
use medexplain_runtime::{build_prompts, build_retry_prompt, ChatCaps, ChatOptions, RateLimiter};
use proptest::prelude::*;
use std::time::{Duration, Instant};

fn arb_document_type() -> impl Strategy<Value = DocumentType> {
    prop::sample::select(DocumentType::ALL.to_vec())
}

fn arb_reading_level() -> impl Strategy<Value = ReadingLevel> {
    prop::sample::select(ReadingLevel::ALL.to_vec())
}

proptest! {
    #[test]
    fn limiter_admits_at_most_capacity_per_window(
        capacity in 1u32..20,
        mut offsets in prop::collection::vec(0u64..999, 0..60),
    ) {
        offsets.sort_unstable();
        let limiter = RateLimiter::new(capacity, Duration::from_secs(1));
        let start = Instant::now();

        let admitted = offsets
            .iter()
            .filter(|ms| limiter.check_at("k", start + Duration::from_millis(**ms)).is_ok())
            .count();

        prop_assert_eq!(admitted, offsets.len().min(capacity as usize));
        if !offsets.is_empty() {
            prop_assert_eq!(
                limiter.remaining_at("k", start + Duration::from_millis(999)),
                capacity - admitted as u32
            );
        }
    }

    #[test]
    fn clamped_options_respect_caps(
        temperature in prop_oneof![
            any::<f32>(),
            Just(f32::NAN),
            Just(f32::INFINITY),
            Just(f32::NEG_INFINITY),
        ],
        tokens in any::<u32>(),
        max_temperature in 0.0f32..2.0,
        max_output_tokens in 1u32..8192,
    ) {
        let caps = ChatCaps { max_temperature, max_output_tokens };
        let options = ChatOptions { temperature, max_output_tokens: tokens }.clamped(&caps);

        prop_assert!(options.temperature >= 0.0);
        prop_assert!(options.temperature <= max_temperature);
        prop_assert!(options.max_output_tokens <= max_output_tokens);
    }

    #[test]
    fn user_prompt_embeds_document(
        document_type in arb_document_type(),
        level in arb_reading_level(),
        text in "\\PC{1,200}",
    ) {
        let prompts = build_prompts(document_type, level);
        let user = prompts.user_prompt(&text);
        prop_assert!(user.contains(&text));
        prop_assert!(!prompts.system.contains("{{DOCUMENT_TEXT}}"));
    }

    #[test]
    fn retry_prompt_caps_listed_issues(
        count in 0usize..12,
        message in "[a-z ]{1,20}",
    ) {
        let issues: Vec<ValidationIssue> = (0..count)
            .map(|i| ValidationIssue::new(format!("/field{i}"), message.clone()))
            .collect();
        let prompt = build_retry_prompt("Glucose: 95 mg/dL", "{}", &issues);

        let problems = prompt
            .split("## Previous Response")
            .next()
            .unwrap_or_default();
        let listed = problems.lines().filter(|l| l.starts_with("- /field")).count();
        prop_assert_eq!(listed, count.min(MAX_RETRY_ISSUES));
        prop_assert_eq!(problems.contains("more problems not shown"), count > MAX_RETRY_ISSUES);
        prop_assert!(prompt.contains("Glucose: 95 mg/dL"));
    }
}
