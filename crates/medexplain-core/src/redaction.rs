//! PII redaction for document text.
//!
//! Runs before any prompt is built, so nothing that matches these rules
//! ever reaches a model. Rules are applied in a fixed order over the whole
//! string and each replaces its match with a bracketed token:
//!
//! | order | rule | token |
//! |---|---|---|
//! | 1 | email address | `[EMAIL]` |
//! | 2 | labeled MRN / Patient ID / Medical Record Number | `[MRN]` |
//! | 3 | US SSN `ddd-dd-dddd` | `[SSN]` |
//! | 4 | US phone number | `[PHONE]` |
//! | 5 | ISO or US date | `[DATE]` |
//! | 6 | street address (number, capitalized words, suffix) | `[ADDRESS]` |
//!
//! Tokens contain no digits and no `@`, so [`redact`] is idempotent.
//!
//! These are heuristics. Non-US phone formats and free-text addresses are
//! missed, and clinical dates are redacted along with personal ones.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

pub const EMAIL_TOKEN: &str = "[EMAIL]";
pub const MRN_TOKEN: &str = "[MRN]";
pub const SSN_TOKEN: &str = "[SSN]";
pub const PHONE_TOKEN: &str = "[PHONE]";
pub const DATE_TOKEN: &str = "[DATE]";
pub const ADDRESS_TOKEN: &str = "[ADDRESS]";

lazy_static! {
    static ref EMAIL_PATTERN: Regex = Regex::new(
        r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}"
    ).unwrap();

    /// The label is kept; only the identifier is replaced. The identifier
    /// must contain a digit so a bare label is left alone.
    static ref MRN_PATTERN: Regex = Regex::new(
        r"(?i)(?P<label>\b(?:MRN|Medical\s+Record\s+(?:Number|No\.?|#)|Patient\s+ID))(?P<sep>\s*[:#]?\s*)[A-Za-z0-9-]*\d[A-Za-z0-9-]*"
    ).unwrap();

    static ref SSN_PATTERN: Regex = Regex::new(
        r"\b\d{3}-\d{2}-\d{4}\b"
    ).unwrap();

    /// Every match starts at a word boundary or `+`/`(`, so a replacement
    /// never exposes a new boundary to an earlier rule.
    static ref PHONE_PATTERN: Regex = Regex::new(
        r"(?:(?:\+1|\b1)[-.\s]?)?(?:\(\d{3}\)|\b\d{3})[-.\s]?\d{3}[-.\s]?\d{4}\b"
    ).unwrap();

    static ref ISO_DATE_PATTERN: Regex = Regex::new(
        r"\b\d{4}-\d{2}-\d{2}\b"
    ).unwrap();

    static ref US_DATE_PATTERN: Regex = Regex::new(
        r"\b\d{1,2}/\d{1,2}/(?:\d{4}|\d{2})\b"
    ).unwrap();

    // Case-sensitive on purpose: street names are capitalized.
    static ref ADDRESS_PATTERN: Regex = Regex::new(
        r"\b\d{1,5}\s+(?:[A-Z][a-z]+\s+){1,4}(?:Street|St|Avenue|Ave|Road|Rd|Boulevard|Blvd|Lane|Ln|Drive|Dr|Court|Ct|Way|Place|Pl)\b\.?"
    ).unwrap();
}

/// Per-rule match counts. Never carries matched text, so it is safe to log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RedactionReport {
    pub emails: usize,
    pub mrns: usize,
    pub ssns: usize,
    pub phones: usize,
    pub dates: usize,
    pub addresses: usize,
}

impl RedactionReport {
    pub fn total(&self) -> usize {
        self.emails + self.mrns + self.ssns + self.phones + self.dates + self.addresses
    }

    pub fn any(&self) -> bool {
        self.total() > 0
    }
}

/// Replace PII in `text` with bracketed tokens.
pub fn redact(text: &str) -> String {
    redact_with_report(text).0
}

/// Like [`redact`], also returning how many matches each rule replaced.
pub fn redact_with_report(text: &str) -> (String, RedactionReport) {
    let mut report = RedactionReport::default();
    if text.is_empty() {
        return (String::new(), report);
    }

    let (out, n) = replace_counted(&EMAIL_PATTERN, text, EMAIL_TOKEN);
    report.emails = n;

    report.mrns = MRN_PATTERN.find_iter(&out).count();
    let out = MRN_PATTERN
        .replace_all(&out, format!("${{label}}${{sep}}{}", MRN_TOKEN).as_str())
        .into_owned();

    let (out, n) = replace_counted(&SSN_PATTERN, &out, SSN_TOKEN);
    report.ssns = n;

    let (out, n) = replace_counted(&PHONE_PATTERN, &out, PHONE_TOKEN);
    report.phones = n;

    let (out, iso) = replace_counted(&ISO_DATE_PATTERN, &out, DATE_TOKEN);
    let (out, us) = replace_counted(&US_DATE_PATTERN, &out, DATE_TOKEN);
    report.dates = iso + us;

    let (out, n) = replace_counted(&ADDRESS_PATTERN, &out, ADDRESS_TOKEN);
    report.addresses = n;

    (out, report)
}

fn replace_counted(pattern: &Regex, text: &str, token: &str) -> (String, usize) {
    let count = pattern.find_iter(text).count();
    if count == 0 {
        return (text.to_string(), 0);
    }
    (pattern.replace_all(text, regex::NoExpand(token)).into_owned(), count)
}

/// Extra characters redacted past the length cap, enough to hold any match
/// that straddles the cut.
const REDACTION_LOOKAHEAD: usize = 256;

/// Strip invisible formatting characters and cap the input length.
///
/// Zero-width and bidi control characters are removed along with other
/// control characters; newlines, tabs and carriage returns are kept.
/// A cut that would land inside a word backs off to the preceding
/// whitespace so no fragment of a longer value is left behind.
pub fn prepare_input(raw: &str, max_chars: usize) -> String {
    let cleaned: String = raw
        .chars()
        .filter(|c| {
            if matches!(*c, ' ' | '\n' | '\t' | '\r') {
                return true;
            }
            if matches!(
                *c,
                '\u{200B}'..='\u{200F}' | '\u{202A}'..='\u{202E}' | '\u{2060}'..='\u{2064}' | '\u{FEFF}'
            ) {
                return false;
            }
            !c.is_control()
        })
        .take(max_chars.saturating_add(1))
        .collect();
    truncate_at_word(cleaned, max_chars)
}

/// Clean, redact, then cap: the length cap is applied to redacted text so a
/// value cut at the boundary is still recognised and replaced.
pub fn redact_input(raw: &str, max_chars: usize) -> (String, RedactionReport) {
    let window = prepare_input(raw, max_chars.saturating_add(REDACTION_LOOKAHEAD));
    let (redacted, report) = redact_with_report(&window);
    (truncate_at_word(redacted, max_chars), report)
}

fn truncate_at_word(mut text: String, max_chars: usize) -> String {
    let Some((cut, next)) = text.char_indices().nth(max_chars) else {
        return text;
    };
    let end = if next.is_whitespace() {
        cut
    } else {
        text[..cut].rfind(char::is_whitespace).unwrap_or(cut)
    };
    text.truncate(end);
    let trimmed = text.trim_end().len();
    text.truncate(trimmed);
    text
}
