//! Tolerant parsing of model output into a JSON object.
//!
//! Models wrap JSON in code fences, add prose around it, emit `undefined`,
//! leave trailing commas, and stop mid-object when they hit a token limit.
//! [`parse_model_json`] handles each of these before giving up.

use serde_json::Value;
use thiserror::Error;

/// Upper bound on truncation repair attempts.
const MAX_REPAIR_ATTEMPTS: usize = 64;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MalformedJson {
    #[error("response contained no JSON object")]
    NoObject,

    #[error("response JSON could not be parsed or repaired")]
    Unrepairable,
}

/// Locate the JSON object in a model response.
///
/// Code fences are ignored. The span starts at the first `{` and ends where
/// that object closes, counting brackets outside strings only. When it never
/// closes the whole remaining text is kept (minus a trailing fence) so
/// truncation repair decides what to drop.
pub fn extract_json_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let tail = &text[start..];
    let span = match balanced_end(tail) {
        Some(end) => &tail[..end],
        None => tail.trim_end().trim_end_matches('`').trim_end(),
    };
    Some(span)
}

/// Byte offset just past the bracket that closes the opening `{`.
fn balanced_end(src: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (idx, c) in src.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(idx + c.len_utf8());
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse a model response into a JSON object, repairing what can be
/// repaired.
pub fn parse_model_json(text: &str) -> Result<Value, MalformedJson> {
    let span = extract_json_span(text).ok_or(MalformedJson::NoObject)?;
    let cleaned = clean_tokens(span);

    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(&cleaned) {
        return Ok(value);
    }

    let scan = scan_structure(&cleaned);
    if scan.final_depth == 0 {
        return Err(MalformedJson::Unrepairable);
    }

    tracing::debug!(
        open_brackets = scan.final_depth,
        candidates = scan.cuts.len(),
        "attempting truncated JSON repair"
    );

    for cut in scan.cuts.iter().rev() {
        let mut candidate = String::with_capacity(cut.at + cut.closers.len());
        candidate.push_str(&cleaned[..cut.at]);
        candidate.push_str(&cut.closers);
        if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(&candidate) {
            return Ok(value);
        }
    }

    Err(MalformedJson::Unrepairable)
}

/// Replace bare `undefined` with `null` and drop trailing commas, leaving
/// string contents untouched.
fn clean_tokens(src: &str) -> String {
    let chars: Vec<char> = src.chars().collect();
    let mut out = String::with_capacity(src.len());
    let mut in_string = false;
    let mut escaped = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            i += 1;
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            ',' => {
                let next = chars[i + 1..].iter().find(|c| !c.is_whitespace());
                if !matches!(next, Some('}') | Some(']')) {
                    out.push(c);
                }
            }
            'u' if is_bare_word(&chars, i, "undefined") => {
                out.push_str("null");
                i += "undefined".len();
                continue;
            }
            _ => out.push(c),
        }
        i += 1;
    }

    out
}

fn is_bare_word(chars: &[char], at: usize, word: &str) -> bool {
    let len = word.chars().count();
    if at + len > chars.len() {
        return false;
    }
    let matches = chars[at..at + len].iter().copied().eq(word.chars());
    let before_ok = at == 0 || !is_ident_char(chars[at - 1]);
    let after_ok = at + len == chars.len() || !is_ident_char(chars[at + len]);
    matches && before_ok && after_ok
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// A place the text can be cut and closed.
struct Cut {
    /// Byte offset to cut at (exclusive).
    at: usize,
    /// Closing brackets to append, innermost first.
    closers: String,
}

struct Scan {
    final_depth: usize,
    cuts: Vec<Cut>,
}

/// Walk the text outside strings, recording candidate cut points: just
/// before each `,` (the previous value is complete), just after each `{` or
/// `[`, and the end of the text when it does not end inside a string.
fn scan_structure(src: &str) -> Scan {
    let mut stack: Vec<char> = Vec::new();
    let mut cuts: Vec<Cut> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    let closers = |stack: &[char]| -> String {
        stack
            .iter()
            .rev()
            .map(|open| if *open == '{' { '}' } else { ']' })
            .collect()
    };
    let push_cut = |cuts: &mut Vec<Cut>, at: usize, stack: &[char]| {
        if stack.is_empty() {
            return;
        }
        if cuts.len() == MAX_REPAIR_ATTEMPTS {
            cuts.remove(0);
        }
        cuts.push(Cut {
            at,
            closers: closers(stack),
        });
    };

    for (idx, c) in src.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '{' | '[' => {
                stack.push(c);
                push_cut(&mut cuts, idx + 1, &stack);
            }
            '}' | ']' => {
                stack.pop();
            }
            ',' => push_cut(&mut cuts, idx, &stack),
            _ => {}
        }
    }

    if !in_string {
        let end = src.trim_end().len();
        push_cut(&mut cuts, end, &stack);
    }

    Scan {
        final_depth: stack.len(),
        cuts,
    }
}
