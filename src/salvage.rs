use std::sync::LazyLock;

use regex::Regex;

static FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json)?\s*(.*?)\s*```").expect("fence regex"));

/// Best-effort extraction of a structured value from a model reply.
///
/// Total function: when no parseable JSON can be found the original raw
/// text comes back under a `response` key, so the caller always receives
/// valid JSON. Downstream consumers handle both shapes.
pub fn salvage(raw: &str) -> serde_json::Value {
    let candidate = extract_candidate(raw);

    if let Ok(value) = serde_json::from_str(candidate) {
        return value;
    }

    // Models pollute near-JSON output with spurious escape sequences and
    // raw newlines; strip those and try once more.
    let cleaned = strip_artifacts(candidate);
    if let Ok(value) = serde_json::from_str(&cleaned) {
        return value;
    }

    serde_json::json!({ "response": raw })
}

/// Candidate search order: fenced code block, then the first balanced
/// `{...}`/`[...]` span, then the whole trimmed text.
fn extract_candidate(raw: &str) -> &str {
    if let Some(captures) = FENCE.captures(raw) {
        if let Some(interior) = captures.get(1) {
            return interior.as_str();
        }
    }
    if let Some(span) = balanced_span(raw) {
        return span;
    }
    raw.trim()
}

/// First balanced-looking JSON array or object span, string- and
/// escape-aware so braces inside quoted text do not confuse the depth
/// count. Returns None on unbalanced or absent brackets.
fn balanced_span(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let start = bytes.iter().position(|&b| b == b'{' || b == b'[')?;

    let mut stack: Vec<u8> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => stack.push(b'}'),
            b'[' => stack.push(b']'),
            b'}' | b']' => {
                if stack.pop() != Some(b) {
                    return None;
                }
                if stack.is_empty() {
                    return Some(&text[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Drops literal `\n`/`\r` escape pairs, bare backslashes, and raw
/// newline/carriage-return characters. Only runs after strict parsing
/// has already failed, so being aggressive costs nothing.
fn strip_artifacts(candidate: &str) -> String {
    let mut out = String::with_capacity(candidate.len());
    let mut chars = candidate.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.peek() {
                Some('n') | Some('r') => {
                    chars.next();
                }
                _ => {}
            },
            '\n' | '\r' => {}
            _ => out.push(c),
        }
    }
    out
}
