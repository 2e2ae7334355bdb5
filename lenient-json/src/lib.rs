//! Lenient decoding for JSON produced by language models.
//!
//! Model output frequently arrives wrapped in markdown fences, padded with
//! prose, or carrying raw control characters inside string literals. This
//! crate recovers a `serde_json::Value` from such payloads through a fixed
//! ladder of repairs, each attempted only if the previous rung failed:
//!
//! 1. strict parse of the trimmed input;
//! 2. strip wrapping markdown code fences and reparse;
//! 3. slice the outermost `[...]` (or `{...}`) region and reparse;
//! 4. escape bare ASCII control characters inside string literals and
//!    reparse;
//! 5. give up, reporting the original strict-parse error.

use std::fmt;

use serde_json::Value;

#[derive(Debug, PartialEq, Eq)]
pub struct LenientJsonError {
    message: String,
}

impl fmt::Display for LenientJsonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lenient JSON decoding failed: {}", self.message)
    }
}

impl std::error::Error for LenientJsonError {}

/// Runs the repair ladder and returns the first successful parse.
pub fn parse_lenient(raw: &str) -> Result<Value, LenientJsonError> {
    let trimmed = raw.trim();

    let strict_error = match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => return Ok(value),
        Err(err) => err,
    };

    let unfenced = strip_markdown_fences(trimmed);
    if let Ok(value) = serde_json::from_str::<Value>(unfenced) {
        return Ok(value);
    }

    if let Some(sliced) = slice_outermost(unfenced) {
        if let Ok(value) = serde_json::from_str::<Value>(sliced) {
            return Ok(value);
        }

        let escaped = escape_bare_control_chars(sliced);
        if let Ok(value) = serde_json::from_str::<Value>(&escaped) {
            return Ok(value);
        }
    }

    let escaped = escape_bare_control_chars(unfenced);
    match serde_json::from_str::<Value>(&escaped) {
        Ok(value) => Ok(value),
        Err(_) => Err(LenientJsonError {
            message: strict_error.to_string(),
        }),
    }
}

/// Removes a wrapping ```json ... ``` (or bare ```) fence if present. Inner
/// content is returned trimmed; input without fences passes through.
fn strip_markdown_fences(text: &str) -> &str {
    let mut inner = text;

    if let Some(rest) = inner.strip_prefix("```json") {
        inner = rest;
    } else if let Some(rest) = inner.strip_prefix("```") {
        inner = rest;
    }

    if let Some(rest) = inner.strip_suffix("```") {
        inner = rest;
    }

    inner.trim()
}

/// Locates the outermost bracketed region: from the first `[` to the last
/// `]` when both exist, otherwise from the first `{` to the last `}`. Arrays
/// win because the extraction contract is "return a JSON array".
fn slice_outermost(text: &str) -> Option<&str> {
    if let Some(sliced) = slice_between(text, '[', ']') {
        return Some(sliced);
    }
    slice_between(text, '{', '}')
}

fn slice_between(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    if end <= start {
        return None;
    }
    text.get(start..=end)
}

/// Escapes ASCII control characters that appear unescaped inside string
/// literals (`\n` inside a string becomes the two characters `\` `n`).
/// Control characters outside strings are structural whitespace and are left
/// alone.
fn escape_bare_control_chars(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;

    for c in text.chars() {
        if in_string {
            if escaped {
                escaped = false;
                out.push(c);
                continue;
            }
            match c {
                '\\' => {
                    escaped = true;
                    out.push(c);
                }
                '"' => {
                    in_string = false;
                    out.push(c);
                }
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\t' => out.push_str("\\t"),
                c if (c as u32) < 0x20 => {
                    out.push_str(&format!("\\u{:04x}", c as u32));
                }
                c => out.push(c),
            }
        } else {
            if c == '"' {
                in_string = true;
            }
            out.push(c);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strict_json_passes_through() {
        let value = parse_lenient(r#"[{"content": "What is 2+2?"}]"#).expect("parse");
        assert_eq!(value, json!([{"content": "What is 2+2?"}]));
    }

    #[test]
    fn fenced_payload_is_unwrapped() {
        let raw = "```json\n[{\"content\": \"Q1\"}]\n```";
        let value = parse_lenient(raw).expect("parse");
        assert_eq!(value, json!([{"content": "Q1"}]));
    }

    #[test]
    fn bare_fence_without_language_tag_is_unwrapped() {
        let raw = "```\n{\"score\": 0.85}\n```";
        let value = parse_lenient(raw).expect("parse");
        assert_eq!(value, json!({"score": 0.85}));
    }

    #[test]
    fn prose_around_an_array_is_sliced_away() {
        let raw = "Here are the questions you asked for:\n[{\"content\": \"Q1\"}]\nLet me know!";
        let value = parse_lenient(raw).expect("parse");
        assert_eq!(value, json!([{"content": "Q1"}]));
    }

    #[test]
    fn prose_around_an_object_is_sliced_away() {
        let raw = "Sure: {\"feedback\": \"ok\"} hope that helps";
        let value = parse_lenient(raw).expect("parse");
        assert_eq!(value, json!({"feedback": "ok"}));
    }

    #[test]
    fn bare_newline_inside_a_string_is_escaped() {
        let raw = "[{\"content\": \"line one\nline two\"}]";
        let value = parse_lenient(raw).expect("parse");
        assert_eq!(value, json!([{"content": "line one\nline two"}]));
    }

    #[test]
    fn fenced_and_control_char_payload_recovers() {
        let raw = "```json\nThe result:\n[{\"content\": \"a\tb\"}]\n```";
        let value = parse_lenient(raw).expect("parse");
        assert_eq!(value, json!([{"content": "a\tb"}]));
    }

    #[test]
    fn escaped_quotes_inside_strings_survive() {
        let raw = r#"[{"content": "He said \"four\"."}]"#;
        let value = parse_lenient(raw).expect("parse");
        assert_eq!(value, json!([{"content": "He said \"four\"."}]));
    }

    #[test]
    fn garbage_fails_with_the_strict_error() {
        let err = parse_lenient("not json at all").expect_err("must fail");
        assert!(err.to_string().contains("lenient JSON decoding failed"));
    }

    #[test]
    fn empty_input_fails() {
        assert!(parse_lenient("").is_err());
        assert!(parse_lenient("   \n").is_err());
    }
}
