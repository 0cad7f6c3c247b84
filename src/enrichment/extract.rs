//! # Context Extraction
//!
//! Pulls the `context` string out of whatever the completion endpoint
//! actually returned. The expected shape is one JSON object with a
//! `context` field, but models wrap output in markdown fences, prepend
//! prose, or drop the JSON entirely. The ladder:
//!
//! 1. Strip markdown code fences, parse strictly, read `context`
//! 2. Bracket-scan for an embedded `{...}` object carrying `context`
//! 3. Heuristic "best line" of the raw text
//! 4. Nothing; the caller emits no message
//!
//! Whatever survives is a plain string; raw unparsed blobs never reach the
//! client.

/// Extract a context string from a raw completion response.
pub fn context_from_response(raw: &str) -> Option<String> {
    let text = strip_code_fences(raw);
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    // 1. Strict parse of the whole payload
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(text) {
        if let Some(context) = value.get("context").and_then(|c| c.as_str()) {
            return non_empty(context);
        }
        // Valid JSON without the expected field falls through to the
        // heuristics like any other malformed payload.
    }

    // 2. Embedded object
    if let Some(context) = scan_embedded_object(text) {
        return Some(context);
    }

    // 3. Best line of the raw text
    best_line(text)
}

/// Remove a wrapping markdown code fence (``` or ```json) if present.
fn strip_code_fences(raw: &str) -> String {
    let trimmed = raw.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }

    trimmed
        .lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Scan for balanced `{...}` spans and return the first one that parses to
/// an object with a string `context` field.
fn scan_embedded_object(text: &str) -> Option<String> {
    let bytes = text.as_bytes();

    for (start, &byte) in bytes.iter().enumerate() {
        if byte != b'{' {
            continue;
        }

        let mut depth = 0usize;
        let mut in_string = false;
        let mut escaped = false;

        for (offset, &b) in bytes[start..].iter().enumerate() {
            if escaped {
                escaped = false;
                continue;
            }
            match b {
                b'\\' if in_string => escaped = true,
                b'"' => in_string = !in_string,
                b'{' if !in_string => depth += 1,
                b'}' if !in_string => {
                    depth -= 1;
                    if depth == 0 {
                        let candidate = &text[start..start + offset + 1];
                        if let Ok(value) = serde_json::from_str::<serde_json::Value>(candidate) {
                            if let Some(context) = value.get("context").and_then(|c| c.as_str()) {
                                if let Some(found) = non_empty(context) {
                                    return Some(found);
                                }
                            }
                        }
                        break;
                    }
                }
                _ => {}
            }
        }
    }

    None
}

/// Last resort: the longest prose-looking line of the response.
fn best_line(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !line.starts_with(['{', '}', '[', ']', '"']))
        .filter(|line| line.chars().any(|c| c.is_alphabetic()))
        .max_by_key(|line| line.len())
        .map(|line| line.to_string())
}

fn non_empty(s: &str) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_json_wins() {
        let raw = r#"{"context": "Raft uses a leader-based log replication scheme."}"#;
        assert_eq!(
            context_from_response(raw).unwrap(),
            "Raft uses a leader-based log replication scheme."
        );
    }

    #[test]
    fn fenced_json_is_unwrapped() {
        let raw = "```json\n{\"context\": \"TLS 1.3 removed renegotiation.\"}\n```";
        assert_eq!(
            context_from_response(raw).unwrap(),
            "TLS 1.3 removed renegotiation."
        );
    }

    #[test]
    fn embedded_object_is_found() {
        let raw = "Sure! Here is the JSON you asked for:\n{\"context\": \"B-trees keep \
fanout high to minimize disk seeks.\"} Hope that helps.";
        assert_eq!(
            context_from_response(raw).unwrap(),
            "B-trees keep fanout high to minimize disk seeks."
        );
    }

    #[test]
    fn embedded_object_handles_nested_braces_in_strings() {
        let raw = r#"prefix {"context": "sample payload: {\"a\": 1}"} suffix"#;
        assert_eq!(
            context_from_response(raw).unwrap(),
            r#"sample payload: {"a": 1}"#
        );
    }

    #[test]
    fn falls_back_to_best_line() {
        let raw = "I could not produce JSON.\nThe speaker is describing consistent hashing \
and its use in distributed caches.\nok";
        assert_eq!(
            context_from_response(raw).unwrap(),
            "The speaker is describing consistent hashing and its use in distributed caches."
        );
    }

    #[test]
    fn json_without_context_field_uses_heuristics() {
        let raw = r#"{"summary": "wrong field entirely"}"#;
        // No context field and no prose line outside the JSON: nothing.
        assert_eq!(context_from_response(raw), None);
    }

    #[test]
    fn total_failure_yields_nothing() {
        assert_eq!(context_from_response(""), None);
        assert_eq!(context_from_response("   \n  "), None);
        assert_eq!(context_from_response("{}[]{}"), None);
    }

    #[test]
    fn empty_context_field_yields_nothing() {
        assert_eq!(context_from_response(r#"{"context": "  "}"#), None);
    }
}
