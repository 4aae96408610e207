//! Tolerant JSON argument parsing: models rarely emit
//! strict JSON for tool arguments. This repair pass is applied only after a
//! strict parse fails, in order, stopping at the first stage that parses.

use agentrt_domain::error::{Error, Result};
use serde_json::Value;

pub fn parse_tool_arguments(raw: &str) -> Result<Value> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(serde_json::json!({}));
    }

    if let Ok(v) = serde_json::from_str(trimmed) {
        return Ok(v);
    }

    let mut candidate = trimmed.to_string();
    candidate = escape_raw_newlines_in_strings(&candidate);
    if let Ok(v) = serde_json::from_str(&candidate) {
        return Ok(v);
    }

    candidate = strip_trailing_commas(&candidate);
    if let Ok(v) = serde_json::from_str(&candidate) {
        return Ok(v);
    }

    if candidate.matches('\'').count() > candidate.matches('"').count() {
        let converted = single_to_double_quotes(&candidate);
        if let Ok(v) = serde_json::from_str(&converted) {
            return Ok(v);
        }
        candidate = converted;
    }

    candidate = close_unbalanced_brackets(&candidate);
    if let Ok(v) = serde_json::from_str(&candidate) {
        return Ok(v);
    }
    candidate = strip_trailing_commas(&candidate);
    if let Ok(v) = serde_json::from_str(&candidate) {
        return Ok(v);
    }

    Err(Error::InvalidInput(format!(
        "could not parse tool arguments as JSON after repair attempts: {raw}"
    )))
}

/// Replace a literal newline appearing inside a (double-quoted) string with
/// an escaped `\n`, leaving structural whitespace between tokens untouched.
fn escape_raw_newlines_in_strings(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_string = false;
    let mut escaped = false;
    for ch in s.chars() {
        match ch {
            '"' if !escaped => {
                in_string = !in_string;
                out.push(ch);
            }
            '\\' if !escaped => {
                escaped = true;
                out.push(ch);
                continue;
            }
            '\n' if in_string => out.push_str("\\n"),
            '\r' if in_string => out.push_str("\\r"),
            _ => out.push(ch),
        }
        escaped = false;
    }
    out
}

fn strip_trailing_commas(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let chars: Vec<char> = s.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == ',' {
            let mut j = i + 1;
            while j < chars.len() && chars[j].is_whitespace() {
                j += 1;
            }
            if j < chars.len() && (chars[j] == '}' || chars[j] == ']') {
                i += 1;
                continue;
            }
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}

/// Best-effort: only attempted when the text has more single quotes than
/// double quotes, i.e. it looks like it was authored with single-quoted
/// strings/keys rather than mixing apostrophes into otherwise-valid JSON.
fn single_to_double_quotes(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_single = false;
    let mut in_double = false;
    let mut escaped = false;
    for ch in s.chars() {
        match ch {
            '\'' if !escaped && !in_double => {
                in_single = !in_single;
                out.push('"');
            }
            '"' if !escaped && !in_single => {
                in_double = !in_double;
                out.push('"');
            }
            '\\' if !escaped => {
                escaped = true;
                out.push(ch);
                continue;
            }
            _ => out.push(ch),
        }
        escaped = false;
    }
    out
}

/// Appends whatever closing braces/brackets are missing, in the correct
/// order, for arguments truncated mid-stream.
fn close_unbalanced_brackets(s: &str) -> String {
    let mut stack = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    for ch in s.chars() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                stack.pop();
            }
            _ => {}
        }
    }
    let mut out = s.to_string();
    while let Some(closer) = stack.pop() {
        out.push(closer);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_strict_json_unchanged() {
        let v = parse_tool_arguments(r#"{"path": "a.txt"}"#).unwrap();
        assert_eq!(v["path"], "a.txt");
    }

    #[test]
    fn empty_arguments_become_empty_object() {
        let v = parse_tool_arguments("").unwrap();
        assert_eq!(v, serde_json::json!({}));
    }

    #[test]
    fn strips_trailing_comma_before_closing_brace() {
        let v = parse_tool_arguments(r#"{"a": 1, "b": 2,}"#).unwrap();
        assert_eq!(v["b"], 2);
    }

    #[test]
    fn strips_trailing_comma_before_closing_bracket() {
        let v = parse_tool_arguments(r#"{"items": [1, 2, 3,]}"#).unwrap();
        assert_eq!(v["items"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn converts_single_quoted_keys_and_values() {
        let v = parse_tool_arguments(r#"{'path': 'a.txt', 'recursive': true}"#).unwrap();
        assert_eq!(v["path"], "a.txt");
        assert_eq!(v["recursive"], true);
    }

    #[test]
    fn closes_missing_terminating_brace() {
        let v = parse_tool_arguments(r#"{"path": "a.txt""#).unwrap();
        assert_eq!(v["path"], "a.txt");
    }

    #[test]
    fn escapes_raw_newline_inside_string() {
        let raw = "{\"content\": \"line one\nline two\"}";
        let v = parse_tool_arguments(raw).unwrap();
        assert_eq!(v["content"], "line one\nline two");
    }

    #[test]
    fn unrecoverable_garbage_is_an_error() {
        assert!(parse_tool_arguments("not json at all {{{").is_err());
    }
}
