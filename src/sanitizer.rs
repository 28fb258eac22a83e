//! Recovery of a JSON question array from free-text model output.
//!
//! `sanitize` runs a fixed sequence of pure text transforms. Each step is exposed on its
//! own so it can be exercised in isolation. None of them fail: the output may still be
//! invalid JSON, which is reported later when the text is parsed.

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

static CODE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```(?:[A-Za-z][A-Za-z0-9_+-]*)?\s*").expect("valid fence regex"));

static OBJECT_ARRAY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\[\s*\{.*\}\s*\]").expect("valid array regex"));

static TRAILING_COMMA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",(\s*[\]}])").expect("valid trailing comma regex"));

/// Characters allowed after a backslash in a JSON string
const JSON_ESCAPES: &[char] = &['"', '\\', '/', 'b', 'f', 'n', 'r', 't'];

/// Full cleanup pipeline applied to a raw model response
pub fn sanitize(raw: &str) -> String {
    let text = strip_code_fences(raw);
    let text = text.trim();
    let text = extract_question_array(text);
    let text = normalize_escapes(text);
    let text = normalize_typography(&text);
    join_broken_string_lines(&text)
}

/// Second-chance cleanup used once when the sanitized text still fails to parse
pub fn repair(sanitized: &str) -> String {
    let text = normalize_typography(sanitized);
    TRAILING_COMMA.replace_all(&text, "$1").into_owned()
}

/// Remove opening and closing triple-backtick fences, with or without a language tag
pub fn strip_code_fences(text: &str) -> String {
    CODE_FENCE.replace_all(text, "").into_owned()
}

/// Cut away commentary around the first `[ { ... } ]` span. Text without such a span is
/// returned unchanged.
pub fn extract_question_array(text: &str) -> &str {
    OBJECT_ARRAY
        .find(text)
        .map(|span| span.as_str())
        .unwrap_or(text)
}

/// Turn `\"` into `"`, then drop every backslash that does not start a legal JSON escape.
pub fn normalize_escapes(text: &str) -> String {
    let unescaped_quotes = text.replace("\\\"", "\"");

    let mut out = String::with_capacity(unescaped_quotes.len());
    let mut chars = unescaped_quotes.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some(&next) if JSON_ESCAPES.contains(&next) => {
                out.push(c);
                out.push(next);
                chars.next();
            }
            _ => {}
        }
    }
    out
}

/// Replace typographic quotes and ellipses with their ASCII forms
pub fn normalize_typography(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{201F}' | '\u{00AB}' | '\u{00BB}' => {
                out.push('"')
            }
            '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}' => out.push('\''),
            '\u{2026}' => out.push_str("..."),
            other => out.push(other),
        }
    }
    out
}

/// Merge lines that continue a string value opened on an earlier line.
///
/// A line with an odd number of unescaped `"` flips the "inside a string" state. While
/// inside, the next line is trimmed and appended to the previous output line with one
/// space instead of starting a new line.
pub fn join_broken_string_lines(text: &str) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut in_string = false;

    for line in text.split('\n') {
        if in_string {
            match lines.last_mut() {
                Some(previous) => {
                    previous.push(' ');
                    previous.push_str(line.trim());
                }
                None => lines.push(line.to_string()),
            }
        } else {
            lines.push(line.to_string());
        }

        if unescaped_quote_count(line) % 2 == 1 {
            in_string = !in_string;
        }
    }

    lines.join("\n")
}

fn unescaped_quote_count(line: &str) -> usize {
    let mut count = 0;
    let mut previous = None;
    for c in line.chars() {
        if c == '"' && previous != Some('\\') {
            count += 1;
        }
        previous = Some(c);
    }
    count
}

/// Parse sanitized text into the list of candidate question records. A top-level object
/// carrying the list under `"questions"` is unwrapped.
pub fn parse_question_array(text: &str) -> Result<Vec<Value>, serde_json::Error> {
    match serde_json::from_str::<Value>(text)? {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => match map.remove("questions") {
            Some(Value::Array(items)) => Ok(items),
            _ => Err(serde::de::Error::custom(
                "expected a JSON array or an object with a \"questions\" array",
            )),
        },
        _ => Err(serde::de::Error::custom("expected a JSON array of questions")),
    }
}
