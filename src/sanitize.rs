// src/sanitize.rs
//
// Output sanitization for exported rows and user-facing error messages

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

fn bearer_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)\bbearer\s+[A-Za-z0-9\-_.~+/=]+").expect("bearer pattern is valid")
    })
}

fn jwt_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"eyJ[A-Za-z0-9_\-]+\.[A-Za-z0-9_\-]+\.[A-Za-z0-9_\-]*")
            .expect("jwt pattern is valid")
    })
}

fn secret_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)\b(client_secret|access_token|refresh_token)=[^&\s]+")
            .expect("secret pattern is valid")
    })
}

fn local_path_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(^|\s)(/[A-Za-z0-9_\-.]+){2,}").expect("path pattern is valid")
    })
}

/// Sanitizes every string inside an exported row
///
/// Directory data is attacker-influenced (display names, user agents, app
/// names), so control characters are stripped before anything reaches a
/// terminal or a downstream parser. Keys are left untouched.
pub fn sanitize_row(row: Value) -> Value {
    match row {
        Value::String(s) => Value::String(sanitize_string(&s)),
        Value::Array(items) => Value::Array(items.into_iter().map(sanitize_row).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| (key, sanitize_row(value)))
                .collect(),
        ),
        other => other,
    }
}

/// Removes control characters, leaving every other character as exported
pub fn sanitize_string(value: &str) -> String {
    value.chars().filter(|c| !c.is_control()).collect()
}

/// Sanitizes error messages before they are shown or logged to a file
///
/// Removes bearer tokens, raw JWTs, credential form fields and absolute
/// local paths.
pub fn sanitize_error(error: &str) -> String {
    let filtered: String = error.chars().filter(|c| !c.is_control()).collect();
    let redacted = bearer_pattern().replace_all(&filtered, "Bearer [REDACTED]");
    let redacted = jwt_pattern().replace_all(&redacted, "[REDACTED_TOKEN]");
    let redacted = secret_pattern().replace_all(&redacted, "$1=[REDACTED]");
    local_path_pattern()
        .replace_all(&redacted, "${1}[REDACTED_PATH]")
        .to_string()
}
