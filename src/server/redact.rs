//! Masking of sensitive values before they reach the logs

use serde_json::Value;

/// Key fragments that mark a value as sensitive, matched case-insensitively
pub const SENSITIVE_KEY_MARKERS: &[&str] =
    &["password", "token", "secret", "key", "auth", "authorization"];

pub fn is_sensitive_key(key: &str) -> bool {
    let key = key.to_lowercase();
    SENSITIVE_KEY_MARKERS
        .iter()
        .any(|marker| key.contains(marker))
}

/// Copy of `value` with every sensitive key's value replaced by `placeholder`,
/// at any depth.
pub fn redact(value: &Value, placeholder: &str) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, value)| {
                    let value = if is_sensitive_key(key) {
                        Value::String(placeholder.to_string())
                    } else {
                        redact(value, placeholder)
                    };
                    (key.clone(), value)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| redact(item, placeholder))
                .collect(),
        ),
        other => other.clone(),
    }
}
