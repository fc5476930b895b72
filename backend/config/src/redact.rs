//! Redaction: produce safe-to-log snapshots of generated documents by masking
//! passwords and similar secrets.

use serde_json::Value;

/// Keys whose string values are always masked.
static SENSITIVE_KEYS: &[&str] = &[
    "password",
    "!password",
    "!root-password",
    "root_password",
    "!encryption-password",
    "encryption_password",
    "passphrase",
    "psk",
    "secret",
    "token",
];

/// Redact a JSON value, replacing every sensitive string with `"***"`.
pub fn redact(value: &Value) -> Value {
    redact_recursive(value, "")
}

fn is_sensitive_key(key: &str) -> bool {
    SENSITIVE_KEYS.iter().any(|k| k.eq_ignore_ascii_case(key))
}

fn redact_recursive(value: &Value, key: &str) -> Value {
    match value {
        Value::String(s) if is_sensitive_key(key) && !s.is_empty() => {
            Value::String("***".to_string())
        }
        Value::Array(arr) => Value::Array(arr.iter().map(|v| redact_recursive(v, key)).collect()),
        Value::Object(map) => {
            let mut result = serde_json::Map::new();
            for (k, v) in map {
                result.insert(k.clone(), redact_recursive(v, k));
            }
            Value::Object(result)
        }
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn redacts_credentials_document() {
        let v = json!({
            "!root-password": "toor",
            "!users": [{ "username": "alice", "!password": "secret", "sudo": true }]
        });
        let redacted = redact(&v);
        assert_eq!(redacted["!root-password"], "***");
        assert_eq!(redacted["!users"][0]["!password"], "***");
        assert_eq!(redacted["!users"][0]["username"], "alice");
        assert!(!redacted.to_string().contains("secret"));
    }

    #[test]
    fn passthrough_non_sensitive() {
        let v = json!({ "timezone": "UTC", "packages": ["vim"] });
        assert_eq!(redact(&v), v);
    }

    #[test]
    fn empty_password_is_left_alone() {
        let v = json!({ "password": "" });
        assert_eq!(redact(&v)["password"], "");
    }
}
