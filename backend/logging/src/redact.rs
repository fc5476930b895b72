//! Log Redaction Layer
//!
//! Scrubs passwords and tokens from free-form text before it is logged.

use regex::Regex;
use std::sync::LazyLock;

static CREDENTIAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)("?!?(?:root[-_])?(?:password|passwd|passphrase|psk)"?\s*[:=]\s*"?)([^"\s,}]+)"#).unwrap()
});
static API_KEY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(sk-[a-zA-Z0-9]{32,})|(Bearer\s+[a-zA-Z0-9\-\._~+/]+=*)").unwrap());

/// Redacts sensitive patterns in a string.
pub fn redact_sensitive_data(input: &str) -> String {
    let redacted = CREDENTIAL_RE.replace_all(input, "${1}[REDACTED]");
    API_KEY_RE.replace_all(&redacted, "[REDACTED_TOKEN]").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redaction() {
        let raw = "Sending with Bearer eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9";
        let clean = redact_sensitive_data(raw);
        assert!(!clean.contains("Bearer eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9"));
    }

    #[test]
    fn scrubs_json_and_key_value_passwords() {
        let clean = redact_sensitive_data(r#"{"!password": "hunter2", "username": "alice"}"#);
        assert!(!clean.contains("hunter2"));
        assert!(clean.contains("alice"));

        let clean = redact_sensitive_data("root_password=s3cret psk: wifi-key");
        assert!(!clean.contains("s3cret"));
        assert!(!clean.contains("wifi-key"));
    }

    #[test]
    fn leaves_plain_progress_alone() {
        let line = "Installing package base (3/120)";
        assert_eq!(redact_sensitive_data(line), line);
    }
}
