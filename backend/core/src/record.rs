use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// One entry in the progress log. Opaque to everything except the browser.
pub type ProgressRecord = Value;

/// How installer output is turned into progress records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    /// Each output line is parsed as a JSON record; non-JSON lines become
    /// `{"message": line}`.
    #[default]
    Json,
    /// Decoded output is appended verbatim as string records.
    Raw,
}

/// Terminal states a run can report through the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Done,
    Error,
    Cancelled,
}

impl std::fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Done => "done",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

pub fn message_record(text: &str) -> ProgressRecord {
    json!({ "message": text })
}

/// Parse a single line of installer output.
///
/// Only JSON objects are accepted as structured records; scalars and arrays
/// are wrapped like any other plain line.
pub fn parse_line(line: &str) -> ProgressRecord {
    match serde_json::from_str::<Value>(line) {
        Ok(value @ Value::Object(_)) => value,
        _ => message_record(line),
    }
}

pub fn done_record() -> ProgressRecord {
    json!({ "status": RecordStatus::Done, "percent": 100, "message": "Completed" })
}

pub fn error_record(message: &str, exit_code: Option<i32>) -> ProgressRecord {
    match exit_code {
        Some(code) => json!({ "status": RecordStatus::Error, "exit_code": code, "message": message }),
        None => json!({ "status": RecordStatus::Error, "message": message }),
    }
}

pub fn cancelled_record() -> ProgressRecord {
    json!({ "status": RecordStatus::Cancelled, "message": "Installation cancelled" })
}

/// Returns the terminal status carried by `record`, if any.
pub fn terminal_status(record: &ProgressRecord) -> Option<RecordStatus> {
    record
        .get("status")
        .cloned()
        .and_then(|s| serde_json::from_value(s).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_json_object_lines() {
        let record = parse_line(r#"{"percent": 40, "step": "pacstrap"}"#);
        assert_eq!(record["percent"], 40);
        assert_eq!(record["step"], "pacstrap");
    }

    #[test]
    fn wraps_plain_lines() {
        let record = parse_line("Installing base packages");
        assert_eq!(record, json!({ "message": "Installing base packages" }));
    }

    #[test]
    fn wraps_json_scalars() {
        assert_eq!(parse_line("42"), json!({ "message": "42" }));
        assert_eq!(parse_line("[1,2]"), json!({ "message": "[1,2]" }));
    }

    #[test]
    fn terminal_records_are_detected() {
        assert_eq!(terminal_status(&done_record()), Some(RecordStatus::Done));
        assert_eq!(
            terminal_status(&error_record("boom", Some(2))),
            Some(RecordStatus::Error)
        );
        assert_eq!(terminal_status(&cancelled_record()), Some(RecordStatus::Cancelled));
        assert_eq!(terminal_status(&message_record("hi")), None);
        assert_eq!(terminal_status(&json!({ "status": "running" })), None);
    }

    #[test]
    fn error_record_carries_exit_code() {
        let record = error_record("installer exited", Some(1));
        assert_eq!(record["exit_code"], 1);
        assert!(error_record("x", None).get("exit_code").is_none());
    }
}
