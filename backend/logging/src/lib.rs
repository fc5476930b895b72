//! Structured logging for boxinstall.
//!
//! Console output, optional rolling NDJSON files, and scrubbing of secrets
//! that may appear in installer output.

pub mod logger;
pub mod redact;

pub use logger::{init_logger, LogOptions};
pub use redact::redact_sensitive_data;
