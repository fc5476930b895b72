//! `boxinstall-config` — settings for the web installer and the installer
//! configuration it hands to `archinstall`.
//!
//! Provides:
//! - Server settings loaded from defaults, TOML and `BOXINSTALL_*` variables
//! - Typed installer config and credentials documents
//! - Default application and the automatic disk layout
//! - Atomic artifact writes with restricted permissions
//! - Redaction for safe logging of generated documents
//! - Request validation

pub mod defaults;
pub mod env;
pub mod io;
pub mod layout;
pub mod materialize;
pub mod redact;
pub mod schema;
pub mod settings;
pub mod validation;

pub use defaults::{build_credentials, build_installer_config, language_name, merge_packages};
pub use env::{apply_env_overrides, apply_env_overrides_with};
pub use io::{read_json, write_json_atomic};
pub use layout::{compute_default_layout, layout_request, DefaultLayout, LayoutRequest};
pub use materialize::{MaterializedRun, Materializer};
pub use redact::redact;
pub use schema::{Credentials, InstallerConfig};
pub use settings::{InstallerSettings, Settings};
pub use validation::{validate, RequestValidationError, ValidationReport};
