//! Environment variable overrides for [`Settings`].
//!
//! Recognised variables:
//! `BOXINSTALL_BIND`, `BOXINSTALL_PORT`, `BOXINSTALL_WEB_ROOT`,
//! `BOXINSTALL_LOCALE_DIR`, `BOXINSTALL_CONFIG_PATH`,
//! `BOXINSTALL_CREDENTIALS_PATH`, `BOXINSTALL_PROGRESS_LOG`,
//! `BOXINSTALL_LOG_CAPACITY`, `BOXINSTALL_KILL_GRACE_SECS`,
//! `BOXINSTALL_INSTALLER`, `BOXINSTALL_OUTPUT_MODE`, `BOXINSTALL_LOG_DIR`,
//! `BOXINSTALL_LOG_JSON` and `RUST_LOG`.

use anyhow::{bail, Context, Result};
use boxinstall_core::OutputMode;
use std::collections::HashMap;
use std::path::PathBuf;

use crate::settings::Settings;

/// Apply overrides from the process environment.
pub fn apply_env_overrides(settings: Settings) -> Result<Settings> {
    apply_env_overrides_with(settings, &std::env::vars().collect())
}

/// Apply overrides from a provided map (useful for testing).
pub fn apply_env_overrides_with(
    mut settings: Settings,
    env: &HashMap<String, String>,
) -> Result<Settings> {
    let get = |key: &str| env.get(key).map(|v| v.trim()).filter(|v| !v.is_empty());

    if let Some(v) = get("BOXINSTALL_BIND") {
        settings.bind_address = v.to_string();
    }
    if let Some(v) = get("BOXINSTALL_PORT") {
        settings.port = v
            .parse()
            .with_context(|| format!("BOXINSTALL_PORT is not a port number: {v}"))?;
    }
    if let Some(v) = get("BOXINSTALL_WEB_ROOT") {
        settings.web_root = PathBuf::from(v);
    }
    if let Some(v) = get("BOXINSTALL_LOCALE_DIR") {
        settings.locale_dir = PathBuf::from(v);
    }
    if let Some(v) = get("BOXINSTALL_CONFIG_PATH") {
        settings.config_path = PathBuf::from(v);
    }
    if let Some(v) = get("BOXINSTALL_CREDENTIALS_PATH") {
        settings.credentials_path = PathBuf::from(v);
    }
    if let Some(v) = get("BOXINSTALL_PROGRESS_LOG") {
        settings.progress_log_path = Some(PathBuf::from(v));
    }
    if let Some(v) = get("BOXINSTALL_LOG_CAPACITY") {
        settings.log_capacity = v
            .parse()
            .with_context(|| format!("BOXINSTALL_LOG_CAPACITY is not a number: {v}"))?;
        if settings.log_capacity == 0 {
            bail!("BOXINSTALL_LOG_CAPACITY must be greater than zero");
        }
    }
    if let Some(v) = get("BOXINSTALL_KILL_GRACE_SECS") {
        settings.kill_grace_secs = v
            .parse()
            .with_context(|| format!("BOXINSTALL_KILL_GRACE_SECS is not a number: {v}"))?;
    }
    if let Some(v) = get("BOXINSTALL_INSTALLER") {
        settings.installer.program = v.to_string();
    }
    if let Some(v) = get("BOXINSTALL_OUTPUT_MODE") {
        settings.installer.output_mode = match v.to_ascii_lowercase().as_str() {
            "json" => OutputMode::Json,
            "raw" => OutputMode::Raw,
            other => bail!("BOXINSTALL_OUTPUT_MODE must be 'json' or 'raw', got '{other}'"),
        };
    }
    if let Some(v) = get("BOXINSTALL_LOG_DIR") {
        settings.log_dir = Some(PathBuf::from(v));
    }
    if let Some(v) = get("BOXINSTALL_LOG_JSON") {
        settings.log_json = matches!(v, "1" | "true" | "yes");
    }
    if let Some(v) = get("RUST_LOG") {
        settings.log_level = v.to_string();
    }

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn overrides_port_and_paths() {
        let s = apply_env_overrides_with(
            Settings::default(),
            &env(&[
                ("BOXINSTALL_PORT", "5000"),
                ("BOXINSTALL_CONFIG_PATH", "/run/boxinstall/config.json"),
                ("BOXINSTALL_OUTPUT_MODE", "RAW"),
            ]),
        )
        .unwrap();
        assert_eq!(s.port, 5000);
        assert_eq!(s.config_path, PathBuf::from("/run/boxinstall/config.json"));
        assert_eq!(s.installer.output_mode, OutputMode::Raw);
    }

    #[test]
    fn empty_values_are_ignored() {
        let s = apply_env_overrides_with(Settings::default(), &env(&[("BOXINSTALL_BIND", "  ")]))
            .unwrap();
        assert_eq!(s.bind_address, "0.0.0.0");
    }

    #[test]
    fn invalid_port_is_an_error() {
        let err = apply_env_overrides_with(
            Settings::default(),
            &env(&[("BOXINSTALL_PORT", "http")]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("BOXINSTALL_PORT"));
    }

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(apply_env_overrides_with(
            Settings::default(),
            &env(&[("BOXINSTALL_LOG_CAPACITY", "0")]),
        )
        .is_err());
    }

    #[test]
    fn unknown_output_mode_is_rejected() {
        assert!(apply_env_overrides_with(
            Settings::default(),
            &env(&[("BOXINSTALL_OUTPUT_MODE", "xml")]),
        )
        .is_err());
    }
}
