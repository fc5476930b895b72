//! Server settings.
//!
//! Precedence: built-in defaults < TOML file < `BOXINSTALL_*` environment
//! variables < command-line flags (applied by the binary).

use anyhow::{Context, Result};
use boxinstall_core::OutputMode;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Directory holding the generated installer artifacts by default.
pub const DEFAULT_STATE_DIR: &str = "/var/lib/boxinstall";

/// Placeholder replaced with the config artifact path in installer arguments.
pub const CONFIG_PLACEHOLDER: &str = "{config}";
/// Placeholder replaced with the credentials artifact path.
pub const CREDS_PLACEHOLDER: &str = "{creds}";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// HTTP bind address
    pub bind_address: String,
    /// HTTP port
    pub port: u16,
    /// Directory holding `Install.html` and its assets
    pub web_root: PathBuf,
    /// Directory holding `<lang>.json` translation files
    pub locale_dir: PathBuf,
    /// Where the installer config is written
    pub config_path: PathBuf,
    /// Where the credentials are written (mode 0600)
    pub credentials_path: PathBuf,
    /// NDJSON mirror of the progress log, truncated on each run
    pub progress_log_path: Option<PathBuf>,
    /// Maximum number of progress records kept in memory
    pub log_capacity: usize,
    /// Seconds between SIGTERM and SIGKILL when replacing a run
    pub kill_grace_secs: u64,
    pub installer: InstallerSettings,
    /// Log level used when `RUST_LOG` is not set
    pub log_level: String,
    /// Directory for rolling server logs; console only when unset
    pub log_dir: Option<PathBuf>,
    /// Emit console logs as JSON
    pub log_json: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8000,
            web_root: PathBuf::from("."),
            locale_dir: PathBuf::from("locales"),
            config_path: Path::new(DEFAULT_STATE_DIR).join("archinstall_config.json"),
            credentials_path: Path::new(DEFAULT_STATE_DIR).join("archinstall_creds.json"),
            progress_log_path: None,
            log_capacity: 200,
            kill_grace_secs: 5,
            installer: InstallerSettings::default(),
            log_level: "info".to_string(),
            log_dir: None,
            log_json: false,
        }
    }
}

/// How the installer is launched.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallerSettings {
    pub program: String,
    /// Arguments; `{config}` and `{creds}` are substituted with artifact paths.
    pub args: Vec<String>,
    pub output_mode: OutputMode,
}

impl Default for InstallerSettings {
    fn default() -> Self {
        Self {
            program: "python".to_string(),
            args: [
                "-m",
                "archinstall",
                "--config",
                CONFIG_PLACEHOLDER,
                "--creds",
                CREDS_PLACEHOLDER,
                "--script",
                "guided",
                "--json",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            output_mode: OutputMode::Json,
        }
    }
}

impl InstallerSettings {
    /// Arguments with artifact paths substituted.
    pub fn resolve_args(&self, config_path: &Path, creds_path: &Path) -> Vec<String> {
        let config = config_path.display().to_string();
        let creds = creds_path.display().to_string();
        self.args
            .iter()
            .map(|arg| {
                arg.replace(CONFIG_PLACEHOLDER, &config)
                    .replace(CREDS_PLACEHOLDER, &creds)
            })
            .collect()
    }
}

impl Settings {
    /// Load settings from an optional TOML file, then apply environment
    /// overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let settings = match path {
            Some(path) => Self::from_toml_file(path)?,
            None => {
                debug!("No settings file given; using defaults");
                Self::default()
            }
        };
        crate::env::apply_env_overrides(settings)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {}", path.display()))?;
        let settings = Self::from_toml_str(&raw)
            .with_context(|| format!("Failed to parse settings at: {}", path.display()))?;
        info!(path = %path.display(), "Loaded settings");
        Ok(settings)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_secs(self.kill_grace_secs)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }

    /// Fails when an artifact would be written inside the web root, where
    /// the static file service would hand it to any client.
    pub fn check_artifact_paths(&self) -> Result<()> {
        let web_root = resolve_path(&self.web_root)?;
        for artifact in [&self.config_path, &self.credentials_path] {
            if resolve_path(artifact)?.starts_with(&web_root) {
                anyhow::bail!(
                    "artifact {} is inside the web root {}",
                    artifact.display(),
                    self.web_root.display()
                );
            }
        }
        Ok(())
    }
}

/// Absolute, `..`-free form of `path` with symlinks followed as far as the
/// path exists.
fn resolve_path(path: &Path) -> Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .context("Failed to read the working directory")?
            .join(path)
    };

    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other),
        }
    }

    let mut existing = normalized.as_path();
    let mut missing = Vec::new();
    while !existing.exists() {
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                existing = parent;
            }
            _ => break,
        }
    }
    let mut resolved = std::fs::canonicalize(existing).unwrap_or_else(|_| existing.to_path_buf());
    for name in missing.iter().rev() {
        resolved.push(name);
    }
    Ok(resolved)
}
