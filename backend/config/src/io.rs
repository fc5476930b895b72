//! Artifact read/write with atomic replacement.

use anyhow::Context;
use boxinstall_core::InstallError;
use serde::{de::DeserializeOwned, Serialize};
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use tokio::fs;
use tracing::info;

/// Mode for the installer config.
pub const CONFIG_MODE: u32 = 0o644;

/// Mode for the credentials file: owner read/write only.
pub const CREDENTIALS_MODE: u32 = 0o600;

/// Serialize `value` as pretty JSON and atomically replace `path` with it.
///
/// Each call writes through its own uniquely named temp file in the target
/// directory, so concurrent writers never touch each other's partial output.
/// The final file carries `mode` even when it already existed.
pub async fn write_json_atomic<T: Serialize>(
    value: &T,
    path: &Path,
    mode: u32,
) -> Result<(), InstallError> {
    let json = serde_json::to_vec_pretty(value).map_err(|e| InstallError::config_write(path, e))?;
    let target = path.to_path_buf();

    tokio::task::spawn_blocking(move || persist_json(&json, &target, mode))
        .await
        .map_err(|e| InstallError::config_write(path, e))??;

    info!(path = %path.display(), mode = %format!("{:o}", mode), "Wrote artifact");
    Ok(())
}

fn persist_json(json: &[u8], path: &Path, mode: u32) -> Result<(), InstallError> {
    let parent = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => {
            std::fs::create_dir_all(parent).map_err(|e| InstallError::config_write(parent, e))?;
            parent
        }
        None => Path::new("."),
    };

    // NamedTempFile starts at 0600, so the contents are never more widely readable.
    let mut tmp = tempfile::Builder::new()
        .prefix(".boxinstall-")
        .suffix(".tmp")
        .tempfile_in(parent)
        .map_err(|e| InstallError::config_write(parent, e))?;
    tmp.write_all(json)
        .map_err(|e| InstallError::config_write(tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| InstallError::config_write(tmp.path(), e))?;
    tmp.as_file()
        .set_permissions(std::fs::Permissions::from_mode(mode))
        .map_err(|e| InstallError::config_write(tmp.path(), e))?;

    tmp.persist(path)
        .map_err(|e| InstallError::config_write(path, e.error))?;
    Ok(())
}

/// Read a JSON document from disk.
pub async fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let raw = fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_slice(&raw).with_context(|| format!("Failed to parse {}", path.display()))
}
