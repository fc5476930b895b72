//! Turns an install request into the config and credentials artifacts the
//! installer reads.

use boxinstall_core::{BlockDeviceProbe, InstallError, InstallRequest};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::defaults::{build_credentials, build_installer_config, DEFAULT_FILESYSTEM};
use crate::io::{write_json_atomic, CONFIG_MODE, CREDENTIALS_MODE};
use crate::layout::{compute_default_layout, layout_request, DefaultLayout};
use crate::redact::redact;
use crate::schema::InstallerConfig;
use crate::validation::validate;

/// Result of a successful materialization.
#[derive(Debug, Clone)]
pub struct MaterializedRun {
    pub config_path: PathBuf,
    pub credentials_path: PathBuf,
    pub config: InstallerConfig,
    /// Present when the default layout was computed.
    pub layout: Option<DefaultLayout>,
}

pub struct Materializer {
    config_path: PathBuf,
    credentials_path: PathBuf,
    probe: Arc<dyn BlockDeviceProbe>,
}

impl Materializer {
    pub fn new(
        config_path: impl Into<PathBuf>,
        credentials_path: impl Into<PathBuf>,
        probe: Arc<dyn BlockDeviceProbe>,
    ) -> Self {
        Self {
            config_path: config_path.into(),
            credentials_path: credentials_path.into(),
            probe,
        }
    }

    /// Validate `request`, resolve its disk layout, and write both artifacts.
    ///
    /// The config is written before the credentials. Nothing is written when
    /// validation fails.
    pub async fn materialize(&self, request: &InstallRequest) -> Result<MaterializedRun, InstallError> {
        let report = validate(request);
        for warning in &report.warnings {
            warn!(path = %warning.path, message = %warning.message, "Install request warning");
        }
        if !report.is_valid() {
            return Err(InstallError::InvalidRequest(report.error_summary()));
        }

        let (disk_config, layout) = self.resolve_disk_config(request).await;
        let config = build_installer_config(request, disk_config);
        let credentials = build_credentials(request);

        if let Ok(value) = serde_json::to_value(&config) {
            debug!(config = %redact(&value), "Final installer config");
        }

        write_json_atomic(&config, &self.config_path, CONFIG_MODE).await?;
        write_json_atomic(&credentials, &self.credentials_path, CREDENTIALS_MODE).await?;

        info!(
            config = %self.config_path.display(),
            credentials = %self.credentials_path.display(),
            users = credentials.users.len(),
            default_layout = layout.is_some(),
            "Installer artifacts written"
        );

        Ok(MaterializedRun {
            config_path: self.config_path.clone(),
            credentials_path: self.credentials_path.clone(),
            config,
            layout,
        })
    }

    /// The disk configuration to hand to the installer.
    ///
    /// When the default layout was requested but cannot be computed, the
    /// caller's original `disk_config` is returned unchanged and the installer
    /// is left to reject it.
    pub async fn resolve_disk_config(
        &self,
        request: &InstallRequest,
    ) -> (Option<Value>, Option<DefaultLayout>) {
        let Some(layout_req) = layout_request(request) else {
            debug!("Using disk_config as provided");
            return (request.disk_config.clone(), None);
        };

        let filesystem = request
            .filesystem
            .as_deref()
            .unwrap_or(DEFAULT_FILESYSTEM);

        let computed = match self.probe.device_size(&layout_req.device).await {
            Ok(total) => compute_default_layout(&layout_req, total, filesystem),
            Err(e) => Err(InstallError::Layout(format!(
                "could not read size of {}: {e:#}",
                layout_req.device
            ))),
        };

        match computed {
            Ok(layout) => {
                info!(
                    device = %layout.device,
                    total_bytes = layout.total_bytes,
                    root_bytes = layout.root_size,
                    filesystem = %layout.filesystem,
                    "Computed default layout"
                );
                (Some(layout.to_disk_config()), Some(layout))
            }
            Err(e) => {
                warn!(error = %e, "Default layout failed; passing request through");
                (request.disk_config.clone(), None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::read_json;
    use crate::layout::{GIB, MIB};
    use anyhow::Result;
    use async_trait::async_trait;
    use serde_json::json;
    use std::os::unix::fs::PermissionsExt;

    struct FixedSize(u64);

    #[async_trait]
    impl BlockDeviceProbe for FixedSize {
        async fn device_size(&self, _device: &str) -> Result<u64> {
            Ok(self.0)
        }
    }

    struct Unreadable;

    #[async_trait]
    impl BlockDeviceProbe for Unreadable {
        async fn device_size(&self, device: &str) -> Result<u64> {
            anyhow::bail!("blockdev: cannot open {device}")
        }
    }

    fn materializer(dir: &std::path::Path, probe: Arc<dyn BlockDeviceProbe>) -> Materializer {
        Materializer::new(dir.join("config.json"), dir.join("creds.json"), probe)
    }

    fn request(v: Value) -> InstallRequest {
        serde_json::from_value(v).unwrap()
    }

    #[tokio::test]
    async fn writes_default_layout_and_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let m = materializer(dir.path(), Arc::new(FixedSize(20 * GIB)));

        let run = m
            .materialize(&request(json!({
                "harddrive": "/dev/sdX",
                "user": { "username": "alice", "password": "secret" }
            })))
            .await
            .unwrap();

        let cfg: Value = read_json(&run.config_path).await.unwrap();
        let root = &cfg["disk_config"]["device_modifications"][0]["partitions"][1];
        assert_eq!(root["mountpoint"], "/");
        assert_eq!(root["length"]["value"], 20 * GIB - GIB - MIB);
        assert!(!cfg.to_string().contains("secret"));

        let creds: Value = read_json(&run.credentials_path).await.unwrap();
        assert_eq!(creds["!users"][0]["username"], "alice");
        let mode = std::fs::metadata(&run.credentials_path)
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o077, 0);
    }

    #[tokio::test]
    async fn small_disk_falls_back_to_original_request() {
        let dir = tempfile::tempdir().unwrap();
        let m = materializer(dir.path(), Arc::new(FixedSize(GIB)));
        let original = json!({
            "config_type": "default_layout",
            "device_modifications": [{ "device": "/dev/sdX", "wipe": true }]
        });

        let (disk, layout) = m
            .resolve_disk_config(&request(json!({ "disk_config": original.clone() })))
            .await;
        assert_eq!(disk, Some(original));
        assert!(layout.is_none());
    }

    #[tokio::test]
    async fn probe_failure_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let m = materializer(dir.path(), Arc::new(Unreadable));
        let (disk, layout) = m
            .resolve_disk_config(&request(json!({ "harddrive": "/dev/sdX" })))
            .await;
        assert_eq!(disk, None);
        assert!(layout.is_none());
    }

    #[tokio::test]
    async fn explicit_disk_config_passes_through() {
        let dir = tempfile::tempdir().unwrap();
        let m = materializer(dir.path(), Arc::new(FixedSize(20 * GIB)));
        let manual = json!({ "config_type": "manual", "device_modifications": [] });
        let (disk, layout) = m
            .resolve_disk_config(&request(json!({ "disk_config": manual.clone() })))
            .await;
        assert_eq!(disk, Some(manual));
        assert!(layout.is_none());
    }

    #[tokio::test]
    async fn invalid_request_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let m = materializer(dir.path(), Arc::new(FixedSize(20 * GIB)));
        let err = m
            .materialize(&request(json!({ "harddrive": "/tmp/disk.img" })))
            .await
            .unwrap_err();
        assert!(matches!(err, InstallError::InvalidRequest(_)));
        assert!(!dir.path().join("config.json").exists());
        assert!(!dir.path().join("creds.json").exists());
    }
}
