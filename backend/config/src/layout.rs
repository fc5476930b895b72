//! Automatic single-disk layout: an EFI boot partition followed by a root
//! partition spanning the rest of the device.

use boxinstall_core::{InstallError, InstallRequest};
use serde_json::{json, Value};

pub const MIB: u64 = 1024 * 1024;
pub const GIB: u64 = 1024 * MIB;

/// Offset of the first partition.
pub const BOOT_START: u64 = MIB;
/// Size of the FAT32 boot partition.
pub const BOOT_SIZE: u64 = GIB;

/// Which device the caller wants the default layout applied to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutRequest {
    pub device: String,
    pub wipe: bool,
}

/// A computed layout, sizes in bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultLayout {
    pub device: String,
    pub wipe: bool,
    pub total_bytes: u64,
    pub root_start: u64,
    pub root_size: u64,
    pub filesystem: String,
}

/// Extract a default-layout request, if the caller asked for one.
///
/// Either `disk_config.config_type == "default_layout"` with a device in the
/// first device modification, or no `disk_config` at all and `harddrive`
/// given as a device path.
pub fn layout_request(request: &InstallRequest) -> Option<LayoutRequest> {
    match &request.disk_config {
        Some(cfg) if cfg.get("config_type").and_then(Value::as_str) == Some("default_layout") => {
            let first = cfg.get("device_modifications")?.as_array()?.first()?;
            let device = first.get("device")?.as_str()?.trim();
            if device.is_empty() {
                return None;
            }
            Some(LayoutRequest {
                device: device.to_string(),
                wipe: first.get("wipe").and_then(Value::as_bool).unwrap_or(true),
            })
        }
        Some(_) => None,
        None => request.harddrive_path().map(|device| LayoutRequest {
            device: device.to_string(),
            wipe: true,
        }),
    }
}

/// Compute the default layout for a device of `total_bytes`.
///
/// Fails when nothing would be left for the root partition.
pub fn compute_default_layout(
    request: &LayoutRequest,
    total_bytes: u64,
    filesystem: &str,
) -> Result<DefaultLayout, InstallError> {
    let root_start = BOOT_START + BOOT_SIZE;
    let root_size = total_bytes
        .checked_sub(root_start)
        .filter(|size| *size > 0)
        .ok_or_else(|| {
            InstallError::Layout(format!(
                "{} is {} bytes; at least {} bytes are needed for the boot partition",
                request.device,
                total_bytes,
                root_start + 1
            ))
        })?;

    Ok(DefaultLayout {
        device: request.device.clone(),
        wipe: request.wipe,
        total_bytes,
        root_start,
        root_size,
        filesystem: filesystem.to_string(),
    })
}

impl DefaultLayout {
    /// Render as an explicit (`manual`) disk configuration.
    pub fn to_disk_config(&self) -> Value {
        let boot = json!({
            "status": "create",
            "type": "primary",
            "start": { "unit": "B", "value": BOOT_START },
            "length": { "unit": "B", "value": BOOT_SIZE },
            "mountpoint": "/boot",
            "fs_type": "fat32",
            "flags": ["boot", "esp"],
        });
        let root = json!({
            "status": "create",
            "type": "primary",
            "start": { "unit": "B", "value": self.root_start },
            "length": { "unit": "B", "value": self.root_size },
            "mountpoint": "/",
            "fs_type": self.filesystem,
            "flags": [],
        });
        json!({
            "config_type": "manual",
            "device_modifications": [{
                "device": self.device,
                "wipe": self.wipe,
                "partitions": [boot, root],
            }],
        })
    }
}
