//! Block device discovery.

use anyhow::{Context, Result};
use async_trait::async_trait;
use boxinstall_core::{BlockDeviceProbe, InstallError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::command::run_checked;

/// One installable disk as shown in the disk picker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskInfo {
    pub name: String,
    pub model: String,
    pub path: String,
    pub total_bytes: u64,
    /// Total minus the sum of its partitions.
    pub free_bytes: u64,
}

#[derive(Debug, Deserialize)]
struct LsblkOutput {
    #[serde(default)]
    blockdevices: Vec<LsblkDevice>,
}

#[derive(Debug, Deserialize)]
struct LsblkDevice {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    size: Value,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    children: Vec<LsblkDevice>,
}

/// Older util-linux prints sizes as strings even with `--bytes`.
fn size_of(value: &Value) -> u64 {
    match value {
        Value::Number(n) => n.as_u64().unwrap_or(0),
        Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

/// Parse `lsblk --bytes --json -o NAME,PATH,SIZE,TYPE,MODEL` output.
///
/// Only whole disks are returned.
pub fn parse_lsblk(raw: &str) -> Result<Vec<DiskInfo>> {
    let parsed: LsblkOutput = serde_json::from_str(raw).context("lsblk output is not valid JSON")?;
    Ok(parsed
        .blockdevices
        .iter()
        .filter(|d| d.kind.as_deref() == Some("disk"))
        .map(|d| {
            let total = size_of(&d.size);
            let used: u64 = d
                .children
                .iter()
                .filter(|c| c.kind.as_deref() == Some("part"))
                .map(|c| size_of(&c.size))
                .sum();
            let name = d.name.clone().unwrap_or_default();
            DiskInfo {
                path: d.path.clone().unwrap_or_else(|| format!("/dev/{name}")),
                name,
                model: d.model.as_deref().unwrap_or("").trim().to_string(),
                total_bytes: total,
                free_bytes: total.saturating_sub(used),
            }
        })
        .collect())
}

pub async fn list_disks() -> Result<Vec<DiskInfo>, InstallError> {
    let raw = run_checked("lsblk", &["--bytes", "--json", "-o", "NAME,PATH,SIZE,TYPE,MODEL"]).await?;
    let disks = parse_lsblk(&raw)?;
    debug!(count = disks.len(), "Enumerated disks");
    Ok(disks)
}

/// Reads device sizes with `blockdev --getsize64`.
#[derive(Debug, Default, Clone, Copy)]
pub struct BlockDev;

#[async_trait]
impl BlockDeviceProbe for BlockDev {
    async fn device_size(&self, device: &str) -> Result<u64> {
        let out = run_checked("blockdev", &["--getsize64", device]).await?;
        let size = out
            .trim()
            .parse::<u64>()
            .with_context(|| format!("unexpected blockdev output for {device}: {}", out.trim()))?;
        info!(device, size, "Probed device size");
        Ok(size)
    }
}
