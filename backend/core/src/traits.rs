use anyhow::Result;
use async_trait::async_trait;

/// Reports the size of a block device.
///
/// Implemented by the host collaborator that shells out to `blockdev`, and by
/// fixed-size doubles in tests.
#[async_trait]
pub trait BlockDeviceProbe: Send + Sync {
    /// Total size of `device` in bytes.
    async fn device_size(&self, device: &str) -> Result<u64>;
}
