use boxinstall_core::InstallError;
use tracing::info;

use crate::command::run_checked;

/// Ask systemd to reboot the machine.
pub async fn reboot() -> Result<(), InstallError> {
    info!("Reboot requested");
    run_checked("systemctl", &["reboot"]).await?;
    Ok(())
}
