//! Host commands the installer front end depends on.
//!
//! Every external program is invoked directly with an argument vector; no
//! shell is involved.

pub mod command;
pub mod disks;
pub mod network;
pub mod power;

pub use command::{run, run_checked, CommandOutput};
pub use disks::{list_disks, parse_lsblk, BlockDev, DiskInfo};
pub use network::{apply_network_config, network_status, plan_network_config, NetworkStatus};
pub use power::reboot;
