//! Timeout Killer
//!
//! Escalates signals on a process group: SIGTERM, wait out the grace period,
//! then SIGKILL.

use anyhow::Result;
use nix::sys::signal::Signal;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{info, warn};

use crate::kill_tree::KillTree;

/// How often liveness is re-checked during the grace period.
const PROBE_INTERVAL: Duration = Duration::from_millis(100);

/// How a termination ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Gone before any signal was sent.
    AlreadyExited,
    /// Exited within the grace period after SIGTERM.
    Terminated,
    /// Needed SIGKILL.
    Killed,
}

pub struct TimeoutKill;

impl TimeoutKill {
    /// SIGTERM the group led by `pid`, then SIGKILL it if `exited` has not
    /// reported true within `grace_period`.
    ///
    /// `exited` must not block. It lets the caller observe a reap done
    /// elsewhere, since an unreaped zombie still answers signal 0.
    pub async fn terminate<F>(pid: u32, grace_period: Duration, mut exited: F) -> Result<Termination>
    where
        F: FnMut() -> bool,
    {
        if exited() || !KillTree::is_alive(pid) {
            return Ok(Termination::AlreadyExited);
        }

        info!(pid, grace = ?grace_period, "Sending SIGTERM to installer process group");
        KillTree::signal_group(pid, Signal::SIGTERM)?;

        let deadline = Instant::now() + grace_period;
        while Instant::now() < deadline {
            if exited() || !KillTree::is_alive(pid) {
                return Ok(Termination::Terminated);
            }
            sleep(PROBE_INTERVAL).await;
        }
        if exited() {
            return Ok(Termination::Terminated);
        }

        warn!(pid, "Process group ignored SIGTERM. Escalating to SIGKILL.");
        KillTree::kill_tree(pid)?;
        Ok(Termination::Killed)
    }
}
