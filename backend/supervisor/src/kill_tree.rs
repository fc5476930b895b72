//! Process Tree Killer
//!
//! The installer runs as a session leader, so its pid doubles as the process
//! group id. Signalling the group reaches every descendant that did not
//! detach itself.

use anyhow::{Context, Result};
use nix::errno::Errno;
use nix::sys::signal::{kill, killpg, Signal};
use nix::unistd::Pid;
use tracing::{debug, info};

pub struct KillTree;

impl KillTree {
    /// Send `signal` to the process group led by `pid`.
    ///
    /// A group that no longer exists is not an error.
    pub fn signal_group(pid: u32, signal: Signal) -> Result<()> {
        match killpg(Pid::from_raw(pid as i32), signal) {
            Ok(()) => {
                debug!(pid, signal = %signal, "Signalled process group");
                Ok(())
            }
            Err(Errno::ESRCH) => {
                debug!(pid, "Process group already gone");
                Ok(())
            }
            Err(e) => Err(e).with_context(|| format!("killpg({pid}, {signal}) failed")),
        }
    }

    /// Forcefully kill a process tree.
    pub fn kill_tree(pid: u32) -> Result<()> {
        info!(pid, "Killing process tree");
        Self::signal_group(pid, Signal::SIGKILL)
    }

    /// Non-blocking liveness probe (signal 0).
    ///
    /// A zombie still counts as alive until it is reaped.
    pub fn is_alive(pid: u32) -> bool {
        match kill(Pid::from_raw(pid as i32), None) {
            Ok(()) => true,
            Err(Errno::EPERM) => true,
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pty_supervisor::PtySupervisor;

    #[test]
    fn kills_the_whole_group() {
        let mut proc = PtySupervisor::new("/bin/sh")
            .args(["-c", "sleep 30 & sleep 30"])
            .spawn()
            .unwrap();
        assert!(KillTree::is_alive(proc.pid));
        KillTree::kill_tree(proc.pid).unwrap();
        proc.child.wait().unwrap();
        assert!(!KillTree::is_alive(proc.pid));
    }

    #[test]
    fn missing_group_is_ok() {
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();
        assert!(KillTree::signal_group(pid, Signal::SIGTERM).is_ok());
    }
}
