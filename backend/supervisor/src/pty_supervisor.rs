//! PTY Process Supervisor
//!
//! Allocates a pseudo-terminal for the installer so it sees an interactive
//! terminal, runs it as the leader of a new session, and hands the master side
//! back to the caller.

use boxinstall_core::InstallError;
use nix::errno::Errno;
use nix::fcntl::{fcntl, FcntlArg, FdFlag};
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::pty::{openpty, Winsize};
use std::fs::File;
use std::io::{self, Read};
use std::os::fd::{AsFd, AsRawFd};
use std::os::unix::process::CommandExt;
use std::process::{Child, Command};
use std::time::Duration;
use tracing::{debug, info};

/// The read side of a terminal the relay drains.
///
/// `close` takes the endpoint by value so it can only ever run once.
pub trait MasterEndpoint: Send + 'static {
    /// Block up to `timeout` for data. `Ok(false)` means the timeout elapsed.
    fn wait_readable(&mut self, timeout: Duration) -> io::Result<bool>;

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    fn close(self);
}

/// Master side of an allocated PTY.
pub struct PtyMaster {
    file: File,
}

impl MasterEndpoint for PtyMaster {
    fn wait_readable(&mut self, timeout: Duration) -> io::Result<bool> {
        let millis = u16::try_from(timeout.as_millis()).unwrap_or(u16::MAX);
        let mut fds = [PollFd::new(self.file.as_fd(), PollFlags::POLLIN)];
        match poll(&mut fds, PollTimeout::from(millis)) {
            Ok(0) => Ok(false),
            // POLLHUP/POLLERR also land here; the next read reports them.
            Ok(_) => Ok(true),
            Err(Errno::EINTR) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }

    fn close(self) {
        debug!(fd = self.file.as_raw_fd(), "Closing PTY master");
        drop(self.file);
    }
}

/// A running installer attached to a PTY.
pub struct PtyProcess {
    pub pid: u32,
    pub child: Child,
    pub master: PtyMaster,
}

pub struct PtySupervisor {
    program: String,
    args: Vec<String>,
}

impl PtySupervisor {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Spawn the program with the PTY slave as its stdin, stdout and stderr.
    ///
    /// The child becomes a session leader, so its pid is also its process
    /// group id. On any failure every descriptor opened here is closed before
    /// returning.
    pub fn spawn(&self) -> Result<PtyProcess, InstallError> {
        let program = which::which(&self.program)
            .map_err(|e| InstallError::Spawn(format!("{}: {e}", self.program)))?;

        let winsize = Winsize {
            ws_row: 24,
            ws_col: 80,
            ws_xpixel: 0,
            ws_ypixel: 0,
        };
        let pty = openpty(&winsize, None)
            .map_err(|e| InstallError::Spawn(format!("openpty failed: {e}")))?;

        let slave_fd = pty.slave.as_raw_fd();
        let master_fd = pty.master.as_raw_fd();

        // Other commands spawned by the server must not inherit either side.
        // dup2 in the child clears the flag on 0/1/2.
        for fd in [master_fd, slave_fd] {
            fcntl(fd, FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC))
                .map_err(|e| InstallError::Spawn(format!("failed to set FD_CLOEXEC: {e}")))?;
        }

        let mut command = Command::new(&program);
        command.args(&self.args);

        // SAFETY: the closure runs in the forked child before exec and only
        // calls async-signal-safe functions. The descriptors are plain integers
        // copied out while the parent still owns them.
        unsafe {
            command.pre_exec(move || {
                if libc::setsid() == -1 {
                    return Err(io::Error::last_os_error());
                }
                if libc::ioctl(slave_fd, libc::TIOCSCTTY as libc::c_ulong, 0) == -1 {
                    return Err(io::Error::last_os_error());
                }
                for target in 0..=2 {
                    if libc::dup2(slave_fd, target) == -1 {
                        return Err(io::Error::last_os_error());
                    }
                }
                if slave_fd > 2 {
                    libc::close(slave_fd);
                } else if libc::fcntl(slave_fd, libc::F_SETFD, 0) == -1 {
                    // dup2 onto itself keeps FD_CLOEXEC.
                    return Err(io::Error::last_os_error());
                }
                libc::close(master_fd);
                Ok(())
            });
        }

        let child = command
            .spawn()
            .map_err(|e| InstallError::Spawn(format!("{}: {e}", program.display())))?;

        // The child holds its own copy; the parent keeps only the master.
        drop(pty.slave);

        let pid = child.id();
        info!(pid, program = %program.display(), args = ?self.args, "Spawned installer on PTY");

        Ok(PtyProcess {
            pid,
            child,
            master: PtyMaster {
                file: File::from(pty.master),
            },
        })
    }
}
