// src/process/terminator.rs

use std::fmt::Debug;
use std::io;

use tracing::debug;

/// Platform seam for the two forced stop steps.
///
/// `pid` is the id of the spawned child. On Unix the child leads its own
/// process group, so implementations may signal the whole group.
pub trait Terminator: Send + Sync + Debug {
    /// Ask the process to exit (SIGTERM / `taskkill`).
    fn terminate(&self, pid: u32) -> io::Result<()>;

    /// Kill the process unconditionally (SIGKILL / `taskkill /F`).
    fn force_kill(&self, pid: u32) -> io::Result<()>;
}

/// Default implementation: process-group signals on Unix, `taskkill /T` on
/// Windows.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlatformTerminator;

#[cfg(unix)]
impl PlatformTerminator {
    fn signal_group(pid: u32, signal: nix::sys::signal::Signal) -> io::Result<()> {
        use nix::errno::Errno;
        use nix::sys::signal::killpg;
        use nix::unistd::Pid;

        let pgid = i32::try_from(pid)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
        match killpg(Pid::from_raw(pgid), signal) {
            Ok(()) => {
                debug!(pid, ?signal, "signalled process group");
                Ok(())
            }
            // Already gone; the exit watcher will notice.
            Err(Errno::ESRCH) => Ok(()),
            Err(e) => Err(io::Error::from(e)),
        }
    }
}

#[cfg(unix)]
impl Terminator for PlatformTerminator {
    fn terminate(&self, pid: u32) -> io::Result<()> {
        Self::signal_group(pid, nix::sys::signal::Signal::SIGTERM)
    }

    fn force_kill(&self, pid: u32) -> io::Result<()> {
        Self::signal_group(pid, nix::sys::signal::Signal::SIGKILL)
    }
}

#[cfg(windows)]
impl PlatformTerminator {
    fn taskkill(pid: u32, force: bool) -> io::Result<()> {
        use std::process::{Command, Stdio};

        let pid_arg = pid.to_string();
        let mut cmd = Command::new("taskkill");
        cmd.args(["/PID", pid_arg.as_str(), "/T"]);
        if force {
            cmd.arg("/F");
        }
        let status = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()?;
        debug!(pid, force, code = ?status.code(), "taskkill finished");
        Ok(())
    }
}

#[cfg(windows)]
impl Terminator for PlatformTerminator {
    fn terminate(&self, pid: u32) -> io::Result<()> {
        Self::taskkill(pid, false)
    }

    fn force_kill(&self, pid: u32) -> io::Result<()> {
        Self::taskkill(pid, true)
    }
}

#[cfg(not(any(unix, windows)))]
impl Terminator for PlatformTerminator {
    fn terminate(&self, _pid: u32) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::Unsupported, "terminate is not supported on this platform"))
    }

    fn force_kill(&self, _pid: u32) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::Unsupported, "force kill is not supported on this platform"))
    }
}
