use std::io;
use std::sync::{Arc, Mutex};

use warden::process::{PlatformTerminator, Terminator};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Terminate,
    Kill,
}

/// A `Terminator` that:
/// - records every terminate / force-kill request with its pid
/// - optionally forwards it to the real platform implementation.
#[derive(Debug, Clone)]
pub struct RecordingTerminator {
    calls: Arc<Mutex<Vec<(Signal, u32)>>>,
    forward: bool,
}

impl RecordingTerminator {
    /// Record only; no signal reaches the process.
    pub fn inert() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            forward: false,
        }
    }

    /// Record, then deliver through [`PlatformTerminator`].
    pub fn forwarding() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            forward: true,
        }
    }

    pub fn calls(&self) -> Vec<(Signal, u32)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn signals(&self) -> Vec<Signal> {
        self.calls().into_iter().map(|(s, _)| s).collect()
    }
}

impl Terminator for RecordingTerminator {
    fn terminate(&self, pid: u32) -> io::Result<()> {
        self.calls.lock().unwrap().push((Signal::Terminate, pid));
        if self.forward {
            PlatformTerminator.terminate(pid)
        } else {
            Ok(())
        }
    }

    fn force_kill(&self, pid: u32) -> io::Result<()> {
        self.calls.lock().unwrap().push((Signal::Kill, pid));
        if self.forward {
            PlatformTerminator.force_kill(pid)
        } else {
            Ok(())
        }
    }
}
