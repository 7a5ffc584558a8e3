// src/process/mod.rs

//! Supervision of long-running server processes.
//!
//! - `launch.rs`: deciding what to run in a server directory.
//! - `pump.rs`: draining and cleaning child output.
//! - `resources.rs`: CPU and memory sampling of a running server.
//! - `terminator.rs`: the platform seam for terminate / force-kill.
//! - `supervisor.rs`: the registry and the start/stop/restart lifecycle.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Local};

pub mod launch;
pub mod pump;
pub mod resources;
pub mod supervisor;
pub mod terminator;

pub use launch::{LaunchPlan, LaunchTarget, resolve_launch};
pub use pump::strip_ansi;
pub use resources::ResourceUsage;
pub use supervisor::ProcessSupervisor;
pub use terminator::{PlatformTerminator, Terminator};

/// Opaque handle returned by [`ProcessSupervisor::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcessId(u64);

impl ProcessId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Crashed,
}

impl ProcessState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessState::Stopped => "stopped",
            ProcessState::Starting => "starting",
            ProcessState::Running => "running",
            ProcessState::Stopping => "stopping",
            ProcessState::Crashed => "crashed",
        }
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Escalation steps taken by `stop`, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopStep {
    /// The stop command was written to stdin.
    StopCommand,
    Terminate,
    Kill,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// Nothing was running; no signal was sent.
    AlreadyStopped,
    /// Exited after the stop command, within the grace timeout.
    Graceful,
    Terminated,
    Killed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopReport {
    pub outcome: StopOutcome,
    pub exit_code: Option<i32>,
}

/// One line of console output, ANSI-stripped and timestamped on arrival.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputLine {
    pub received_at: DateTime<Local>,
    pub text: String,
}

impl fmt::Display for OutputLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.received_at.format("%H:%M:%S"), self.text)
    }
}

/// Everything observable about supervised processes.
///
/// `generation` identifies the launch an event belongs to; it increases by
/// one on every start attempt of the same process.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessEvent {
    StateChanged {
        id: ProcessId,
        generation: u64,
        state: ProcessState,
    },
    Output {
        id: ProcessId,
        generation: u64,
        line: OutputLine,
    },
    CommandSent {
        id: ProcessId,
        generation: u64,
        command: String,
    },
    StopEscalated {
        id: ProcessId,
        generation: u64,
        step: StopStep,
    },
    /// Emitted exactly once per launch, after the child has been reaped.
    Exited {
        id: ProcessId,
        generation: u64,
        code: i32,
        /// True when the exit followed a `stop` request.
        requested: bool,
    },
}

impl ProcessEvent {
    pub fn id(&self) -> ProcessId {
        match self {
            ProcessEvent::StateChanged { id, .. }
            | ProcessEvent::Output { id, .. }
            | ProcessEvent::CommandSent { id, .. }
            | ProcessEvent::StopEscalated { id, .. }
            | ProcessEvent::Exited { id, .. } => *id,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessSnapshot {
    pub id: ProcessId,
    pub working_dir: PathBuf,
    pub state: ProcessState,
    pub pid: Option<u32>,
    pub generation: u64,
    /// Exit code of the last finished launch; cleared on start.
    pub exit_code: Option<i32>,
}
