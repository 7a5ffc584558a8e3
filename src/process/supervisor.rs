// src/process/supervisor.rs

//! Registry of managed server processes and their lifecycle.
//!
//! Locking:
//! - the registry map is a `std::sync::Mutex`, held only for map lookups;
//! - each process has a `tokio::sync::Mutex<ProcessInner>` guarding state,
//!   the console queue and exit bookkeeping. No I/O is awaited while it is
//!   held; `stop` releases it while waiting for the child and the `Stopping`
//!   state keeps other operations out meanwhile.
//!
//! Each launch runs two tokio tasks. The monitor pumps output, reaps the
//! child, performs the terminal state transition and publishes the exit code
//! on a per-launch watch channel that `stop` waits on. The console writer
//! owns the child's stdin and drains a bounded queue of lines into it, so a
//! server that stops reading its console can stall only that task.

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures_util::future::join_all;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::config::{LaunchConfig, SupervisorConfig};
use crate::errors::ProcessError;
use crate::fs::{FileSystem, RealFileSystem};
use crate::process::launch::resolve_launch;
use crate::process::pump::pump_lines;
use crate::process::resources::{ResourceUsage, sample_tree};
use crate::process::terminator::{PlatformTerminator, Terminator};
use crate::process::{
    ProcessEvent, ProcessId, ProcessSnapshot, ProcessState, StopOutcome, StopReport, StopStep,
};

/// Console lines that may be queued ahead of the writer task.
const CONSOLE_QUEUE: usize = 64;

type Registry = HashMap<ProcessId, Arc<ManagedProcess>>;
type ExitReceiver = watch::Receiver<Option<i32>>;

#[derive(Debug)]
struct ManagedProcess {
    id: ProcessId,
    working_dir: PathBuf,
    inner: tokio::sync::Mutex<ProcessInner>,
}

#[derive(Debug)]
struct ProcessInner {
    state: ProcessState,
    generation: u64,
    pid: Option<u32>,
    exit_code: Option<i32>,
    console: Option<mpsc::Sender<String>>,
    exit_rx: Option<ExitReceiver>,
    removed: bool,
}

impl ProcessInner {
    fn new() -> Self {
        Self {
            state: ProcessState::Stopped,
            generation: 0,
            pid: None,
            exit_code: None,
            console: None,
            exit_rx: None,
            removed: false,
        }
    }
}

/// Starts, stops and watches server processes.
#[derive(Debug)]
pub struct ProcessSupervisor {
    config: SupervisorConfig,
    launch: LaunchConfig,
    fs: Arc<dyn FileSystem>,
    terminator: Arc<dyn Terminator>,
    registry: Mutex<Registry>,
    next_id: AtomicU64,
    events: broadcast::Sender<ProcessEvent>,
}

impl ProcessSupervisor {
    pub fn new(config: SupervisorConfig, launch: LaunchConfig) -> Self {
        Self::with_backends(
            config,
            launch,
            Arc::new(RealFileSystem),
            Arc::new(PlatformTerminator),
        )
    }

    pub fn with_backends(
        config: SupervisorConfig,
        launch: LaunchConfig,
        fs: Arc<dyn FileSystem>,
        terminator: Arc<dyn Terminator>,
    ) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            config,
            launch,
            fs,
            terminator,
            registry: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            events,
        }
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn get(&self, id: ProcessId) -> Result<Arc<ManagedProcess>, ProcessError> {
        self.registry()
            .get(&id)
            .cloned()
            .ok_or(ProcessError::UnknownProcess(id))
    }

    /// Receive every event emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ProcessEvent> {
        self.events.subscribe()
    }

    /// Put a server directory under supervision. The process starts out
    /// `Stopped`.
    pub fn register(&self, working_dir: impl Into<PathBuf>) -> ProcessId {
        let id = ProcessId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let working_dir = working_dir.into();
        info!(server = %id, dir = ?working_dir, "registered server");
        let process = Arc::new(ManagedProcess {
            id,
            working_dir,
            inner: tokio::sync::Mutex::new(ProcessInner::new()),
        });
        self.registry().insert(id, process);
        id
    }

    /// Drop a stopped process from the registry.
    pub async fn remove(&self, id: ProcessId) -> Result<(), ProcessError> {
        let process = self.get(id)?;
        let mut inner = process.inner.lock().await;
        if inner.state != ProcessState::Stopped {
            return Err(ProcessError::InvalidState {
                id,
                operation: "remove",
                state: inner.state,
                expected: ProcessState::Stopped,
            });
        }
        inner.removed = true;
        self.registry().remove(&id);
        info!(server = %id, "removed server");
        Ok(())
    }

    pub async fn snapshot(&self, id: ProcessId) -> Result<ProcessSnapshot, ProcessError> {
        let process = self.get(id)?;
        let inner = process.inner.lock().await;
        Ok(snapshot_of(&process, &inner))
    }

    pub async fn state(&self, id: ProcessId) -> Result<ProcessState, ProcessError> {
        let process = self.get(id)?;
        let state = process.inner.lock().await.state;
        Ok(state)
    }

    /// Snapshots of every registered process, ordered by id.
    pub async fn list(&self) -> Vec<ProcessSnapshot> {
        let mut processes: Vec<_> = self.registry().values().cloned().collect();
        processes.sort_by_key(|p| p.id);

        let mut snapshots = Vec::with_capacity(processes.len());
        for process in processes {
            let inner = process.inner.lock().await;
            snapshots.push(snapshot_of(&process, &inner));
        }
        snapshots
    }

    /// Launch the server. Returns the generation of the new launch.
    pub async fn start(&self, id: ProcessId) -> Result<u64, ProcessError> {
        let process = self.get(id)?;
        let mut inner = process.inner.lock().await;
        if inner.removed {
            return Err(ProcessError::UnknownProcess(id));
        }
        if inner.state != ProcessState::Stopped {
            return Err(ProcessError::InvalidState {
                id,
                operation: "start",
                state: inner.state,
                expected: ProcessState::Stopped,
            });
        }

        inner.generation += 1;
        inner.exit_code = None;
        let generation = inner.generation;
        self.transition(id, &mut inner, ProcessState::Starting);

        let plan = match resolve_launch(self.fs.as_ref(), &process.working_dir, &self.launch) {
            Ok(plan) => plan,
            Err(err) => {
                warn!(server = %id, error = %err, "nothing to launch");
                self.transition(id, &mut inner, ProcessState::Stopped);
                return Err(err);
            }
        };

        let mut child = match plan.command(&process.working_dir).spawn() {
            Ok(child) => child,
            Err(source) => {
                error!(server = %id, command = %plan.describe(), error = %source, "spawn failed");
                self.transition(id, &mut inner, ProcessState::Stopped);
                return Err(ProcessError::Spawn {
                    dir: process.working_dir.clone(),
                    command: plan.describe(),
                    source,
                });
            }
        };

        let pid = child.id();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let (exit_tx, exit_rx) = watch::channel(None);

        inner.console = child.stdin.take().map(|stdin| {
            let (tx, rx) = mpsc::channel(CONSOLE_QUEUE);
            tokio::spawn(console_writer(id, generation, stdin, rx));
            tx
        });
        inner.pid = pid;
        inner.exit_rx = Some(exit_rx);
        self.transition(id, &mut inner, ProcessState::Running);

        info!(
            server = %id,
            generation,
            pid = ?pid,
            command = %plan.describe(),
            dir = ?process.working_dir,
            "server process started"
        );

        tokio::spawn(monitor(
            process.clone(),
            generation,
            child,
            stdout,
            stderr,
            exit_tx,
            self.events.clone(),
        ));

        Ok(generation)
    }

    /// Stop the server: stop command, then terminate, then kill.
    ///
    /// A process that is already stopped yields `AlreadyStopped` without any
    /// signal being sent. If the process survives every step the state goes
    /// back to `Running` and `Unkillable` is returned.
    pub async fn stop(&self, id: ProcessId) -> Result<StopReport, ProcessError> {
        let process = self.get(id)?;

        let (mut exit_rx, pid, generation) = {
            let mut inner = process.inner.lock().await;
            match inner.state {
                ProcessState::Stopped | ProcessState::Crashed => {
                    debug!(server = %id, "stop requested but server is not running");
                    return Ok(StopReport {
                        outcome: StopOutcome::AlreadyStopped,
                        exit_code: inner.exit_code,
                    });
                }
                ProcessState::Starting | ProcessState::Stopping => {
                    return Err(ProcessError::InvalidState {
                        id,
                        operation: "stop",
                        state: inner.state,
                        expected: ProcessState::Running,
                    });
                }
                ProcessState::Running => {}
            }

            let Some(exit_rx) = inner.exit_rx.clone() else {
                return Ok(StopReport {
                    outcome: StopOutcome::AlreadyStopped,
                    exit_code: inner.exit_code,
                });
            };

            self.transition(id, &mut inner, ProcessState::Stopping);
            let generation = inner.generation;
            self.emit(ProcessEvent::StopEscalated {
                id,
                generation,
                step: StopStep::StopCommand,
            });

            let queued = inner
                .console
                .as_ref()
                .map(|tx| tx.try_send(self.config.stop_command.clone()));
            match queued {
                Some(Ok(())) => debug!(server = %id, "stop command queued"),
                Some(Err(e)) => warn!(server = %id, error = %e, "could not queue stop command"),
                None => warn!(server = %id, "console closed; skipping stop command"),
            }

            (exit_rx, inner.pid, generation)
        };

        if let Some(code) = wait_exit(&mut exit_rx, self.config.grace_timeout).await {
            info!(server = %id, code, "server stopped gracefully");
            return Ok(StopReport {
                outcome: StopOutcome::Graceful,
                exit_code: Some(code),
            });
        }

        warn!(
            server = %id,
            grace_ms = self.config.grace_timeout.as_millis() as u64,
            "server ignored stop command; terminating"
        );
        self.emit(ProcessEvent::StopEscalated {
            id,
            generation,
            step: StopStep::Terminate,
        });
        if let Some(pid) = pid {
            if let Err(e) = self.terminator.terminate(pid) {
                warn!(server = %id, pid, error = %e, "terminate failed");
            }
        }
        if let Some(code) = wait_exit(&mut exit_rx, self.config.terminate_timeout).await {
            info!(server = %id, code, "server terminated");
            return Ok(StopReport {
                outcome: StopOutcome::Terminated,
                exit_code: Some(code),
            });
        }

        warn!(server = %id, "server survived terminate; killing");
        self.emit(ProcessEvent::StopEscalated {
            id,
            generation,
            step: StopStep::Kill,
        });
        if let Some(pid) = pid {
            if let Err(e) = self.terminator.force_kill(pid) {
                warn!(server = %id, pid, error = %e, "kill failed");
            }
        }
        if let Some(code) = wait_exit(&mut exit_rx, self.config.kill_timeout).await {
            info!(server = %id, code, "server killed");
            return Ok(StopReport {
                outcome: StopOutcome::Killed,
                exit_code: Some(code),
            });
        }

        {
            let mut inner = process.inner.lock().await;
            if inner.generation == generation && inner.state == ProcessState::Stopping {
                self.transition(id, &mut inner, ProcessState::Running);
            }
        }
        error!(server = %id, pid = ?pid, "server survived terminate and kill");
        Err(ProcessError::Unkillable {
            id,
            pid: pid.unwrap_or_default(),
            dir: process.working_dir.clone(),
        })
    }

    /// Stop, wait for the settle delay, start again.
    pub async fn restart(&self, id: ProcessId) -> Result<u64, ProcessError> {
        let report = self.stop(id).await?;
        debug!(server = %id, outcome = ?report.outcome, "restart: stopped");
        tokio::time::sleep(self.config.restart_settle).await;
        self.start(id).await
    }

    /// Queue `text` plus a newline for the server console.
    ///
    /// Never waits on the child: if the server has stopped reading and the
    /// queue is full, this fails with a `WouldBlock` stdin error.
    pub async fn send_command(&self, id: ProcessId, text: &str) -> Result<(), ProcessError> {
        let process = self.get(id)?;
        let mut inner = process.inner.lock().await;
        if inner.state != ProcessState::Running {
            return Err(ProcessError::InvalidState {
                id,
                operation: "send_command",
                state: inner.state,
                expected: ProcessState::Running,
            });
        }

        let generation = inner.generation;
        let stdin_error = |kind: io::ErrorKind, msg: &str| ProcessError::Stdin {
            id,
            dir: process.working_dir.clone(),
            source: io::Error::new(kind, msg.to_string()),
        };
        let console = inner
            .console
            .as_ref()
            .ok_or_else(|| stdin_error(io::ErrorKind::BrokenPipe, "stdin closed"))?;
        console.try_send(text.to_string()).map_err(|e| match e {
            TrySendError::Full(_) => {
                stdin_error(io::ErrorKind::WouldBlock, "console is not reading input")
            }
            TrySendError::Closed(_) => stdin_error(io::ErrorKind::BrokenPipe, "stdin closed"),
        })?;

        debug!(server = %id, command = %text, "command queued");
        self.emit(ProcessEvent::CommandSent {
            id,
            generation,
            command: text.to_string(),
        });
        Ok(())
    }

    /// Stop every registered process concurrently.
    pub async fn stop_all(&self) -> Vec<(ProcessId, Result<StopReport, ProcessError>)> {
        let mut ids: Vec<ProcessId> = self.registry().keys().copied().collect();
        ids.sort();
        let results = join_all(ids.iter().map(|id| self.stop(*id))).await;
        ids.into_iter().zip(results).collect()
    }

    /// CPU and memory of the server's process tree, or `None` when nothing
    /// is running. Takes about the minimum CPU sampling interval.
    pub async fn resource_usage(
        &self,
        id: ProcessId,
    ) -> Result<Option<ResourceUsage>, ProcessError> {
        let process = self.get(id)?;
        let pid = {
            let inner = process.inner.lock().await;
            match (inner.state, inner.pid) {
                (ProcessState::Running | ProcessState::Stopping, Some(pid)) => pid,
                _ => return Ok(None),
            }
        };

        match tokio::task::spawn_blocking(move || sample_tree(pid)).await {
            Ok(usage) => Ok(usage),
            Err(e) => {
                warn!(server = %id, pid, error = %e, "resource sampling failed");
                Ok(None)
            }
        }
    }

    fn emit(&self, event: ProcessEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn transition(&self, id: ProcessId, inner: &mut ProcessInner, state: ProcessState) {
        transition(&self.events, id, inner, state);
    }
}

fn snapshot_of(process: &ManagedProcess, inner: &ProcessInner) -> ProcessSnapshot {
    ProcessSnapshot {
        id: process.id,
        working_dir: process.working_dir.clone(),
        state: inner.state,
        pid: inner.pid,
        generation: inner.generation,
        exit_code: inner.exit_code,
    }
}

fn transition(
    events: &broadcast::Sender<ProcessEvent>,
    id: ProcessId,
    inner: &mut ProcessInner,
    state: ProcessState,
) {
    debug!(server = %id, from = %inner.state, to = %state, "state change");
    inner.state = state;
    let _ = events.send(ProcessEvent::StateChanged {
        id,
        generation: inner.generation,
        state,
    });
}

/// Feed queued console lines to the child until the queue closes or the pipe
/// breaks.
async fn console_writer(
    id: ProcessId,
    generation: u64,
    mut stdin: ChildStdin,
    mut lines: mpsc::Receiver<String>,
) {
    while let Some(line) = lines.recv().await {
        if let Err(e) = write_line(&mut stdin, &line).await {
            debug!(server = %id, generation, error = %e, "console closed");
            break;
        }
    }
}

async fn write_line(stdin: &mut ChildStdin, text: &str) -> io::Result<()> {
    stdin.write_all(text.as_bytes()).await?;
    stdin.write_all(b"\n").await?;
    stdin.flush().await
}

/// Wait up to `limit` for the launch to exit. `None` means still running.
async fn wait_exit(exit_rx: &mut ExitReceiver, limit: Duration) -> Option<i32> {
    match tokio::time::timeout(limit, exit_rx.wait_for(Option::is_some)).await {
        Ok(Ok(code)) => *code,
        // Monitor gone without publishing; the child was dropped with it.
        Ok(Err(_)) => Some(-1),
        Err(_) => None,
    }
}

/// Exit code as reported to callers; a Unix signal death becomes `-signal`.
pub(crate) fn exit_code_of(status: &ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }
    -1
}

async fn monitor(
    process: Arc<ManagedProcess>,
    generation: u64,
    mut child: Child,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
    exit_tx: watch::Sender<Option<i32>>,
    events: broadcast::Sender<ProcessEvent>,
) {
    let id = process.id;

    pump_lines(stdout, stderr, |line| {
        debug!(server = %id, generation, "{}", line.text);
        let _ = events.send(ProcessEvent::Output {
            id,
            generation,
            line,
        });
    })
    .await;

    let code = match child.wait().await {
        Ok(status) => exit_code_of(&status),
        Err(e) => {
            warn!(server = %id, generation, error = %e, "failed to reap server process");
            -1
        }
    };

    let requested = {
        let mut inner = process.inner.lock().await;
        if inner.generation != generation {
            false
        } else {
            let requested = inner.state == ProcessState::Stopping;
            inner.console = None;
            inner.pid = None;
            inner.exit_code = Some(code);
            match inner.state {
                ProcessState::Stopping => {}
                ProcessState::Running if code == 0 => {
                    info!(server = %id, generation, "server exited cleanly");
                }
                _ => {
                    warn!(server = %id, generation, code, dir = ?process.working_dir, "server crashed");
                    transition(&events, id, &mut inner, ProcessState::Crashed);
                }
            }
            transition(&events, id, &mut inner, ProcessState::Stopped);
            requested
        }
    };

    let _ = exit_tx.send(Some(code));
    let _ = events.send(ProcessEvent::Exited {
        id,
        generation,
        code,
        requested,
    });
}
