// src/download/task.rs

//! Per-transfer state shared between the registry and its worker.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::fs::tmp_sibling;

/// Lifecycle of a [`DownloadTask`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadState {
    Pending,
    InFlight,
    Cancelled,
    Failed,
    Completed,
}

impl DownloadState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DownloadState::Cancelled | DownloadState::Failed | DownloadState::Completed
        )
    }
}

/// Progress report handed to `on_progress`.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadProgress {
    pub url: String,
    pub bytes_downloaded: u64,
    /// Zero when the server did not report a size.
    pub bytes_total: u64,
}

impl DownloadProgress {
    /// Percentage in `0.0..=100.0`, or `None` if the total is unknown.
    pub fn percent(&self) -> Option<f64> {
        if self.bytes_total == 0 {
            return None;
        }
        let pct = self.bytes_downloaded as f64 / self.bytes_total as f64 * 100.0;
        Some(pct.min(100.0))
    }
}

/// Point-in-time copy of a task, for listings.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadSnapshot {
    pub url: String,
    pub destination: PathBuf,
    pub state: DownloadState,
    pub bytes_downloaded: u64,
    pub bytes_total: u64,
    pub cancel_requested: bool,
}

/// One transfer. The worker is the only writer of the byte counters and the
/// state; the registry only ever sets the cancellation flag.
#[derive(Debug)]
pub struct DownloadTask {
    url: String,
    destination: PathBuf,
    temp_path: PathBuf,
    state: Mutex<DownloadState>,
    bytes_downloaded: AtomicU64,
    bytes_total: AtomicU64,
    cancelled: AtomicBool,
}

impl DownloadTask {
    pub fn new(url: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        let destination = destination.into();
        Self {
            url: url.into(),
            temp_path: tmp_sibling(&destination),
            destination,
            state: Mutex::new(DownloadState::Pending),
            bytes_downloaded: AtomicU64::new(0),
            bytes_total: AtomicU64::new(0),
            cancelled: AtomicBool::new(false),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    pub fn state(&self) -> DownloadState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn set_state(&self, state: DownloadState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub(crate) fn record_bytes(&self, downloaded: u64) {
        self.bytes_downloaded.store(downloaded, Ordering::Release);
    }

    pub(crate) fn set_total(&self, total: u64) {
        self.bytes_total.store(total, Ordering::Release);
    }

    pub fn progress(&self) -> DownloadProgress {
        DownloadProgress {
            url: self.url.clone(),
            bytes_downloaded: self.bytes_downloaded.load(Ordering::Acquire),
            bytes_total: self.bytes_total.load(Ordering::Acquire),
        }
    }

    pub fn snapshot(&self) -> DownloadSnapshot {
        let progress = self.progress();
        DownloadSnapshot {
            url: self.url.clone(),
            destination: self.destination.clone(),
            state: self.state(),
            bytes_downloaded: progress.bytes_downloaded,
            bytes_total: progress.bytes_total,
            cancel_requested: self.is_cancelled(),
        }
    }
}
