// src/download/mod.rs

//! Resumable HTTP downloads of server cores.
//!
//! - `task.rs`: per-transfer state and progress snapshots.
//! - `manager.rs`: the URL-keyed registry and worker spawning.
//! - `worker.rs`: HEAD size lookup, ranged GET, chunked write, atomic rename.
//! - `progress.rs`: progress callback throttling.
//! - `integrity.rs`: size/magic gate for finished cores.

pub mod integrity;
pub mod manager;
pub mod progress;
pub mod task;
mod worker;

pub use integrity::{IntegrityError, accept_core_file, validate_core_file};
pub use manager::DownloadManager;
pub use progress::ProgressThrottle;
pub use task::{DownloadProgress, DownloadSnapshot, DownloadState, DownloadTask};
