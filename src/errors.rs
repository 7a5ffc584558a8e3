// src/errors.rs

//! Crate-wide error types.
//!
//! `WardenError` is the top-level error used by config loading and the CLI.
//! The two subsystems have their own taxonomies ([`DownloadError`],
//! [`ProcessError`]) so callers can tell a user cancellation from a network
//! failure, or a spawn failure from an unkillable process, without string
//! matching.

use std::path::PathBuf;

use thiserror::Error;

use crate::download::integrity::IntegrityError;
use crate::process::{ProcessId, ProcessState};
use crate::retry::{RetryError, Transient};
use crate::types::ServerKind;

#[derive(Error, Debug)]
pub enum WardenError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerError(#[from] toml::ser::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error(transparent)]
    Integrity(#[from] IntegrityError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, WardenError>;

/// Failure of a single transfer.
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("network error fetching {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} answered HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("download of {url} cancelled by user")]
    Cancelled { url: String },

    #[error("a download of {url} is already in progress")]
    Duplicate { url: String },

    #[error("disk error on {path:?}: {source}")]
    Disk {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{url} ended after {actual} of {expected} bytes")]
    Truncated {
        url: String,
        expected: u64,
        actual: u64,
    },

    #[error("no chunk received from {url} within {timeout_secs}s")]
    ReadTimeout { url: String, timeout_secs: u64 },

    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<DownloadError>,
    },

    #[error("download worker for {url} stopped without reporting")]
    WorkerLost { url: String },
}

impl DownloadError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DownloadError::Cancelled { .. })
    }

    pub(crate) fn network(url: &str, source: reqwest::Error) -> Self {
        DownloadError::Network {
            url: url.to_string(),
            source,
        }
    }

    pub(crate) fn disk(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DownloadError::Disk {
            path: path.into(),
            source,
        }
    }
}

impl Transient for DownloadError {
    fn is_transient(&self) -> bool {
        match self {
            DownloadError::Network { source, .. } => {
                source.is_timeout()
                    || source.is_connect()
                    || source.is_request()
                    || source.is_body()
            }
            DownloadError::ReadTimeout { .. } => true,
            _ => false,
        }
    }
}

impl From<RetryError<DownloadError>> for DownloadError {
    fn from(err: RetryError<DownloadError>) -> Self {
        match err {
            RetryError::Permanent(e) => e,
            RetryError::Exhausted { attempts, last } => DownloadError::RetriesExhausted {
                attempts,
                last: Box::new(last),
            },
        }
    }
}

/// Failure to resolve a core download URL or version list.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} answered HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("unexpected response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{kind} version '{version}' is not available")]
    UnknownVersion { kind: ServerKind, version: String },
}

/// Failure of a supervisor operation.
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("no managed process with id {0}")]
    UnknownProcess(ProcessId),

    #[error("process {id} is {state}; {operation} needs it {expected}")]
    InvalidState {
        id: ProcessId,
        operation: &'static str,
        state: ProcessState,
        expected: ProcessState,
    },

    #[error("no start script or core file matching '{pattern}' in {dir:?}")]
    LaunchNotFound { dir: PathBuf, pattern: String },

    #[error("failed to spawn `{command}` in {dir:?}: {source}")]
    Spawn {
        dir: PathBuf,
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("writing to stdin of process {id} ({dir:?}): {source}")]
    Stdin {
        id: ProcessId,
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("process {id} (pid {pid}) in {dir:?} survived terminate and kill")]
    Unkillable { id: ProcessId, pid: u32, dir: PathBuf },

    #[error("filesystem error in {dir:?}: {source}")]
    Filesystem {
        dir: PathBuf,
        #[source]
        source: anyhow::Error,
    },
}
