// src/download/manager.rs

//! Registry of in-flight downloads and the entry point for starting them.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Context;
use reqwest::Client;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::config::DownloadConfig;
use crate::download::task::{DownloadProgress, DownloadSnapshot, DownloadState, DownloadTask};
use crate::download::worker;
use crate::errors::{DownloadError, Result};

type Registry = Arc<Mutex<HashMap<String, Arc<DownloadTask>>>>;

fn lock(registry: &Registry) -> MutexGuard<'_, HashMap<String, Arc<DownloadTask>>> {
    registry.lock().unwrap_or_else(|e| e.into_inner())
}

/// Removes a task from the registry when its worker finishes, even if the
/// worker panics.
struct RegistryGuard {
    registry: Registry,
    url: String,
}

impl Drop for RegistryGuard {
    fn drop(&mut self) {
        lock(&self.registry).remove(&self.url);
    }
}

/// Concurrent download manager.
///
/// At most one transfer per URL is active at a time. Each transfer runs on
/// its own tokio task; callers observe it through the `on_progress` and
/// `on_complete` callbacks, or through [`DownloadManager::download`].
#[derive(Clone)]
pub struct DownloadManager {
    client: Client,
    config: Arc<DownloadConfig>,
    registry: Registry,
    runtime: Handle,
}

impl std::fmt::Debug for DownloadManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadManager")
            .field("config", &self.config)
            .field("active", &lock(&self.registry).len())
            .finish()
    }
}

impl DownloadManager {
    /// Must be called from within a tokio runtime; workers are spawned on it.
    pub fn new(config: DownloadConfig) -> Result<Self> {
        let runtime = Handle::try_current().context("download manager needs a tokio runtime")?;
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .context("building HTTP client")?;

        Ok(Self {
            client,
            config: Arc::new(config),
            registry: Arc::new(Mutex::new(HashMap::new())),
            runtime,
        })
    }

    pub fn config(&self) -> &DownloadConfig {
        &self.config
    }

    /// Start downloading `url` to `destination` in the background.
    ///
    /// Returns `false`, and invokes neither callback, if a transfer of the
    /// same URL is already active. `on_complete` runs exactly once, after
    /// the URL has been released from the registry.
    pub fn start_download<P, C>(
        &self,
        url: &str,
        destination: impl Into<PathBuf>,
        on_progress: P,
        on_complete: C,
    ) -> bool
    where
        P: Fn(DownloadProgress) + Send + Sync + 'static,
        C: FnOnce(std::result::Result<PathBuf, DownloadError>) + Send + 'static,
    {
        let task = {
            let mut registry = lock(&self.registry);
            if registry.contains_key(url) {
                debug!(url, "download already active; ignoring");
                return false;
            }
            let task = Arc::new(DownloadTask::new(url, destination));
            registry.insert(url.to_string(), task.clone());
            task
        };

        info!(url, destination = ?task.destination(), "download started");

        let guard = RegistryGuard {
            registry: self.registry.clone(),
            url: url.to_string(),
        };
        let client = self.client.clone();
        let config = self.config.clone();

        self.runtime.spawn(async move {
            task.set_state(DownloadState::InFlight);
            let result = worker::run_transfer(&client, &config, &task, &on_progress).await;

            let outcome = match result {
                Ok(bytes) => {
                    task.set_state(DownloadState::Completed);
                    info!(url = task.url(), bytes, destination = ?task.destination(), "download complete");
                    Ok(task.destination().to_path_buf())
                }
                Err(err) => {
                    discard_partial(&task).await;
                    if err.is_cancelled() {
                        task.set_state(DownloadState::Cancelled);
                        info!(url = task.url(), "download cancelled");
                    } else {
                        task.set_state(DownloadState::Failed);
                        error!(url = task.url(), error = %err, "download failed");
                    }
                    Err(err)
                }
            };

            drop(guard);
            on_complete(outcome);
        });

        true
    }

    /// Start a download and wait for it to finish.
    pub async fn download<P>(
        &self,
        url: &str,
        destination: impl Into<PathBuf>,
        on_progress: P,
    ) -> std::result::Result<PathBuf, DownloadError>
    where
        P: Fn(DownloadProgress) + Send + Sync + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let started = self.start_download(url, destination, on_progress, move |outcome| {
            let _ = tx.send(outcome);
        });
        if !started {
            return Err(DownloadError::Duplicate {
                url: url.to_string(),
            });
        }
        rx.await.map_err(|_| DownloadError::WorkerLost {
            url: url.to_string(),
        })?
    }

    /// Request cancellation of the transfer for `url`.
    ///
    /// Returns whether an active transfer was found. The worker notices at
    /// its next chunk boundary.
    pub fn cancel_download(&self, url: &str) -> bool {
        match lock(&self.registry).get(url) {
            Some(task) => {
                task.cancel();
                info!(url, "download cancellation requested");
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) {
        let registry = lock(&self.registry);
        for task in registry.values() {
            task.cancel();
        }
        if !registry.is_empty() {
            info!(count = registry.len(), "cancelling all downloads");
        }
    }

    pub fn is_active(&self, url: &str) -> bool {
        lock(&self.registry).contains_key(url)
    }

    pub fn active_downloads(&self) -> Vec<DownloadSnapshot> {
        let mut snapshots: Vec<_> = lock(&self.registry)
            .values()
            .map(|task| task.snapshot())
            .collect();
        snapshots.sort_by(|a, b| a.url.cmp(&b.url));
        snapshots
    }
}

async fn discard_partial(task: &DownloadTask) {
    match tokio::fs::remove_file(task.temp_path()).await {
        Ok(()) => debug!(path = ?task.temp_path(), "removed partial file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = ?task.temp_path(), error = %e, "failed to remove partial file"),
    }
}
