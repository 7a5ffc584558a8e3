// src/download/worker.rs

//! The transfer itself: size lookup, resumable GET, chunked write, finalize.

use std::path::Path;

use futures_util::StreamExt;
use reqwest::header::{CONTENT_LENGTH, HeaderMap, RANGE};
use reqwest::{Client, Response, StatusCode};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::config::DownloadConfig;
use crate::download::progress::ProgressThrottle;
use crate::download::task::{DownloadProgress, DownloadTask};
use crate::errors::DownloadError;
use crate::retry::RetryPolicy;

/// Run one transfer to completion. Returns the final size on disk.
///
/// On success the destination holds the complete file and the temporary
/// file is gone. On failure the temporary file is left for the caller to
/// clean up.
pub(crate) async fn run_transfer(
    client: &Client,
    config: &DownloadConfig,
    task: &DownloadTask,
    on_progress: &(dyn Fn(DownloadProgress) + Send + Sync),
) -> Result<u64, DownloadError> {
    let url = task.url();
    let temp = task.temp_path();

    let mut total = head_total(client, config, url).await;
    ensure_not_cancelled(task)?;

    let mut offset = existing_offset(temp).await?;

    let response = send_get(client, config, url, offset).await?;
    if offset > 0 && response.status() != StatusCode::PARTIAL_CONTENT {
        info!(url, offset, "server ignored range request; restarting from zero");
        offset = 0;
    }
    if total == 0 {
        if let Some(len) = header_length(response.headers()) {
            total = offset + len;
        }
    }

    let mut file = open_temp(temp, offset).await?;
    task.set_total(total);
    task.record_bytes(offset);
    on_progress(task.progress());

    debug!(url, offset, total, "streaming body");
    let downloaded = stream_body(config, task, response, &mut file, offset, total, on_progress).await?;

    file.flush()
        .await
        .map_err(|e| DownloadError::disk(temp, e))?;
    file.sync_all()
        .await
        .map_err(|e| DownloadError::disk(temp, e))?;
    drop(file);

    if total > 0 && downloaded != total {
        return Err(DownloadError::Truncated {
            url: url.to_string(),
            expected: total,
            actual: downloaded,
        });
    }

    fs::rename(temp, task.destination())
        .await
        .map_err(|e| DownloadError::disk(task.destination(), e))?;

    Ok(downloaded)
}

fn ensure_not_cancelled(task: &DownloadTask) -> Result<(), DownloadError> {
    if task.is_cancelled() {
        return Err(DownloadError::Cancelled {
            url: task.url().to_string(),
        });
    }
    Ok(())
}

fn header_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
}

fn check_status(url: &str, response: Response) -> Result<Response, DownloadError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(DownloadError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        })
    }
}

/// Total size from a HEAD request. Any failure just means "unknown" (0).
async fn head_total(client: &Client, config: &DownloadConfig, url: &str) -> u64 {
    let policy = RetryPolicy::new(config.head_attempts, config.retry_base_delay);
    let result = policy
        .execute(|| async move {
            let response = client
                .head(url)
                .timeout(config.connect_timeout)
                .send()
                .await
                .map_err(|e| DownloadError::network(url, e))?;
            let response = check_status(url, response)?;
            Ok::<_, DownloadError>(header_length(response.headers()).unwrap_or(0))
        })
        .await;

    match result {
        Ok(total) => total,
        Err(err) => {
            let err = DownloadError::from(err);
            warn!(url, error = %err, "size lookup failed; total unknown");
            0
        }
    }
}

/// Size of an existing partial file, or 0 after making sure the
/// destination directory exists.
async fn existing_offset(temp: &Path) -> Result<u64, DownloadError> {
    match fs::metadata(temp).await {
        Ok(meta) => {
            if meta.len() > 0 {
                info!(path = ?temp, offset = meta.len(), "resuming partial download");
            }
            Ok(meta.len())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            if let Some(parent) = temp.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)
                        .await
                        .map_err(|e| DownloadError::disk(parent, e))?;
                }
            }
            Ok(0)
        }
        Err(e) => Err(DownloadError::disk(temp, e)),
    }
}

async fn send_get(
    client: &Client,
    config: &DownloadConfig,
    url: &str,
    offset: u64,
) -> Result<Response, DownloadError> {
    let policy = RetryPolicy::new(config.get_attempts, config.retry_base_delay);
    let response = policy
        .execute(|| async move {
            let mut request = client.get(url);
            if offset > 0 {
                request = request.header(RANGE, format!("bytes={}-", offset));
            }
            let response = request
                .send()
                .await
                .map_err(|e| DownloadError::network(url, e))?;
            check_status(url, response)
        })
        .await?;
    Ok(response)
}

async fn open_temp(temp: &Path, offset: u64) -> Result<File, DownloadError> {
    let mut options = OpenOptions::new();
    if offset > 0 {
        options.append(true);
    } else {
        options.write(true).create(true).truncate(true);
    }
    options
        .open(temp)
        .await
        .map_err(|e| DownloadError::disk(temp, e))
}

async fn stream_body(
    config: &DownloadConfig,
    task: &DownloadTask,
    response: Response,
    file: &mut File,
    offset: u64,
    total: u64,
    on_progress: &(dyn Fn(DownloadProgress) + Send + Sync),
) -> Result<u64, DownloadError> {
    let url = task.url();
    let temp = task.temp_path();
    let mut throttle = ProgressThrottle::new(total, config.min_progress_interval, offset);
    let mut downloaded = offset;
    let mut stream = response.bytes_stream();

    loop {
        let next = tokio::time::timeout(config.read_timeout, stream.next())
            .await
            .map_err(|_| DownloadError::ReadTimeout {
                url: url.to_string(),
                timeout_secs: config.read_timeout.as_secs(),
            })?;
        let Some(chunk) = next else {
            break;
        };
        let chunk = chunk.map_err(|e| DownloadError::network(url, e))?;

        for piece in chunk.chunks(config.chunk_size) {
            ensure_not_cancelled(task)?;
            file.write_all(piece)
                .await
                .map_err(|e| DownloadError::disk(temp, e))?;
            downloaded += piece.len() as u64;
            task.record_bytes(downloaded);
            if throttle.should_report(downloaded) {
                on_progress(task.progress());
            }
        }
    }

    if throttle.finish(downloaded) {
        on_progress(task.progress());
    }
    Ok(downloaded)
}
