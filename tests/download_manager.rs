mod common;
use crate::common::builders::ConfigFileBuilder;
use crate::common::{init_tracing, with_timeout};

use std::error::Error;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use warden::config::DownloadConfig;
use warden::download::{DownloadManager, DownloadProgress};
use warden::errors::DownloadError;

type TestResult = Result<(), Box<dyn Error>>;

fn body(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

fn fast_config() -> DownloadConfig {
    ConfigFileBuilder::new()
        .retry_base_delay("10ms")
        .read_timeout("5s")
        .min_progress_interval(4 * 1024)
        .build()
        .download
}

fn recorder() -> (Arc<Mutex<Vec<DownloadProgress>>>, impl Fn(DownloadProgress) + Send + Sync + 'static) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    (seen, move |p| sink.lock().unwrap().push(p))
}

#[tokio::test]
async fn download_writes_destination_and_reports_progress() -> TestResult {
    init_tracing();
    let server = MockServer::start().await;
    let payload = body(64 * 1024);
    Mock::given(method("GET"))
        .and(path("/cores/paper.jar"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(payload.clone()))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir()?;
    let dest = dir.path().join("srv").join("paper.jar");
    let url = format!("{}/cores/paper.jar", server.uri());
    let manager = DownloadManager::new(fast_config())?;
    let (seen, on_progress) = recorder();

    let saved = with_timeout(manager.download(&url, &dest, on_progress)).await?;

    assert_eq!(saved, dest);
    assert_eq!(std::fs::read(&dest)?, payload);
    assert!(!dir.path().join("srv").join("paper.jar.tmp").exists());
    assert!(!manager.is_active(&url));

    let seen = seen.lock().unwrap();
    assert!(seen.len() >= 2, "expected initial and final reports, got {}", seen.len());
    assert_eq!(seen.first().map(|p| p.bytes_downloaded), Some(0));
    let last = seen.last().unwrap();
    assert_eq!(last.bytes_downloaded, payload.len() as u64);
    assert_eq!(last.bytes_total, payload.len() as u64);
    assert!(seen.windows(2).all(|w| w[0].bytes_downloaded <= w[1].bytes_downloaded));
    Ok(())
}

#[tokio::test]
async fn second_request_for_same_url_is_ignored_while_active() -> TestResult {
    init_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow.jar"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(body(2048))
                .set_delay(Duration::from_millis(400)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir()?;
    let url = format!("{}/slow.jar", server.uri());
    let manager = DownloadManager::new(fast_config())?;

    let (tx, rx) = oneshot::channel();
    let started = manager.start_download(&url, dir.path().join("a.jar"), |_| {}, move |r| {
        let _ = tx.send(r);
    });
    assert!(started);
    assert!(manager.is_active(&url));

    let completed_twice = Arc::new(Mutex::new(false));
    let flag = completed_twice.clone();
    let again = manager.start_download(&url, dir.path().join("b.jar"), |_| {}, move |_| {
        *flag.lock().unwrap() = true;
    });
    assert!(!again);

    let err = manager
        .download(&url, dir.path().join("c.jar"), |_| {})
        .await
        .unwrap_err();
    assert!(matches!(err, DownloadError::Duplicate { .. }), "{err}");

    let snapshots = manager.active_downloads();
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].destination, dir.path().join("a.jar"));

    let first = with_timeout(rx).await?;
    assert_eq!(first?, dir.path().join("a.jar"));
    assert!(!*completed_twice.lock().unwrap());
    assert!(!dir.path().join("b.jar").exists());

    // Released: the same URL may be fetched again.
    assert!(!manager.is_active(&url));
    Ok(())
}

#[tokio::test]
async fn partial_file_is_resumed_with_range_request() -> TestResult {
    init_tracing();
    let server = MockServer::start().await;
    let payload = body(10_000);
    let offset = 4_000usize;
    Mock::given(method("GET"))
        .and(path("/core.jar"))
        .and(header("range", "bytes=4000-"))
        .respond_with(ResponseTemplate::new(206).set_body_bytes(payload[offset..].to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir()?;
    let dest = dir.path().join("core.jar");
    std::fs::write(dir.path().join("core.jar.tmp"), &payload[..offset])?;

    let manager = DownloadManager::new(fast_config())?;
    let (seen, on_progress) = recorder();
    let url = format!("{}/core.jar", server.uri());
    with_timeout(manager.download(&url, &dest, on_progress)).await?;

    assert_eq!(std::fs::read(&dest)?, payload);
    assert!(!dir.path().join("core.jar.tmp").exists());

    let seen = seen.lock().unwrap();
    assert_eq!(seen.first().map(|p| p.bytes_downloaded), Some(offset as u64));
    assert_eq!(seen.last().map(|p| p.bytes_total), Some(payload.len() as u64));
    Ok(())
}

#[tokio::test]
async fn full_response_to_range_request_restarts_from_zero() -> TestResult {
    init_tracing();
    let server = MockServer::start().await;
    let payload = body(3_000);
    Mock::given(method("GET"))
        .and(path("/core.jar"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(payload.clone()))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir()?;
    let dest = dir.path().join("core.jar");
    std::fs::write(dir.path().join("core.jar.tmp"), b"stale bytes from another file")?;

    let manager = DownloadManager::new(fast_config())?;
    let url = format!("{}/core.jar", server.uri());
    with_timeout(manager.download(&url, &dest, |_| {})).await?;

    assert_eq!(std::fs::read(&dest)?, payload);
    Ok(())
}

#[tokio::test]
async fn http_error_status_is_not_retried_and_leaves_nothing_behind() -> TestResult {
    init_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing.jar"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir()?;
    let dest = dir.path().join("missing.jar");
    let manager = DownloadManager::new(fast_config())?;
    let url = format!("{}/missing.jar", server.uri());

    let err = with_timeout(manager.download(&url, &dest, |_| {}))
        .await
        .unwrap_err();

    assert!(matches!(err, DownloadError::Status { status: 500, .. }), "{err}");
    assert!(!dest.exists());
    assert!(!dir.path().join("missing.jar.tmp").exists());
    assert!(!manager.is_active(&url));
    Ok(())
}

#[tokio::test]
async fn cancelled_download_removes_partial_file() -> TestResult {
    init_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/big.jar"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(body(256 * 1024))
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&server)
        .await;

    let dir = tempfile::tempdir()?;
    let dest = dir.path().join("big.jar");
    let url = format!("{}/big.jar", server.uri());
    let manager = DownloadManager::new(fast_config())?;

    let (tx, rx) = oneshot::channel();
    assert!(manager.start_download(&url, &dest, |_| {}, move |r| {
        let _ = tx.send(r);
    }));
    assert!(manager.cancel_download(&url));

    let err = with_timeout(rx).await?.unwrap_err();
    assert!(err.is_cancelled(), "{err}");
    assert!(!dest.exists());
    assert!(!dir.path().join("big.jar.tmp").exists());
    assert!(!manager.cancel_download(&url), "registry entry should be gone");
    Ok(())
}

#[tokio::test]
async fn cancel_all_stops_every_active_download() -> TestResult {
    init_tracing();
    let server = MockServer::start().await;
    for name in ["/a.jar", "/b.jar"] {
        Mock::given(method("GET"))
            .and(path(name))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(body(128 * 1024))
                    .set_delay(Duration::from_millis(300)),
            )
            .mount(&server)
            .await;
    }

    let dir = tempfile::tempdir()?;
    let manager = DownloadManager::new(fast_config())?;
    let mut completions = Vec::new();
    for name in ["a.jar", "b.jar"] {
        let url = format!("{}/{name}", server.uri());
        let (tx, rx) = oneshot::channel();
        assert!(manager.start_download(&url, dir.path().join(name), |_| {}, move |r| {
            let _ = tx.send(r);
        }));
        completions.push(rx);
    }
    assert_eq!(manager.active_downloads().len(), 2);

    manager.cancel_all();

    for rx in completions {
        let err = with_timeout(rx).await?.unwrap_err();
        assert!(err.is_cancelled(), "{err}");
    }
    assert!(manager.active_downloads().is_empty());
    for name in ["a.jar", "b.jar", "a.jar.tmp", "b.jar.tmp"] {
        assert!(!dir.path().join(name).exists(), "{name} left behind");
    }
    Ok(())
}

#[tokio::test]
async fn bytes_land_in_temp_file_until_transfer_completes() -> TestResult {
    init_tracing();
    let server = MockServer::start().await;
    let payload = body(256 * 1024);
    Mock::given(method("GET"))
        .and(path("/core.jar"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(payload.clone()))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir()?;
    let dest = dir.path().join("core.jar");
    let temp = dir.path().join("core.jar.tmp");
    let url = format!("{}/core.jar", server.uri());
    let manager = DownloadManager::new(fast_config())?;

    // (bytes, temp exists, destination exists) at each report.
    let observed = Arc::new(Mutex::new(Vec::new()));
    let sink = observed.clone();
    let (watch_dest, watch_temp) = (dest.clone(), temp.clone());
    let on_progress = move |p: DownloadProgress| {
        sink.lock()
            .unwrap()
            .push((p.bytes_downloaded, watch_temp.exists(), watch_dest.exists()));
    };

    with_timeout(manager.download(&url, &dest, on_progress)).await?;

    let observed = observed.lock().unwrap();
    let during: Vec<_> = observed.iter().filter(|(bytes, ..)| *bytes > 0).collect();
    assert!(
        during.iter().any(|(bytes, ..)| *bytes < payload.len() as u64),
        "expected reports mid-transfer: {observed:?}"
    );
    for (bytes, temp_exists, dest_exists) in during {
        assert!(*temp_exists, "no temp file at {bytes} bytes");
        assert!(!*dest_exists, "destination visible at {bytes} bytes");
    }
    assert!(!temp.exists());
    assert_eq!(std::fs::read(&dest)?, payload);
    Ok(())
}

/// Answers HEAD with the body length. The first `drops` GETs are read and
/// then hung up on without a response; later GETs get `body`.
async fn flaky_server(
    drops: usize,
    body: Vec<u8>,
) -> std::io::Result<(String, Arc<AtomicUsize>)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let gets = Arc::new(AtomicUsize::new(0));
    let counter = gets.clone();
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let body = body.clone();
            let counter = counter.clone();
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }
                let head = format!(
                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    body.len()
                );
                let response = if request.starts_with(b"HEAD") {
                    head.into_bytes()
                } else if counter.fetch_add(1, Ordering::SeqCst) < drops {
                    return;
                } else {
                    let mut r = head.into_bytes();
                    r.extend_from_slice(&body);
                    r
                };
                let _ = socket.write_all(&response).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    Ok((format!("http://{addr}/core.jar"), gets))
}

#[tokio::test]
async fn dropped_connections_are_retried_until_attempts_run_out() -> TestResult {
    init_tracing();
    let (url, gets) = flaky_server(usize::MAX, body(2_000)).await?;
    let config = ConfigFileBuilder::new()
        .retry_base_delay("10ms")
        .get_attempts(3)
        .build()
        .download;

    let dir = tempfile::tempdir()?;
    let dest = dir.path().join("core.jar");
    let manager = DownloadManager::new(config)?;

    let err = with_timeout(manager.download(&url, &dest, |_| {}))
        .await
        .unwrap_err();

    match err {
        DownloadError::RetriesExhausted { attempts, last } => {
            assert_eq!(attempts, 3);
            assert!(matches!(*last, DownloadError::Network { .. }), "{last}");
        }
        other => panic!("expected exhausted retries, got {other}"),
    }
    assert!(gets.load(Ordering::SeqCst) >= 3);
    assert!(!dest.exists());
    assert!(!dir.path().join("core.jar.tmp").exists());
    Ok(())
}

#[tokio::test]
async fn dropped_connection_is_retried_then_succeeds() -> TestResult {
    init_tracing();
    let payload = body(2_000);
    let (url, gets) = flaky_server(2, payload.clone()).await?;
    let config = ConfigFileBuilder::new()
        .retry_base_delay("10ms")
        .get_attempts(3)
        .build()
        .download;

    let dir = tempfile::tempdir()?;
    let dest = dir.path().join("core.jar");
    let manager = DownloadManager::new(config)?;

    with_timeout(manager.download(&url, &dest, |_| {})).await?;

    assert_eq!(gets.load(Ordering::SeqCst), 3);
    assert_eq!(std::fs::read(&dest)?, payload);
    Ok(())
}

/// Serves HEAD with `advertised` as Content-Length, and GET with `body`.
async fn lying_server(advertised: usize, body: Vec<u8>) -> std::io::Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let body = body.clone();
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }
                let response = if request.starts_with(b"HEAD") {
                    format!(
                        "HTTP/1.1 200 OK\r\nContent-Length: {advertised}\r\nConnection: close\r\n\r\n"
                    )
                    .into_bytes()
                } else {
                    let mut r = format!(
                        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                        body.len()
                    )
                    .into_bytes();
                    r.extend_from_slice(&body);
                    r
                };
                let _ = socket.write_all(&response).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    Ok(format!("http://{addr}/core.jar"))
}

#[tokio::test]
async fn size_mismatch_with_advertised_total_is_truncation() -> TestResult {
    init_tracing();
    let url = lying_server(5_000, body(1_000)).await?;

    let dir = tempfile::tempdir()?;
    let dest: PathBuf = dir.path().join("core.jar");
    let manager = DownloadManager::new(fast_config())?;

    let err = with_timeout(manager.download(&url, &dest, |_| {}))
        .await
        .unwrap_err();

    match err {
        DownloadError::Truncated {
            expected, actual, ..
        } => {
            assert_eq!(expected, 5_000);
            assert_eq!(actual, 1_000);
        }
        other => panic!("expected truncation, got {other}"),
    }
    assert!(!dest.exists());
    assert!(!dir.path().join("core.jar.tmp").exists());
    Ok(())
}
