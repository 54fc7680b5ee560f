//! Streaming downloader tests
//!
//! Tests file integrity, progress reporting, failure cleanup and timing
//! against mockito fixtures and hand-rolled TCP servers.

use std::net::SocketAddr;
use std::time::Duration;

use mockito::Server;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use ytgrab::fetch::{DownloadError, NoopObserver, StreamingDownloader};
use ytgrab::models::{DownloadProgress, DownloadRequest};

fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Accept one connection, wait `delay`, then write `head` and `body` and close
async fn serve_once(head: String, body: Vec<u8>, delay: Duration) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 4096];
        let _ = socket.read(&mut buf).await;
        tokio::time::sleep(delay).await;
        let _ = socket.write_all(head.as_bytes()).await;
        let _ = socket.write_all(&body).await;
        let _ = socket.flush().await;
        let _ = socket.shutdown().await;
    });

    addr
}

// =============================================================================
// Integrity
// =============================================================================

#[tokio::test]
async fn test_file_matches_body() {
    let mut server = Server::new_async().await;
    let body = payload(256 * 1024);
    let mock = server
        .mock("GET", "/video.mp4")
        .with_status(200)
        .with_header("content-type", "video/mp4")
        .with_body(body.clone())
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let request = DownloadRequest::new(
        format!("{}/video.mp4", server.url()),
        dir.path().join("video.mp4"),
    );

    let outcome = StreamingDownloader::new()
        .download(&request, &mut NoopObserver)
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(outcome.bytes_written, body.len() as u64);
    assert_eq!(outcome.total_bytes, Some(body.len() as u64));
    assert_eq!(std::fs::read(&request.destination).unwrap(), body);
    assert!(!request.partial_path().exists());
}

#[tokio::test]
async fn test_empty_body() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/empty")
        .with_status(200)
        .with_body("")
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let request = DownloadRequest::new(format!("{}/empty", server.url()), dir.path().join("e"));

    let mut reports = Vec::new();
    let outcome = StreamingDownloader::new()
        .download(&request, &mut |p: &DownloadProgress| reports.push(*p))
        .await
        .unwrap();

    assert_eq!(outcome.bytes_written, 0);
    assert_eq!(std::fs::metadata(&request.destination).unwrap().len(), 0);
    // Zero total has no percentage
    assert!(reports.iter().all(|p| p.percentage().is_none()));
}

// =============================================================================
// Progress
// =============================================================================

#[tokio::test]
async fn test_progress_is_monotonic_from_zero_to_hundred() {
    let mut server = Server::new_async().await;
    let body = payload(1024 * 1024);
    let _mock = server
        .mock("GET", "/big")
        .with_status(200)
        .with_body(body.clone())
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let request = DownloadRequest::new(format!("{}/big", server.url()), dir.path().join("big"));

    let mut percents = Vec::new();
    StreamingDownloader::new()
        .download(&request, &mut |p: &DownloadProgress| {
            percents.push(p.percentage().unwrap())
        })
        .await
        .unwrap();

    assert!(percents.len() >= 2);
    assert_eq!(percents.first().copied(), Some(0.0));
    assert_eq!(percents.last().copied(), Some(100.0));
    assert!(percents.windows(2).all(|w| w[0] <= w[1]));
    assert!(percents.iter().all(|p| (0.0..=100.0).contains(p)));
}

#[tokio::test]
async fn test_unknown_length_reports_bytes() {
    let mut server = Server::new_async().await;
    let body = payload(64 * 1024);
    let chunked = body.clone();
    let _mock = server
        .mock("GET", "/stream")
        .with_status(200)
        .with_chunked_body(move |w| std::io::Write::write_all(w, &chunked))
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let request = DownloadRequest::new(format!("{}/stream", server.url()), dir.path().join("s"));

    let mut reports = Vec::new();
    let outcome = StreamingDownloader::new()
        .download(&request, &mut |p: &DownloadProgress| reports.push(*p))
        .await
        .unwrap();

    assert_eq!(outcome.total_bytes, None);
    assert_eq!(outcome.bytes_written, body.len() as u64);
    assert!(reports.iter().all(|p| p.percentage().is_none()));
    assert_eq!(reports.last().unwrap().bytes_transferred, body.len() as u64);
    assert_eq!(std::fs::read(&request.destination).unwrap(), body);
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test]
async fn test_http_error_status() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/gone")
        .with_status(404)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let request = DownloadRequest::new(format!("{}/gone", server.url()), dir.path().join("g"));

    let err = StreamingDownloader::new()
        .download(&request, &mut NoopObserver)
        .await
        .unwrap_err();

    assert!(matches!(err, DownloadError::Status { status: 404, .. }));
    assert!(err.is_network());
    assert!(!request.destination.exists());
}

#[tokio::test]
async fn test_disconnect_mid_stream_is_an_error() {
    let head = "HTTP/1.1 200 OK\r\nContent-Length: 1000\r\nConnection: close\r\n\r\n".to_string();
    let addr = serve_once(head, payload(500), Duration::ZERO).await;

    let dir = tempfile::tempdir().unwrap();
    let request = DownloadRequest::new(format!("http://{}/cut", addr), dir.path().join("cut.mp4"));

    let mut last = None;
    let result = StreamingDownloader::new()
        .download(&request, &mut |p: &DownloadProgress| last = Some(*p))
        .await;

    let err = result.unwrap_err();
    assert!(
        matches!(
            err,
            DownloadError::Interrupted { .. } | DownloadError::Truncated { .. }
        ),
        "unexpected error: {err}"
    );
    assert!(!request.destination.exists());
    assert!(!request.partial_path().exists());
    assert!(last.map(|p| p.bytes_transferred < 1000).unwrap_or(true));
}

#[tokio::test]
async fn test_failed_rename_removes_partial_file() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/clip")
        .with_status(200)
        .with_body("complete body")
        .create_async()
        .await;

    // A non-empty directory at the destination makes the final rename fail
    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("taken");
    std::fs::create_dir(&destination).unwrap();
    std::fs::write(destination.join("keep"), "x").unwrap();
    let request = DownloadRequest::new(format!("{}/clip", server.url()), &destination);

    let err = StreamingDownloader::new()
        .download(&request, &mut NoopObserver)
        .await
        .unwrap_err();

    assert!(matches!(err, DownloadError::Io { .. }));
    assert!(!err.is_network());
    assert!(!request.partial_path().exists());
    assert!(destination.join("keep").exists());
}

// =============================================================================
// Timing
// =============================================================================

#[tokio::test]
async fn test_elapsed_includes_server_latency() {
    let body = payload(2048);
    let head = format!(
        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );
    let addr = serve_once(head, body, Duration::from_secs(2)).await;

    let dir = tempfile::tempdir().unwrap();
    let request = DownloadRequest::new(format!("http://{}/slow", addr), dir.path().join("slow"));

    let outcome = StreamingDownloader::new()
        .download(&request, &mut NoopObserver)
        .await
        .unwrap();

    assert!(outcome.elapsed_seconds >= 2.0, "elapsed {}", outcome.elapsed_seconds);
    assert_eq!(outcome.bytes_written, 2048);
}

#[tokio::test]
async fn test_idle_timeout_abandons_transfer() {
    let head = "HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\n".to_string();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 4096];
        let _ = socket.read(&mut buf).await;
        let _ = socket.write_all(head.as_bytes()).await;
        let _ = socket.write_all(b"abc").await;
        // Hold the connection open without sending the rest
        tokio::time::sleep(Duration::from_secs(10)).await;
    });

    let dir = tempfile::tempdir().unwrap();
    let request = DownloadRequest::new(format!("http://{}/stall", addr), dir.path().join("stall"));
    let downloader =
        StreamingDownloader::with_timeouts(Duration::from_secs(1), Duration::from_millis(500))
            .unwrap();

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        downloader.download(&request, &mut NoopObserver),
    )
    .await
    .expect("read timeout should fire before the test timeout");

    assert!(result.is_err());
    assert!(!request.partial_path().exists());
}
