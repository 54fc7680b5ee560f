//! HTTP service tests
//!
//! Exercises the router in-process with `tower::ServiceExt::oneshot`. A fake
//! fetcher treats the page URL as a direct media URL and streams it from
//! mockito, so no yt-dlp binary is needed.

use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use mockito::Server;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use ytgrab::fetch::{ProgressObserver, StreamingDownloader};
use ytgrab::models::{DownloadRequest, JobState, JobStatus};
use ytgrab::resolver::{FetchError, FetchJob, MediaFetcher};
use ytgrab::server::{router, AppState};

struct DirectFetcher {
    downloader: StreamingDownloader,
}

#[async_trait]
impl MediaFetcher for DirectFetcher {
    async fn fetch(
        &self,
        job: &FetchJob,
        observer: &mut dyn ProgressObserver,
    ) -> Result<(), FetchError> {
        let request = DownloadRequest::new(job.url.clone(), job.output.clone());
        self.downloader.download(&request, observer).await?;
        Ok(())
    }
}

fn state(dir: &std::path::Path) -> AppState {
    AppState::new(
        Arc::new(DirectFetcher {
            downloader: StreamingDownloader::new(),
        }),
        dir,
    )
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

// =============================================================================
// Validation
// =============================================================================

#[tokio::test]
async fn test_missing_fields_is_400() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(state(dir.path()));

    let (status, body) = send(&app, post_json("/download", json!({"videoUrl": "x"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"error": "Missing required fields"}));

    let (status, body) = send(
        &app,
        post_json("/download", json!({"videoUrl": "", "quality": "best", "filename": "a.mp4"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing required fields");
}

#[tokio::test]
async fn test_malformed_body_is_400_json() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(state(dir.path()));

    let request = Request::builder()
        .method("POST")
        .uri("/download")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().starts_with("Invalid request body"));
}

#[tokio::test]
async fn test_path_traversal_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(state(dir.path()));

    for name in ["../escape.mp4", "nested/a.mp4", ".."] {
        let (status, body) = send(
            &app,
            post_json(
                "/download",
                json!({"videoUrl": "https://youtu.be/x", "quality": "best", "filename": name}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{name}");
        assert!(body["error"].as_str().unwrap().contains("Invalid filename"));
    }
}

#[tokio::test]
async fn test_invalid_quality_is_400() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(state(dir.path()));

    let (status, _) = send(
        &app,
        post_json(
            "/download",
            json!({"videoUrl": "https://youtu.be/x", "quality": "ultra", "filename": "a.mp4"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// =============================================================================
// Inline Downloads
// =============================================================================

#[tokio::test]
async fn test_download_completes() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/v")
        .with_status(200)
        .with_body("video-bytes")
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let app = router(state(dir.path()));

    // The bundled UI sends outputFilename
    let (status, body) = send(
        &app,
        post_json(
            "/download",
            json!({
                "videoUrl": format!("{}/v", server.url()),
                "quality": "720",
                "outputFilename": "clip.mp4"
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Download completed");
    assert_eq!(body["filename"], "clip.mp4");
    assert!(body["elapsedSeconds"].as_f64().unwrap() >= 0.0);
    assert_eq!(
        std::fs::read_to_string(dir.path().join("clip.mp4")).unwrap(),
        "video-bytes"
    );
}

#[tokio::test]
async fn test_fetch_failure_is_500() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/missing")
        .with_status(404)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let app = router(state(dir.path()));

    let (status, body) = send(
        &app,
        post_json(
            "/download",
            json!({
                "videoUrl": format!("{}/missing", server.url()),
                "quality": "best",
                "filename": "gone.mp4"
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({"error": "Error downloading video"}));
    assert!(!dir.path().join("gone.mp4").exists());
}

#[tokio::test]
async fn test_concurrent_downloads_are_isolated() {
    let mut server = Server::new_async().await;
    let first = vec![b'a'; 512 * 1024];
    let second = vec![b'b'; 384 * 1024];
    let _m1 = server
        .mock("GET", "/first")
        .with_status(200)
        .with_body(first.clone())
        .create_async()
        .await;
    let _m2 = server
        .mock("GET", "/second")
        .with_status(200)
        .with_body(second.clone())
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let app = router(state(dir.path()));

    let req = |path: &str, name: &str| {
        post_json(
            "/download",
            json!({
                "videoUrl": format!("{}/{}", server.url(), path),
                "quality": "best",
                "filename": name
            }),
        )
    };

    let (a, b) = tokio::join!(
        send(&app, req("first", "one.mp4")),
        send(&app, req("second", "two.mp4"))
    );

    assert_eq!(a.0, StatusCode::OK);
    assert_eq!(b.0, StatusCode::OK);
    assert_eq!(std::fs::read(dir.path().join("one.mp4")).unwrap(), first);
    assert_eq!(std::fs::read(dir.path().join("two.mp4")).unwrap(), second);
}

#[tokio::test]
async fn test_same_target_in_progress_is_409() {
    let dir = tempfile::tempdir().unwrap();
    let state = state(dir.path());
    let _claim = state.active.claim(&dir.path().join("busy.mp4")).unwrap();
    let app = router(state);

    let (status, body) = send(
        &app,
        post_json(
            "/download",
            json!({"videoUrl": "https://youtu.be/x", "quality": "best", "filename": "busy.mp4"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("busy.mp4"));
}

// =============================================================================
// Background Jobs
// =============================================================================

#[tokio::test]
async fn test_job_runs_to_completion() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/job")
        .with_status(200)
        .with_body(vec![1u8; 64 * 1024])
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let app = router(state(dir.path()));

    let (status, accepted) = send(
        &app,
        post_json(
            "/jobs",
            json!({
                "videoUrl": format!("{}/job", server.url()),
                "quality": "1080p",
                "filename": "job.mp4"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let status_url = accepted["statusUrl"].as_str().unwrap().to_string();
    assert_eq!(status_url, format!("/jobs/{}", accepted["id"].as_str().unwrap()));

    let mut job: Option<JobStatus> = None;
    for _ in 0..100 {
        let (status, body) = send(&app, get(&status_url)).await;
        assert_eq!(status, StatusCode::OK);
        let current: JobStatus = serde_json::from_value(body).unwrap();
        if current.state.is_terminal() {
            job = Some(current);
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let job = job.expect("job should finish");
    assert_eq!(job.state, JobState::Completed);
    assert_eq!(job.percent, Some(100.0));
    assert_eq!(job.filename, "job.mp4");
    assert!(dir.path().join("job.mp4").exists());

    let (status, list) = send(&app, get("/jobs")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_unknown_job_is_404() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(state(dir.path()));

    let (status, body) = send(&app, get(&format!("/jobs/{}", uuid::Uuid::new_v4()))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Job not found");
}

// =============================================================================
// Misc
// =============================================================================

#[tokio::test]
async fn test_health_and_cors() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(state(dir.path()));

    let request = Request::builder()
        .uri("/health")
        .header(header::ORIGIN, "http://localhost:3000")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .unwrap(),
        "*"
    );
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"ok");
}
