//! HTTP download service
//!
//! `POST /download` fetches a video and answers when the file is written.
//! `POST /jobs` starts the same work in the background; poll `GET /jobs/:id`.

pub mod handlers;
pub mod jobs;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

use crate::resolver::MediaFetcher;

pub use handlers::{ApiError, DownloadBody};
pub use jobs::{ActivePaths, JobObserver, JobTable, PathClaim, DEFAULT_JOB_HISTORY};

/// Errors starting or running the listener
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Cannot create output directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Cannot bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },
    #[error("Server error: {0}")]
    Serve(#[from] std::io::Error),
}

/// Shared state for every request
#[derive(Clone)]
pub struct AppState {
    pub fetcher: Arc<dyn MediaFetcher>,
    pub output_dir: PathBuf,
    pub jobs: JobTable,
    pub active: ActivePaths,
}

impl AppState {
    pub fn new(fetcher: Arc<dyn MediaFetcher>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            fetcher,
            output_dir: output_dir.into(),
            jobs: JobTable::new(),
            active: ActivePaths::new(),
        }
    }

    /// Keep at most `history` finished jobs for polling
    pub fn with_job_history(mut self, history: usize) -> Self {
        self.jobs = JobTable::with_history(history);
        self
    }
}

/// Build the router with permissive CORS
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/download", post(handlers::download))
        .route("/jobs", post(handlers::create_job).get(handlers::list_jobs))
        .route("/jobs/:id", get(handlers::job_status))
        .route("/health", get(handlers::health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind `addr` and serve until Ctrl-C
pub async fn serve(addr: SocketAddr, state: AppState) -> Result<(), ServerError> {
    tokio::fs::create_dir_all(&state.output_dir)
        .await
        .map_err(|source| ServerError::OutputDir {
            path: state.output_dir.clone(),
            source,
        })?;

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;

    tracing::info!("Server is running on http://{}", addr);
    tracing::info!(output_dir = %state.output_dir.display(), "saving downloads");
    tracing::info!("  POST /download  - Download and wait");
    tracing::info!("  POST /jobs      - Start a background download");
    tracing::info!("  GET  /jobs/:id  - Job status");
    tracing::info!("  GET  /health    - Health check");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "cannot listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}
