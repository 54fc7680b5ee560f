//! Route handlers and request validation

use std::path::{Component, Path as FsPath};
use std::time::Instant;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::fetch::LogObserver;
use crate::models::{JobStatus, QualityPreference};
use crate::resolver::FetchJob;
use crate::server::AppState;

/// Body of `POST /download` and `POST /jobs`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadBody {
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub quality: Option<String>,
    /// The bundled UI sends `outputFilename`
    #[serde(default, alias = "outputFilename")]
    pub filename: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadResponse {
    /// The bundled UI checks this flag
    pub success: bool,
    pub message: &'static str,
    pub filename: String,
    pub elapsed_seconds: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobAccepted {
    pub id: Uuid,
    pub status_url: String,
}

/// Errors returned as `{ "error": ... }`
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Missing required fields")]
    MissingFields,
    #[error("Invalid request body: {0}")]
    BadBody(String),
    #[error("Invalid quality '{0}' (use \"best\" or a height such as 720)")]
    BadQuality(String),
    #[error("Invalid filename '{0}'")]
    BadFilename(String),
    #[error("A download to '{0}' is already in progress")]
    Busy(String),
    #[error("Job not found")]
    JobNotFound,
    #[error("Error downloading video")]
    Download,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingFields
            | ApiError::BadBody(_)
            | ApiError::BadQuality(_)
            | ApiError::BadFilename(_) => StatusCode::BAD_REQUEST,
            ApiError::Busy(_) => StatusCode::CONFLICT,
            ApiError::JobNotFound => StatusCode::NOT_FOUND,
            ApiError::Download => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// A bare file name: no separators, no `.`/`..`, nothing hidden in components
pub fn is_safe_filename(name: &str) -> bool {
    if name.is_empty() || name.contains('\0') || name.contains('/') || name.contains('\\') {
        return false;
    }
    let mut components = FsPath::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// Check the body and turn it into a fetch job under the output directory
pub fn validate(body: DownloadBody, output_dir: &FsPath) -> Result<(FetchJob, String), ApiError> {
    let non_empty = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());

    let (Some(url), Some(quality), Some(filename)) = (
        non_empty(body.video_url),
        non_empty(body.quality),
        non_empty(body.filename),
    ) else {
        return Err(ApiError::MissingFields);
    };

    let quality = QualityPreference::parse(&quality).ok_or(ApiError::BadQuality(quality))?;
    if !is_safe_filename(&filename) {
        return Err(ApiError::BadFilename(filename));
    }

    let job = FetchJob::new(url, quality, output_dir.join(&filename));
    Ok((job, filename))
}

fn parse_body(body: Result<Json<DownloadBody>, JsonRejection>) -> Result<DownloadBody, ApiError> {
    body.map(|Json(b)| b)
        .map_err(|rejection| ApiError::BadBody(rejection.body_text()))
}

/// POST /download: fetch inline and answer once the file is complete
pub async fn download(
    State(state): State<AppState>,
    body: Result<Json<DownloadBody>, JsonRejection>,
) -> Result<Json<DownloadResponse>, ApiError> {
    let (job, filename) = validate(parse_body(body)?, &state.output_dir)?;
    let _claim = state
        .active
        .claim(&job.output)
        .ok_or_else(|| ApiError::Busy(filename.clone()))?;

    tracing::info!(url = %job.url, quality = %job.quality, filename = %filename, "download requested");
    let started = Instant::now();
    let mut observer = LogObserver::new(filename.clone());

    if let Err(e) = state.fetcher.fetch(&job, &mut observer).await {
        tracing::error!(url = %job.url, error = %e, "error downloading video");
        return Err(ApiError::Download);
    }

    Ok(Json(DownloadResponse {
        success: true,
        message: "Download completed",
        filename,
        elapsed_seconds: started.elapsed().as_secs_f64(),
    }))
}

/// POST /jobs: start a background fetch and return its id for polling
pub async fn create_job(
    State(state): State<AppState>,
    body: Result<Json<DownloadBody>, JsonRejection>,
) -> Result<(StatusCode, Json<JobAccepted>), ApiError> {
    let (job, filename) = validate(parse_body(body)?, &state.output_dir)?;
    let claim = state
        .active
        .claim(&job.output)
        .ok_or_else(|| ApiError::Busy(filename.clone()))?;

    let id = state.jobs.insert(JobStatus::queued(filename));
    tracing::info!(%id, url = %job.url, "job queued");

    let fetcher = state.fetcher.clone();
    let jobs = state.jobs.clone();
    tokio::spawn(async move {
        let _claim = claim;
        let started = Instant::now();
        jobs.mark_running(&id);
        let mut observer = jobs.observer(id);

        match fetcher.fetch(&job, &mut observer).await {
            Ok(()) => {
                tracing::info!(%id, "job completed");
                jobs.mark_completed(&id, started.elapsed().as_secs_f64());
            }
            Err(e) => {
                tracing::error!(%id, error = %e, "job failed");
                jobs.mark_failed(&id, e.to_string(), started.elapsed().as_secs_f64());
            }
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(JobAccepted {
            id,
            status_url: format!("/jobs/{}", id),
        }),
    ))
}

/// GET /jobs/:id
pub async fn job_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<JobStatus>, ApiError> {
    state.jobs.get(&id).map(Json).ok_or(ApiError::JobNotFound)
}

/// GET /jobs
pub async fn list_jobs(State(state): State<AppState>) -> Json<Vec<JobStatus>> {
    Json(state.jobs.list())
}

/// GET /health
pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}
