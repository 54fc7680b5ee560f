//! Streaming HTTP downloader
//!
//! Copies a remote resource to disk chunk by chunk, reporting cumulative
//! progress after every chunk. Bytes land in `<destination>.part` and are
//! renamed into place only once the body has been fully received.

use std::path::Path;
use std::time::{Duration, Instant};

use futures::StreamExt;
use thiserror::Error;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use crate::fetch::progress::ProgressObserver;
use crate::models::{DownloadOutcome, DownloadProgress, DownloadRequest};

/// Errors from a streaming transfer
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("Request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("Server returned HTTP {status} for {url}")]
    Status { url: String, status: u16 },
    #[error("Connection lost after {received} bytes: {source}")]
    Interrupted {
        received: u64,
        #[source]
        source: reqwest::Error,
    },
    #[error("Transfer ended early: received {received} of {expected} bytes")]
    Truncated { received: u64, expected: u64 },
    #[error("File error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Download cancelled")]
    Cancelled,
}

impl DownloadError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        DownloadError::Io {
            path: path.display().to_string(),
            source,
        }
    }

    /// True for failures on the network side (as opposed to local disk)
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            DownloadError::Request { .. }
                | DownloadError::Status { .. }
                | DownloadError::Interrupted { .. }
                | DownloadError::Truncated { .. }
        )
    }
}

/// Streaming downloader over a shared `reqwest` client
#[derive(Debug, Clone)]
pub struct StreamingDownloader {
    client: reqwest::Client,
}

impl StreamingDownloader {
    /// Create a downloader with default timeouts
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Create a downloader whose client gives up on slow connects and idle reads
    pub fn with_timeouts(connect: Duration, idle: Duration) -> Result<Self, DownloadError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect)
            .read_timeout(idle)
            .build()
            .map_err(DownloadError::Client)?;
        Ok(Self { client })
    }

    /// Download `request.source_url` to `request.destination`
    pub async fn download(
        &self,
        request: &DownloadRequest,
        observer: &mut dyn ProgressObserver,
    ) -> Result<DownloadOutcome, DownloadError> {
        self.download_with_cancel(request, observer, &CancellationToken::new())
            .await
    }

    /// Download, aborting as soon as `cancel` fires
    pub async fn download_with_cancel(
        &self,
        request: &DownloadRequest,
        observer: &mut dyn ProgressObserver,
        cancel: &CancellationToken,
    ) -> Result<DownloadOutcome, DownloadError> {
        let partial = request.partial_path();
        let started = Instant::now();

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(DownloadError::Cancelled),
            result = self.transfer(request, &partial, started, observer) => result,
        };

        let result = match result {
            Ok(received) => fs::rename(&partial, &request.destination)
                .await
                .map(|()| received)
                .map_err(|e| DownloadError::io(&request.destination, e)),
            Err(e) => Err(e),
        };

        match result {
            Ok((bytes_written, total_bytes)) => {
                let outcome = DownloadOutcome {
                    path: request.destination.clone(),
                    bytes_written,
                    total_bytes,
                    elapsed_seconds: started.elapsed().as_secs_f64(),
                };
                observer.on_finish(&outcome);
                tracing::debug!(
                    url = %request.source_url,
                    path = %outcome.path.display(),
                    bytes = outcome.bytes_written,
                    elapsed = outcome.elapsed_seconds,
                    "transfer complete"
                );
                Ok(outcome)
            }
            Err(e) => {
                tracing::warn!(url = %request.source_url, error = %e, "transfer failed");
                // Partial file may not exist if the request itself failed
                let _ = fs::remove_file(&partial).await;
                Err(e)
            }
        }
    }

    /// Stream the body into `partial`, returning (bytes written, advertised total)
    async fn transfer(
        &self,
        request: &DownloadRequest,
        partial: &Path,
        started: Instant,
        observer: &mut dyn ProgressObserver,
    ) -> Result<(u64, Option<u64>), DownloadError> {
        let url = request.source_url.as_str();
        tracing::debug!(url, dest = %request.destination.display(), "starting transfer");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| DownloadError::Request {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let total = response.content_length();
        let mut file = File::create(partial)
            .await
            .map_err(|e| DownloadError::io(partial, e))?;

        let mut received: u64 = 0;
        observer.on_progress(&DownloadProgress::new(0, total, started.elapsed().as_secs_f64()));

        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|source| DownloadError::Interrupted { received, source })?;
            file.write_all(&chunk)
                .await
                .map_err(|e| DownloadError::io(partial, e))?;
            received += chunk.len() as u64;
            observer.on_progress(&DownloadProgress::new(
                received,
                total,
                started.elapsed().as_secs_f64(),
            ));
        }

        file.flush().await.map_err(|e| DownloadError::io(partial, e))?;
        file.sync_all()
            .await
            .map_err(|e| DownloadError::io(partial, e))?;

        if let Some(expected) = total {
            if received < expected {
                return Err(DownloadError::Truncated { received, expected });
            }
        }

        Ok((received, total))
    }
}

impl Default for StreamingDownloader {
    fn default() -> Self {
        Self::new()
    }
}
