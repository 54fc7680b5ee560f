//! Media resolution via external tools
//!
//! - `MediaResolver`: page URL -> formats, metadata, direct media URL
//! - `MediaFetcher`: page URL -> finished file on disk
//! - `YtDlp`: the yt-dlp backed implementation of both

pub mod ytdlp;

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

use crate::fetch::{DownloadError, ProgressObserver};
use crate::models::{QualityPreference, ResolvedMedia, VideoFormat, VideoMetadata};

pub use ytdlp::{YtDlp, YtDlpError};

/// Formats and metadata for one page URL
#[derive(Debug, Clone, Default)]
pub struct ProbeResult {
    pub metadata: VideoMetadata,
    pub formats: Vec<VideoFormat>,
}

impl ProbeResult {
    /// Formats with known dimensions, in yt-dlp's order
    pub fn listable_formats(&self) -> Vec<&VideoFormat> {
        self.formats.iter().filter(|f| f.is_listable()).collect()
    }
}

/// Turns page URLs into something downloadable
#[async_trait]
pub trait MediaResolver: Send + Sync {
    /// List formats and metadata
    async fn probe(&self, url: &str) -> Result<ProbeResult, YtDlpError>;

    /// Direct media URL for one format
    async fn resolve(&self, url: &str, format_id: &str) -> Result<ResolvedMedia, YtDlpError>;

    async fn formats(&self, url: &str) -> Result<Vec<VideoFormat>, YtDlpError> {
        Ok(self.probe(url).await?.formats)
    }

    async fn metadata(&self, url: &str) -> Result<VideoMetadata, YtDlpError> {
        Ok(self.probe(url).await?.metadata)
    }
}

/// A page URL to fetch at a given quality into a given file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchJob {
    pub url: String,
    pub quality: QualityPreference,
    pub output: PathBuf,
}

impl FetchJob {
    pub fn new(
        url: impl Into<String>,
        quality: QualityPreference,
        output: impl Into<PathBuf>,
    ) -> Self {
        Self {
            url: url.into(),
            quality,
            output: output.into(),
        }
    }

    /// Container to merge into: the output's extension, or mp4
    pub fn merge_format(&self) -> String {
        self.output
            .extension()
            .and_then(|e| e.to_str())
            .filter(|e| !e.is_empty())
            .map(|e| e.to_lowercase())
            .unwrap_or_else(|| "mp4".to_string())
    }
}

/// Errors from producing a finished file
#[derive(Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    Resolve(#[from] YtDlpError),
    #[error(transparent)]
    Download(#[from] DownloadError),
}

/// Produces a finished media file for a page URL
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn fetch(
        &self,
        job: &FetchJob,
        observer: &mut dyn ProgressObserver,
    ) -> Result<(), FetchError>;
}
