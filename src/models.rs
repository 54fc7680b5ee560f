//! Data structures and types for ytgrab
//!
//! Shared models used across the application, organized by domain:
//! - **Transfer**: download requests, progress snapshots, outcomes
//! - **Formats**: yt-dlp format and metadata records
//! - **Quality**: quality preferences accepted by the web service
//! - **Jobs**: background download status for progress polling

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

// =============================================================================
// Transfer Models
// =============================================================================

/// A single streaming download: where to read from, where to write to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    /// Direct, fetchable media URL (not a page URL)
    pub source_url: String,
    /// Destination file path
    pub destination: PathBuf,
}

impl DownloadRequest {
    pub fn new(source_url: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source_url: source_url.into(),
            destination: destination.into(),
        }
    }

    /// Sibling path the bytes are written to before the final rename
    pub fn partial_path(&self) -> PathBuf {
        let mut name = self
            .destination
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".part");
        self.destination.with_file_name(name)
    }
}

/// Cumulative progress of one in-flight transfer
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DownloadProgress {
    pub bytes_transferred: u64,
    /// Advertised content length, if the server sent one
    pub total_bytes: Option<u64>,
    pub elapsed_seconds: f64,
}

impl DownloadProgress {
    pub fn new(bytes_transferred: u64, total_bytes: Option<u64>, elapsed_seconds: f64) -> Self {
        Self {
            bytes_transferred,
            total_bytes,
            elapsed_seconds,
        }
    }

    /// Percentage of the total, clamped to [0, 100]
    ///
    /// `None` when the total is unknown or zero; callers should fall back
    /// to `bytes_transferred`.
    pub fn percentage(&self) -> Option<f64> {
        match self.total_bytes {
            Some(total) if total > 0 => {
                let pct = self.bytes_transferred as f64 / total as f64 * 100.0;
                Some(pct.clamp(0.0, 100.0))
            }
            _ => None,
        }
    }

    /// Estimated seconds remaining at the average rate so far
    pub fn eta_seconds(&self) -> Option<f64> {
        let total = self.total_bytes?;
        if self.bytes_transferred == 0 || self.elapsed_seconds <= 0.0 {
            return None;
        }
        let remaining = total.saturating_sub(self.bytes_transferred) as f64;
        let rate = self.bytes_transferred as f64 / self.elapsed_seconds;
        Some(remaining / rate)
    }
}

impl fmt::Display for DownloadProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.percentage() {
            Some(pct) => write!(f, "{:.1}%", pct),
            None => write!(f, "{}", format_bytes(self.bytes_transferred)),
        }
    }
}

/// Result of a successful transfer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DownloadOutcome {
    pub path: PathBuf,
    pub bytes_written: u64,
    pub total_bytes: Option<u64>,
    pub elapsed_seconds: f64,
}

/// Format a byte count for humans (1.5 MiB)
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

// =============================================================================
// Format Models (yt-dlp)
// =============================================================================

/// One entry from the `formats` array of `yt-dlp --dump-json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoFormat {
    pub format_id: String,
    #[serde(default)]
    pub ext: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fps: Option<f64>,
    pub vcodec: Option<String>,
    pub acodec: Option<String>,
    pub filesize: Option<u64>,
    pub filesize_approx: Option<u64>,
    pub format_note: Option<String>,
}

impl VideoFormat {
    /// Only formats with known dimensions are offered in the quality menu
    pub fn is_listable(&self) -> bool {
        self.width.is_some() && self.height.is_some()
    }

    pub fn resolution(&self) -> Option<String> {
        match (self.width, self.height) {
            (Some(w), Some(h)) => Some(format!("{}x{}", w, h)),
            _ => None,
        }
    }

    /// Exact size when known, otherwise yt-dlp's estimate
    pub fn size_bytes(&self) -> Option<u64> {
        self.filesize.or(self.filesize_approx)
    }

    pub fn has_video(&self) -> bool {
        self.vcodec.as_deref().map(|v| v != "none").unwrap_or(false)
    }

    pub fn has_audio(&self) -> bool {
        self.acodec.as_deref().map(|a| a != "none").unwrap_or(false)
    }
}

impl fmt::Display for VideoFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.resolution() {
            Some(res) => write!(f, "{} ({})", res, self.ext),
            None => write!(f, "{} ({})", self.format_id, self.ext),
        }
    }
}

/// Descriptive metadata for a video page
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub uploader: Option<String>,
    pub upload_date: Option<String>,
    pub duration: Option<f64>,
}

/// A direct media URL produced by the resolver for one format
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedMedia {
    pub url: String,
    pub ext: Option<String>,
    pub title: Option<String>,
}

// =============================================================================
// Quality
// =============================================================================

/// Quality requested through the web service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QualityPreference {
    #[default]
    Best,
    /// Best video no taller than this many lines
    MaxHeight(u32),
}

impl QualityPreference {
    /// Parse "best", "1080", "720p" and friends
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().to_lowercase();
        if s == "best" {
            return Some(Self::Best);
        }
        let digits = s.strip_suffix('p').unwrap_or(&s);
        match digits.parse::<u32>() {
            Ok(h) if h > 0 => Some(Self::MaxHeight(h)),
            _ => None,
        }
    }

    /// yt-dlp `-f` selector for a merged video+audio download
    pub fn format_selector(&self) -> String {
        match self {
            Self::Best => "bestvideo+bestaudio".to_string(),
            Self::MaxHeight(h) => format!("bestvideo[height<={}]+bestaudio/best", h),
        }
    }
}

impl fmt::Display for QualityPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Best => write!(f, "best"),
            Self::MaxHeight(h) => write!(f, "{}p", h),
        }
    }
}

// =============================================================================
// Web Jobs
// =============================================================================

/// Lifecycle of a background web download
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Running,
    Completed,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

/// Snapshot of a background download, as returned by `GET /jobs/:id`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub id: Uuid,
    pub state: JobState,
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_seconds: Option<f64>,
}

impl JobStatus {
    pub fn queued(filename: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            state: JobState::Queued,
            filename: filename.into(),
            percent: None,
            error: None,
            elapsed_seconds: None,
        }
    }
}
