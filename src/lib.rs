//! ytgrab - download videos through yt-dlp
//!
//! # Modules
//!
//! - `models` - Requests, progress snapshots, formats, web job status
//! - `fetch` - Streaming HTTP downloader and progress observers
//! - `resolver` - yt-dlp format probing, URL resolution, merged downloads
//! - `prompt` - Interactive question flow
//! - `schedule` - Cron parsing and the run loop
//! - `server` - HTTP download service
//! - `cli` / `commands` - Command line surface

pub mod cli;
pub mod commands;
pub mod config;
pub mod fetch;
pub mod models;
pub mod prompt;
pub mod resolver;
pub mod schedule;
pub mod server;

// Re-export commonly used types
pub use models::{
    DownloadOutcome, DownloadProgress, DownloadRequest, JobState, JobStatus, QualityPreference,
    ResolvedMedia, VideoFormat, VideoMetadata,
};

pub use config::Config;
pub use fetch::{DownloadError, ProgressObserver, StreamingDownloader};
pub use resolver::{FetchJob, MediaFetcher, MediaResolver, YtDlp};
pub use schedule::{CronSchedule, Scheduler};
