//! Streaming downloads
//!
//! - Downloader: HTTP GET streamed to a file with cumulative progress
//! - Progress: observer trait plus bar, log and no-op observers

pub mod downloader;
pub mod progress;

pub use downloader::{DownloadError, StreamingDownloader};
pub use progress::{BarObserver, LogObserver, NoopObserver, ProgressObserver};
