//! Progress observers
//!
//! The downloader reports through `ProgressObserver` so the transfer logic
//! stays independent of how (or whether) progress is rendered.

use indicatif::{ProgressBar, ProgressStyle};

use crate::models::{format_bytes, DownloadOutcome, DownloadProgress};

/// Receives cumulative progress at chunk granularity
pub trait ProgressObserver: Send {
    fn on_progress(&mut self, progress: &DownloadProgress);

    /// Called once after the file is in place
    fn on_finish(&mut self, _outcome: &DownloadOutcome) {}
}

impl<F> ProgressObserver for F
where
    F: FnMut(&DownloadProgress) + Send,
{
    fn on_progress(&mut self, progress: &DownloadProgress) {
        self(progress)
    }
}

/// Discards every report
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ProgressObserver for NoopObserver {
    fn on_progress(&mut self, _progress: &DownloadProgress) {}
}

/// Terminal progress bar
///
/// Shows `Downloading: [bar] 42% | 12s remaining` when the total is known
/// and a byte-counting spinner otherwise. Cleared on completion.
pub struct BarObserver {
    bar: ProgressBar,
    sized: bool,
}

impl BarObserver {
    const BAR_TEMPLATE: &'static str =
        "Downloading: [{bar:40}] {percent}% | {msg}";
    const SPINNER_TEMPLATE: &'static str = "Downloading: {spinner} {msg}";

    pub fn new() -> Self {
        let bar = ProgressBar::new(100);
        if let Ok(style) = ProgressStyle::with_template(Self::BAR_TEMPLATE) {
            bar.set_style(style.progress_chars("█▓░"));
        }
        Self { bar, sized: true }
    }

    /// Bar that draws nowhere (for tests and quiet mode)
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
            sized: true,
        }
    }

    fn switch_to_spinner(&mut self) {
        if let Ok(style) = ProgressStyle::with_template(Self::SPINNER_TEMPLATE) {
            self.bar.set_style(style);
        }
        self.sized = false;
    }
}

impl Default for BarObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressObserver for BarObserver {
    fn on_progress(&mut self, progress: &DownloadProgress) {
        match progress.percentage() {
            Some(pct) => {
                self.bar.set_position(pct.floor() as u64);
                let eta = progress
                    .eta_seconds()
                    .map(|s| format!("{:.0}s remaining", s))
                    .unwrap_or_else(|| "--s remaining".to_string());
                self.bar.set_message(eta);
            }
            None => {
                if self.sized {
                    self.switch_to_spinner();
                }
                self.bar.set_message(format_bytes(progress.bytes_transferred));
                self.bar.tick();
            }
        }
    }

    fn on_finish(&mut self, _outcome: &DownloadOutcome) {
        self.bar.finish_and_clear();
    }
}

impl Drop for BarObserver {
    fn drop(&mut self) {
        if !self.bar.is_finished() {
            self.bar.abandon();
        }
    }
}

/// Logs progress through `tracing`, at most once per whole percent
#[derive(Debug, Default)]
pub struct LogObserver {
    label: String,
    last_percent: Option<u64>,
}

impl LogObserver {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            last_percent: None,
        }
    }
}

impl ProgressObserver for LogObserver {
    fn on_progress(&mut self, progress: &DownloadProgress) {
        match progress.percentage() {
            Some(pct) => {
                let whole = pct.floor() as u64;
                if self.last_percent != Some(whole) {
                    self.last_percent = Some(whole);
                    tracing::debug!(label = %self.label, percent = whole, "download progress");
                }
            }
            None => {
                tracing::trace!(
                    label = %self.label,
                    bytes = progress.bytes_transferred,
                    "download progress"
                );
            }
        }
    }

    fn on_finish(&mut self, outcome: &DownloadOutcome) {
        tracing::info!(
            label = %self.label,
            path = %outcome.path.display(),
            bytes = outcome.bytes_written,
            elapsed = outcome.elapsed_seconds,
            "download finished"
        );
    }
}
