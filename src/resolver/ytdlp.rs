//! yt-dlp integration
//!
//! Probes formats and metadata with `--dump-json`, resolves a single format
//! to its direct media URL, and runs merged video+audio downloads while
//! relaying yt-dlp's own progress lines.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Instant;

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;

use crate::fetch::ProgressObserver;
use crate::models::{DownloadProgress, ResolvedMedia, VideoFormat, VideoMetadata};
use crate::resolver::{FetchError, FetchJob, MediaFetcher, MediaResolver, ProbeResult};

/// Units used when yt-dlp does not print a total size
const PERCENT_SCALE: u64 = 10_000;

/// Errors from running yt-dlp
#[derive(Debug, Error)]
pub enum YtDlpError {
    #[error("yt-dlp not found at '{0}'. Install it first (pip install yt-dlp).")]
    NotFound(String),
    #[error("Failed to run yt-dlp: {0}")]
    Io(#[from] std::io::Error),
    #[error("yt-dlp exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },
    #[error("Could not parse yt-dlp output: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("yt-dlp returned no direct URL for format '{0}'")]
    NoUrl(String),
}

/// One `[download]  42.3% of ~10.00MiB ...` line
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct YtDlpProgress {
    pub percent: f64,
    pub total_bytes: Option<u64>,
}

impl YtDlpProgress {
    /// Express as a transfer snapshot; without a size, a fixed unit scale stands in
    pub fn to_progress(&self, elapsed_seconds: f64) -> DownloadProgress {
        let pct = self.percent.clamp(0.0, 100.0) / 100.0;
        let total = self.total_bytes.unwrap_or(PERCENT_SCALE);
        let done = (total as f64 * pct).round() as u64;
        DownloadProgress::new(done.min(total), Some(total), elapsed_seconds)
    }
}

/// Folds per-stream progress runs into one rising 0..100 run
///
/// A merged `bestvideo+bestaudio` download prints a full 0..100% run for
/// each stream. The `[info] ... Downloading 1 format(s): 137+140` line gives
/// the stream count and every `[download] Destination:` line after the first
/// moves on to the next stream's share.
#[derive(Debug, Clone)]
pub struct MergedProgress {
    streams: usize,
    current: usize,
    seen_destination: bool,
    highest: f64,
}

impl MergedProgress {
    pub fn new() -> Self {
        Self {
            streams: 1,
            current: 0,
            seen_destination: false,
            highest: 0.0,
        }
    }

    /// Feed one stdout line; progress lines come back as overall progress
    pub fn feed(&mut self, line: &str) -> Option<YtDlpProgress> {
        let line = line.trim();
        if let Some(caps) = formats_regex().captures(line) {
            self.streams = caps[1].split('+').count().max(1);
            return None;
        }
        if line.starts_with("[download] Destination:") {
            if self.seen_destination {
                self.current = (self.current + 1).min(self.streams - 1);
            }
            self.seen_destination = true;
            return None;
        }

        let progress = parse_progress_line(line)?;
        if self.streams == 1 {
            self.highest = self.highest.max(progress.percent.clamp(0.0, 100.0));
            return Some(YtDlpProgress {
                percent: self.highest,
                total_bytes: progress.total_bytes,
            });
        }

        let share = (self.current as f64 + progress.percent.clamp(0.0, 100.0) / 100.0)
            / self.streams as f64;
        self.highest = self.highest.max(share * 100.0);
        // Each stream reports its own size, so no overall total
        Some(YtDlpProgress {
            percent: self.highest,
            total_bytes: None,
        })
    }
}

impl Default for MergedProgress {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to a yt-dlp executable
#[derive(Debug, Clone)]
pub struct YtDlp {
    binary: PathBuf,
}

impl YtDlp {
    /// Use `yt-dlp` from PATH
    pub fn new() -> Self {
        Self::with_binary("yt-dlp")
    }

    /// Use a specific binary
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Check that the binary runs
    pub async fn is_available(&self) -> bool {
        Command::new(&self.binary)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.kill_on_drop(true);
        cmd
    }

    fn map_spawn_error(&self, e: std::io::Error) -> YtDlpError {
        if e.kind() == std::io::ErrorKind::NotFound {
            YtDlpError::NotFound(self.binary.display().to_string())
        } else {
            YtDlpError::Io(e)
        }
    }

    /// Run yt-dlp and parse its stdout as a single JSON document
    async fn run_json(&self, args: &[&str]) -> Result<Value, YtDlpError> {
        tracing::debug!(binary = %self.binary.display(), ?args, "running yt-dlp");

        let output = self
            .command()
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| self.map_spawn_error(e))?;

        if !output.status.success() {
            return Err(YtDlpError::Failed {
                status: output.status.to_string(),
                stderr: summarize_stderr(&String::from_utf8_lossy(&output.stderr)),
            });
        }

        Ok(serde_json::from_slice(&output.stdout)?)
    }

    /// Build the argument list for a merged download
    pub fn download_args(job: &FetchJob) -> Vec<String> {
        vec![
            "-f".to_string(),
            job.quality.format_selector(),
            "--merge-output-format".to_string(),
            job.merge_format(),
            "--newline".to_string(),
            "--no-warnings".to_string(),
            "--no-playlist".to_string(),
            "-o".to_string(),
            output_template(&job.output),
            job.url.clone(),
        ]
    }
}

impl Default for YtDlp {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaResolver for YtDlp {
    async fn probe(&self, url: &str) -> Result<ProbeResult, YtDlpError> {
        let json = self
            .run_json(&["--dump-json", "--no-warnings", "--no-playlist", url])
            .await?;
        parse_probe(json)
    }

    async fn resolve(&self, url: &str, format_id: &str) -> Result<ResolvedMedia, YtDlpError> {
        let json = self
            .run_json(&[
                "--dump-json",
                "--no-warnings",
                "--no-playlist",
                "-f",
                format_id,
                url,
            ])
            .await?;
        parse_resolved(&json, format_id)
    }
}

#[async_trait]
impl MediaFetcher for YtDlp {
    async fn fetch(
        &self,
        job: &FetchJob,
        observer: &mut dyn ProgressObserver,
    ) -> Result<(), FetchError> {
        let args = Self::download_args(job);
        tracing::info!(url = %job.url, quality = %job.quality, output = %job.output.display(), "starting yt-dlp download");

        let started = Instant::now();
        let mut child = self
            .command()
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.map_spawn_error(e))?;

        let stderr_task = child.stderr.take().map(|mut pipe| {
            tokio::spawn(async move {
                let mut buf = String::new();
                let _ = pipe.read_to_string(&mut buf).await;
                buf
            })
        });

        if let Some(stdout) = child.stdout.take() {
            let mut merged = MergedProgress::new();
            let mut lines = BufReader::new(stdout).lines();
            while let Some(line) = lines.next_line().await.map_err(YtDlpError::Io)? {
                match merged.feed(&line) {
                    Some(p) => observer.on_progress(&p.to_progress(started.elapsed().as_secs_f64())),
                    None => tracing::trace!(line = %line, "yt-dlp"),
                }
            }
        }

        let status = child.wait().await.map_err(YtDlpError::Io)?;
        let stderr = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };

        if !status.success() {
            return Err(YtDlpError::Failed {
                status: status.to_string(),
                stderr: summarize_stderr(&stderr),
            }
            .into());
        }

        tracing::info!(output = %job.output.display(), elapsed = started.elapsed().as_secs_f64(), "yt-dlp download finished");
        Ok(())
    }
}

/// `-o` takes an output template; a literal path needs its `%` doubled
fn output_template(path: &Path) -> String {
    path.display().to_string().replace('%', "%%")
}

// =============================================================================
// Output Parsing
// =============================================================================

/// Split a `--dump-json` document into metadata and formats
pub fn parse_probe(json: Value) -> Result<ProbeResult, YtDlpError> {
    let formats = json
        .get("formats")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|f| serde_json::from_value::<VideoFormat>(f.clone()).ok())
                .collect()
        })
        .unwrap_or_default();

    let metadata: VideoMetadata = serde_json::from_value(json)?;
    Ok(ProbeResult { metadata, formats })
}

/// Pull the direct media URL out of a single-format `--dump-json` document
pub fn parse_resolved(json: &Value, format_id: &str) -> Result<ResolvedMedia, YtDlpError> {
    let url = json
        .get("url")
        .and_then(|v| v.as_str())
        .filter(|u| !u.is_empty())
        .ok_or_else(|| YtDlpError::NoUrl(format_id.to_string()))?;

    Ok(ResolvedMedia {
        url: url.to_string(),
        ext: json.get("ext").and_then(|v| v.as_str()).map(String::from),
        title: json.get("title").and_then(|v| v.as_str()).map(String::from),
    })
}

fn progress_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^\[download\]\s+(\d+(?:\.\d+)?)%(?:\s+of\s+~?\s*(\d+(?:\.\d+)?)\s*([KMGT]?i?B))?",
        )
        .expect("progress regex is valid")
    })
}

fn formats_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\[info\] .*Downloading \d+ format\(s\): (\S+)")
            .expect("formats regex is valid")
    })
}

/// Parse a yt-dlp `[download]` progress line
pub fn parse_progress_line(line: &str) -> Option<YtDlpProgress> {
    let caps = progress_regex().captures(line.trim())?;
    let percent = caps.get(1)?.as_str().parse::<f64>().ok()?;
    let total_bytes = match (caps.get(2), caps.get(3)) {
        (Some(value), Some(unit)) => parse_size(value.as_str(), unit.as_str()),
        _ => None,
    };
    Some(YtDlpProgress {
        percent,
        total_bytes,
    })
}

fn parse_size(value: &str, unit: &str) -> Option<u64> {
    let value: f64 = value.parse().ok()?;
    let multiplier: f64 = match unit {
        "B" => 1.0,
        "KiB" => 1024.0,
        "MiB" => 1024.0 * 1024.0,
        "GiB" => 1024.0 * 1024.0 * 1024.0,
        "TiB" => 1024.0 * 1024.0 * 1024.0 * 1024.0,
        "KB" => 1e3,
        "MB" => 1e6,
        "GB" => 1e9,
        "TB" => 1e12,
        _ => return None,
    };
    Some((value * multiplier).round() as u64)
}

/// Last meaningful stderr line, preferring yt-dlp's `ERROR:` lines
fn summarize_stderr(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    lines
        .iter()
        .rev()
        .find(|l| l.starts_with("ERROR:"))
        .or_else(|| lines.last())
        .map(|l| l.to_string())
        .unwrap_or_else(|| "no error output".to_string())
}
