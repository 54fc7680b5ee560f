//! CLI - Command Line Interface for ytgrab
//!
//! Run without a subcommand for the interactive prompts. Every prompt step
//! also has a scriptable subcommand whose output is JSON-parseable.
//!
//! # Examples
//!
//! ```bash
//! # Interactive flow
//! ytgrab
//!
//! # List formats, then download one
//! ytgrab formats "https://youtu.be/dQw4w9WgXcQ" --json
//! ytgrab download "https://youtu.be/dQw4w9WgXcQ" -f 22 -n clip.mp4
//!
//! # Web service and cron
//! ytgrab serve --port 5000
//! ytgrab schedule "0 0 * * *" "https://youtu.be/dQw4w9WgXcQ"
//! ```

use clap::{ArgAction, Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::io::IsTerminal;
use std::net::IpAddr;
use std::path::PathBuf;

use crate::models::{DownloadOutcome, VideoFormat};

// =============================================================================
// Exit Codes
// =============================================================================

/// Exit codes for CLI operations (semantic for scripting)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Success
    Success = 0,
    /// General error
    Error = 1,
    /// Invalid arguments
    InvalidArgs = 2,
    /// Network error
    NetworkError = 3,
    /// yt-dlp could not resolve the URL
    ResolveFailed = 4,
    /// No downloadable formats
    NoFormats = 5,
    /// Transfer failed
    DownloadFailed = 6,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> i32 {
        code as i32
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> std::process::ExitCode {
        std::process::ExitCode::from(code as u8)
    }
}

// =============================================================================
// Main CLI Structure
// =============================================================================

/// ytgrab - download videos through yt-dlp
///
/// Run without arguments for the interactive prompts.
/// Use subcommands for automation and scripting.
#[derive(Parser, Debug)]
#[command(
    name = "ytgrab",
    version,
    about = "Download videos through yt-dlp, now or on a schedule",
    long_about = "Pick a quality and filename, then stream the video to disk with a \
                  progress bar and a timing report.\n\n\
                  Run without arguments for the interactive prompts.\n\
                  Use subcommands for automation, cron jobs and the web service.",
    after_help = "EXAMPLES:\n\
                  ytgrab                                  Interactive prompts\n\
                  ytgrab formats <url> --json             List formats\n\
                  ytgrab download <url> -f 22 -n a.mp4    Download one format\n\
                  ytgrab serve --port 5000                Run the web service"
)]
pub struct Cli {
    /// Output format as JSON (default for non-TTY)
    #[arg(long, short = 'j', global = true)]
    pub json: bool,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Path to config file
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// More log output (-v debug, -vv trace)
    #[arg(long, short = 'v', global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Subcommand to run (omit for interactive mode)
    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Cli {
    /// Check if JSON output should be used
    pub fn should_json(&self) -> bool {
        self.json || !std::io::stdout().is_terminal()
    }

    /// Log filter implied by `-v` when RUST_LOG is unset
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "ytgrab=info",
            1 => "ytgrab=debug",
            _ => "ytgrab=trace",
        }
    }
}

// =============================================================================
// Subcommands
// =============================================================================

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the interactive prompts (default)
    #[command(visible_alias = "i")]
    Interactive,

    /// List the formats available for a video
    #[command(visible_alias = "f")]
    Formats(FormatsCmd),

    /// Show video metadata
    Info(InfoCmd),

    /// Resolve a format and download it
    #[command(visible_alias = "dl")]
    Download(DownloadCmd),

    /// Download a direct media URL as-is
    Fetch(FetchCmd),

    /// Run the HTTP download service
    Serve(ServeCmd),

    /// Download on a cron schedule
    #[command(visible_alias = "cron")]
    Schedule(ScheduleCmd),
}

/// List formats for a video URL
#[derive(Args, Debug)]
pub struct FormatsCmd {
    /// Video page URL
    #[arg(required = true)]
    pub url: String,

    /// Include audio-only and formats without dimensions
    #[arg(long, short = 'a')]
    pub all: bool,
}

/// Show metadata for a video URL
#[derive(Args, Debug)]
pub struct InfoCmd {
    /// Video page URL
    #[arg(required = true)]
    pub url: String,
}

/// Resolve then stream one format to disk
#[derive(Args, Debug, Clone)]
pub struct DownloadCmd {
    /// Video page URL
    #[arg(required = true)]
    pub url: String,

    /// yt-dlp format id (see `formats`)
    #[arg(long, short = 'f', default_value = "best")]
    pub format: String,

    /// Output directory (default from config)
    #[arg(long, short = 'o')]
    pub output_dir: Option<PathBuf>,

    /// Output filename (default: the video title)
    #[arg(long, short = 'n')]
    pub filename: Option<String>,
}

/// Stream a direct media URL to a file
#[derive(Args, Debug)]
pub struct FetchCmd {
    /// Direct media URL
    #[arg(required = true)]
    pub url: String,

    /// Destination file
    #[arg(long, short = 'o', required = true)]
    pub output: PathBuf,
}

/// Run the HTTP service
#[derive(Args, Debug)]
pub struct ServeCmd {
    /// Port to listen on (default from config, 5000)
    #[arg(long, short = 'p')]
    pub port: Option<u16>,

    /// Address to bind (default from config, 127.0.0.1)
    #[arg(long, short = 'b')]
    pub bind: Option<IpAddr>,

    /// Output directory (default from config)
    #[arg(long, short = 'o')]
    pub output_dir: Option<PathBuf>,
}

/// Repeat a download at each cron fire time
#[derive(Args, Debug)]
pub struct ScheduleCmd {
    /// Cron expression, 5 fields or 6/7 with seconds
    #[arg(required = true)]
    pub cron: String,

    #[command(flatten)]
    pub download: DownloadCmd,
}

// =============================================================================
// JSON Output Types
// =============================================================================

/// Generic JSON output wrapper with status
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonOutput<T: Serialize> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "is_zero")]
    pub exit_code: i32,
}

fn is_zero(n: &i32) -> bool {
    *n == 0
}

impl<T: Serialize> JsonOutput<T> {
    /// Create success output with data
    pub fn success(data: T) -> Self {
        Self {
            data: Some(data),
            error: None,
            exit_code: 0,
        }
    }

    /// Create error output (no data)
    pub fn error_msg(msg: impl Into<String>, code: ExitCode) -> JsonOutput<()> {
        JsonOutput::<()> {
            data: None,
            error: Some(msg.into()),
            exit_code: code.into(),
        }
    }
}

/// One row of `formats` output
#[derive(Debug, Serialize, Deserialize)]
pub struct FormatRow {
    pub index: usize,
    pub format_id: String,
    pub ext: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fps: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filesize: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl FormatRow {
    pub fn new(index: usize, format: &VideoFormat) -> Self {
        Self {
            index,
            format_id: format.format_id.clone(),
            ext: format.ext.clone(),
            resolution: format.resolution(),
            fps: format.fps,
            filesize: format.size_bytes(),
            note: format.format_note.clone(),
        }
    }
}

/// Result of `download` and `fetch`
#[derive(Debug, Serialize, Deserialize)]
pub struct DownloadReport {
    pub status: String,
    pub path: PathBuf,
    pub bytes: u64,
    pub elapsed_seconds: f64,
}

impl From<&DownloadOutcome> for DownloadReport {
    fn from(outcome: &DownloadOutcome) -> Self {
        Self {
            status: "ok".to_string(),
            path: outcome.path.clone(),
            bytes: outcome.bytes_written,
            elapsed_seconds: outcome.elapsed_seconds,
        }
    }
}

// =============================================================================
// Output Helpers
// =============================================================================

/// Output handler for consistent formatting
pub struct Output {
    pub json: bool,
    pub quiet: bool,
}

impl Output {
    pub fn new(cli: &Cli) -> Self {
        Self {
            json: cli.should_json(),
            quiet: cli.quiet,
        }
    }

    /// Print success data as JSON
    pub fn print<T: Serialize>(&self, data: T) -> anyhow::Result<()> {
        if self.json {
            let output = JsonOutput::success(data);
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            println!("{}", serde_json::to_string_pretty(&data)?);
        }
        Ok(())
    }

    /// Print a plain line (suppressed in JSON mode)
    pub fn line(&self, msg: impl std::fmt::Display) {
        if !self.json {
            println!("{}", msg);
        }
    }

    /// Print error and return exit code
    pub fn error(&self, msg: impl Into<String>, code: ExitCode) -> ExitCode {
        let msg = msg.into();
        if self.json {
            let output = JsonOutput::<()>::error_msg(&msg, code);
            if let Ok(json) = serde_json::to_string_pretty(&output) {
                eprintln!("{}", json);
            }
        } else if !self.quiet {
            eprintln!("Error: {}", msg);
        }
        code
    }

    /// Print info message (suppressed in quiet mode)
    pub fn info(&self, msg: impl std::fmt::Display) {
        if !self.quiet && !self.json {
            eprintln!("{}", msg);
        }
    }

    /// Whether a live progress bar should be drawn
    pub fn show_progress(&self) -> bool {
        !self.quiet && !self.json && std::io::stderr().is_terminal()
    }
}

// =============================================================================
// Tests
// =============================================================================
