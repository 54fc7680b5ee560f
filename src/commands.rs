//! CLI Command Handlers
//!
//! Implements all CLI commands by calling the appropriate backend services.
//! Each handler takes CLI args, the loaded Config and Output, returns ExitCode.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;

use crate::cli::{
    DownloadCmd, DownloadReport, ExitCode, FetchCmd, FormatRow, FormatsCmd, InfoCmd, Output,
    ScheduleCmd, ServeCmd,
};
use crate::config::Config;
use crate::fetch::{BarObserver, DownloadError, StreamingDownloader};
use crate::models::{DownloadRequest, ResolvedMedia};
use crate::prompt::{self, PromptFlow, Session, SessionOutcome};
use crate::resolver::{MediaResolver, YtDlp, YtDlpError};
use crate::schedule::{CronSchedule, Scheduler};
use crate::server::{self, AppState};

// =============================================================================
// Shared Helpers
// =============================================================================

fn resolver(config: &Config) -> YtDlp {
    YtDlp::with_binary(&config.ytdlp_path)
}

fn downloader(config: &Config) -> Result<StreamingDownloader, DownloadError> {
    StreamingDownloader::with_timeouts(config.connect_timeout(), config.read_timeout())
}

fn resolve_exit_code(e: &YtDlpError) -> ExitCode {
    match e {
        YtDlpError::NotFound(_) => ExitCode::Error,
        _ => ExitCode::ResolveFailed,
    }
}

fn download_exit_code(e: &DownloadError) -> ExitCode {
    if e.is_network() {
        ExitCode::NetworkError
    } else {
        ExitCode::DownloadFailed
    }
}

fn bar(output: &Output) -> BarObserver {
    if output.show_progress() {
        BarObserver::new()
    } else {
        BarObserver::hidden()
    }
}

/// Cancel `token` on Ctrl-C
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupted, stopping");
            token.cancel();
        }
    });
}

/// Filename for a resolved download when none was given
///
/// Uses the title with path-hostile characters replaced, then the media
/// extension (or `fallback_ext`).
pub fn default_filename(media: &ResolvedMedia, fallback_ext: &str) -> String {
    let stem: String = media
        .title
        .as_deref()
        .unwrap_or("video")
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\0' => '_',
            c => c,
        })
        .collect();
    let stem = stem.trim().trim_matches('.');
    let stem = if stem.is_empty() { "video" } else { stem };
    let ext = media.ext.as_deref().unwrap_or(fallback_ext);
    format!("{}.{}", stem, ext)
}

/// Add the media extension when the given name has none
fn with_media_extension(name: &str, media: &ResolvedMedia, fallback_ext: &str) -> String {
    if Path::new(name).extension().is_some() {
        name.to_string()
    } else {
        prompt::ensure_extension(name, media.ext.as_deref().unwrap_or(fallback_ext))
    }
}

// =============================================================================
// Interactive Command
// =============================================================================

pub async fn interactive_cmd(config: &Config, output: &Output) -> ExitCode {
    let downloader = match downloader(config) {
        Ok(d) => d,
        Err(e) => return output.error(e.to_string(), ExitCode::Error),
    };
    let resolver: Arc<dyn MediaResolver> = Arc::new(resolver(config));

    let mut flow = PromptFlow::new(
        BufReader::new(tokio::io::stdin()),
        std::io::stdout(),
        resolver,
        downloader,
    )
    .with_extension(config.default_extension.clone())
    .with_progress(!output.quiet);

    let mut session = Session::new(&config.output_dir);
    match flow.run(&mut session).await {
        Ok(SessionOutcome::Downloaded(_)) | Ok(SessionOutcome::Closed) => ExitCode::Success,
        Ok(SessionOutcome::Aborted(_)) => ExitCode::Error,
        Ok(SessionOutcome::Scheduled(schedule)) => {
            let cancel = CancellationToken::new();
            cancel_on_ctrl_c(cancel.clone());
            let runs = prompt::run_scheduled(flow, schedule, session, cancel).await;
            tracing::info!(runs, "scheduled sessions finished");
            ExitCode::Success
        }
        Err(e) => output.error(e.to_string(), ExitCode::Error),
    }
}

// =============================================================================
// Formats Command
// =============================================================================

pub async fn formats_cmd(cmd: FormatsCmd, config: &Config, output: &Output) -> ExitCode {
    let ytdlp = resolver(config);
    output.info(format!("Fetching formats for: {}", cmd.url));

    let probe = match ytdlp.probe(&cmd.url).await {
        Ok(p) => p,
        Err(e) => {
            return output.error(
                format!("Error fetching video formats: {}", e),
                resolve_exit_code(&e),
            )
        }
    };

    let formats: Vec<_> = if cmd.all {
        probe.formats.iter().collect()
    } else {
        probe.listable_formats()
    };
    if formats.is_empty() {
        return output.error("No formats available for this video.", ExitCode::NoFormats);
    }

    let rows: Vec<FormatRow> = formats
        .iter()
        .enumerate()
        .map(|(i, f)| FormatRow::new(i + 1, f))
        .collect();

    if output.json {
        if let Err(e) = output.print(&rows) {
            return output.error(format!("Failed to serialize: {}", e), ExitCode::Error);
        }
    } else {
        output.line(format!("{}:", probe.metadata.title));
        for (row, format) in rows.iter().zip(&formats) {
            let note = row.note.as_deref().unwrap_or("");
            output.line(format!("  {}: {}  [{}] {}", row.index, format, row.format_id, note));
        }
    }
    ExitCode::Success
}

// =============================================================================
// Info Command
// =============================================================================

pub async fn info_cmd(cmd: InfoCmd, config: &Config, output: &Output) -> ExitCode {
    let ytdlp = resolver(config);
    output.info(format!("Getting info for: {}", cmd.url));

    match ytdlp.metadata(&cmd.url).await {
        Ok(meta) => {
            if let Err(e) = output.print(&meta) {
                return output.error(format!("Failed to serialize: {}", e), ExitCode::Error);
            }
            ExitCode::Success
        }
        Err(e) => output.error(format!("Info failed: {}", e), resolve_exit_code(&e)),
    }
}

// =============================================================================
// Download Command
// =============================================================================

pub async fn download_cmd(cmd: DownloadCmd, config: &Config, output: &Output) -> ExitCode {
    download_once(&cmd, config, output).await
}

/// Resolve the chosen format and stream it to disk
async fn download_once(cmd: &DownloadCmd, config: &Config, output: &Output) -> ExitCode {
    let ytdlp = resolver(config);
    let downloader = match downloader(config) {
        Ok(d) => d,
        Err(e) => return output.error(e.to_string(), ExitCode::Error),
    };

    output.info(format!("Resolving {} (format {})", cmd.url, cmd.format));
    let media = match ytdlp.resolve(&cmd.url, &cmd.format).await {
        Ok(m) => m,
        Err(e) => {
            return output.error(
                format!("Error downloading video: {}", e),
                resolve_exit_code(&e),
            )
        }
    };

    let dir = cmd
        .output_dir
        .clone()
        .unwrap_or_else(|| config.output_dir.clone());
    let filename = match cmd.filename.as_deref() {
        Some(name) => with_media_extension(name, &media, &config.default_extension),
        None => default_filename(&media, &config.default_extension),
    };

    if let Err(e) = tokio::fs::create_dir_all(&dir).await {
        return output.error(
            format!("Cannot create {}: {}", dir.display(), e),
            ExitCode::Error,
        );
    }

    fetch_to(&downloader, &media.url, dir.join(filename), output).await
}

async fn fetch_to(
    downloader: &StreamingDownloader,
    url: &str,
    destination: PathBuf,
    output: &Output,
) -> ExitCode {
    let request = DownloadRequest::new(url, destination);
    let mut observer = bar(output);

    match downloader.download(&request, &mut observer).await {
        Ok(outcome) => {
            output.info(format!(
                "Video downloaded successfully to {}",
                outcome.path.display()
            ));
            output.info(format!(
                "Time spent on download: {:.2} seconds",
                outcome.elapsed_seconds
            ));
            if output.json {
                if let Err(e) = output.print(DownloadReport::from(&outcome)) {
                    return output.error(format!("Failed to serialize: {}", e), ExitCode::Error);
                }
            }
            ExitCode::Success
        }
        Err(e) => output.error(
            format!("Error downloading video: {}", e),
            download_exit_code(&e),
        ),
    }
}

// =============================================================================
// Fetch Command
// =============================================================================

pub async fn fetch_cmd(cmd: FetchCmd, config: &Config, output: &Output) -> ExitCode {
    let downloader = match downloader(config) {
        Ok(d) => d,
        Err(e) => return output.error(e.to_string(), ExitCode::Error),
    };

    if let Some(parent) = cmd.output.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Err(e) = tokio::fs::create_dir_all(parent).await {
            return output.error(
                format!("Cannot create {}: {}", parent.display(), e),
                ExitCode::Error,
            );
        }
    }

    fetch_to(&downloader, &cmd.url, cmd.output, output).await
}

// =============================================================================
// Serve Command
// =============================================================================

pub async fn serve_cmd(cmd: ServeCmd, config: &Config, output: &Output) -> ExitCode {
    let mut config = config.clone();
    if let Some(port) = cmd.port {
        config.port = port;
    }
    if let Some(bind) = cmd.bind {
        config.bind = bind;
    }
    if let Some(dir) = cmd.output_dir {
        config.output_dir = dir;
    }

    let ytdlp = resolver(&config);
    if !ytdlp.is_available().await {
        tracing::warn!(
            binary = %ytdlp.binary().display(),
            "yt-dlp is not runnable; downloads will fail until it is installed"
        );
    }

    let state = AppState::new(Arc::new(ytdlp), config.output_dir.clone())
        .with_job_history(config.job_history);
    match server::serve(config.listen_addr(), state).await {
        Ok(()) => ExitCode::Success,
        Err(e) => output.error(e.to_string(), ExitCode::Error),
    }
}

// =============================================================================
// Schedule Command
// =============================================================================

pub async fn schedule_cmd(cmd: ScheduleCmd, config: &Config, output: &Output) -> ExitCode {
    let schedule = match CronSchedule::parse(&cmd.cron) {
        Ok(s) => s,
        Err(e) => return output.error(e.to_string(), ExitCode::InvalidArgs),
    };

    output.info(format!(
        "Download scheduled with cron expression: {}",
        schedule
    ));
    if let Some(next) = schedule.upcoming(1).first() {
        output.info(format!("Next run: {}", next.format("%Y-%m-%d %H:%M:%S")));
    }

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let download = &cmd.download;
    let runs = Scheduler::new(schedule)
        .run(cancel, || async move {
            let code = download_once(download, config, output).await;
            if code != ExitCode::Success {
                tracing::warn!(url = %download.url, code = i32::from(code), "scheduled download failed");
            }
        })
        .await;

    tracing::info!(runs, "scheduler finished");
    ExitCode::Success
}
