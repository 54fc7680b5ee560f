//! Interactive prompt flow
//!
//! Walks the user through scheduling, output directory, URL, quality and
//! filename, then downloads. Each question is a `Step`; all answers live
//! in a `Session` that is passed from step to step.
//!
//! ```text
//! AskSchedule ─y─> AskCron ──> (scheduled)
//!      │n
//!      v
//! AskDirectory -> AskUrl -> AskQuality -> AskFilename -> Download
//! ```

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::fetch::{BarObserver, StreamingDownloader};
use crate::models::{DownloadOutcome, DownloadRequest, VideoFormat};
use crate::resolver::MediaResolver;
use crate::schedule::{CronSchedule, Scheduler};

/// Errors that end the prompt loop itself (terminal I/O)
#[derive(Debug, Error)]
pub enum PromptError {
    #[error("Terminal I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// One question in the flow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    AskSchedule,
    AskCron,
    AskDirectory,
    AskUrl,
    AskQuality,
    AskFilename,
    Download,
}

/// How a session ended
#[derive(Debug)]
pub enum SessionOutcome {
    /// File saved
    Downloaded(DownloadOutcome),
    /// User asked for a cron schedule; the caller runs it
    Scheduled(CronSchedule),
    /// Session ended early with a message already shown to the user
    Aborted(String),
    /// Input reached end of file
    Closed,
}

/// Answers collected so far
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub output_dir: PathBuf,
    pub url: Option<String>,
    /// Formats offered in the quality menu, in menu order
    pub formats: Vec<VideoFormat>,
    pub format_code: Option<String>,
    pub filename: Option<String>,
}

impl Session {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            ..Default::default()
        }
    }

    /// Fresh session for the URL onwards, keeping the chosen directory
    pub fn restart(&self) -> Self {
        Self::new(self.output_dir.clone())
    }
}

enum Transition {
    Next(Step),
    Finish(SessionOutcome),
}

/// Add the extension unless the name already ends with it
pub fn ensure_extension(filename: &str, ext: &str) -> String {
    let suffix = format!(".{}", ext);
    if filename.ends_with(&suffix) {
        filename.to_string()
    } else {
        format!("{}{}", filename, suffix)
    }
}

/// Render the numbered quality menu
pub fn quality_menu(formats: &[VideoFormat]) -> String {
    formats
        .iter()
        .enumerate()
        .map(|(i, f)| format!("{}: {}\n", i + 1, f))
        .collect()
}

/// Map a 1-based menu answer to a format
pub fn select_format<'a>(formats: &'a [VideoFormat], answer: &str) -> Option<&'a VideoFormat> {
    let index: usize = answer.trim().parse().ok()?;
    index.checked_sub(1).and_then(|i| formats.get(i))
}

/// Drives the questions over any line input and text output
pub struct PromptFlow<R, W> {
    input: R,
    output: W,
    resolver: Arc<dyn MediaResolver>,
    downloader: StreamingDownloader,
    extension: String,
    show_progress: bool,
}

impl<R, W> PromptFlow<R, W>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    pub fn new(
        input: R,
        output: W,
        resolver: Arc<dyn MediaResolver>,
        downloader: StreamingDownloader,
    ) -> Self {
        Self {
            input,
            output,
            resolver,
            downloader,
            extension: "mp4".to_string(),
            show_progress: true,
        }
    }

    /// Extension forced onto filenames (default mp4)
    pub fn with_extension(mut self, ext: impl Into<String>) -> Self {
        self.extension = ext.into();
        self
    }

    /// Draw a progress bar during the download step
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Written output (for inspection in tests)
    pub fn output(&self) -> &W {
        &self.output
    }

    /// Run the whole flow from the scheduling question
    pub async fn run(&mut self, session: &mut Session) -> Result<SessionOutcome, PromptError> {
        self.run_from(Step::AskSchedule, session).await
    }

    /// Run the flow starting at `step`
    pub async fn run_from(
        &mut self,
        mut step: Step,
        session: &mut Session,
    ) -> Result<SessionOutcome, PromptError> {
        loop {
            tracing::debug!(?step, "prompt step");
            match self.step(step, session).await? {
                Transition::Next(next) => step = next,
                Transition::Finish(outcome) => return Ok(outcome),
            }
        }
    }

    async fn step(&mut self, step: Step, session: &mut Session) -> Result<Transition, PromptError> {
        match step {
            Step::AskSchedule => {
                let Some(answer) = self.ask("Do you want to schedule the download? (y/n): ").await?
                else {
                    return Ok(self.input_closed());
                };
                if answer.eq_ignore_ascii_case("y") {
                    Ok(Transition::Next(Step::AskCron))
                } else {
                    Ok(Transition::Next(Step::AskDirectory))
                }
            }

            Step::AskCron => {
                let Some(expr) = self
                    .ask("Enter the cron schedule (e.g., \"0 0 * * *\" for daily at midnight): ")
                    .await?
                else {
                    return Ok(self.input_closed());
                };
                match CronSchedule::parse(&expr) {
                    Ok(schedule) => {
                        writeln!(self.output, "Download scheduled with cron expression: {}", schedule)?;
                        Ok(Transition::Finish(SessionOutcome::Scheduled(schedule)))
                    }
                    Err(e) => self.abort(e.to_string()),
                }
            }

            Step::AskDirectory => {
                let question = format!(
                    "Enter the directory where you want to save the video (default is \"{}\"): ",
                    session.output_dir.display()
                );
                let Some(dir) = self.ask(&question).await? else {
                    return Ok(self.input_closed());
                };
                if !dir.is_empty() {
                    session.output_dir = PathBuf::from(dir);
                    if let Err(e) = tokio::fs::create_dir_all(&session.output_dir).await {
                        return self.abort(format!(
                            "Could not create directory {}: {}",
                            session.output_dir.display(),
                            e
                        ));
                    }
                }
                Ok(Transition::Next(Step::AskUrl))
            }

            Step::AskUrl => {
                let Some(url) = self.ask("Enter the YouTube video URL: ").await? else {
                    return Ok(self.input_closed());
                };
                if url.is_empty() {
                    return self.abort("No URL entered.");
                }

                let probe = match self.resolver.probe(&url).await {
                    Ok(probe) => probe,
                    Err(e) => {
                        tracing::warn!(url = %url, error = %e, "format probe failed");
                        return self.abort(format!("Error fetching video formats: {}", e));
                    }
                };

                session.url = Some(url);
                session.formats = probe
                    .listable_formats()
                    .into_iter()
                    .cloned()
                    .collect();

                if session.formats.is_empty() {
                    return self.abort("No formats available for this video.");
                }
                Ok(Transition::Next(Step::AskQuality))
            }

            Step::AskQuality => {
                writeln!(self.output, "\nAvailable video qualities:")?;
                write!(self.output, "{}", quality_menu(&session.formats))?;
                let Some(answer) = self
                    .ask("\nSelect the number corresponding to the desired video quality: ")
                    .await?
                else {
                    return Ok(self.input_closed());
                };
                match select_format(&session.formats, &answer) {
                    Some(format) => {
                        session.format_code = Some(format.format_id.clone());
                        Ok(Transition::Next(Step::AskFilename))
                    }
                    None => self.abort("Invalid selection."),
                }
            }

            Step::AskFilename => {
                let question = format!(
                    "Enter the output filename (e.g., video.{}): ",
                    self.extension
                );
                let Some(name) = self.ask(&question).await? else {
                    return Ok(self.input_closed());
                };
                if name.is_empty() {
                    return self.abort("No filename entered.");
                }
                session.filename = Some(ensure_extension(&name, &self.extension));
                Ok(Transition::Next(Step::Download))
            }

            Step::Download => self.download(session).await,
        }
    }

    async fn download(&mut self, session: &Session) -> Result<Transition, PromptError> {
        let (Some(url), Some(format_code), Some(filename)) = (
            session.url.as_deref(),
            session.format_code.as_deref(),
            session.filename.as_deref(),
        ) else {
            return self.abort("Session is missing a URL, quality or filename.");
        };

        let media = match self.resolver.resolve(url, format_code).await {
            Ok(media) => media,
            Err(e) => return self.abort(format!("Error downloading video: {}", e)),
        };

        if let Err(e) = tokio::fs::create_dir_all(&session.output_dir).await {
            return self.abort(format!("Error downloading video: {}", e));
        }

        let request = DownloadRequest::new(media.url, session.output_dir.join(filename));
        let mut observer = if self.show_progress {
            BarObserver::new()
        } else {
            BarObserver::hidden()
        };

        match self
            .downloader
            .download(&request, &mut observer)
            .await
        {
            Ok(outcome) => {
                writeln!(
                    self.output,
                    "Video downloaded successfully to {}",
                    outcome.path.display()
                )?;
                writeln!(
                    self.output,
                    "Time spent on download: {:.2} seconds",
                    outcome.elapsed_seconds
                )?;
                Ok(Transition::Finish(SessionOutcome::Downloaded(outcome)))
            }
            Err(e) => self.abort(format!("Error downloading video: {}", e)),
        }
    }

    /// Print a question and read one trimmed line; `None` on end of input
    async fn ask(&mut self, question: &str) -> Result<Option<String>, PromptError> {
        write!(self.output, "{}", question)?;
        self.output.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line).await? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }

    fn abort(&mut self, message: impl Into<String>) -> Result<Transition, PromptError> {
        let message = message.into();
        writeln!(self.output, "{}", message)?;
        Ok(Transition::Finish(SessionOutcome::Aborted(message)))
    }

    fn input_closed(&mut self) -> Transition {
        let _ = writeln!(self.output);
        Transition::Finish(SessionOutcome::Closed)
    }
}

/// Replay the flow from the URL question at every fire time
///
/// Returns the number of completed sessions.
pub async fn run_scheduled<R, W>(
    flow: PromptFlow<R, W>,
    schedule: CronSchedule,
    session: Session,
    cancel: CancellationToken,
) -> usize
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let flow = Arc::new(Mutex::new(flow));
    let template = session;
    let scheduler = Scheduler::new(schedule);

    scheduler
        .run(cancel.clone(), || {
            let flow = flow.clone();
            let mut session = template.restart();
            let cancel = cancel.clone();
            async move {
                let mut flow = flow.lock().await;
                let _ = writeln!(flow.output, "Running scheduled download...");
                match flow.run_from(Step::AskUrl, &mut session).await {
                    Ok(SessionOutcome::Closed) => cancel.cancel(),
                    Ok(_) => {}
                    Err(e) => {
                        tracing::error!(error = %e, "scheduled session failed");
                        cancel.cancel();
                    }
                }
            }
        })
        .await
}
