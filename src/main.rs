//! ytgrab - download videos through yt-dlp
//!
//! Prompts for a quality and filename, streams the file to disk with a
//! progress bar, and reports how long it took. Also runs on a cron schedule
//! or as a small HTTP service.
//!
//! # Usage
//!
//! ```bash
//! # Interactive prompts
//! ytgrab
//!
//! # CLI mode (for automation)
//! ytgrab download "https://youtu.be/dQw4w9WgXcQ" -f 22 -n clip.mp4
//! ytgrab serve --port 5000
//! ```

use clap::Parser;
use tracing_subscriber::EnvFilter;

use ytgrab::cli::{Cli, Command, ExitCode, Output};
use ytgrab::commands;
use ytgrab::config::Config;

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    run(cli).await.into()
}

/// Log to stderr; RUST_LOG wins over -v
fn init_logging(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_filter()));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Run the selected command and return its exit code
async fn run(cli: Cli) -> ExitCode {
    let output = Output::new(&cli);

    let config = match cli.config.as_deref() {
        Some(path) => match Config::load_from(path) {
            Ok(config) => config,
            Err(e) => return output.error(format!("{:#}", e), ExitCode::InvalidArgs),
        },
        None => Config::load(),
    };
    tracing::debug!(?config, "configuration loaded");

    match cli.command {
        None | Some(Command::Interactive) => commands::interactive_cmd(&config, &output).await,

        Some(Command::Formats(cmd)) => commands::formats_cmd(cmd, &config, &output).await,

        Some(Command::Info(cmd)) => commands::info_cmd(cmd, &config, &output).await,

        Some(Command::Download(cmd)) => commands::download_cmd(cmd, &config, &output).await,

        Some(Command::Fetch(cmd)) => commands::fetch_cmd(cmd, &config, &output).await,

        Some(Command::Serve(cmd)) => commands::serve_cmd(cmd, &config, &output).await,

        Some(Command::Schedule(cmd)) => commands::schedule_cmd(cmd, &config, &output).await,
    }
}
