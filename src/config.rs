//! Configuration management for ytgrab
//!
//! Handles config file loading and environment overrides.
//! Config is stored at ~/.config/ytgrab/config.toml

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::server::DEFAULT_JOB_HISTORY;

/// Port the web service listens on unless configured otherwise
pub const DEFAULT_PORT: u16 = 5000;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where downloads are written
    pub output_dir: PathBuf,
    /// Web service port
    pub port: u16,
    /// Web service bind address
    pub bind: IpAddr,
    /// yt-dlp executable (name on PATH or full path)
    pub ytdlp_path: PathBuf,
    /// Seconds to wait for a TCP connection
    pub connect_timeout_secs: u64,
    /// Seconds a transfer may sit idle before it is abandoned
    pub read_timeout_secs: u64,
    /// Extension appended to prompted filenames
    pub default_extension: String,
    /// Finished web jobs kept for `GET /jobs`
    pub job_history: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("downloads"),
            port: DEFAULT_PORT,
            bind: IpAddr::V4(Ipv4Addr::LOCALHOST),
            ytdlp_path: PathBuf::from("yt-dlp"),
            connect_timeout_secs: 10,
            read_timeout_secs: 60,
            default_extension: "mp4".to_string(),
            job_history: DEFAULT_JOB_HISTORY,
        }
    }
}

impl Config {
    /// Get config file path (~/.config/ytgrab/config.toml)
    pub fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("ytgrab").join("config.toml"))
    }

    /// Load config from the default path, or return defaults if not found
    ///
    /// Environment overrides are applied on top.
    pub fn load() -> Self {
        let text = Self::path().and_then(|p| std::fs::read_to_string(p).ok());
        Self::parse_or_default(text.as_deref()).with_env_overrides()
    }

    /// Parse config text; missing or unparsable text yields the defaults
    fn parse_or_default(text: Option<&str>) -> Self {
        text.and_then(|s| toml::from_str::<Config>(s).ok())
            .unwrap_or_default()
    }

    /// Load config from an explicit file; unlike `load`, a bad file is an error
    pub fn load_from(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&text)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(config.with_env_overrides())
    }

    /// Apply YTGRAB_OUTPUT_DIR, YTGRAB_PORT and YTGRAB_YTDLP
    pub fn with_env_overrides(self) -> Self {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(dir) = lookup("YTGRAB_OUTPUT_DIR").filter(|d| !d.is_empty()) {
            self.output_dir = PathBuf::from(dir);
        }
        if let Some(port) = lookup("YTGRAB_PORT").and_then(|p| p.parse().ok()) {
            self.port = port;
        }
        if let Some(bin) = lookup("YTGRAB_YTDLP").filter(|b| !b.is_empty()) {
            self.ytdlp_path = PathBuf::from(bin);
        }
        self
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}
