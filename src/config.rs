// Runtime configuration. Every knob has a usable default and can be
// overridden by flag or environment variable.

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(name = "beatfetch", about = "Audio download + BPM/key analysis service")]
pub struct Config {
    /// Address to bind the HTTP server to
    #[arg(long, env = "BEATFETCH_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port for the HTTP server
    #[arg(long, env = "BEATFETCH_PORT", default_value_t = 5000)]
    pub port: u16,

    /// Directory for per-job scratch files (defaults to <system temp>/beatfetch)
    #[arg(long, env = "BEATFETCH_TEMP_DIR")]
    pub temp_dir: Option<PathBuf>,

    /// Seconds a finished job stays queryable before eviction
    #[arg(long, env = "BEATFETCH_RETENTION_SECS", default_value_t = 3600)]
    pub retention_secs: u64,

    /// Seconds between reaper sweeps
    #[arg(long, env = "BEATFETCH_REAP_INTERVAL_SECS", default_value_t = 300)]
    pub reap_interval_secs: u64,

    /// Seconds before a thumbnail request is abandoned
    #[arg(long, env = "BEATFETCH_THUMBNAIL_TIMEOUT_SECS", default_value_t = 5)]
    pub thumbnail_timeout_secs: u64,
}

impl Config {
    pub fn temp_dir(&self) -> PathBuf {
        self.temp_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("beatfetch"))
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_secs)
    }

    pub fn thumbnail_timeout(&self) -> Duration {
        Duration::from_secs(self.thumbnail_timeout_secs)
    }
}
