//! Configuration for fetchd
//!
//! All settings come from environment variables, with a `.env` file in the
//! working directory loaded first. Unparseable numeric values silently fall
//! back to their defaults so a typo never prevents the service from booting.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Service configuration
///
/// | Variable | Default | Meaning |
/// |---|---|---|
/// | `PORT` | `8080` | HTTP listen port |
/// | `DATA_DIR` | `data` | downloaded-file directory |
/// | `STATE_DIR` | `var/state` | snapshot + WAL directory |
/// | `WORKERS` | `4` | download worker pool size |
/// | `RETRY_MAX` | `3` | max retries per item (0 = no retry) |
/// | `RETRY_BACKOFF_MS` | `500` | linear backoff base in milliseconds |
/// | `SNAPSHOT_EVERY_N` | `50` | snapshot cadence in processed items (0 = never) |
/// | `FORCE_RESET` | `false` | accept a corrupt snapshot and start empty |
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// HTTP listen port (default: 8080)
    pub port: u16,

    /// Directory for downloaded files (default: "data")
    pub data_dir: PathBuf,

    /// Directory for the snapshot and write-ahead log (default: "var/state")
    pub state_dir: PathBuf,

    /// Download worker pool size (default: 4)
    pub workers: usize,

    /// Maximum retries per item, 0 disables retries (default: 3)
    pub retry_max: u32,

    /// Linear backoff base; attempt `n` waits `n * retry_backoff` (default: 500ms)
    pub retry_backoff: Duration,

    /// Write a snapshot every N processed items, 0 disables (default: 50)
    pub snapshot_every_n: usize,

    /// Start with an empty store when the snapshot is unreadable, instead of
    /// refusing to boot (default: false)
    pub force_reset: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            data_dir: PathBuf::from("data"),
            state_dir: PathBuf::from("var/state"),
            workers: 4,
            retry_max: 3,
            retry_backoff: Duration::from_millis(500),
            snapshot_every_n: 50,
            force_reset: false,
        }
    }
}

impl Config {
    /// Load configuration: `.env` file first (if present), then the process
    /// environment
    pub fn load() -> Self {
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    /// Read configuration from the process environment only
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            port: env_parse("PORT", defaults.port),
            data_dir: env_var("DATA_DIR").map(PathBuf::from).unwrap_or(defaults.data_dir),
            state_dir: env_var("STATE_DIR").map(PathBuf::from).unwrap_or(defaults.state_dir),
            workers: env_parse("WORKERS", defaults.workers),
            retry_max: env_parse("RETRY_MAX", defaults.retry_max),
            retry_backoff: Duration::from_millis(env_parse("RETRY_BACKOFF_MS", 500)),
            snapshot_every_n: env_parse("SNAPSHOT_EVERY_N", defaults.snapshot_every_n),
            force_reset: env_parse("FORCE_RESET", defaults.force_reset),
        }
    }

    /// Socket address the API server binds to
    pub fn bind_address(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.port))
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.is_empty())
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    parse_or(env_var(key).as_deref(), default)
}

/// Parse an optional string value, falling back to the default when the value
/// is absent or does not parse
fn parse_or<T: FromStr>(value: Option<&str>, default: T) -> T {
    match value {
        Some(raw) => raw.trim().parse().unwrap_or(default),
        None => default,
    }
}
