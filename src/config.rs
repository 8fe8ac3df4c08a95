//! Server configuration from the environment (a `.env` file is loaded first by main).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::presence::DEFAULT_TIMEOUT_SECS;

const DEFAULT_BIND: &str = "0.0.0.0:8080";
const DEFAULT_SWEEP_SECS: u64 = 5;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid bind address '{value}': {source}")]
    InvalidBind {
        value: String,
        source: std::net::AddrParseError,
    },
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub presence_timeout: Duration,
    pub sweep_interval: Duration,
    pub static_dir: PathBuf,
    /// JSON file with categories to load at startup
    pub categories_file: Option<PathBuf>,
}

fn seconds_from_env(key: &str, default: u64) -> Duration {
    let secs = match std::env::var(key) {
        Ok(v) => match v.trim().parse::<u64>() {
            Ok(n) if n > 0 => n,
            _ => {
                tracing::warn!("{}='{}' is not a positive number, using {}", key, v, default);
                default
            }
        },
        Err(_) => default,
    };
    Duration::from_secs(secs)
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let bind_value =
            std::env::var("TOPLIST_BIND").unwrap_or_else(|_| DEFAULT_BIND.to_string());
        let bind = bind_value
            .parse::<SocketAddr>()
            .map_err(|source| ConfigError::InvalidBind {
                value: bind_value.clone(),
                source,
            })?;

        let presence_timeout =
            seconds_from_env("TOPLIST_PRESENCE_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS as u64);
        let sweep_interval = seconds_from_env("TOPLIST_SWEEP_INTERVAL_SECS", DEFAULT_SWEEP_SECS);

        let static_dir = std::env::var("TOPLIST_STATIC_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("static"));

        let categories_file = std::env::var("TOPLIST_CATEGORIES")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);

        tracing::info!(
            %bind,
            presence_timeout_secs = presence_timeout.as_secs(),
            sweep_interval_secs = sweep_interval.as_secs(),
            "Server config loaded"
        );

        Ok(Self {
            bind,
            presence_timeout,
            sweep_interval,
            static_dir,
            categories_file,
        })
    }

    pub fn presence_timeout_chrono(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.presence_timeout.as_secs() as i64)
    }
}
