use std::net::SocketAddr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub log_level: Level,
    /// Upper bound for a single inbound WebSocket message (and frame).
    pub max_message_bytes: usize,
    /// Upper bound for producing the upgrade response once the request is read.
    pub handshake_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], 8080)),
            log_level: Level::INFO,
            max_message_bytes: 1024,
            handshake_timeout: Duration::from_secs(10),
        }
    }
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        let defaults = Self::default();

        let bind_address = match std::env::var("BIND_ADDRESS") {
            Ok(raw) => raw.parse::<SocketAddr>().map_err(|e| {
                ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
            })?,
            Err(_) => defaults.bind_address,
        };

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let max_message_bytes =
            positive_var("MAX_MESSAGE_BYTES")?.unwrap_or(defaults.max_message_bytes as u64);
        let handshake_timeout = positive_var("HANDSHAKE_TIMEOUT_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.handshake_timeout);

        Ok(Self {
            bind_address,
            log_level,
            max_message_bytes: max_message_bytes as usize,
            handshake_timeout,
        })
    }
}

/// Reads an optional, strictly positive integer variable.
fn positive_var(name: &str) -> Result<Option<u64>, ConfigError> {
    let Ok(raw) = std::env::var(name) else {
        return Ok(None);
    };
    match raw.trim().parse::<u64>() {
        Ok(0) => Err(ConfigError::InvalidValue(
            name.to_string(),
            "must be greater than zero".to_string(),
        )),
        Ok(value) => Ok(Some(value)),
        Err(e) => Err(ConfigError::InvalidValue(name.to_string(), e.to_string())),
    }
}
