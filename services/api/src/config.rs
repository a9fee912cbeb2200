use roleplay_core::config::ProviderConfig;
use std::{net::SocketAddr, time::Duration};
use tracing::Level;

pub use roleplay_core::config::{ConfigError, Provider};

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub provider: ProviderConfig,
    pub log_level: Level,
    /// Sessions untouched for this long are dropped. `None` keeps them forever.
    pub session_idle_timeout: Option<Duration>,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let provider = ProviderConfig::from_env()?;

        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let idle_secs_str =
            std::env::var("SESSION_IDLE_TIMEOUT_SECS").unwrap_or_else(|_| "3600".to_string());
        let idle_secs = idle_secs_str.trim().parse::<u64>().map_err(|e| {
            ConfigError::InvalidValue(
                "SESSION_IDLE_TIMEOUT_SECS".to_string(),
                format!("'{}': {}", idle_secs_str, e),
            )
        })?;
        let session_idle_timeout = (idle_secs > 0).then(|| Duration::from_secs(idle_secs));

        Ok(Self {
            bind_address,
            provider,
            log_level,
            session_idle_timeout,
        })
    }
}
