//! Server configuration loaded from environment variables.
//!
//! Fail-fast: a missing or unreadable SP configuration file aborts startup
//! with a clear message instead of serving a half-configured provider.

use std::env;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("SP_CONFIG is not set; point it at the SP configuration JSON file")]
    MissingConfigPath,

    #[error("failed to read {path}: {source}")]
    Unreadable {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid PORT value: {0}")]
    InvalidPort(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Raw JSON contents of the SP configuration file.
    pub sp_config_json: String,
    pub host: String,
    pub port: u16,
    pub log_filter: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        // A missing .env file is fine; environment variables still apply.
        let _ = dotenvy::dotenv();

        let path = env::var("SP_CONFIG").map_err(|_| ConfigError::MissingConfigPath)?;
        let sp_config_json =
            std::fs::read_to_string(&path).map_err(|source| ConfigError::Unreadable {
                path: path.clone(),
                source,
            })?;

        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = match env::var("PORT") {
            Ok(value) => value
                .parse::<u16>()
                .map_err(|_| ConfigError::InvalidPort(value))?,
            Err(_) => 8080,
        };
        let log_filter = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            sp_config_json,
            host,
            port,
            log_filter,
        })
    }
}
