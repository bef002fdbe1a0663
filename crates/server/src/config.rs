//! Server configuration loaded from environment variables.

use std::env;
use std::net::SocketAddr;

/// Top-level server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Bind address, built from `PORT`.
    pub addr: SocketAddr,
    /// Store URL (`sqlite:...`).
    pub store_url: String,
    /// Shared secret for session tokens on `/ws?token=...`. When unset,
    /// only unauthenticated (limited) sessions are possible.
    pub service_key: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Description | Default |
    /// |----------|-------------|---------|
    /// | `PORT` | Listen port | `8000` |
    /// | `STORE_URL` | Store URL | `sqlite:leads.db?mode=rwc` |
    /// | `STORE_SERVICE_KEY` | Session token secret | (unset) |
    pub fn from_env() -> Result<Self, ConfigError> {
        let port: u16 = env::var("PORT")
            .unwrap_or_else(|_| "8000".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidPort)?;

        Ok(Self {
            addr: SocketAddr::from(([0, 0, 0, 0], port)),
            store_url: env::var("STORE_URL")
                .unwrap_or_else(|_| "sqlite:leads.db?mode=rwc".to_string()),
            service_key: env::var("STORE_SERVICE_KEY").ok(),
        })
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("PORT must be a number")]
    InvalidPort,
}
