//! Configuration error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading options or the engine configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The engine configuration file does not exist.
    #[error("Configuration file not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// The file exists but could not be read.
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The engine configuration is not valid JSON.
    #[error("Configuration file is corrupted or contains invalid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    /// No usable `mixed` inbound to point the system proxy at.
    #[error("No suitable mixed inbound found for the system proxy")]
    NoProxyInbound,

    /// The options file is not valid TOML or has wrongly typed fields.
    #[error("Invalid options file {}: {source}", path.display())]
    Options {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}
