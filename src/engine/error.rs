//! Engine process error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that prevent the engine from being launched.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The configuration file to pass to the engine does not exist.
    #[error("Configuration file not found at: {}", path.display())]
    ConfigFileNotFound { path: PathBuf },

    /// The engine binary is neither in the engine directory nor on PATH.
    #[error("{name} executable not found. Looked in '{}' and system PATH", dir.display())]
    ExecutableNotFound { name: String, dir: PathBuf },

    /// The OS refused to launch the binary.
    #[error("Failed to execute engine binary ('{}'): {source}", path.display())]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A second start was requested while the engine is running.
    #[error("Engine is already running")]
    AlreadyRunning,
}
