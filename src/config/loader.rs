//! Configuration loading from disk.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use crate::config::engine::{extract, EngineConfig};
use crate::config::error::ConfigError;
use crate::config::options::DroverOptions;

/// Default options file name, looked up next to the executable.
pub const OPTIONS_FILE_NAME: &str = "drover.toml";

/// Read and extract the engine configuration. Does not validate.
pub fn load_engine_config(path: &Path) -> Result<EngineConfig, ConfigError> {
    let content = read(path)?;
    extract(&content)
}

/// Load options from a TOML file.
///
/// A missing file yields the defaults. Relative paths inside the file are
/// resolved against the file's directory.
pub fn load_options(path: &Path) -> Result<DroverOptions, ConfigError> {
    let content = match read(path) {
        Ok(content) => content,
        Err(ConfigError::NotFound { .. }) => {
            tracing::info!(path = %path.display(), "Options file not found, using defaults");
            return Ok(DroverOptions::default());
        }
        Err(e) => return Err(e),
    };

    let mut options: DroverOptions = toml::from_str(&content).map_err(|source| ConfigError::Options {
        path: path.to_path_buf(),
        source,
    })?;

    if let Some(base) = path.parent() {
        options.resolve_relative_to(base);
    }

    Ok(options)
}

fn read(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| match source.kind() {
        ErrorKind::NotFound => ConfigError::NotFound {
            path: path.to_path_buf(),
        },
        _ => ConfigError::Io {
            path: path.to_path_buf(),
            source,
        },
    })
}
