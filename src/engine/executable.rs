//! Locating the engine binary.

use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::engine::error::EngineError;

/// Base name of the engine binary.
pub const ENGINE_BINARY: &str = "sing-box";

/// Platform file name of the engine binary (`sing-box.exe` on Windows).
pub fn engine_file_name() -> String {
    format!("{}{}", ENGINE_BINARY, env::consts::EXE_SUFFIX)
}

/// Find the engine binary in `engine_dir`, then on the system `PATH`.
pub fn resolve_executable(engine_dir: &Path) -> Result<PathBuf, EngineError> {
    resolve_in(engine_dir, &engine_file_name(), env::var_os("PATH"))
}

/// Lookup with an explicit file name and search path.
pub fn resolve_in(
    engine_dir: &Path,
    file_name: &str,
    search_path: Option<OsString>,
) -> Result<PathBuf, EngineError> {
    let local = engine_dir.join(file_name);
    if local.is_file() {
        tracing::debug!(path = %local.display(), "Engine binary found in engine directory");
        return Ok(local);
    }

    let found = search_path
        .as_deref()
        .into_iter()
        .flat_map(env::split_paths)
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(|dir| dir.join(file_name))
        .find(|candidate| candidate.is_file());

    match found {
        Some(path) => {
            tracing::debug!(path = %path.display(), "Engine binary found on PATH");
            Ok(path)
        }
        None => Err(EngineError::ExecutableNotFound {
            name: file_name.to_string(),
            dir: engine_dir.to_path_buf(),
        }),
    }
}
