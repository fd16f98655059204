//! Application options (`drover.toml`).
//!
//! All types derive Serde traits; every field has a default so an empty
//! or missing options file is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How selectors are laid out in the tray menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MenuLayout {
    /// One submenu per selector.
    Nested,
    /// Selector captions followed by their outbounds in the top menu.
    #[default]
    Flat,
}

/// Root options for the supervisor.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DroverOptions {
    /// Directory holding the sing-box executable.
    pub engine_dir: PathBuf,

    /// Path to the sing-box configuration file.
    pub config_path: PathBuf,

    /// Enable the system proxy on startup and disable it on exit.
    pub system_proxy_auto: bool,

    /// Menu layout mode.
    pub menu_layout: MenuLayout,

    /// Restart the engine when its configuration file changes.
    pub watch_config: bool,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Prometheus metrics bind address; disabled when unset.
    pub metrics_address: Option<String>,

    /// Timeout configuration.
    pub timeouts: TimeoutOptions,
}

impl Default for DroverOptions {
    fn default() -> Self {
        let engine_dir = default_engine_dir();
        Self {
            config_path: engine_dir.join("config.json"),
            engine_dir,
            system_proxy_auto: true,
            menu_layout: MenuLayout::Flat,
            watch_config: false,
            log_level: "info".to_string(),
            metrics_address: None,
            timeouts: TimeoutOptions::default(),
        }
    }
}

impl DroverOptions {
    /// Resolve relative paths against `base` (the options file directory).
    pub fn resolve_relative_to(&mut self, base: &Path) {
        if self.engine_dir.is_relative() {
            self.engine_dir = base.join(&self.engine_dir);
        }
        if self.config_path.is_relative() {
            self.config_path = base.join(&self.config_path);
        }
    }
}

/// Timeouts for engine and control plane operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutOptions {
    /// Per-request control plane timeout in seconds.
    pub control_request_secs: u64,

    /// How long to watch a freshly spawned engine for an immediate exit.
    pub liveness_ms: u64,

    /// Grace period between the terminate request and a forced kill.
    pub graceful_stop_secs: u64,

    /// Upper bound on waiting for the control plane after start.
    pub readiness_ms: u64,
}

impl Default for TimeoutOptions {
    fn default() -> Self {
        Self {
            control_request_secs: 5,
            liveness_ms: 100,
            graceful_stop_secs: 5,
            readiness_ms: 3000,
        }
    }
}

impl TimeoutOptions {
    pub fn control_request(&self) -> Duration {
        Duration::from_secs(self.control_request_secs)
    }

    pub fn liveness(&self) -> Duration {
        Duration::from_millis(self.liveness_ms)
    }

    pub fn graceful_stop(&self) -> Duration {
        Duration::from_secs(self.graceful_stop_secs)
    }

    pub fn readiness(&self) -> Duration {
        Duration::from_millis(self.readiness_ms)
    }
}

/// Directory of the running executable, falling back to the working dir.
pub fn default_engine_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
}
