//! Child process lifecycle for the engine.
//!
//! # Responsibilities
//! - Spawn `sing-box run -c <config>` from the binary's own directory
//! - Detect a child that dies within the liveness window
//! - Stop gracefully, escalating to a kill after the stop timeout
//! - Notice a child that died later (`refresh`)
//!
//! The child handle lives behind an async mutex that is held for the whole
//! of `start` (including the liveness wait) and of `stop`, so the two can
//! never interleave on the same handle.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::config::TimeoutOptions;
use crate::engine::error::EngineError;
use crate::engine::output::{drain, OutputTail, STDERR_TAIL_LINES};
use crate::observability::metrics;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// How long to wait for stderr to flush after an immediate exit.
const STDERR_FLUSH_WAIT: Duration = Duration::from_millis(500);

/// Engine process state.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    NotStarted = 0,
    Starting = 1,
    Running = 2,
    Exited = 3,
    Stopped = 4,
}

impl From<u8> for EngineState {
    fn from(val: u8) -> Self {
        match val {
            1 => EngineState::Starting,
            2 => EngineState::Running,
            3 => EngineState::Exited,
            4 => EngineState::Stopped,
            _ => EngineState::NotStarted,
        }
    }
}

/// Result of a start attempt that got as far as spawning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// Still alive after the liveness window.
    Running { pid: Option<u32> },
    /// Died within the liveness window.
    Exited { code: Option<i32>, stderr: String },
}

impl StartOutcome {
    pub fn is_running(&self) -> bool {
        matches!(self, StartOutcome::Running { .. })
    }

    /// User-facing message for an immediate exit.
    pub fn diagnostic(&self) -> Option<String> {
        match self {
            StartOutcome::Running { .. } => None,
            StartOutcome::Exited { code, stderr } => {
                let code = code.map_or_else(|| "signal".to_string(), |c| c.to_string());
                Some(format!("Engine exited with code {}. Error:\n{}", code, stderr))
            }
        }
    }
}

/// How a stop request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// Nothing was running.
    NotRunning,
    /// The engine exited after the terminate request.
    Graceful,
    /// The engine had to be killed.
    Forced,
}

struct RunningEngine {
    child: Child,
    pid: Option<u32>,
    stderr_tail: OutputTail,
}

/// Supervisor for a single engine child process.
pub struct EngineProcess {
    state: AtomicU8,
    running: Mutex<Option<RunningEngine>>,
    liveness_window: Duration,
    stop_timeout: Duration,
}

impl EngineProcess {
    /// Create a supervisor using the configured timeouts.
    pub fn new(timeouts: &TimeoutOptions) -> Self {
        Self::with_timeouts(timeouts.liveness(), timeouts.graceful_stop())
    }

    pub fn with_timeouts(liveness_window: Duration, stop_timeout: Duration) -> Self {
        Self {
            state: AtomicU8::new(EngineState::NotStarted as u8),
            running: Mutex::new(None),
            liveness_window,
            stop_timeout,
        }
    }

    /// Current state, without locking.
    pub fn state(&self) -> EngineState {
        EngineState::from(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: EngineState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// PID of the running engine.
    pub async fn pid(&self) -> Option<u32> {
        self.running.lock().await.as_ref().and_then(|e| e.pid)
    }

    /// Launch the engine and watch it for the liveness window.
    pub async fn start(&self, executable: &Path, config_path: &Path) -> Result<StartOutcome, EngineError> {
        let mut slot = self.running.lock().await;
        if slot.is_some() {
            return Err(EngineError::AlreadyRunning);
        }

        if !config_path.exists() {
            return Err(EngineError::ConfigFileNotFound {
                path: config_path.to_path_buf(),
            });
        }

        // The child runs from the binary's directory, so relative paths
        // must be pinned to ours first.
        let executable = absolute(executable);
        let config_path = absolute(config_path);

        self.set_state(EngineState::Starting);

        let mut command = Command::new(&executable);
        command
            .arg("run")
            .arg("-c")
            .arg(&config_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = executable.parent() {
            command.current_dir(dir);
        }
        #[cfg(windows)]
        command.creation_flags(CREATE_NO_WINDOW);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(source) => {
                self.set_state(EngineState::NotStarted);
                metrics::record_engine_start("spawn_failed");
                tracing::error!(path = %executable.display(), error = %source, "Failed to spawn engine");
                return Err(EngineError::Spawn { path: executable, source });
            }
        };

        let pid = child.id();
        let stderr_tail = OutputTail::new(STDERR_TAIL_LINES);
        if let Some(stdout) = child.stdout.take() {
            drain(stdout, "stdout", None);
        }
        let stderr_task: Option<JoinHandle<()>> = child
            .stderr
            .take()
            .map(|stderr| drain(stderr, "stderr", Some(stderr_tail.clone())));

        let waited = timeout(self.liveness_window, child.wait()).await;
        match waited {
            Err(_) => {
                self.set_state(EngineState::Running);
                metrics::record_engine_start("running");
                tracing::info!(pid = ?pid, config = %config_path.display(), "Engine running");
                *slot = Some(RunningEngine { child, pid, stderr_tail });
                Ok(StartOutcome::Running { pid })
            }
            Ok(result) => {
                let code = match result {
                    Ok(status) => status.code(),
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to collect engine exit status");
                        let _ = child.start_kill();
                        None
                    }
                };
                if let Some(task) = stderr_task {
                    let _ = timeout(STDERR_FLUSH_WAIT, task).await;
                }
                let stderr = stderr_tail.text();

                self.set_state(EngineState::Exited);
                metrics::record_engine_start("exited");
                tracing::warn!(code = ?code, stderr = %stderr, "Engine exited immediately");
                Ok(StartOutcome::Exited { code, stderr })
            }
        }
    }

    /// Stop the engine: terminate request, then a kill after the timeout.
    ///
    /// Safe to call repeatedly; only a running engine is touched.
    pub async fn stop(&self) -> StopOutcome {
        let mut slot = self.running.lock().await;
        let Some(mut engine) = slot.take() else {
            return StopOutcome::NotRunning;
        };

        tracing::info!(pid = ?engine.pid, "Stopping engine");

        let outcome = if request_terminate(&engine) {
            let waited = timeout(self.stop_timeout, engine.child.wait()).await;
            match waited {
                Ok(_) => StopOutcome::Graceful,
                Err(_) => {
                    tracing::warn!(
                        pid = ?engine.pid,
                        timeout_secs = self.stop_timeout.as_secs_f32(),
                        "Graceful shutdown timed out, killing engine"
                    );
                    force_kill(&mut engine).await;
                    StopOutcome::Forced
                }
            }
        } else {
            force_kill(&mut engine).await;
            StopOutcome::Forced
        };

        self.set_state(EngineState::Stopped);
        tracing::info!(outcome = ?outcome, "Engine stopped");
        outcome
    }

    /// Reap the engine if it died since the last check.
    pub async fn refresh(&self) -> EngineState {
        let mut slot = self.running.lock().await;

        let exited = match slot.as_mut().map(|engine| engine.child.try_wait()) {
            Some(Ok(Some(status))) => Some(status),
            Some(Err(e)) => {
                tracing::warn!(error = %e, "Failed to poll engine status");
                None
            }
            _ => None,
        };

        if let Some(status) = exited {
            if let Some(engine) = slot.take() {
                tracing::error!(
                    pid = ?engine.pid,
                    code = ?status.code(),
                    stderr = %engine.stderr_tail.text(),
                    "Engine exited unexpectedly"
                );
            }
            self.set_state(EngineState::Exited);
        }

        self.state()
    }
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(unix)]
fn request_terminate(engine: &RunningEngine) -> bool {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(pid) = engine.pid else {
        return false;
    };
    match kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(pid, error = %e, "Failed to send SIGTERM to engine");
            false
        }
    }
}

/// Console-less children on Windows have no graceful stop signal.
#[cfg(not(unix))]
fn request_terminate(_engine: &RunningEngine) -> bool {
    false
}

async fn force_kill(engine: &mut RunningEngine) {
    if let Err(e) = engine.child.kill().await {
        tracing::warn!(pid = ?engine.pid, error = %e, "Failed to kill engine");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_round_trip() {
        for state in [
            EngineState::NotStarted,
            EngineState::Starting,
            EngineState::Running,
            EngineState::Exited,
            EngineState::Stopped,
        ] {
            assert_eq!(EngineState::from(state as u8), state);
        }
        assert_eq!(EngineState::from(42), EngineState::NotStarted);
    }

    #[test]
    fn test_exit_diagnostic() {
        let outcome = StartOutcome::Exited {
            code: Some(1),
            stderr: "bad config".into(),
        };
        assert!(!outcome.is_running());
        assert_eq!(
            outcome.diagnostic().unwrap(),
            "Engine exited with code 1. Error:\nbad config"
        );
        assert!(StartOutcome::Running { pid: Some(1) }.diagnostic().is_none());
    }

    #[tokio::test]
    async fn test_missing_config_spawns_nothing() {
        let process = EngineProcess::with_timeouts(Duration::from_millis(100), Duration::from_secs(1));
        let dir = tempfile::tempdir().unwrap();
        let err = process
            .start(Path::new("/nonexistent/sing-box"), &dir.path().join("missing.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::ConfigFileNotFound { .. }));
        assert_eq!(process.state(), EngineState::NotStarted);
    }

    #[tokio::test]
    async fn test_stop_before_start_is_noop() {
        let process = EngineProcess::with_timeouts(Duration::from_millis(100), Duration::from_secs(1));
        assert_eq!(process.stop().await, StopOutcome::NotRunning);
        assert_eq!(process.state(), EngineState::NotStarted);
    }
}
