//! OS signal handling.
//!
//! # Responsibilities
//! - Register handlers once at startup
//! - Translate OS signals into [`Signal`] events for the main loop
//!
//! # Design Decisions
//! - SIGHUP restarts the engine with a re-read config instead of exiting
//! - Non-Unix platforms only get Ctrl-C

/// Event delivered to the main loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Shutdown,
    Reload,
}

#[cfg(unix)]
pub struct SignalListener {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
    hangup: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl SignalListener {
    pub fn new() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
            hangup: signal(SignalKind::hangup())?,
        })
    }

    /// Wait for the next signal.
    pub async fn recv(&mut self) -> Signal {
        tokio::select! {
            _ = self.interrupt.recv() => {
                tracing::info!("Received SIGINT");
                Signal::Shutdown
            }
            _ = self.terminate.recv() => {
                tracing::info!("Received SIGTERM");
                Signal::Shutdown
            }
            _ = self.hangup.recv() => {
                tracing::info!("Received SIGHUP");
                Signal::Reload
            }
        }
    }
}

#[cfg(not(unix))]
pub struct SignalListener;

#[cfg(not(unix))]
impl SignalListener {
    pub fn new() -> std::io::Result<Self> {
        Ok(Self)
    }

    pub async fn recv(&mut self) -> Signal {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Ctrl-C handler failed");
        } else {
            tracing::info!("Received Ctrl-C");
        }
        Signal::Shutdown
    }
}
