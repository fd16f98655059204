//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT/Ctrl-C → Signal::Shutdown
//!     SIGHUP                → Signal::Reload (restart engine with re-read config)
//!
//! Shutdown (shutdown.rs):
//!     trigger() → background loops (engine monitor, config watcher) exit
//!     → Supervisor::shutdown (system proxy off, engine stopped)
//! ```
//!
//! # Design Decisions
//! - Background loops never stop the engine themselves; only the main
//!   task calls `Supervisor::shutdown`, and it runs once

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::{Signal, SignalListener};
