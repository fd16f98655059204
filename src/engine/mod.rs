//! Engine process supervision.
//!
//! # Data Flow
//! ```text
//! engine_dir / PATH
//!     → executable.rs (locate sing-box)
//!     → process.rs (spawn `sing-box run -c <config>`, liveness window)
//!     → output.rs (drain stdout/stderr, keep a stderr tail)
//!
//! Process States:
//!     NotStarted → Starting → Running → (Exited | Stopped)
//! ```
//!
//! # Design Decisions
//! - A child that dies within the liveness window is reported, not thrown:
//!   the rest of the application keeps running so the user sees why
//! - Output is always captured and drained; the child never writes to a
//!   visible console and never blocks on a full pipe
//! - Stop is graceful first (SIGTERM on Unix), forced after a deadline

pub mod error;
pub mod executable;
pub mod output;
pub mod process;

pub use error::EngineError;
pub use executable::resolve_executable;
pub use process::{EngineProcess, EngineState, StartOutcome, StopOutcome};
