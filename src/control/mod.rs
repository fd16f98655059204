//! Control plane subsystem.
//!
//! # Data Flow
//! ```text
//! Supervisor.change_selector / apply_defaults
//!     → sync.rs (queue batch, return immediately)
//!     → worker: PUT /proxies/{selector} per task, in order
//!     → worker: DELETE /connections
//!     → client.rs (bearer auth, 5s timeout, bool result)
//!
//! After engine start:
//!     readiness.rs polls GET /version with backoff until ready or deadline
//! ```
//!
//! # Design Decisions
//! - Control failures are never fatal: logged, counted, reported as false
//! - No automatic retries of writes; the next user action or restart
//!   converges state

pub mod client;
pub mod readiness;
pub mod sync;

pub use client::{ControlError, ControlMethod, ControlPlaneClient};
pub use readiness::wait_until_ready;
pub use sync::{BatchReport, DispatchTicket, SelectionTask, SelectorSynchronizer};
