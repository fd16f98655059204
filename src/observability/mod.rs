//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via `tracing`)
//!     → metrics.rs (counters)
//!
//! Consumers:
//!     → stderr (fmt layer, filtered by RUST_LOG or the configured level)
//!     → optional Prometheus scrape endpoint
//! ```
//!
//! # Design Decisions
//! - Structured fields (selector, status, pid) instead of formatted text
//! - Engine stdout/stderr is forwarded at debug level under its own target
//! - Metrics are cheap and always recorded; exposition is opt-in

pub mod logging;
pub mod metrics;
