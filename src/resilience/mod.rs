//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Engine started:
//!     → readiness poll against the control plane
//!     → backoff.rs spaces the probes (jittered, capped)
//!     → gives up at the readiness deadline
//! ```
//!
//! # Design Decisions
//! - Every external call has a deadline (see `TimeoutOptions`)
//! - Control plane writes are never retried automatically; callers get
//!   a bool and decide
//! - Probes back off so a slow engine is not hammered

pub mod backoff;
