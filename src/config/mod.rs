//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! drover.toml (TOML)
//!     → loader.rs (read & deserialize, resolve relative paths)
//!     → DroverOptions (immutable)
//!
//! sing-box config.json (JSON with `//` comment lines)
//!     → loader.rs (read file)
//!     → engine.rs (strip comments, extract the selector/proxy subset)
//!     → validation.rs (mixed inbound present)
//!     → EngineConfig (validated, immutable)
//!
//! On engine config change:
//!     watcher.rs detects change
//!     → supervisor re-extracts and restarts the engine
//! ```
//!
//! # Design Decisions
//! - Only the fields that drive selectors and the system proxy are read;
//!   the rest of the engine schema is ignored
//! - Extraction is pure; file access stays in loader.rs
//! - Options fields all have defaults so a missing file is valid

pub mod engine;
pub mod error;
pub mod loader;
pub mod options;
pub mod validation;
pub mod watcher;

pub use engine::{EngineConfig, Selector};
pub use error::ConfigError;
pub use options::{DroverOptions, MenuLayout, TimeoutOptions};
