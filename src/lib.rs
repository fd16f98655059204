//! Drover: supervisor for a sing-box proxy engine.

// Engine side
pub mod config;
pub mod control;
pub mod engine;

// Desktop integration
pub mod menu;
pub mod system_proxy;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub mod supervisor;

pub use config::{DroverOptions, EngineConfig, Selector};
pub use lifecycle::Shutdown;
pub use supervisor::{Supervisor, SupervisorError};
