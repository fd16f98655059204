//! Engine configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (extraction handles syntax)
//! - Ensure there is a local proxy entry point for the system proxy
//!
//! # Design Decisions
//! - Validation is a pure function: &EngineConfig → Result<(), ConfigError>
//! - Runs before any process is spawned

use crate::config::engine::EngineConfig;
use crate::config::error::ConfigError;

/// Reject configurations without a usable mixed inbound.
pub fn validate_engine_config(config: &EngineConfig) -> Result<(), ConfigError> {
    if config.proxy_host.is_empty() || config.proxy_port < 1 {
        return Err(ConfigError::NoProxyInbound);
    }

    if config.control_address.is_empty() {
        tracing::warn!("No clash_api external_controller configured, selector control disabled");
    }

    Ok(())
}
