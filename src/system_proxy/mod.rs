//! OS-level system proxy control.
//!
//! # Data Flow
//! ```text
//! Supervisor.enable_system_proxy(host, port)
//!     → SystemProxy backend chosen once at startup (platform_backend)
//!         windows.rs     → HKCU Internet Settings + WinINet refresh
//!         Unsupported    → explicit error, nothing touched
//! ```
//!
//! # Design Decisions
//! - The proxy setting is process-wide OS state, so it sits behind a
//!   capability trait injected into the supervisor
//! - Platforms without a backend get a real `Unsupported` variant rather
//!   than a runtime failure path

#[cfg(windows)]
pub mod windows;

use thiserror::Error;

/// Errors from a system proxy backend.
#[derive(Debug, Error)]
pub enum SystemProxyError {
    /// No backend for this platform.
    #[error("System proxy is not supported on {0}")]
    Unsupported(&'static str),

    /// The OS rejected the change.
    #[error("System proxy update failed: {0}")]
    Os(String),
}

/// Capability to switch the OS-wide proxy on and off.
pub trait SystemProxy: Send + Sync {
    /// Route system traffic through `host:port`.
    fn enable(&self, host: &str, port: u16) -> Result<(), SystemProxyError>;

    /// Turn the system proxy off.
    fn disable(&self) -> Result<(), SystemProxyError>;

    /// Backend name for logs.
    fn name(&self) -> &'static str;
}

/// Backend for platforms without system proxy support.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedProxy;

impl SystemProxy for UnsupportedProxy {
    fn enable(&self, _host: &str, _port: u16) -> Result<(), SystemProxyError> {
        Err(SystemProxyError::Unsupported(std::env::consts::OS))
    }

    fn disable(&self) -> Result<(), SystemProxyError> {
        Err(SystemProxyError::Unsupported(std::env::consts::OS))
    }

    fn name(&self) -> &'static str {
        "unsupported"
    }
}

/// The backend for the current platform.
pub fn platform_backend() -> Box<dyn SystemProxy> {
    #[cfg(windows)]
    {
        Box::new(windows::WindowsProxy)
    }
    #[cfg(not(windows))]
    {
        Box::new(UnsupportedProxy)
    }
}

/// Value written as the per-protocol proxy server list.
pub fn proxy_server_string(host: &str, port: u16) -> String {
    format!("http={host}:{port};https={host}:{port};socks={host}:{port}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_backend() {
        let backend = UnsupportedProxy;
        let err = backend.enable("127.0.0.1", 2080).unwrap_err();
        assert!(matches!(err, SystemProxyError::Unsupported(_)));
        assert!(err.to_string().contains(std::env::consts::OS));
        assert!(backend.disable().is_err());
    }

    #[test]
    fn test_proxy_server_string() {
        assert_eq!(
            proxy_server_string("127.0.0.1", 2080),
            "http=127.0.0.1:2080;https=127.0.0.1:2080;socks=127.0.0.1:2080"
        );
    }

    #[cfg(not(windows))]
    #[test]
    fn test_platform_backend_is_unsupported() {
        assert_eq!(platform_backend().name(), "unsupported");
    }
}
