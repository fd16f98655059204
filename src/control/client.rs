//! Clash API control plane client.
//!
//! # Responsibilities
//! - Authenticated PUT/DELETE calls against the engine's controller
//! - Lightweight reads (`/version`, `/proxies/{name}`) for readiness and
//!   live selector state
//! - Turn every failure into `false`/`None` plus a log line; nothing here
//!   ever raises to the caller
//!
//! The client holds only the immutable controller URL and secret plus a
//! `reqwest::Client` (internally reference counted), so clones are cheap
//! and can be used from any task without locking.

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::config::EngineConfig;
use crate::observability::metrics;

/// Mutating methods the control plane is driven with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMethod {
    /// Set a value (`PUT /proxies/{name}`).
    Put,
    /// Purge state (`DELETE /connections`).
    Delete,
}

impl ControlMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlMethod::Put => "PUT",
            ControlMethod::Delete => "DELETE",
        }
    }

    fn to_reqwest(self) -> reqwest::Method {
        match self {
            ControlMethod::Put => reqwest::Method::PUT,
            ControlMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

/// Why a control plane request did not apply.
#[derive(Debug, Error)]
pub enum ControlError {
    /// No controller is configured.
    #[error("control plane disabled (no external_controller)")]
    Disabled,

    /// The controller address does not form a valid URL.
    #[error("invalid controller address '{address}': {source}")]
    InvalidAddress {
        address: String,
        #[source]
        source: url::ParseError,
    },

    /// Connection failure, timeout or body decode error.
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The controller answered with a non-2xx status.
    #[error("controller returned status {0}")]
    Status(StatusCode),
}

#[derive(Deserialize)]
struct ProxyState {
    #[serde(default)]
    now: Option<String>,
}

/// Client for the engine's Clash-compatible HTTP API.
#[derive(Clone, Debug)]
pub struct ControlPlaneClient {
    http: reqwest::Client,
    /// `None` when no controller is configured or the address is invalid.
    base_url: Option<Url>,
    secret: String,
}

impl ControlPlaneClient {
    /// Build a client for `address` (`host:port`) with bearer `secret`.
    pub fn new(address: &str, secret: &str, timeout: Duration) -> Self {
        let base_url = match controller_url(address) {
            Ok(url) => Some(url),
            Err(ControlError::Disabled) => None,
            Err(e) => {
                tracing::warn!(error = %e, "Control plane disabled");
                None
            }
        };

        // The system proxy may point at the engine itself; never route
        // control traffic through it.
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .no_proxy()
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Falling back to default HTTP client");
                reqwest::Client::new()
            });

        Self {
            http,
            base_url,
            secret: secret.to_string(),
        }
    }

    /// Client for the controller declared in an engine config.
    pub fn from_config(config: &EngineConfig, timeout: Duration) -> Self {
        Self::new(&config.control_address, &config.control_secret, timeout)
    }

    /// Whether a controller is configured.
    pub fn is_enabled(&self) -> bool {
        self.base_url.is_some()
    }

    /// Issue a mutating request. `path` is a list of unescaped segments.
    ///
    /// Returns `true` on a 2xx answer. Returns `false` without touching the
    /// network when the control plane is disabled, and `false` (logged) on
    /// any transport error or non-2xx status.
    pub async fn request(&self, method: ControlMethod, path: &[&str], body: Option<&Value>) -> bool {
        let result = self.try_request(method, path, body).await;
        match &result {
            Ok(()) => {
                tracing::debug!(method = method.as_str(), path = ?path, "Control plane request applied");
            }
            Err(ControlError::Disabled) => {
                tracing::debug!(method = method.as_str(), path = ?path, "Control plane disabled, request skipped");
                return false;
            }
            Err(e) => {
                tracing::warn!(method = method.as_str(), path = ?path, error = %e, "API request failed");
            }
        }
        metrics::record_control_request(method.as_str(), result.is_ok());
        result.is_ok()
    }

    async fn try_request(&self, method: ControlMethod, path: &[&str], body: Option<&Value>) -> Result<(), ControlError> {
        let url = self.endpoint(path)?;
        let mut request = self
            .http
            .request(method.to_reqwest(), url)
            .header(AUTHORIZATION, format!("Bearer {}", self.secret));
        if let Some(body) = body {
            request = request
                .header(CONTENT_TYPE, "application/json")
                .body(body.to_string());
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ControlError::Status(status));
        }
        Ok(())
    }

    /// Point selector `name` at `outbound`.
    pub async fn set_selector(&self, name: &str, outbound: &str) -> bool {
        let body = json!({ "name": outbound });
        self.request(ControlMethod::Put, &["proxies", name], Some(&body)).await
    }

    /// Drop all tracked connections so new routing takes effect at once.
    pub async fn purge_connections(&self) -> bool {
        self.request(ControlMethod::Delete, &["connections"], None).await
    }

    /// `GET /version`; true once the controller answers with 2xx.
    pub async fn probe(&self) -> bool {
        match self.get(&["version"]).await {
            Ok(_) => true,
            Err(e) => {
                tracing::trace!(error = %e, "Control plane probe failed");
                false
            }
        }
    }

    /// Outbound currently selected by `name`, as reported by the engine.
    pub async fn selector_state(&self, name: &str) -> Option<String> {
        let result = match self.get(&["proxies", name]).await {
            Ok(response) => response.json::<ProxyState>().await.map_err(ControlError::from),
            Err(e) => Err(e),
        };
        match result {
            Ok(state) => state.now,
            Err(ControlError::Disabled) => None,
            Err(e) => {
                tracing::warn!(selector = %name, error = %e, "Failed to query selector state");
                None
            }
        }
    }

    async fn get(&self, path: &[&str]) -> Result<reqwest::Response, ControlError> {
        let url = self.endpoint(path)?;
        let response = self
            .http
            .get(url)
            .header(AUTHORIZATION, format!("Bearer {}", self.secret))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ControlError::Status(status));
        }
        Ok(response)
    }

    fn endpoint(&self, path: &[&str]) -> Result<Url, ControlError> {
        let mut url = self.base_url.clone().ok_or(ControlError::Disabled)?;
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.clear().extend(path);
        }
        Ok(url)
    }
}

/// Build the base URL for a controller address.
///
/// Unspecified bind hosts (`0.0.0.0`, `[::]`, or none at all as in
/// `:9090`) are dialled on the matching loopback address.
pub fn controller_url(address: &str) -> Result<Url, ControlError> {
    let address = address.trim();
    if address.is_empty() {
        return Err(ControlError::Disabled);
    }

    let dialable = if let Some(port) = address.strip_prefix("0.0.0.0:") {
        format!("127.0.0.1:{}", port)
    } else if let Some(port) = address.strip_prefix("[::]:") {
        format!("[::1]:{}", port)
    } else if address.starts_with(':') {
        format!("127.0.0.1{}", address)
    } else {
        address.to_string()
    };

    Url::parse(&format!("http://{}", dialable)).map_err(|source| ControlError::InvalidAddress {
        address: address.to_string(),
        source,
    })
}
