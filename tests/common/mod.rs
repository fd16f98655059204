//! Shared utilities for integration tests.

#![allow(dead_code)]

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::routing::{delete, get};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::path::{Path as FsPath, PathBuf};
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

/// One request seen by the fake control plane.
#[derive(Debug, Clone, PartialEq)]
pub struct Recorded {
    /// `"METHOD /path"`.
    pub line: String,
    pub body: Option<Value>,
    pub authorization: Option<String>,
}

#[derive(Clone, Default)]
struct FakeState {
    calls: Arc<Mutex<Vec<Recorded>>>,
    put_status: Arc<AtomicU16>,
    delay_ms: Arc<AtomicU16>,
}

/// Minimal Clash API stand-in that records every request.
pub struct FakeControlPlane {
    pub addr: SocketAddr,
    state: FakeState,
}

impl FakeControlPlane {
    pub async fn start() -> Self {
        let state = FakeState::default();
        state.put_status.store(204, Ordering::SeqCst);

        let app = Router::new()
            .route("/version", get(version))
            .route("/proxies/{name}", get(proxy_state).put(select_proxy))
            .route("/connections", delete(purge))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    /// `host:port` as it would appear in `external_controller`.
    pub fn controller(&self) -> String {
        self.addr.to_string()
    }

    /// Status returned for PUT /proxies/{name}.
    pub fn set_put_status(&self, status: u16) {
        self.state.put_status.store(status, Ordering::SeqCst);
    }

    /// Delay applied to every PUT.
    pub fn set_put_delay(&self, delay: Duration) {
        self.state.delay_ms.store(delay.as_millis() as u16, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<Recorded> {
        self.state.calls.lock().unwrap().clone()
    }

    /// Request lines, ignoring readiness probes and state queries.
    pub fn writes(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| !c.line.starts_with("GET "))
            .map(|c| c.line)
            .collect()
    }
}

fn record(state: &FakeState, method: Method, path: String, headers: &HeaderMap, body: &[u8]) {
    let body = if body.is_empty() {
        None
    } else {
        serde_json::from_slice(body).ok()
    };
    let authorization = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    state.calls.lock().unwrap().push(Recorded {
        line: format!("{} {}", method, path),
        body,
        authorization,
    });
}

async fn version(State(state): State<FakeState>, headers: HeaderMap) -> Json<Value> {
    record(&state, Method::GET, "/version".into(), &headers, &[]);
    Json(json!({ "version": "sing-box 1.9.0", "premium": false }))
}

async fn proxy_state(State(state): State<FakeState>, Path(name): Path<String>, headers: HeaderMap) -> Json<Value> {
    record(&state, Method::GET, format!("/proxies/{}", name), &headers, &[]);
    Json(json!({ "type": "Selector", "name": name, "now": "relay-a" }))
}

async fn select_proxy(
    State(state): State<FakeState>,
    Path(name): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let delay = state.delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay as u64)).await;
    }
    record(&state, Method::PUT, format!("/proxies/{}", name), &headers, &body);
    StatusCode::from_u16(state.put_status.load(Ordering::SeqCst)).unwrap_or(StatusCode::NO_CONTENT)
}

async fn purge(State(state): State<FakeState>, headers: HeaderMap) -> StatusCode {
    record(&state, Method::DELETE, "/connections".into(), &headers, &[]);
    StatusCode::NO_CONTENT
}

/// Engine config with one mixed inbound, two selectors and a controller.
pub fn engine_config(controller: &str, secret: &str) -> String {
    format!(
        r#"// written by tests
{{
  "inbounds": [
    {{ "type": "tun", "tag": "tun-in" }},
    {{ "type": "mixed", "tag": "mixed-in", "listen": "127.0.0.1", "listen_port": 2080 }}
  ],
  "outbounds": [
    {{ "type": "selector", "tag": "proxy-select", "outbounds": ["direct", "relay-a"], "default": "relay-a" }},
    {{ "type": "selector", "tag": "fallback", "outbounds": ["direct"] }},
    {{ "type": "direct", "tag": "direct" }}
  ],
  "experimental": {{
    "clash_api": {{ "external_controller": "{controller}", "secret": "{secret}" }}
  }}
}}
"#
    )
}

/// Install a fake engine in `dir`: `<dir>/<engine_file_name>` runs the
/// shell and `<dir>/run` is the script it executes (`sh run -c <cfg>`,
/// with `dir` as the working directory).
#[cfg(unix)]
pub fn fake_engine(dir: &FsPath, script: &str) -> PathBuf {
    let exe = dir.join(drover::engine::executable::engine_file_name());
    std::os::unix::fs::symlink("/bin/sh", &exe).unwrap();
    std::fs::write(dir.join("run"), script).unwrap();
    exe
}
