//! Waiting for the control plane to come up after an engine start.

use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};

use crate::control::client::ControlPlaneClient;
use crate::resilience::backoff::readiness_delay;

/// Poll `GET /version` until it answers or `deadline` passes.
///
/// Each probe is cut off at the remaining deadline, so a controller that
/// accepts connections but never answers cannot stretch the wait.
/// Returns `false` immediately when the control plane is disabled.
pub async fn wait_until_ready(client: &ControlPlaneClient, deadline: Duration) -> bool {
    if !client.is_enabled() {
        return false;
    }

    let started = Instant::now();
    let mut attempt = 0u32;
    loop {
        let remaining = deadline.saturating_sub(started.elapsed());
        let answered = matches!(timeout(remaining, client.probe()).await, Ok(true));
        if answered {
            tracing::info!(
                attempts = attempt + 1,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Control plane ready"
            );
            return true;
        }

        attempt += 1;
        let remaining = deadline.saturating_sub(started.elapsed());
        if remaining.is_zero() {
            tracing::warn!(
                attempts = attempt,
                deadline_ms = deadline.as_millis() as u64,
                "Control plane not ready before deadline"
            );
            return false;
        }
        sleep(readiness_delay(attempt).min(remaining)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_is_not_ready() {
        let client = ControlPlaneClient::new("", "", Duration::from_secs(1));
        assert!(!wait_until_ready(&client, Duration::from_secs(5)).await);
    }

    #[tokio::test]
    async fn test_silent_controller_does_not_outlast_deadline() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let client = ControlPlaneClient::new(&addr.to_string(), "", Duration::from_secs(5));
        let started = std::time::Instant::now();
        assert!(!wait_until_ready(&client, Duration::from_millis(300)).await);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_gives_up_at_deadline() {
        let client = ControlPlaneClient::new("127.0.0.1:9", "", Duration::from_millis(200));
        let started = std::time::Instant::now();
        assert!(!wait_until_ready(&client, Duration::from_millis(300)).await);
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
