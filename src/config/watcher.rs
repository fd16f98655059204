//! Engine configuration file watcher for hot restart.

use std::path::{Path, PathBuf};
use std::time::Duration;
use notify::{Watcher, RecursiveMode, Event, RecommendedWatcher, Config};
use tokio::sync::mpsc;

/// Watches the engine configuration file and reports edits.
///
/// The parent directory is watched rather than the file itself, so editors
/// that save by writing a temp file and renaming it are still seen. The
/// watcher only signals; re-extraction happens in the supervisor, so an
/// invalid edit never stops a running engine.
pub struct ConfigWatcher {
    file: PathBuf,
    change_tx: mpsc::UnboundedSender<()>,
}

impl ConfigWatcher {
    /// Returns the watcher and a receiver of change notifications.
    pub fn new(file: &Path) -> (Self, mpsc::UnboundedReceiver<()>) {
        let (change_tx, change_rx) = mpsc::unbounded_channel();
        (Self { file: file.to_path_buf(), change_tx }, change_rx)
    }

    /// Start watching in a background thread.
    ///
    /// The returned watcher must be kept alive for notifications to flow.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let dir = self
            .file
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let file_name = self.file.file_name().map(|n| n.to_os_string());
        let tx = self.change_tx;

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let relevant = event.kind.is_modify() || event.kind.is_create();
                    let ours = event
                        .paths
                        .iter()
                        .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                    if relevant && ours {
                        tracing::debug!(paths = ?event.paths, "Engine config change detected");
                        let _ = tx.send(());
                    }
                }
                Err(e) => tracing::error!("Watch error: {:?}", e),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        tracing::info!(file = ?self.file, "Config watcher started");
        Ok(watcher)
    }
}

/// Wait for the next change and swallow the burst that follows it.
///
/// A single save usually produces several events; they are coalesced
/// until `quiet` passes without a new one. Returns `false` once the
/// watcher is gone.
pub async fn next_change(rx: &mut mpsc::UnboundedReceiver<()>, quiet: Duration) -> bool {
    if rx.recv().await.is_none() {
        return false;
    }
    while let Ok(Some(())) = tokio::time::timeout(quiet, rx.recv()).await {}
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bursts_are_coalesced() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        for _ in 0..5 {
            tx.send(()).unwrap();
        }
        assert!(next_change(&mut rx, Duration::from_millis(20)).await);
        assert!(rx.try_recv().is_err());

        drop(tx);
        assert!(!next_change(&mut rx, Duration::from_millis(20)).await);
    }

    #[tokio::test]
    async fn test_watcher_reports_edit() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("config.json");
        std::fs::write(&file, "{}").unwrap();

        let (watcher, mut rx) = ConfigWatcher::new(&file);
        let _guard = watcher.run().unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        std::fs::write(&file, "{ \"inbounds\": [] }").unwrap();

        let got = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await;
        assert!(matches!(got, Ok(Some(()))));
    }
}
