//! Selector synchronization.
//!
//! # Responsibilities
//! - Accept batches of selector changes without blocking the caller
//! - Apply each batch in order: one PUT per task, strictly sequential,
//!   then a single `DELETE /connections`
//! - Remember what the control plane acknowledged (the ledger)
//!
//! # Design Decisions
//! - All batches go through one queue drained by one worker task, so
//!   overlapping dispatches (a default pass racing a click) converge on the
//!   last dispatched batch instead of on whichever purge lands last
//! - Individual failures do not stop the batch; the purge always runs
//! - After `close`, queued batches are dropped and results of calls still
//!   in flight are discarded

use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::Instrument;
use uuid::Uuid;

use crate::config::Selector;
use crate::control::client::ControlPlaneClient;
use crate::observability::metrics;

/// A single desired selector state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionTask {
    pub selector: String,
    pub outbound: String,
}

impl SelectionTask {
    pub fn new(selector: impl Into<String>, outbound: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            outbound: outbound.into(),
        }
    }
}

/// Outcome of one dispatched batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// PUTs answered with 2xx.
    pub applied: usize,
    /// PUTs that failed.
    pub failed: usize,
    /// Whether the connection purge succeeded.
    pub purged: bool,
}

/// Handle to a dispatched batch. Dropping it does not cancel the batch.
#[derive(Debug)]
pub struct DispatchTicket {
    rx: oneshot::Receiver<BatchReport>,
}

impl DispatchTicket {
    /// Wait for the batch to finish. `None` if it was dropped (shutdown).
    pub async fn wait(self) -> Option<BatchReport> {
        self.rx.await.ok()
    }
}

struct Batch {
    id: Uuid,
    tasks: Vec<SelectionTask>,
    reply: oneshot::Sender<BatchReport>,
}

/// Serializes selector changes onto the control plane.
#[derive(Clone)]
pub struct SelectorSynchronizer {
    queue: mpsc::UnboundedSender<Batch>,
    ledger: Arc<DashMap<String, String>>,
    closed: Arc<AtomicBool>,
}

impl SelectorSynchronizer {
    /// Start the worker. Must be called inside a Tokio runtime.
    pub fn spawn(client: ControlPlaneClient) -> Self {
        let (queue, rx) = mpsc::unbounded_channel();
        let ledger = Arc::new(DashMap::new());
        let closed = Arc::new(AtomicBool::new(false));

        let worker = Worker {
            client,
            ledger: ledger.clone(),
            closed: closed.clone(),
        };
        tokio::spawn(worker.run(rx));

        Self { queue, ledger, closed }
    }

    /// Queue a batch. Returns immediately; safe to call from any thread.
    pub fn dispatch(&self, tasks: Vec<SelectionTask>) -> DispatchTicket {
        let (reply, rx) = oneshot::channel();
        if self.closed.load(Ordering::Acquire) {
            tracing::debug!(tasks = tasks.len(), "Synchronizer closed, batch dropped");
            return DispatchTicket { rx };
        }

        let batch = Batch {
            id: Uuid::new_v4(),
            tasks,
            reply,
        };
        tracing::debug!(batch = %batch.id, tasks = batch.tasks.len(), "Selector batch queued");
        if self.queue.send(batch).is_err() {
            tracing::warn!("Selector worker is gone, batch dropped");
        }
        DispatchTicket { rx }
    }

    /// Push every selector's declared default in one batch.
    ///
    /// Selectors whose default matches no candidate are skipped. Returns
    /// `None` when there is nothing to push.
    pub fn apply_defaults(&self, selectors: &[Selector]) -> Option<DispatchTicket> {
        let tasks: Vec<SelectionTask> = selectors
            .iter()
            .filter_map(|s| s.default_outbound().map(|o| SelectionTask::new(s.name.as_str(), o)))
            .collect();

        if tasks.is_empty() {
            tracing::debug!("No selector defaults to apply");
            return None;
        }

        tracing::info!(count = tasks.len(), "Applying selector defaults");
        Some(self.dispatch(tasks))
    }

    /// Last outbound the control plane acknowledged for `selector`.
    pub fn applied(&self, selector: &str) -> Option<String> {
        self.ledger.get(selector).map(|entry| entry.value().clone())
    }

    /// Stop accepting batches and discard results still in flight.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::debug!("Selector synchronizer closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

struct Worker {
    client: ControlPlaneClient,
    ledger: Arc<DashMap<String, String>>,
    closed: Arc<AtomicBool>,
}

impl Worker {
    async fn run(self, mut rx: mpsc::UnboundedReceiver<Batch>) {
        while let Some(batch) = rx.recv().await {
            if self.is_closed() {
                continue;
            }
            let span = tracing::info_span!("selector_batch", batch = %batch.id);
            let report = self.apply(&batch.tasks).instrument(span).await;
            if !self.is_closed() {
                let _ = batch.reply.send(report);
            }
        }
        tracing::debug!("Selector worker exiting");
    }

    async fn apply(&self, tasks: &[SelectionTask]) -> BatchReport {
        metrics::record_selector_batch();
        let mut report = BatchReport::default();

        for task in tasks {
            let ok = self.client.set_selector(&task.selector, &task.outbound).await;
            if ok {
                report.applied += 1;
                if !self.is_closed() {
                    self.ledger.insert(task.selector.clone(), task.outbound.clone());
                }
            } else {
                report.failed += 1;
            }
        }

        report.purged = self.client.purge_connections().await;

        tracing::info!(
            applied = report.applied,
            failed = report.failed,
            purged = report.purged,
            "Selector batch finished"
        );
        report
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
