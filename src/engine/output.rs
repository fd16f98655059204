//! Draining of the engine's stdout/stderr.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;

/// Number of stderr lines kept for diagnostics.
pub const STDERR_TAIL_LINES: usize = 64;

/// Bounded buffer holding the most recent lines of a stream.
#[derive(Clone, Debug)]
pub struct OutputTail {
    lines: Arc<Mutex<VecDeque<String>>>,
    capacity: usize,
}

impl OutputTail {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    fn push(&self, line: String) {
        let mut lines = self.lines.lock().unwrap_or_else(|e| e.into_inner());
        if lines.len() == self.capacity {
            lines.pop_front();
        }
        lines.push_back(line);
    }

    /// Buffered lines joined with newlines, trimmed.
    pub fn text(&self) -> String {
        let lines = self.lines.lock().unwrap_or_else(|e| e.into_inner());
        lines.iter().map(String::as_str).collect::<Vec<_>>().join("\n").trim().to_string()
    }
}

/// Spawn a task that reads `reader` to EOF, forwarding each line to
/// `tracing` and optionally into `tail`.
///
/// Invalid UTF-8 is replaced rather than ending the drain, so the pipe
/// keeps emptying for the lifetime of the child.
pub fn drain<R>(reader: R, stream: &'static str, tail: Option<OutputTail>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf).trim_end().to_string();
                    tracing::debug!(target: "drover::engine::output", stream, "{}", line);
                    if let Some(tail) = &tail {
                        tail.push(line);
                    }
                }
                Err(e) => {
                    tracing::debug!(stream, error = %e, "Engine output stream closed");
                    break;
                }
            }
        }
    })
}
