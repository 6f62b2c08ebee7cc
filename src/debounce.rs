//! Trailing-edge debouncer for content-change events.
//!
//! Every pushed value restarts the quiescence window. Only when the window
//! elapses with no further pushes is the latest value emitted. A burst of
//! keystrokes therefore yields exactly one emission, carrying the final
//! state.
//!
//! Empty values are ignored: they neither replace the pending value nor
//! restart the window. Leading-edge mode exists for non-content signals. It
//! emits the first value of a burst immediately (empty or not) and then
//! stays silent until the window passes with no further events.
//!
//! The debouncer knows nothing about which note it serves.
//!
//! ```text
//! push("a") push("ab") push("abc") ──500ms quiet──▶ emit("abc")
//! ```

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

/// Default quiescence window.
pub const DEFAULT_WINDOW: Duration = Duration::from_millis(500);

/// Which edge of a burst produces the emission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Edge {
    #[default]
    Trailing,
    Leading,
}

#[derive(Debug)]
enum Signal {
    Value(String),
    /// Emit the pending value now, if any.
    Flush,
    /// Drop the pending value without emitting.
    Cancel,
}

/// Handle for pushing change events into a running debouncer.
///
/// Pushing never blocks. When every handle is dropped, a pending trailing
/// value is emitted and the emission stream ends.
#[derive(Debug, Clone)]
pub struct Debouncer {
    tx: mpsc::UnboundedSender<Signal>,
}

impl Debouncer {
    /// Spawns a trailing-edge debouncer on the current tokio runtime.
    pub fn spawn(window: Duration) -> (Self, mpsc::UnboundedReceiver<String>, JoinHandle<()>) {
        Self::spawn_with_edge(window, Edge::Trailing)
    }

    pub fn spawn_with_edge(
        window: Duration,
        edge: Edge,
    ) -> (Self, mpsc::UnboundedReceiver<String>, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let task = match edge {
            Edge::Trailing => tokio::spawn(run_trailing(window, rx, out_tx)),
            Edge::Leading => tokio::spawn(run_leading(window, rx, out_tx)),
        };
        (Self { tx }, out_rx, task)
    }

    /// Records a change. Returns `false` once the debouncer has stopped.
    pub fn push(&self, value: impl Into<String>) -> bool {
        self.tx.send(Signal::Value(value.into())).is_ok()
    }

    /// Emits the pending value immediately instead of waiting out the window.
    pub fn flush(&self) -> bool {
        self.tx.send(Signal::Flush).is_ok()
    }

    /// Discards the pending value.
    pub fn cancel(&self) -> bool {
        self.tx.send(Signal::Cancel).is_ok()
    }
}

async fn run_trailing(
    window: Duration,
    mut rx: mpsc::UnboundedReceiver<Signal>,
    out: mpsc::UnboundedSender<String>,
) {
    let mut pending: Option<String> = None;
    let mut deadline = Instant::now();

    loop {
        let signal = if pending.is_some() {
            tokio::select! {
                signal = rx.recv() => signal,
                _ = sleep_until(deadline) => {
                    if let Some(value) = pending.take() {
                        if out.send(value).is_err() {
                            return;
                        }
                    }
                    continue;
                }
            }
        } else {
            rx.recv().await
        };

        match signal {
            Some(Signal::Value(value)) => {
                if value.trim().is_empty() {
                    continue;
                }
                pending = Some(value);
                deadline = Instant::now() + window;
            }
            Some(Signal::Flush) => {
                if let Some(value) = pending.take() {
                    if out.send(value).is_err() {
                        return;
                    }
                }
            }
            Some(Signal::Cancel) => pending = None,
            None => {
                if let Some(value) = pending.take() {
                    let _ = out.send(value);
                }
                return;
            }
        }
    }
}

async fn run_leading(
    window: Duration,
    mut rx: mpsc::UnboundedReceiver<Signal>,
    out: mpsc::UnboundedSender<String>,
) {
    // `Some` while inside a burst; events before the deadline are swallowed.
    let mut quiet_at: Option<Instant> = None;

    loop {
        let signal = match quiet_at {
            Some(deadline) => {
                tokio::select! {
                    signal = rx.recv() => signal,
                    _ = sleep_until(deadline) => {
                        quiet_at = None;
                        continue;
                    }
                }
            }
            None => rx.recv().await,
        };

        match signal {
            Some(Signal::Value(value)) => {
                if quiet_at.is_none() && out.send(value).is_err() {
                    return;
                }
                quiet_at = Some(Instant::now() + window);
            }
            Some(Signal::Flush) | Some(Signal::Cancel) => quiet_at = None,
            None => return,
        }
    }
}
