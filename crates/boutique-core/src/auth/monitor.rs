//! Background re-checking of the session gate.
//!
//! The monitor runs one gate check immediately, then on every interval
//! tick and whenever a `GateEvent` arrives (a storage write from another
//! context, or the view regaining focus). Verdicts are published on a
//! `watch` channel so views only wake on change.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::gate::{SessionGate, SessionVerdict};

/// Default period between gate checks.
/// Two seconds keeps stores converged well under the three-second mark.
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(2);

/// Buffer size for the event channel.
/// Events are coalesced by the next check, so a small buffer is enough.
const EVENT_BUFFER_SIZE: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateEvent {
    StorageChanged,
    VisibilityChanged,
}

pub struct SessionMonitor {
    gate: Arc<SessionGate>,
    interval: Duration,
}

impl SessionMonitor {
    pub fn new(gate: Arc<SessionGate>) -> Self {
        Self {
            gate,
            interval: DEFAULT_CHECK_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Start the monitor on the current tokio runtime.
    pub fn spawn(self) -> MonitorHandle {
        let (event_tx, mut event_rx) = mpsc::channel(EVENT_BUFFER_SIZE);
        let (verdict_tx, verdict_rx) = watch::channel(SessionVerdict::unauthenticated());
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let gate = self.gate;
        let period = self.interval;
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(interval_ms = period.as_millis() as u64, "Session monitor started");

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    event = event_rx.recv() => match event {
                        Some(event) => {
                            debug!(?event, "Session gate event");
                            if let Some(verdict) = check_off_runtime(&gate).await {
                                publish(&verdict_tx, verdict);
                            }
                        }
                        None => break,
                    },
                    _ = ticker.tick() => {
                        if let Some(verdict) = check_off_runtime(&gate).await {
                            publish(&verdict_tx, verdict);
                        }
                    }
                }
            }
            info!("Session monitor stopped");
        });

        MonitorHandle {
            events: event_tx,
            verdicts: verdict_rx,
            shutdown: Some(shutdown_tx),
            task,
        }
    }
}

/// Stores may do file I/O, so the check runs on the blocking pool.
async fn check_off_runtime(gate: &Arc<SessionGate>) -> Option<SessionVerdict> {
    let gate = Arc::clone(gate);
    match tokio::task::spawn_blocking(move || gate.check()).await {
        Ok(verdict) => Some(verdict),
        Err(e) => {
            warn!(error = %e, "Session check task failed");
            None
        }
    }
}

fn publish(tx: &watch::Sender<SessionVerdict>, verdict: SessionVerdict) {
    tx.send_if_modified(|current| {
        if *current == verdict {
            false
        } else {
            *current = verdict;
            true
        }
    });
}

pub struct MonitorHandle {
    events: mpsc::Sender<GateEvent>,
    verdicts: watch::Receiver<SessionVerdict>,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    /// Ask for an immediate re-check. Returns false if the buffer is full
    /// or the monitor has stopped; a full buffer already has a check queued.
    pub fn notify(&self, event: GateEvent) -> bool {
        self.events.try_send(event).is_ok()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionVerdict> {
        self.verdicts.clone()
    }

    pub fn current(&self) -> SessionVerdict {
        self.verdicts.borrow().clone()
    }

    /// Stop the monitor and wait for its task to finish.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = (&mut self.task).await;
    }
}
