//! Fire-and-forget incident emission.

use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::sync::mpsc::error::TrySendError;

use crate::incidents::store::IncidentStore;
use crate::incidents::types::Incident;
use crate::observability::metrics;

/// Cheap handle used by the admission components to hand off incidents.
#[derive(Debug, Clone)]
pub struct IncidentEmitter {
    tx: Option<mpsc::Sender<Incident>>,
}

impl IncidentEmitter {
    /// Create an emitter and the receiver its worker drains.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Incident>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx: Some(tx) }, rx)
    }

    /// An emitter that discards everything.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Queue an incident without waiting. Never fails the caller.
    pub fn emit(&self, incident: Incident) {
        let Some(tx) = &self.tx else {
            return;
        };
        match tx.try_send(incident) {
            Ok(()) => {}
            Err(TrySendError::Full(incident)) => {
                metrics::record_incident_dropped();
                tracing::warn!(
                    fingerprint = %incident.fingerprint,
                    "Incident channel full, dropping incident"
                );
            }
            Err(TrySendError::Closed(incident)) => {
                tracing::debug!(fingerprint = %incident.fingerprint, "Incident worker gone, dropping incident");
            }
        }
    }
}

/// Background task that writes queued incidents to a store.
pub struct IncidentWorker<S> {
    rx: mpsc::Receiver<Incident>,
    store: S,
    timeout: Duration,
}

impl<S: IncidentStore> IncidentWorker<S> {
    pub fn new(rx: mpsc::Receiver<Incident>, store: S, timeout: Duration) -> Self {
        Self { rx, store, timeout }
    }

    /// Drain until every emitter is dropped or shutdown fires.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        loop {
            tokio::select! {
                next = self.rx.recv() => match next {
                    Some(incident) => self.deliver(incident).await,
                    None => break,
                },
                _ = shutdown.recv() => {
                    // Flush what is already queued, without waiting for more.
                    while let Ok(incident) = self.rx.try_recv() {
                        self.deliver(incident).await;
                    }
                    break;
                }
            }
        }
        tracing::debug!("Incident worker stopped");
    }

    async fn deliver(&self, incident: Incident) {
        match tokio::time::timeout(self.timeout, self.store.store(&incident)).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(fingerprint = %incident.fingerprint, "Incident store rejected incident");
            }
            Err(_) => {
                tracing::warn!(
                    fingerprint = %incident.fingerprint,
                    timeout = ?self.timeout,
                    "Incident store timed out"
                );
            }
        }
    }
}
