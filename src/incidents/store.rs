//! Incident sinks.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;

use crate::incidents::types::Incident;

/// Write-only destination for incidents.
///
/// Returns `false` when the incident could not be persisted; the worker logs
/// that and moves on.
pub trait IncidentStore: Send + Sync + 'static {
    fn store(&self, incident: &Incident) -> impl Future<Output = bool> + Send;
}

/// Keeps the most recent incidents in memory and logs each one.
///
/// Backs the `/vanguard/incidents` diagnostics endpoint.
#[derive(Debug, Clone)]
pub struct MemoryIncidentStore {
    recent: Arc<Mutex<VecDeque<Incident>>>,
    capacity: usize,
}

impl MemoryIncidentStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            recent: Arc::new(Mutex::new(VecDeque::with_capacity(capacity.min(1024)))),
            capacity: capacity.max(1),
        }
    }

    /// Most recent first.
    pub fn recent(&self) -> Vec<Incident> {
        self.recent.lock().iter().rev().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.recent.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl IncidentStore for MemoryIncidentStore {
    async fn store(&self, incident: &Incident) -> bool {
        tracing::info!(
            incident_id = %incident.id,
            fingerprint = %incident.fingerprint,
            severity = incident.severity.as_str(),
            endpoint = ?incident.endpoint,
            message = %incident.error_message,
            "Incident recorded"
        );

        let mut recent = self.recent.lock();
        if recent.len() == self.capacity {
            recent.pop_front();
        }
        recent.push_back(incident.clone());
        true
    }
}
