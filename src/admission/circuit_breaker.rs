//! Per-endpoint circuit breaker.
//!
//! # States
//! - Closed: healthy, requests pass (initial state)
//! - Open: endpoint quarantined, requests fail fast with 503
//! - HalfOpen: one probe per probe interval is let through
//!
//! CLOSED means healthy. Never invert this.
//!
//! # State Transitions
//! ```text
//! Closed   → Open:     evaluate() with requests >= min AND failure rate > threshold
//! Open     → HalfOpen: state() observed after the quarantine elapsed (lazy, no timer)
//! HalfOpen → Closed:   record_probe_result(success = true)
//! HalfOpen → Open:     record_probe_result(success = false), quarantine restarts now
//! ```
//!
//! # Design Decisions
//! - Minimum-traffic gate: a single 500 never quarantines a quiet endpoint
//! - Strict `>` on the threshold; exactly 50% does not trip
//! - Entering Open or HalfOpen clears the failure window so the probe is
//!   measured on a clean slate
//! - Protected endpoints are permanently Closed
//! - Entries are LRU-bounded like the failure windows and only created
//!   once a circuit trips, so a healthy endpoint holds no slot

use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::admission::failure_tracker::FailureTracker;
use crate::admission::protected::is_protected;
use crate::config::CircuitConfig;
use crate::incidents::{Incident, IncidentEmitter};
use crate::observability::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

/// Why a circuit was opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpenCause {
    FailureRate,
    ProbeFailed,
    Forced,
}

impl OpenCause {
    fn as_str(&self) -> &'static str {
        match self {
            OpenCause::FailureRate => "failure_rate",
            OpenCause::ProbeFailed => "probe_failed",
            OpenCause::Forced => "forced",
        }
    }
}

#[derive(Debug)]
struct CircuitEntry {
    state: CircuitState,
    opened_at: Option<Instant>,
    last_probe_at: Option<Instant>,
    failure_rate_at_open: f64,
}

impl CircuitEntry {
    fn closed() -> Self {
        Self {
            state: CircuitState::Closed,
            opened_at: None,
            last_probe_at: None,
            failure_rate_at_open: 0.0,
        }
    }
}

/// Diagnostic view of one circuit.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CircuitSnapshot {
    pub state: CircuitState,
    pub failure_rate_at_open: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quarantine_elapsed_secs: Option<f64>,
}

/// Breaker thresholds resolved into durations.
#[derive(Debug, Clone)]
struct Thresholds {
    failure_rate: f64,
    min_requests: u64,
    quarantine: Duration,
    probe_interval: Duration,
}

pub struct CircuitBreaker {
    entries: Mutex<LruCache<String, Arc<Mutex<CircuitEntry>>>>,
    tracker: Arc<FailureTracker>,
    incidents: IncidentEmitter,
    thresholds: Thresholds,
}

impl CircuitBreaker {
    pub fn new(config: &CircuitConfig, tracker: Arc<FailureTracker>, incidents: IncidentEmitter) -> Self {
        let capacity = NonZeroUsize::new(config.max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            tracker,
            incidents,
            thresholds: Thresholds {
                failure_rate: config.failure_rate_threshold,
                min_requests: config.min_requests_in_window,
                quarantine: config.quarantine(),
                probe_interval: config.probe_interval(),
            },
        }
    }

    /// Current state, applying the lazy Open → HalfOpen transition.
    pub fn state(&self, endpoint: &str) -> CircuitState {
        if is_protected(endpoint) {
            return CircuitState::Closed;
        }
        let Some(entry) = self.existing(endpoint) else {
            return CircuitState::Closed;
        };
        let mut entry = entry.lock();
        self.advance(endpoint, &mut entry, Instant::now());
        entry.state
    }

    /// Claim the probe slot. True at most once per probe interval while HalfOpen.
    pub fn should_allow_probe(&self, endpoint: &str) -> bool {
        if is_protected(endpoint) {
            return true;
        }
        let Some(entry) = self.existing(endpoint) else {
            return true;
        };
        let now = Instant::now();
        let mut entry = entry.lock();
        self.advance(endpoint, &mut entry, now);

        match entry.state {
            CircuitState::Closed => true,
            CircuitState::Open => false,
            CircuitState::HalfOpen => match entry.last_probe_at {
                Some(at) if now.saturating_duration_since(at) < self.thresholds.probe_interval => false,
                _ => {
                    entry.last_probe_at = Some(now);
                    tracing::info!(endpoint, "Admitting half-open probe");
                    true
                }
            },
        }
    }

    /// Re-evaluate after an outcome was recorded. Returns the resulting state.
    pub fn evaluate(&self, endpoint: &str) -> CircuitState {
        if is_protected(endpoint) {
            return CircuitState::Closed;
        }
        // Healthy endpoints never occupy a slot, so unique junk paths cannot
        // evict a tripped circuit.
        let entry = match self.existing(endpoint) {
            Some(entry) => entry,
            None if self.threshold_exceeded(endpoint).is_some() => self.entry_for(endpoint),
            None => return CircuitState::Closed,
        };
        let now = Instant::now();
        let mut entry = entry.lock();
        self.advance(endpoint, &mut entry, now);

        if entry.state == CircuitState::Closed {
            if let Some(rate) = self.threshold_exceeded(endpoint) {
                tracing::debug!(endpoint, rate, "Failure threshold exceeded");
                self.open(endpoint, &mut entry, rate, OpenCause::FailureRate, now);
            }
        }
        entry.state
    }

    /// Failure rate of the current window when it trips the breaker.
    fn threshold_exceeded(&self, endpoint: &str) -> Option<f64> {
        let requests = self.tracker.request_count(endpoint);
        let rate = self.tracker.failure_rate(endpoint);
        (requests >= self.thresholds.min_requests && rate > self.thresholds.failure_rate).then_some(rate)
    }

    /// Feed back the outcome of a HalfOpen probe.
    pub fn record_probe_result(&self, endpoint: &str, success: bool) {
        if is_protected(endpoint) {
            return;
        }
        let Some(entry) = self.existing(endpoint) else {
            return;
        };
        let now = Instant::now();
        let mut entry = entry.lock();
        self.advance(endpoint, &mut entry, now);

        if entry.state != CircuitState::HalfOpen {
            tracing::debug!(endpoint, state = entry.state.as_str(), "Probe result ignored outside half-open");
            return;
        }

        if success {
            let quarantined = entry
                .opened_at
                .map(|at| now.saturating_duration_since(at).as_secs_f64())
                .unwrap_or_default();
            *entry = CircuitEntry::closed();
            metrics::record_circuit_transition(CircuitState::Closed.as_str());
            tracing::info!(endpoint, quarantined_secs = quarantined, "Circuit closed, endpoint recovered");
            self.incidents.emit(Incident::circuit_recovered(endpoint, quarantined));
        } else {
            let rate = self.tracker.failure_rate(endpoint);
            self.open(endpoint, &mut entry, rate, OpenCause::ProbeFailed, now);
        }
    }

    /// Manually quarantine an endpoint. Refused for protected endpoints.
    pub fn force_open(&self, endpoint: &str) -> bool {
        if is_protected(endpoint) {
            tracing::warn!(endpoint, "Refusing to force open a protected endpoint");
            return false;
        }
        let entry = self.entry_for(endpoint);
        let mut entry = entry.lock();
        let rate = self.tracker.failure_rate(endpoint);
        self.open(endpoint, &mut entry, rate, OpenCause::Forced, Instant::now());
        true
    }

    /// Manually close a circuit. Returns the state it was in.
    pub fn force_closed(&self, endpoint: &str) -> CircuitState {
        let Some(entry) = self.existing(endpoint) else {
            return CircuitState::Closed;
        };
        let mut entry = entry.lock();
        let previous = entry.state;
        if previous != CircuitState::Closed {
            *entry = CircuitEntry::closed();
            metrics::record_circuit_transition(CircuitState::Closed.as_str());
            tracing::warn!(endpoint, from = previous.as_str(), "Circuit force-closed");
        }
        previous
    }

    /// Diagnostic snapshot. Does not apply transitions; an Open circuit past
    /// its quarantine is reported as HalfOpen.
    pub fn all_states(&self) -> BTreeMap<String, CircuitSnapshot> {
        let entries: Vec<_> = self
            .entries
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let now = Instant::now();
        entries
            .into_iter()
            .map(|(endpoint, entry)| {
                let entry = entry.lock();
                let elapsed = entry
                    .opened_at
                    .map(|at| now.saturating_duration_since(at));
                let state = match (entry.state, elapsed) {
                    (CircuitState::Open, Some(e)) if e >= self.thresholds.quarantine => CircuitState::HalfOpen,
                    (state, _) => state,
                };
                let snapshot = CircuitSnapshot {
                    state,
                    failure_rate_at_open: entry.failure_rate_at_open,
                    quarantine_elapsed_secs: match state {
                        CircuitState::Open => elapsed.map(|e| e.as_secs_f64()),
                        _ => None,
                    },
                };
                (endpoint, snapshot)
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn advance(&self, endpoint: &str, entry: &mut CircuitEntry, now: Instant) {
        if entry.state != CircuitState::Open {
            return;
        }
        let Some(opened_at) = entry.opened_at else {
            return;
        };
        if now.saturating_duration_since(opened_at) >= self.thresholds.quarantine {
            entry.state = CircuitState::HalfOpen;
            entry.last_probe_at = None;
            self.tracker.reset_endpoint(endpoint);
            metrics::record_circuit_transition(CircuitState::HalfOpen.as_str());
            tracing::info!(endpoint, "Quarantine elapsed, circuit half-open");
        }
    }

    fn open(&self, endpoint: &str, entry: &mut CircuitEntry, rate: f64, cause: OpenCause, now: Instant) {
        entry.state = CircuitState::Open;
        entry.opened_at = Some(now);
        entry.last_probe_at = None;
        entry.failure_rate_at_open = rate;
        self.tracker.reset_endpoint(endpoint);

        metrics::record_circuit_transition(CircuitState::Open.as_str());
        tracing::warn!(
            endpoint,
            failure_rate = rate,
            cause = cause.as_str(),
            quarantine_secs = self.thresholds.quarantine.as_secs(),
            "Circuit opened"
        );
        self.incidents.emit(Incident::circuit_opened(endpoint, rate, cause.as_str()));
    }

    fn existing(&self, endpoint: &str) -> Option<Arc<Mutex<CircuitEntry>>> {
        self.entries.lock().get(endpoint).cloned()
    }

    fn entry_for(&self, endpoint: &str) -> Arc<Mutex<CircuitEntry>> {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get(endpoint) {
            return entry.clone();
        }
        let entry = Arc::new(Mutex::new(CircuitEntry::closed()));
        if let Some((evicted, _)) = entries.push(endpoint.to_string(), entry.clone()) {
            metrics::record_eviction("circuits");
            tracing::debug!(evicted = %evicted, "Circuit entry evicted (LRU)");
        }
        entry
    }
}
