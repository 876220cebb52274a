//! Axum middleware that gates every request and feeds outcomes back.
//!
//! # Request Flow
//! ```text
//! state(path) == Open                      → 503, Retry-After: quarantine
//! should_shed(path, method)                → 429, Retry-After: 30
//! state(path) == HalfOpen && no probe slot → 503, Retry-After: probe interval
//! otherwise forward, then:
//!     record(path, status) | record_exception(path)
//!     evaluate(path)
//!     record_probe_result(path, 2xx) when the request was a probe
//! ```
//!
//! In shadow mode every decision is computed and logged but the request is
//! forwarded anyway. Off bypasses the layer completely.

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use crate::admission::circuit_breaker::{CircuitBreaker, CircuitState};
use crate::admission::failure_tracker::FailureTracker;
use crate::admission::load_shedder::LoadSheddingGovernor;
use crate::config::{AdmissionConfig, AdmissionMode};
use crate::incidents::{AlertWebhook, IncidentEmitter};
use crate::observability::metrics;

/// Retry-After sent with load shedding rejections, in seconds.
const SHEDDING_RETRY_AFTER_SECS: u64 = 30;

/// Response extension set by a handler whose upstream could not be reached.
/// Counted as an exception rather than by status code.
#[derive(Debug, Clone, Copy)]
pub struct UpstreamFailure;

/// Runtime switches that can change on config reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AdmissionSwitches {
    pub mode: AdmissionMode,
    pub circuit_breaker_enabled: bool,
    pub load_shedding_enabled: bool,
}

impl From<&AdmissionConfig> for AdmissionSwitches {
    fn from(config: &AdmissionConfig) -> Self {
        Self {
            mode: config.mode,
            circuit_breaker_enabled: config.circuit_breaker_enabled,
            load_shedding_enabled: config.load_shedding_enabled,
        }
    }
}

/// The admission services, shared by the middleware and the diagnostics handlers.
#[derive(Clone)]
pub struct Admission {
    pub tracker: Arc<FailureTracker>,
    pub breaker: Arc<CircuitBreaker>,
    pub governor: Arc<LoadSheddingGovernor>,
    switches: Arc<ArcSwap<AdmissionSwitches>>,
    quarantine_secs: u64,
    probe_interval_secs: u64,
}

impl Admission {
    pub fn new(config: &AdmissionConfig, incidents: IncidentEmitter, alert: Option<AlertWebhook>) -> Self {
        let tracker = Arc::new(FailureTracker::new(&config.tracker));
        let breaker = Arc::new(CircuitBreaker::new(&config.circuit, tracker.clone(), incidents.clone()));
        let governor = Arc::new(LoadSheddingGovernor::new(config.shedding.clone(), incidents, alert));
        Self {
            tracker,
            breaker,
            governor,
            switches: Arc::new(ArcSwap::from_pointee(AdmissionSwitches::from(config))),
            quarantine_secs: config.circuit.quarantine_secs,
            probe_interval_secs: config.circuit.probe_interval_secs,
        }
    }

    pub fn switches(&self) -> AdmissionSwitches {
        **self.switches.load()
    }

    /// Swap in the mode and enable flags of a reloaded config.
    pub fn apply_switches(&self, switches: AdmissionSwitches) {
        let previous = self.switches();
        if previous == switches {
            return;
        }
        self.switches.store(Arc::new(switches));
        tracing::info!(
            mode = switches.mode.as_str(),
            circuit_breaker_enabled = switches.circuit_breaker_enabled,
            load_shedding_enabled = switches.load_shedding_enabled,
            previous_mode = previous.mode.as_str(),
            "Admission switches updated"
        );
    }

    /// Decide whether a request may pass. Claims the HalfOpen probe slot only
    /// once the shedding check has passed.
    fn check(&self, switches: &AdmissionSwitches, endpoint: &str, request: &Request<Body>) -> Decision {
        let state = if switches.circuit_breaker_enabled {
            self.breaker.state(endpoint)
        } else {
            CircuitState::Closed
        };
        if state == CircuitState::Open {
            return Decision::Reject(RejectionKind::CircuitOpen, self.quarantine_secs);
        }

        if switches.load_shedding_enabled && self.governor.should_shed(endpoint, request.method()) {
            return Decision::Reject(RejectionKind::Shedding, SHEDDING_RETRY_AFTER_SECS);
        }

        if state == CircuitState::HalfOpen {
            if !self.breaker.should_allow_probe(endpoint) {
                return Decision::RejectProbe(self.probe_interval_secs);
            }
            return Decision::Admit { probe: true };
        }
        Decision::Admit { probe: false }
    }
}

enum Decision {
    Admit { probe: bool },
    Reject(RejectionKind, u64),
    /// HalfOpen with the probe slot taken; a forwarded request still counts as a probe.
    RejectProbe(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionKind {
    CircuitOpen,
    ProbeUnavailable,
    Shedding,
}

impl RejectionKind {
    pub fn status(&self) -> StatusCode {
        match self {
            RejectionKind::CircuitOpen | RejectionKind::ProbeUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            RejectionKind::Shedding => StatusCode::TOO_MANY_REQUESTS,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RejectionKind::CircuitOpen => "circuit_open",
            RejectionKind::ProbeUnavailable => "probe_unavailable",
            RejectionKind::Shedding => "load_shedding",
        }
    }
}

/// Structured rejection returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub kind: RejectionKind,
    pub endpoint: String,
    pub retry_after: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RejectionBody<'a> {
    error: &'static str,
    endpoint: &'a str,
    retry_after: u64,
}

impl Rejection {
    pub fn new(kind: RejectionKind, endpoint: impl Into<String>, retry_after: u64) -> Self {
        Self {
            kind,
            endpoint: endpoint.into(),
            retry_after,
        }
    }
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        let body = RejectionBody {
            error: self.kind.as_str(),
            endpoint: &self.endpoint,
            retry_after: self.retry_after,
        };
        let mut response = (self.kind.status(), Json(body)).into_response();
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from(self.retry_after));
        response
    }
}

/// Admission middleware, installed with `axum::middleware::from_fn_with_state`.
pub async fn admission_middleware(State(admission): State<Admission>, request: Request<Body>, next: Next) -> Response {
    let switches = admission.switches();
    if switches.mode == AdmissionMode::Off {
        return next.run(request).await;
    }

    let endpoint = request.uri().path().to_string();
    let enforce = switches.mode == AdmissionMode::Active;

    let probe = match admission.check(&switches, &endpoint, &request) {
        Decision::Admit { probe } => probe,
        Decision::Reject(kind, retry_after) => {
            metrics::record_rejection(kind.as_str(), enforce);
            if enforce {
                tracing::warn!(endpoint = %endpoint, reason = kind.as_str(), retry_after, "Request rejected");
                return Rejection::new(kind, endpoint, retry_after).into_response();
            }
            tracing::info!(endpoint = %endpoint, reason = kind.as_str(), "Shadow mode: would reject request");
            false
        }
        Decision::RejectProbe(retry_after) => {
            let kind = RejectionKind::ProbeUnavailable;
            metrics::record_rejection(kind.as_str(), enforce);
            if enforce {
                tracing::debug!(endpoint = %endpoint, retry_after, "Probe slot taken, rejecting");
                return Rejection::new(kind, endpoint, retry_after).into_response();
            }
            tracing::info!(endpoint = %endpoint, reason = kind.as_str(), "Shadow mode: would reject request");
            true
        }
    };

    let mut guard = OutcomeGuard {
        admission: &admission,
        endpoint: &endpoint,
        circuit: switches.circuit_breaker_enabled,
        probe,
        done: false,
    };

    let response = next.run(request).await;
    if response.extensions().get::<UpstreamFailure>().is_some() {
        guard.exception();
    } else {
        guard.completed(response.status());
    }
    response
}

/// Post-request bookkeeping. Dropped without an outcome (the request future
/// was cancelled) counts as an exception.
struct OutcomeGuard<'a> {
    admission: &'a Admission,
    endpoint: &'a str,
    circuit: bool,
    probe: bool,
    done: bool,
}

impl OutcomeGuard<'_> {
    fn completed(&mut self, status: StatusCode) {
        self.done = true;
        let code = status.as_u16();
        self.admission.tracker.record(self.endpoint, code);
        metrics::record_request(if status.is_server_error() {
            "server_error"
        } else if status.is_client_error() {
            "client_error"
        } else {
            "success"
        });
        self.feed_back(status.is_success());
    }

    fn exception(&mut self) {
        self.done = true;
        self.admission.tracker.record_exception(self.endpoint);
        metrics::record_request("exception");
        self.feed_back(false);
    }

    fn feed_back(&self, success: bool) {
        if !self.circuit {
            return;
        }
        self.admission.breaker.evaluate(self.endpoint);
        if self.probe {
            self.admission.breaker.record_probe_result(self.endpoint, success);
        }
    }
}

impl Drop for OutcomeGuard<'_> {
    fn drop(&mut self) {
        if !self.done {
            tracing::debug!(endpoint = self.endpoint, "Request cancelled before completion, counting as failure");
            self.exception();
        }
    }
}
