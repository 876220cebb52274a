//! Metrics collection and exposition.
//!
//! # Metrics
//! - `vanguard_requests_total` (counter): forwarded requests by outcome
//! - `vanguard_rejections_total` (counter): admission rejections by reason, enforced or shadow
//! - `vanguard_circuit_transitions_total` (counter): circuit transitions by target state
//! - `vanguard_evictions_total` (counter): LRU evictions by map
//! - `vanguard_incidents_dropped_total` (counter): incidents lost to a full channel
//! - `vanguard_shedding_active` (gauge): 1 while shedding
//! - `vanguard_memory_pct` (gauge): last sampled memory utilization

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Install the Prometheus recorder and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(outcome: &'static str) {
    counter!("vanguard_requests_total", "outcome" => outcome).increment(1);
}

pub fn record_rejection(reason: &'static str, enforced: bool) {
    let mode = if enforced { "enforced" } else { "shadow" };
    counter!("vanguard_rejections_total", "reason" => reason, "mode" => mode).increment(1);
}

pub fn record_circuit_transition(to: &'static str) {
    counter!("vanguard_circuit_transitions_total", "to" => to).increment(1);
}

pub fn record_eviction(map: &'static str) {
    counter!("vanguard_evictions_total", "map" => map).increment(1);
}

pub fn record_incident_dropped() {
    counter!("vanguard_incidents_dropped_total").increment(1);
}

pub fn set_shedding(active: bool, memory_pct: f64) {
    gauge!("vanguard_shedding_active").set(if active { 1.0 } else { 0.0 });
    gauge!("vanguard_memory_pct").set(memory_pct);
}
