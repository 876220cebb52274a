use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::admission::{CircuitSnapshot, CircuitState, EndpointRate, RouteSnapshot, SheddingSnapshot};
use crate::config::AdmissionMode;
use crate::http::server::AppState;
use crate::incidents::Incident;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub mode: AdmissionMode,
    pub circuit_breaker_enabled: bool,
    pub load_shedding_enabled: bool,
    pub tracked_endpoints: usize,
    pub circuits: usize,
    pub shedding_active: bool,
    pub active_fallbacks: Vec<String>,
}

#[derive(Deserialize)]
pub struct EndpointRequest {
    pub endpoint: String,
}

#[derive(Deserialize)]
pub struct ActivateRequest {
    pub key: String,
    #[serde(default)]
    pub reason: String,
}

#[derive(Deserialize)]
pub struct DeactivateRequest {
    pub key: String,
}

fn error(status: StatusCode, message: impl Into<String>) -> axum::response::Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    let switches = state.admission.switches();
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        mode: switches.mode,
        circuit_breaker_enabled: switches.circuit_breaker_enabled,
        load_shedding_enabled: switches.load_shedding_enabled,
        tracked_endpoints: state.admission.tracker.len(),
        circuits: state.admission.breaker.len(),
        shedding_active: state.admission.governor.is_active(),
        active_fallbacks: state.routes.active_fallbacks(),
    })
}

pub async fn get_rates(State(state): State<AppState>) -> Json<BTreeMap<String, EndpointRate>> {
    Json(state.admission.tracker.all_rates())
}

pub async fn get_circuits(State(state): State<AppState>) -> Json<BTreeMap<String, CircuitSnapshot>> {
    Json(state.admission.breaker.all_states())
}

pub async fn get_shedding(State(state): State<AppState>) -> Json<SheddingSnapshot> {
    Json(state.admission.governor.snapshot())
}

pub async fn get_routes(State(state): State<AppState>) -> Json<BTreeMap<String, RouteSnapshot>> {
    Json(state.routes.all_routes())
}

pub async fn get_incidents(State(state): State<AppState>) -> Json<Vec<Incident>> {
    Json(state.incidents.recent())
}

pub async fn force_open(State(state): State<AppState>, Json(req): Json<EndpointRequest>) -> impl IntoResponse {
    if !state.admission.breaker.force_open(&req.endpoint) {
        return error(StatusCode::FORBIDDEN, format!("{} is protected", req.endpoint));
    }
    tracing::warn!(endpoint = %req.endpoint, "Circuit force-opened via admin API");
    Json(serde_json::json!({ "endpoint": req.endpoint, "state": CircuitState::Open })).into_response()
}

pub async fn force_closed(State(state): State<AppState>, Json(req): Json<EndpointRequest>) -> impl IntoResponse {
    let previous = state.admission.breaker.force_closed(&req.endpoint);
    Json(serde_json::json!({
        "endpoint": req.endpoint,
        "previous_state": previous,
        "state": CircuitState::Closed,
    }))
}

pub async fn activate_fallback(State(state): State<AppState>, Json(req): Json<ActivateRequest>) -> impl IntoResponse {
    if !state.routes.activate_fallback(&req.key, &req.reason) {
        return error(
            StatusCode::UNPROCESSABLE_ENTITY,
            format!("{} is unknown, protected or has no fallback", req.key),
        );
    }
    Json(serde_json::json!({ "key": req.key, "fallback_active": true })).into_response()
}

pub async fn deactivate_fallback(State(state): State<AppState>, Json(req): Json<DeactivateRequest>) -> impl IntoResponse {
    match state.routes.deactivate_fallback(&req.key) {
        Some(secs) => Json(serde_json::json!({
            "key": req.key,
            "fallback_active": false,
            "active_for_secs": secs,
        }))
        .into_response(),
        None => error(StatusCode::NOT_FOUND, format!("no active fallback for {}", req.key)),
    }
}
