//! Health endpoints. All of them sit inside the blast radius, so they stay
//! reachable while circuits are open or load is being shed.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

use crate::admission::CircuitState;
use crate::http::server::AppState;

#[derive(Serialize)]
struct Liveness {
    status: &'static str,
}

#[derive(Serialize)]
pub struct DependencyHealth {
    pub active_fallbacks: Vec<String>,
    pub open_circuits: Vec<String>,
    pub shedding_active: bool,
    pub memory_pct: f64,
}

pub async fn healthz() -> impl IntoResponse {
    Json(Liveness { status: "ok" })
}

/// Not ready while shedding, so a balancer can steer new traffic elsewhere.
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    if state.admission.governor.is_active() {
        (StatusCode::SERVICE_UNAVAILABLE, Json(Liveness { status: "shedding" }))
    } else {
        (StatusCode::OK, Json(Liveness { status: "ready" }))
    }
}

pub async fn dependencies(State(state): State<AppState>) -> Json<DependencyHealth> {
    let open_circuits = state
        .admission
        .breaker
        .all_states()
        .into_iter()
        .filter(|(_, snapshot)| snapshot.state != CircuitState::Closed)
        .map(|(endpoint, _)| endpoint)
        .collect();

    Json(DependencyHealth {
        active_fallbacks: state.routes.active_fallbacks(),
        open_circuits,
        shedding_active: state.admission.governor.is_active(),
        memory_pct: state.admission.governor.memory_pct(),
    })
}
