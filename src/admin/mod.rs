//! Operator surface.
//!
//! `/vanguard/*` is read-only and always mounted. `/admin/*` mutates
//! admission state, requires a bearer token and is only mounted when
//! `admin.enabled` is set. Both prefixes are in the blast radius.

pub mod auth;
pub mod handlers;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::http::server::AppState;

pub fn diagnostics_router() -> Router<AppState> {
    Router::new()
        .route("/vanguard/status", get(get_status))
        .route("/vanguard/rates", get(get_rates))
        .route("/vanguard/circuits", get(get_circuits))
        .route("/vanguard/shedding", get(get_shedding))
        .route("/vanguard/routes", get(get_routes))
        .route("/vanguard/incidents", get(get_incidents))
}

pub fn setup_admin_router(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/admin/circuits/force-open", post(force_open))
        .route("/admin/circuits/force-closed", post(force_closed))
        .route("/admin/fallbacks/activate", post(activate_fallback))
        .route("/admin/fallbacks/deactivate", post(deactivate_fallback))
        .route_layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
}
