//! Vanguard: adaptive admission control for HTTP services.
//!
//! Per-endpoint circuit breaking, memory-pressure load shedding and
//! operator-switchable fallback routes, served as an Axum gateway in front
//! of an application server.

pub mod admin;
pub mod admission;
pub mod config;
pub mod http;
pub mod incidents;
pub mod lifecycle;
pub mod observability;

pub use config::schema::VanguardConfig;
pub use http::VanguardServer;
pub use lifecycle::Shutdown;
