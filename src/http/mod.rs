//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, timeout, tracing)
//!     → admission middleware (may answer 503/429 directly)
//!     → probes.rs | admin diagnostics | forward handler
//!     → routing table picks primary or fallback handler
//!     → response.rs (strip hop-by-hop headers, static answers, 502 marking)
//!     → Send to client
//! ```

pub mod probes;
pub mod response;
pub mod server;

pub use server::{AppState, ServerError, VanguardServer};
