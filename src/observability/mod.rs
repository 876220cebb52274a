//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Admission components produce:
//!     → structured `tracing` events (transitions at warn/info, decisions at debug)
//!     → metrics.rs (counters and gauges)
//!
//! Consumers:
//!     → stdout log aggregation
//!     → Prometheus scrape of the metrics listener
//! ```
//!
//! # Design Decisions
//! - Metric updates are plain atomic increments, safe on the hot path
//! - Without an installed recorder the metric calls are no-ops (tests)
//! - Request ID (`x-request-id`) flows through every request span

pub mod logging;
pub mod metrics;
