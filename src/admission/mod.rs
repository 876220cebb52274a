//! Adaptive admission control.
//!
//! # Data Flow
//! ```text
//! Incoming request (path, method)
//!     → middleware.rs (gate order: circuit, probe slot, load shedding)
//!     → downstream handler
//!     → failure_tracker.rs (record status or exception)
//!     → circuit_breaker.rs (evaluate, probe feedback)
//!
//! Background:
//!     memory.rs sample every 10s
//!     → load_shedder.rs (hysteresis 90% on / 75% off)
//!
//! Operator:
//!     routing_table.rs (switch a route onto its fallback)
//! ```
//!
//! # Design Decisions
//! - Every service is constructed once by the server and injected; no globals
//! - Timers are lazy, checked on access against `tokio::time::Instant`
//! - protected.rs defines the blast radius no component may touch
//! - Nothing on the request path performs I/O or can fail the request

pub mod circuit_breaker;
pub mod failure_tracker;
pub mod load_shedder;
pub mod memory;
pub mod middleware;
pub mod protected;
pub mod routing_table;

pub use circuit_breaker::{CircuitBreaker, CircuitSnapshot, CircuitState};
pub use failure_tracker::{EndpointRate, FailureTracker};
pub use load_shedder::{LoadSheddingGovernor, SheddingSnapshot};
pub use memory::{MemorySampler, ProcMeminfoSampler, SamplerError};
pub use middleware::{admission_middleware, Admission, AdmissionSwitches, Rejection, RejectionKind, UpstreamFailure};
pub use protected::{is_protected, is_shed_exempt};
pub use routing_table::{ResolvedRoute, RouteError, RouteHandler, RouteSnapshot, RoutingTable};
