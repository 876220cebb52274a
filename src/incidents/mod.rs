//! Incident emission subsystem.
//!
//! # Data Flow
//! ```text
//! State transition (circuit opened/recovered, shedding activated)
//!     → emitter.rs (try_send on a bounded channel, never blocks)
//!     → worker (background task)
//!     → IncidentStore::store under a timeout
//!
//! Shedding activation additionally:
//!     → alert.rs (webhook POST, spawned, 5s timeout)
//! ```
//!
//! # Design Decisions
//! - The request path only ever does a non-blocking channel send
//! - A full channel drops the incident and counts it
//! - Store and webhook failures are logged and swallowed

pub mod alert;
pub mod emitter;
pub mod store;
pub mod types;

pub use alert::{AlertError, AlertWebhook};
pub use emitter::{IncidentEmitter, IncidentWorker};
pub use store::{IncidentStore, MemoryIncidentStore};
pub use types::{Incident, IncidentStatus, Severity};
