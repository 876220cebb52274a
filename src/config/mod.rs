//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse, deserialize, environment overrides)
//!     → validation.rs (semantic checks)
//!     → VanguardConfig (validated, immutable)
//!     → thresholds handed to the admission components at startup
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → server swaps the admission switches (mode + enable flags)
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Environment keys override file values (deployment-time knobs)
//! - An unreadable operating mode means shadow mode, never enforcement

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AdminConfig, AdmissionConfig, AdmissionMode, AlertingConfig, CircuitConfig, HandlerConfig,
    IncidentConfig, ListenerConfig, ObservabilityConfig, RouteConfig, SheddingConfig,
    TrackerConfig, UpstreamConfig, VanguardConfig,
};
