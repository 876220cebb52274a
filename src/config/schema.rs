//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Root configuration for the admission gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct VanguardConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Default upstream application server.
    pub upstream: UpstreamConfig,

    /// Admission control: mode, switches and thresholds.
    pub admission: AdmissionConfig,

    /// Logical routes with optional fallback handlers.
    pub routes: Vec<RouteConfig>,

    /// Incident emission settings.
    pub incidents: IncidentConfig,

    /// Outbound alert webhook.
    pub alerting: AlertingConfig,

    /// Admin API settings.
    pub admin: AdminConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Upstream application server that admitted requests are forwarded to.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Upstream address (e.g., "127.0.0.1:3000").
    pub address: String,

    /// Total time allowed for a forwarded request, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:3000".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Whether the admission layer blocks requests or only reports what it would do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AdmissionMode {
    /// Rejections are enforced.
    Active,
    /// Decisions are computed and logged, nothing is blocked.
    #[default]
    Shadow,
    /// The admission layer is bypassed entirely.
    Off,
}

impl AdmissionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdmissionMode::Active => "active",
            AdmissionMode::Shadow => "shadow",
            AdmissionMode::Off => "off",
        }
    }
}

impl FromStr for AdmissionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" | "enforce" => Ok(AdmissionMode::Active),
            "shadow" | "dry-run" | "dry_run" => Ok(AdmissionMode::Shadow),
            "off" | "disabled" => Ok(AdmissionMode::Off),
            other => Err(format!("unknown admission mode '{}'", other)),
        }
    }
}

/// Accepts every spelling `FromStr` knows. Anything else is read as shadow mode.
impl<'de> Deserialize<'de> for AdmissionMode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawMode {
            Text(String),
            Other(serde::de::IgnoredAny),
        }

        let raw = match RawMode::deserialize(deserializer)? {
            RawMode::Text(text) => text,
            RawMode::Other(_) => String::from("<non-string>"),
        };
        Ok(raw.parse().unwrap_or_else(|e: String| {
            tracing::warn!(value = %raw, error = %e, "Unreadable admission mode, using shadow mode");
            AdmissionMode::Shadow
        }))
    }
}

/// Admission control configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdmissionConfig {
    /// Operating mode.
    pub mode: AdmissionMode,

    /// Consult and drive the per-endpoint circuit breaker.
    pub circuit_breaker_enabled: bool,

    /// Consult the memory-pressure governor.
    pub load_shedding_enabled: bool,

    pub tracker: TrackerConfig,
    pub circuit: CircuitConfig,
    pub shedding: SheddingConfig,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            mode: AdmissionMode::default(),
            circuit_breaker_enabled: true,
            load_shedding_enabled: true,
            tracker: TrackerConfig::default(),
            circuit: CircuitConfig::default(),
            shedding: SheddingConfig::default(),
        }
    }
}

/// Sliding-window failure tracker settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Window length in seconds; counters reset wholesale once it elapses.
    pub window_secs: u64,

    /// Maximum number of endpoints tracked at once (LRU bound).
    pub max_endpoints: usize,
}

impl TrackerConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            window_secs: 60,
            max_endpoints: 200,
        }
    }
}

/// Circuit breaker thresholds.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitConfig {
    /// Failure rate that must be strictly exceeded to open a circuit.
    pub failure_rate_threshold: f64,

    /// Minimum requests in the current window before a circuit may open.
    pub min_requests_in_window: u64,

    /// Time spent OPEN before probing, in seconds.
    pub quarantine_secs: u64,

    /// Minimum spacing between HALF_OPEN probes, in seconds.
    pub probe_interval_secs: u64,

    /// Maximum number of circuit entries kept (LRU bound).
    pub max_entries: usize,
}

impl CircuitConfig {
    pub fn quarantine(&self) -> Duration {
        Duration::from_secs(self.quarantine_secs)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failure_rate_threshold: 0.5,
            min_requests_in_window: 10,
            quarantine_secs: 60,
            probe_interval_secs: 30,
            max_entries: 200,
        }
    }
}

/// Memory-pressure load shedding thresholds.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SheddingConfig {
    /// Utilization percentage at or above which shedding activates.
    pub threshold_high: f64,

    /// Utilization percentage at or below which shedding deactivates.
    pub threshold_low: f64,

    /// Sampling interval in seconds.
    pub check_interval_secs: u64,
}

impl Default for SheddingConfig {
    fn default() -> Self {
        Self {
            threshold_high: 90.0,
            threshold_low: 75.0,
            check_interval_secs: 10,
        }
    }
}

/// Logical route with a primary and an optional fallback handler.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Route key; matched as a path prefix on segment boundaries.
    pub key: String,

    pub primary: HandlerConfig,

    #[serde(default)]
    pub fallback: Option<HandlerConfig>,
}

/// Handler definition as written in the config file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HandlerConfig {
    /// Forward to another upstream server.
    Upstream { address: String },

    /// Answer locally with a fixed response.
    Static {
        #[serde(default = "default_static_status")]
        status: u16,
        #[serde(default)]
        body: String,
    },
}

fn default_static_status() -> u16 {
    503
}

/// Incident emission configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IncidentConfig {
    /// Capacity of the channel between the admission engine and the store worker.
    pub channel_capacity: usize,

    /// Timeout for a single store call, in seconds.
    pub store_timeout_secs: u64,

    /// Number of recent incidents retained for the diagnostics endpoint.
    pub retained: usize,
}

impl Default for IncidentConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
            store_timeout_secs: 5,
            retained: 100,
        }
    }
}

/// Alert webhook configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AlertingConfig {
    /// Webhook receiving `{text, severity, timestamp}` on shedding activation.
    pub webhook_url: Option<String>,

    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for AlertingConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout_secs: 5,
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Mount the mutating `/admin/*` endpoints.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
