//! Incident record types.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Severity attached to an incident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Informational,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Informational => "informational",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncidentStatus {
    Active,
    Resolved,
}

/// Structured incident written to the incident store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Incident {
    pub id: Uuid,
    /// Stable key grouping repeated incidents of the same kind and endpoint.
    pub fingerprint: String,
    /// Seconds since the Unix epoch.
    pub timestamp: u64,
    pub severity: Severity,
    pub status: IncidentStatus,
    pub error_type: String,
    pub error_message: String,
    pub endpoint: Option<String>,
    pub context_vector: serde_json::Value,
    pub resolved_at: Option<u64>,
}

impl Incident {
    fn new(
        error_type: &str,
        severity: Severity,
        status: IncidentStatus,
        endpoint: Option<&str>,
        error_message: String,
        context_vector: serde_json::Value,
    ) -> Self {
        let timestamp = unix_now();
        Self {
            id: Uuid::new_v4(),
            fingerprint: format!("{}:{}", error_type, endpoint.unwrap_or("global")),
            timestamp,
            severity,
            status,
            error_type: error_type.to_string(),
            error_message,
            endpoint: endpoint.map(str::to_string),
            context_vector,
            resolved_at: (status == IncidentStatus::Resolved).then_some(timestamp),
        }
    }

    /// A circuit entered OPEN.
    pub fn circuit_opened(endpoint: &str, failure_rate: f64, cause: &str) -> Self {
        Self::new(
            "circuit_open",
            Severity::High,
            IncidentStatus::Active,
            Some(endpoint),
            format!(
                "Circuit opened for {} ({}, failure rate {:.1}%)",
                endpoint,
                cause,
                failure_rate * 100.0
            ),
            serde_json::json!({ "failureRate": failure_rate, "cause": cause }),
        )
    }

    /// A circuit closed after a successful probe.
    pub fn circuit_recovered(endpoint: &str, quarantine_secs: f64) -> Self {
        Self::new(
            "circuit_recovered",
            Severity::Informational,
            IncidentStatus::Resolved,
            Some(endpoint),
            format!("Circuit for {} recovered after {:.1}s", endpoint, quarantine_secs),
            serde_json::json!({ "quarantineSeconds": quarantine_secs }),
        )
    }

    /// Global load shedding switched on.
    pub fn load_shedding_activated(memory_pct: f64) -> Self {
        Self::new(
            "load_shedding",
            Severity::Critical,
            IncidentStatus::Active,
            None,
            format!("Load shedding activated at {:.1}% memory utilization", memory_pct),
            serde_json::json!({ "memoryPct": memory_pct }),
        )
    }
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_groups_by_kind_and_endpoint() {
        let a = Incident::circuit_opened("/matchup/analyze", 0.66, "failure_rate");
        let b = Incident::circuit_opened("/matchup/analyze", 0.9, "probe_failed");
        assert_eq!(a.fingerprint, b.fingerprint);
        assert_ne!(a.id, b.id);
        assert_eq!(a.severity, Severity::High);
        assert!(a.resolved_at.is_none());
    }

    #[test]
    fn test_recovery_is_resolved() {
        let incident = Incident::circuit_recovered("/pulse/data", 61.5);
        assert_eq!(incident.status, IncidentStatus::Resolved);
        assert_eq!(incident.resolved_at, Some(incident.timestamp));
    }

    #[test]
    fn test_serializes_camel_case() {
        let incident = Incident::load_shedding_activated(93.0);
        let json = serde_json::to_value(&incident).unwrap();
        assert_eq!(json["errorType"], "load_shedding");
        assert_eq!(json["severity"], "critical");
        assert_eq!(json["fingerprint"], "load_shedding:global");
        assert_eq!(json["contextVector"]["memoryPct"], 93.0);
    }
}
