//! Configuration validation.
//!
//! Semantic checks only; serde handles syntax. All errors are collected so an
//! operator sees every problem in one pass.

use std::collections::HashSet;
use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::{HandlerConfig, VanguardConfig};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &VanguardConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new("listener.bind_address", "must be a socket address"));
    }
    if config.upstream.address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new("upstream.address", "must be a socket address"));
    }
    if config.upstream.request_timeout_secs == 0 {
        errors.push(ValidationError::new("upstream.request_timeout_secs", "must be > 0"));
    }

    let admission = &config.admission;
    if admission.tracker.window_secs == 0 {
        errors.push(ValidationError::new("admission.tracker.window_secs", "must be > 0"));
    }
    if admission.tracker.max_endpoints == 0 {
        errors.push(ValidationError::new("admission.tracker.max_endpoints", "must be > 0"));
    }

    let circuit = &admission.circuit;
    if !(circuit.failure_rate_threshold > 0.0 && circuit.failure_rate_threshold <= 1.0) {
        errors.push(ValidationError::new(
            "admission.circuit.failure_rate_threshold",
            "must be in (0, 1]",
        ));
    }
    if circuit.min_requests_in_window == 0 {
        errors.push(ValidationError::new("admission.circuit.min_requests_in_window", "must be > 0"));
    }
    if circuit.quarantine_secs == 0 {
        errors.push(ValidationError::new("admission.circuit.quarantine_secs", "must be > 0"));
    }
    if circuit.probe_interval_secs == 0 {
        errors.push(ValidationError::new("admission.circuit.probe_interval_secs", "must be > 0"));
    }
    if circuit.max_entries == 0 {
        errors.push(ValidationError::new("admission.circuit.max_entries", "must be > 0"));
    }

    let shedding = &admission.shedding;
    if !(shedding.threshold_high > 0.0 && shedding.threshold_high <= 100.0) {
        errors.push(ValidationError::new("admission.shedding.threshold_high", "must be in (0, 100]"));
    }
    if shedding.threshold_low < 0.0 || shedding.threshold_low >= shedding.threshold_high {
        errors.push(ValidationError::new(
            "admission.shedding.threshold_low",
            "must be >= 0 and below threshold_high",
        ));
    }
    if shedding.check_interval_secs == 0 {
        errors.push(ValidationError::new("admission.shedding.check_interval_secs", "must be > 0"));
    }

    let mut seen = HashSet::new();
    for (i, route) in config.routes.iter().enumerate() {
        let field = format!("routes[{}]", i);
        if !route.key.starts_with('/') {
            errors.push(ValidationError::new(format!("{}.key", field), "must start with '/'"));
        }
        if !seen.insert(route.key.as_str()) {
            errors.push(ValidationError::new(format!("{}.key", field), format!("duplicate key '{}'", route.key)));
        }
        validate_handler(&route.primary, &format!("{}.primary", field), &mut errors);
        if let Some(fallback) = &route.fallback {
            validate_handler(fallback, &format!("{}.fallback", field), &mut errors);
        }
    }

    if config.incidents.channel_capacity == 0 {
        errors.push(ValidationError::new("incidents.channel_capacity", "must be > 0"));
    }
    if let Some(url) = &config.alerting.webhook_url {
        if url::Url::parse(url).is_err() {
            errors.push(ValidationError::new("alerting.webhook_url", "must be an absolute URL"));
        }
    }
    if config.admin.enabled && config.admin.api_key.trim().is_empty() {
        errors.push(ValidationError::new("admin.api_key", "required when admin.enabled is set"));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new("observability.metrics_address", "must be a socket address"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_handler(handler: &HandlerConfig, field: &str, errors: &mut Vec<ValidationError>) {
    match handler {
        HandlerConfig::Upstream { address } => {
            if address.parse::<SocketAddr>().is_err() {
                errors.push(ValidationError::new(format!("{}.address", field), "must be a socket address"));
            }
        }
        HandlerConfig::Static { status, .. } => {
            if !(100..=599).contains(status) {
                errors.push(ValidationError::new(format!("{}.status", field), "must be a valid HTTP status"));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::RouteConfig;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&VanguardConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = VanguardConfig::default();
        config.admission.circuit.failure_rate_threshold = 0.0;
        config.admission.tracker.max_endpoints = 0;
        config.routes.push(RouteConfig {
            key: "players".into(),
            primary: HandlerConfig::Upstream { address: "nowhere".into() },
            fallback: Some(HandlerConfig::Static { status: 42, body: String::new() }),
        });

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"admission.circuit.failure_rate_threshold"));
        assert!(fields.contains(&"admission.tracker.max_endpoints"));
        assert!(fields.contains(&"routes[0].key"));
        assert!(fields.contains(&"routes[0].primary.address"));
        assert!(fields.contains(&"routes[0].fallback.status"));
    }

    #[test]
    fn test_admin_requires_key() {
        let mut config = VanguardConfig::default();
        config.admin.enabled = true;
        config.admin.api_key = "  ".into();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "admin.api_key");
    }

    #[test]
    fn test_duplicate_route_keys() {
        let mut config = VanguardConfig::default();
        let route = RouteConfig {
            key: "/players".into(),
            primary: HandlerConfig::Upstream { address: "127.0.0.1:4000".into() },
            fallback: None,
        };
        config.routes.push(route.clone());
        config.routes.push(route);

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("duplicate"));
    }
}
