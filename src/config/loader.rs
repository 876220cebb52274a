//! Configuration loading from disk and the environment.

use std::fmt::Display;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

use crate::config::schema::{AdmissionMode, VanguardConfig};
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load a TOML file, apply environment overrides, and validate.
pub fn load_config(path: &Path) -> Result<VanguardConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let mut config: VanguardConfig = toml::from_str(&content)?;

    apply_overrides(&mut config, |key| std::env::var(key).ok());
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Build a configuration from defaults plus environment overrides.
pub fn config_from_env() -> Result<VanguardConfig, ConfigError> {
    let mut config = VanguardConfig::default();
    apply_overrides(&mut config, |key| std::env::var(key).ok());
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Apply key/value overrides on top of a parsed configuration.
///
/// Values that fail to parse are logged and ignored, except the operating
/// mode, which falls back to `shadow` so an unreadable flag never turns
/// enforcement on.
pub fn apply_overrides<F>(config: &mut VanguardConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = lookup("VANGUARD_MODE") {
        config.admission.mode = raw.parse().unwrap_or_else(|e| {
            tracing::warn!(value = %raw, error = %e, "Unreadable VANGUARD_MODE, using shadow mode");
            AdmissionMode::Shadow
        });
    }

    let admission = &mut config.admission;
    override_value(&lookup, "CIRCUIT_BREAKER_ENABLED", &mut admission.circuit_breaker_enabled);
    override_value(&lookup, "LOAD_SHEDDING_ENABLED", &mut admission.load_shedding_enabled);
    override_value(&lookup, "FAILURE_RATE_THRESHOLD", &mut admission.circuit.failure_rate_threshold);
    override_value(&lookup, "MIN_REQUESTS_IN_WINDOW", &mut admission.circuit.min_requests_in_window);
    override_value(&lookup, "QUARANTINE_DURATION_S", &mut admission.circuit.quarantine_secs);
    override_value(&lookup, "PROBE_INTERVAL_S", &mut admission.circuit.probe_interval_secs);
    override_value(&lookup, "SHEDDING_THRESHOLD_HIGH", &mut admission.shedding.threshold_high);
    override_value(&lookup, "SHEDDING_THRESHOLD_LOW", &mut admission.shedding.threshold_low);
    override_value(&lookup, "MAX_ENDPOINTS", &mut admission.tracker.max_endpoints);
    override_value(&lookup, "WINDOW_SECONDS", &mut admission.tracker.window_secs);

    if let Some(url) = lookup("ALERT_WEBHOOK_URL") {
        config.alerting.webhook_url = Some(url).filter(|u| !u.is_empty());
    }
    if let Some(key) = lookup("VANGUARD_ADMIN_KEY") {
        config.admin.api_key = key;
    }
}

fn override_value<F, T>(lookup: &F, key: &str, target: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.trim().parse::<T>() {
        Ok(value) => *target = value,
        Err(e) => tracing::warn!(key, value = %raw, error = %e, "Ignoring unparsable override"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_overrides_apply_thresholds() {
        let mut config = VanguardConfig::default();
        apply_overrides(
            &mut config,
            lookup_from(&[
                ("VANGUARD_MODE", "active"),
                ("FAILURE_RATE_THRESHOLD", "0.25"),
                ("MIN_REQUESTS_IN_WINDOW", "20"),
                ("WINDOW_SECONDS", "30"),
            ]),
        );
        assert_eq!(config.admission.mode, AdmissionMode::Active);
        assert_eq!(config.admission.circuit.failure_rate_threshold, 0.25);
        assert_eq!(config.admission.circuit.min_requests_in_window, 20);
        assert_eq!(config.admission.tracker.window_secs, 30);
    }

    #[test]
    fn test_bad_mode_falls_back_to_shadow() {
        let mut config = VanguardConfig::default();
        config.admission.mode = AdmissionMode::Active;
        apply_overrides(&mut config, lookup_from(&[("VANGUARD_MODE", "sometimes")]));
        assert_eq!(config.admission.mode, AdmissionMode::Shadow);
    }

    #[test]
    fn test_bad_number_is_ignored() {
        let mut config = VanguardConfig::default();
        apply_overrides(&mut config, lookup_from(&[("MAX_ENDPOINTS", "lots")]));
        assert_eq!(config.admission.tracker.max_endpoints, 200);
    }

    #[test]
    fn test_load_config_reports_validation_errors() {
        let path = std::env::temp_dir().join(format!("vanguard-invalid-{}.toml", std::process::id()));
        fs::write(&path, "[admission.shedding]\nthreshold_high = 50.0\nthreshold_low = 60.0\n").unwrap();

        let err = load_config(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("threshold_low"));

        std::fs::remove_file(&path).unwrap_or_default();
    }

    #[test]
    fn test_config_file_mode_aliases_and_unknown_values() {
        let cases = [
            ("dry-run", AdmissionMode::Shadow),
            ("enforce", AdmissionMode::Active),
            ("Disabled", AdmissionMode::Off),
            ("loud", AdmissionMode::Shadow),
        ];
        for (i, (raw, expected)) in cases.into_iter().enumerate() {
            let path = std::env::temp_dir().join(format!("vanguard-mode-{}-{}.toml", std::process::id(), i));
            fs::write(&path, format!("[admission]\nmode = \"{}\"\n", raw)).unwrap();

            let config = load_config(&path).unwrap();
            assert_eq!(config.admission.mode, expected, "mode = {raw}");

            std::fs::remove_file(&path).unwrap_or_default();
        }
    }

    #[test]
    fn test_non_string_mode_falls_back_to_shadow() {
        let config: VanguardConfig = toml::from_str("[admission]\nmode = 3\n").unwrap();
        assert_eq!(config.admission.mode, AdmissionMode::Shadow);
    }
}
