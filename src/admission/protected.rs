//! Blast-radius route sets.
//!
//! Health checks and the gateway's own diagnostic/admin surface must stay
//! reachable during an incident, so they are never tracked, never tripped,
//! never shed and never rerouted.

const PROTECTED_EXACT: &[&str] = &["/healthz", "/readyz", "/health", "/health/deps"];
const PROTECTED_PREFIXES: &[&str] = &["/vanguard/", "/admin/"];

/// Live-data streams are additionally exempt from load shedding.
const SHED_EXEMPT_PREFIXES: &[&str] = &["/live/"];

/// True for paths inside the blast-radius set.
pub fn is_protected(path: &str) -> bool {
    PROTECTED_EXACT.contains(&path) || PROTECTED_PREFIXES.iter().any(|p| path.starts_with(p))
}

/// True for paths the load shedder must never reject.
pub fn is_shed_exempt(path: &str) -> bool {
    is_protected(path) || SHED_EXEMPT_PREFIXES.iter().any(|p| path.starts_with(p))
}
