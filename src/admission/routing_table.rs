//! Logical routes with switchable fallback handlers.
//!
//! # Responsibilities
//! - Hold the primary and optional fallback handler per route key
//! - Flip a route onto its fallback (and back) at runtime
//! - Resolve a request path to the handler currently in effect
//!
//! # Design Decisions
//! - Handlers are typed and resolved at registration, never looked up by name
//! - Protected keys cannot be registered, so they cannot be rerouted
//! - Path matching is by prefix on segment boundaries, longest key wins

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use thiserror::Error;
use tokio::time::Instant;

use crate::admission::protected::is_protected;
use crate::config::{HandlerConfig, RouteConfig};

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("invalid upstream address '{0}'")]
    InvalidAddress(String),

    #[error("route key '{0}' is protected")]
    Protected(String),
}

/// Where a request for a route goes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RouteHandler {
    /// Forward to an upstream server.
    Upstream { address: SocketAddr },
    /// Answer locally.
    Static { status: u16, body: String },
}

impl TryFrom<&HandlerConfig> for RouteHandler {
    type Error = RouteError;

    fn try_from(config: &HandlerConfig) -> Result<Self, Self::Error> {
        match config {
            HandlerConfig::Upstream { address } => address
                .parse()
                .map(|address| RouteHandler::Upstream { address })
                .map_err(|_| RouteError::InvalidAddress(address.clone())),
            HandlerConfig::Static { status, body } => Ok(RouteHandler::Static {
                status: *status,
                body: body.clone(),
            }),
        }
    }
}

#[derive(Debug)]
struct RouteEntry {
    primary: RouteHandler,
    fallback: Option<RouteHandler>,
    activation: Option<Activation>,
}

#[derive(Debug)]
struct Activation {
    at: Instant,
    reason: String,
}

/// Result of resolving a request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRoute {
    pub key: String,
    pub handler: RouteHandler,
    pub fallback: bool,
}

/// Diagnostic view of one route.
#[derive(Debug, Clone, Serialize)]
pub struct RouteSnapshot {
    pub primary: RouteHandler,
    pub fallback: Option<RouteHandler>,
    pub fallback_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_for_secs: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Default)]
pub struct RoutingTable {
    routes: RwLock<HashMap<String, RouteEntry>>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from configured routes.
    pub fn from_config(routes: &[RouteConfig]) -> Result<Self, RouteError> {
        let table = Self::new();
        for route in routes {
            let primary = RouteHandler::try_from(&route.primary)?;
            let fallback = route.fallback.as_ref().map(RouteHandler::try_from).transpose()?;
            if !table.register_route(&route.key, primary, fallback) {
                return Err(RouteError::Protected(route.key.clone()));
            }
        }
        Ok(table)
    }

    /// Register or replace a route. Refused for protected keys.
    pub fn register_route(&self, key: &str, primary: RouteHandler, fallback: Option<RouteHandler>) -> bool {
        if is_protected(key) {
            tracing::warn!(key, "Refusing to register a protected route key");
            return false;
        }
        tracing::debug!(key, has_fallback = fallback.is_some(), "Route registered");
        self.routes.write().insert(
            key.to_string(),
            RouteEntry {
                primary,
                fallback,
                activation: None,
            },
        );
        true
    }

    /// Switch a route onto its fallback. Idempotent.
    pub fn activate_fallback(&self, key: &str, reason: &str) -> bool {
        if is_protected(key) {
            tracing::warn!(key, "Refusing to activate fallback for a protected route");
            return false;
        }
        let mut routes = self.routes.write();
        let Some(entry) = routes.get_mut(key) else {
            tracing::warn!(key, "Fallback activation for unknown route");
            return false;
        };
        if entry.fallback.is_none() {
            tracing::warn!(key, "Route has no fallback to activate");
            return false;
        }
        if entry.activation.is_some() {
            return true;
        }
        entry.activation = Some(Activation {
            at: Instant::now(),
            reason: reason.to_string(),
        });
        tracing::warn!(key, reason, "Fallback activated");
        true
    }

    /// Switch a route back to its primary. Returns how long the fallback was active.
    pub fn deactivate_fallback(&self, key: &str) -> Option<f64> {
        let mut routes = self.routes.write();
        let activation = routes.get_mut(key)?.activation.take()?;
        let elapsed = activation.at.elapsed().as_secs_f64();
        tracing::info!(key, active_for_secs = elapsed, reason = %activation.reason, "Fallback deactivated");
        Some(elapsed)
    }

    pub fn is_fallback_active(&self, key: &str) -> bool {
        self.routes
            .read()
            .get(key)
            .is_some_and(|entry| entry.activation.is_some())
    }

    /// Keys currently served by their fallback, sorted.
    pub fn active_fallbacks(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .routes
            .read()
            .iter()
            .filter(|(_, entry)| entry.activation.is_some())
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    pub fn all_routes(&self) -> BTreeMap<String, RouteSnapshot> {
        let now = Instant::now();
        self.routes
            .read()
            .iter()
            .map(|(key, entry)| {
                let snapshot = RouteSnapshot {
                    primary: entry.primary.clone(),
                    fallback: entry.fallback.clone(),
                    fallback_active: entry.activation.is_some(),
                    active_for_secs: entry
                        .activation
                        .as_ref()
                        .map(|a| now.saturating_duration_since(a.at).as_secs_f64()),
                    reason: entry.activation.as_ref().map(|a| a.reason.clone()),
                };
                (key.clone(), snapshot)
            })
            .collect()
    }

    /// Find the route owning `path` and the handler currently in effect.
    pub fn resolve(&self, path: &str) -> Option<ResolvedRoute> {
        let routes = self.routes.read();
        let (key, entry) = routes
            .iter()
            .filter(|(key, _)| prefix_matches(key, path))
            .max_by_key(|(key, _)| key.len())?;

        let (handler, fallback) = match (&entry.activation, &entry.fallback) {
            (Some(_), Some(fallback)) => (fallback.clone(), true),
            _ => (entry.primary.clone(), false),
        };
        Some(ResolvedRoute {
            key: key.clone(),
            handler,
            fallback,
        })
    }

    pub fn len(&self) -> usize {
        self.routes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn prefix_matches(key: &str, path: &str) -> bool {
    match path.strip_prefix(key) {
        Some(rest) => rest.is_empty() || rest.starts_with('/') || key.ends_with('/'),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upstream(port: u16) -> RouteHandler {
        RouteHandler::Upstream {
            address: SocketAddr::from(([127, 0, 0, 1], port)),
        }
    }

    fn cached() -> RouteHandler {
        RouteHandler::Static {
            status: 200,
            body: "cached".into(),
        }
    }

    #[test]
    fn test_protected_keys_refused() {
        let table = RoutingTable::new();
        assert!(!table.register_route("/healthz", upstream(1), Some(cached())));
        assert!(!table.register_route("/admin/circuits", upstream(1), None));
        assert!(table.is_empty());
        assert!(!table.activate_fallback("/healthz", "drill"));
    }

    #[test]
    fn test_activation_rules() {
        let table = RoutingTable::new();
        table.register_route("/matchup", upstream(4000), Some(cached()));
        table.register_route("/players", upstream(4001), None);

        assert!(!table.activate_fallback("/unknown", "drill"));
        assert!(!table.activate_fallback("/players", "drill"));
        assert!(table.activate_fallback("/matchup", "upstream slow"));
        assert!(table.activate_fallback("/matchup", "again"));
        assert!(table.is_fallback_active("/matchup"));
        assert_eq!(table.active_fallbacks(), vec!["/matchup".to_string()]);

        let routes = table.all_routes();
        assert_eq!(routes["/matchup"].reason.as_deref(), Some("upstream slow"));
        assert!(!routes["/players"].fallback_active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deactivate_reports_duration() {
        let table = RoutingTable::new();
        table.register_route("/matchup", upstream(4000), Some(cached()));
        assert_eq!(table.deactivate_fallback("/matchup"), None);

        table.activate_fallback("/matchup", "drill");
        tokio::time::advance(std::time::Duration::from_secs(12)).await;
        let elapsed = table.deactivate_fallback("/matchup").unwrap();
        assert!((elapsed - 12.0).abs() < 0.01);
        assert!(!table.is_fallback_active("/matchup"));
        assert_eq!(table.deactivate_fallback("/matchup"), None);
    }

    #[test]
    fn test_resolve_longest_prefix_on_segments() {
        let table = RoutingTable::new();
        table.register_route("/matchup", upstream(4000), Some(cached()));
        table.register_route("/matchup/analyze", upstream(4001), None);

        assert_eq!(table.resolve("/matchup/analyze/42").unwrap().handler, upstream(4001));
        assert_eq!(table.resolve("/matchup/list").unwrap().key, "/matchup");
        assert_eq!(table.resolve("/matchup").unwrap().key, "/matchup");
        assert!(table.resolve("/matchups").is_none());
        assert!(table.resolve("/players").is_none());

        table.activate_fallback("/matchup", "drill");
        let resolved = table.resolve("/matchup/list").unwrap();
        assert!(resolved.fallback);
        assert_eq!(resolved.handler, cached());
    }

    #[test]
    fn test_from_config_rejects_bad_address() {
        let routes = vec![RouteConfig {
            key: "/matchup".into(),
            primary: HandlerConfig::Upstream { address: "not an address".into() },
            fallback: None,
        }];
        assert!(matches!(
            RoutingTable::from_config(&routes),
            Err(RouteError::InvalidAddress(_))
        ));
    }
}
