//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Construct the admission services and inject them into handlers
//! - Create the Axum router: health, diagnostics, admin, forwarding
//! - Wire up middleware (timeout, request ID, tracing, admission)
//! - Forward admitted requests to the resolved upstream
//! - Run the background tasks (memory sampling, incident worker, config swap)

use axum::{
    body::Body,
    extract::State,
    http::{header, uri::Authority, uri::PathAndQuery, uri::Scheme, Request, Uri},
    middleware::from_fn_with_state,
    response::Response,
    routing::get,
    Router,
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::admin;
use crate::admission::{
    admission_middleware, Admission, AdmissionSwitches, MemorySampler, ProcMeminfoSampler, RouteError,
    RouteHandler, RoutingTable,
};
use crate::config::{AdminConfig, VanguardConfig};
use crate::http::{probes, response};
use crate::incidents::{AlertError, AlertWebhook, Incident, IncidentEmitter, IncidentWorker, MemoryIncidentStore};
use crate::lifecycle::Shutdown;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid upstream address '{0}'")]
    UpstreamAddress(String),

    #[error(transparent)]
    Route(#[from] RouteError),

    #[error("failed to build alert webhook: {0}")]
    Alert(#[from] AlertError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub admission: Admission,
    pub routes: Arc<RoutingTable>,
    pub client: Client<HttpConnector, Body>,
    pub default_upstream: SocketAddr,
    pub incidents: MemoryIncidentStore,
    pub admin: AdminConfig,
}

/// HTTP server for the admission gateway.
pub struct VanguardServer {
    state: AppState,
    config: VanguardConfig,
    incident_rx: Option<mpsc::Receiver<Incident>>,
}

impl VanguardServer {
    /// Create a new server with the given configuration.
    pub fn new(config: VanguardConfig) -> Result<Self, ServerError> {
        let default_upstream = config
            .upstream
            .address
            .parse()
            .map_err(|_| ServerError::UpstreamAddress(config.upstream.address.clone()))?;

        let (emitter, incident_rx) = IncidentEmitter::channel(config.incidents.channel_capacity);
        let alert = match &config.alerting.webhook_url {
            Some(url) => Some(AlertWebhook::new(url.clone(), Duration::from_secs(config.alerting.timeout_secs))?),
            None => None,
        };

        let admission = Admission::new(&config.admission, emitter, alert);
        let routes = Arc::new(RoutingTable::from_config(&config.routes)?);

        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());

        let state = AppState {
            admission,
            routes,
            client,
            default_upstream,
            incidents: MemoryIncidentStore::new(config.incidents.retained),
            admin: config.admin.clone(),
        };

        Ok(Self {
            state,
            config,
            incident_rx: Some(incident_rx),
        })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    pub fn router(&self) -> Router {
        let state = self.state.clone();

        let mut app = Router::new()
            .route("/healthz", get(probes::healthz))
            .route("/readyz", get(probes::readyz))
            .route("/health/deps", get(probes::dependencies))
            .merge(admin::diagnostics_router());
        if self.config.admin.enabled {
            app = app.merge(admin::setup_admin_router(&state));
        }

        app.fallback(forward_handler)
            .layer(from_fn_with_state(state.admission.clone(), admission_middleware))
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(self.config.upstream.request_timeout_secs)))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn config(&self) -> &VanguardConfig {
        &self.config
    }

    /// Run the server, sampling host memory from `/proc/meminfo`.
    pub async fn run(
        self,
        listener: TcpListener,
        config_updates: Option<mpsc::UnboundedReceiver<VanguardConfig>>,
        shutdown: &Shutdown,
    ) -> Result<(), ServerError> {
        self.run_with_sampler(listener, ProcMeminfoSampler::new(), config_updates, shutdown)
            .await
    }

    /// Run the server until shutdown fires.
    pub async fn run_with_sampler<S: MemorySampler>(
        mut self,
        listener: TcpListener,
        sampler: S,
        config_updates: Option<mpsc::UnboundedReceiver<VanguardConfig>>,
        shutdown: &Shutdown,
    ) -> Result<(), ServerError> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            mode = self.config.admission.mode.as_str(),
            routes = self.state.routes.len(),
            "HTTP server starting"
        );

        if let Some(rx) = self.incident_rx.take() {
            let worker = IncidentWorker::new(
                rx,
                self.state.incidents.clone(),
                Duration::from_secs(self.config.incidents.store_timeout_secs),
            );
            tokio::spawn(worker.run(shutdown.subscribe()));
        }

        tokio::spawn(
            self.state
                .admission
                .governor
                .clone()
                .run(sampler, shutdown.subscribe()),
        );

        if let Some(updates) = config_updates {
            tokio::spawn(apply_config_updates(
                self.state.admission.clone(),
                self.config.clone(),
                updates,
                shutdown.subscribe(),
            ));
        }

        let app = self.router();
        let mut stop = shutdown.subscribe();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = stop.recv().await;
                tracing::info!("HTTP server draining connections");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Swap admission switches from reloaded configs. Everything else needs a restart.
async fn apply_config_updates(
    admission: Admission,
    current: VanguardConfig,
    mut updates: mpsc::UnboundedReceiver<VanguardConfig>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            update = updates.recv() => {
                let Some(config) = update else { break };
                admission.apply_switches(AdmissionSwitches::from(&config.admission));
                if config.routes != current.routes
                    || config.admission.tracker != current.admission.tracker
                    || config.admission.circuit != current.admission.circuit
                    || config.admission.shedding != current.admission.shedding
                {
                    tracing::warn!("Routes and thresholds changed on disk; they apply after a restart");
                }
            }
            _ = shutdown.recv() => break,
        }
    }
}

/// Forward an admitted request to the route's handler, or the default upstream.
async fn forward_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let path = request.uri().path().to_string();

    let target = match state.routes.resolve(&path) {
        Some(resolved) => match resolved.handler {
            RouteHandler::Static { status, body } => {
                return response::static_response(&resolved.key, status, body, resolved.fallback);
            }
            RouteHandler::Upstream { address } => {
                if resolved.fallback {
                    tracing::debug!(route = %resolved.key, upstream = %address, "Serving from fallback upstream");
                }
                address
            }
        },
        None => state.default_upstream,
    };

    let (mut parts, body) = request.into_parts();
    let mut uri_parts = parts.uri.clone().into_parts();
    uri_parts.scheme = Some(Scheme::HTTP);
    uri_parts.authority = Authority::from_str(&target.to_string()).ok();
    if uri_parts.path_and_query.is_none() {
        uri_parts.path_and_query = Some(PathAndQuery::from_static("/"));
    }
    parts.uri = match Uri::from_parts(uri_parts) {
        Ok(uri) => uri,
        Err(e) => {
            tracing::error!(path = %path, error = %e, "Failed to build upstream URI");
            return response::upstream_unreachable();
        }
    };
    response::strip_hop_by_hop(&mut parts.headers);
    parts.headers.remove(header::HOST);

    match state.client.request(Request::from_parts(parts, body)).await {
        Ok(upstream) => {
            tracing::debug!(
                path = %path,
                upstream = %target,
                status = upstream.status().as_u16(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Upstream responded"
            );
            response::from_upstream(upstream)
        }
        Err(e) => {
            tracing::error!(path = %path, upstream = %target, error = %e, "Upstream error");
            response::upstream_unreachable()
        }
    }
}
