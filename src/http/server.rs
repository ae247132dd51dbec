//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build the shared registry, event bus and transport client
//! - Create the Axum router that sends every method/path to the dispatcher
//! - Wire up middleware (request ID, tracing)
//! - Apply upstream lists from config reloads
//! - Serve until shutdown is signalled, then wait for in-flight dispatches

use std::sync::Arc;
use std::time::Duration;

use axum::{body::Body, extract::State, http::Request, response::Response, routing::any, Router};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::admin::{self, AdminState};
use crate::config::SplitterConfig;
use crate::event::EventBus;
use crate::lifecycle::shutdown::signalled;
use crate::lifecycle::InflightTracker;
use crate::split::{DispatchSettings, Dispatcher};
use crate::upstream::{TransportClient, UpstreamError, UpstreamRegistry};

/// How long shutdown waits for dispatch tasks still draining upstreams.
const DRAIN_GRACE: Duration = Duration::from_secs(10);

/// Errors raised while assembling the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to build transport client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("invalid upstream: {0}")]
    Upstream(#[from] UpstreamError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// The traffic-splitting proxy server.
pub struct SplitterServer {
    router: Router,
    config: SplitterConfig,
    registry: Arc<UpstreamRegistry>,
    events: Arc<EventBus>,
    inflight: InflightTracker,
}

impl SplitterServer {
    /// Create a new server with the given configuration.
    pub fn new(config: SplitterConfig) -> Result<Self, ServerError> {
        let registry = Arc::new(UpstreamRegistry::from_urls(&config.upstreams)?);
        let events = Arc::new(EventBus::new(&config.events));
        let client = TransportClient::new(&config.timeouts)?;
        let inflight = InflightTracker::new();

        if registry.is_empty() {
            tracing::warn!("No upstreams configured; every request will be answered with 502");
        }

        let dispatcher = Dispatcher::new(
            Arc::clone(&registry),
            client,
            Arc::clone(&events),
            inflight.clone(),
            DispatchSettings::from_config(&config),
        );

        let router = Self::build_router(dispatcher);
        Ok(Self {
            router,
            config,
            registry,
            events,
            inflight,
        })
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(dispatcher: Dispatcher) -> Router {
        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(dispatcher)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::x_request_id()),
            )
    }

    /// Router for the introspection surface, sharing this server's state.
    pub fn admin_router(&self) -> Router {
        admin::setup_admin_router(AdminState::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.events),
            self.config.admin.api_key.clone(),
        ))
    }

    pub fn registry(&self) -> Arc<UpstreamRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn events(&self) -> Arc<EventBus> {
        Arc::clone(&self.events)
    }

    /// Tracker of dispatch tasks still running (shadows may outlive responses).
    pub fn inflight(&self) -> InflightTracker {
        self.inflight.clone()
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &SplitterConfig {
        &self.config
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(
        self,
        listener: TcpListener,
        config_updates: mpsc::UnboundedReceiver<SplitterConfig>,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            upstreams = self.registry.len(),
            rewrite_host = self.config.rewrite_host,
            "Proxy server starting"
        );

        let registry = Arc::clone(&self.registry);
        let reload_shutdown = shutdown.resubscribe();
        tokio::spawn(async move {
            tokio::select! {
                _ = apply_config_updates(registry, config_updates) => {}
                _ = signalled(reload_shutdown) => {}
            }
        });

        axum::serve(listener, self.router)
            .with_graceful_shutdown(signalled(shutdown))
            .await?;

        let pending = self.inflight.active_count();
        if pending > 0 {
            tracing::info!(pending, "Waiting for in-flight upstream calls");
            if !self.inflight.wait_idle(DRAIN_GRACE).await {
                tracing::warn!(
                    remaining = self.inflight.active_count(),
                    "Grace period elapsed with upstream calls still running"
                );
            }
        }

        tracing::info!("Proxy server stopped");
        Ok(())
    }
}

/// Swap in the upstream list of every reloaded config.
async fn apply_config_updates(
    registry: Arc<UpstreamRegistry>,
    mut updates: mpsc::UnboundedReceiver<SplitterConfig>,
) {
    while let Some(config) = updates.recv().await {
        match registry.replace(&config.upstreams) {
            Ok(()) => tracing::info!(
                upstreams = config.upstreams.len(),
                "Reloaded upstream list (other settings apply after restart)"
            ),
            Err(e) => tracing::error!(error = %e, "Rejected reloaded upstream list"),
        }
    }
}

/// Every method and path goes to the dispatcher.
async fn proxy_handler(State(dispatcher): State<Dispatcher>, request: Request<Body>) -> Response {
    dispatcher.handle(request).await
}
