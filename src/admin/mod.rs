//! Introspection surface, served on its own port.
//!
//! # Data Flow
//! ```text
//! admin client
//!     → auth.rs (bearer key, only when configured)
//!     → handlers.rs
//!         GET /               → status summary
//!         GET /upstreams      → registry snapshot
//!         GET /requests       → retained HandleResults, newest first
//!         GET /requests/{id}  → one HandleResult
//!         GET /events         → WebSocket feed of every publish
//! ```

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::{middleware, routing::get, Router};

use crate::event::EventBus;
use crate::upstream::UpstreamRegistry;

use self::auth::admin_auth_middleware;
use self::handlers::*;

/// Shared state for the admin handlers.
#[derive(Debug, Clone)]
pub struct AdminState {
    pub registry: Arc<UpstreamRegistry>,
    pub events: Arc<EventBus>,
    pub api_key: Option<Arc<str>>,
}

impl AdminState {
    pub fn new(
        registry: Arc<UpstreamRegistry>,
        events: Arc<EventBus>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            registry,
            events,
            api_key: api_key.filter(|key| !key.is_empty()).map(Arc::from),
        }
    }
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/", get(get_status))
        .route("/upstreams", get(get_upstreams))
        .route("/requests", get(get_requests))
        .route("/requests/{id}", get(get_request))
        .route("/events", get(live_events))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            admin_auth_middleware,
        ))
        .with_state(state)
}
