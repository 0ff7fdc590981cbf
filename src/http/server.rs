//! HTTP router setup.
//!
//! # Responsibilities
//! - Create the Axum Router with health, notification and admin routes
//! - Wire up middleware (admission, rate limit, timeout, tracing, request ID)
//!
//! Serving and draining belong to [`crate::net::HttpListener`].

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::admin;
use crate::config::ListenerConfig;
use crate::http::handlers;
use crate::http::middleware::admission_middleware;
use crate::lifecycle::{LifecycleError, PhaseTracker, TaskSupervisor};
use crate::messaging::MessagingClient;
use crate::net::AcceptGate;
use crate::security::{rate_limit_middleware, RateLimiter};
use crate::storage::ResourceGuard;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<ResourceGuard>,
    pub supervisor: Arc<TaskSupervisor>,
    pub phase: PhaseTracker,
    pub messaging: Arc<MessagingClient>,
    pub degraded: Arc<Vec<LifecycleError>>,
    pub probe_timeout: Duration,
    pub admin_key: Option<Arc<str>>,
}

/// Build the Axum router with all middleware layers.
///
/// Layers run outermost first: request ID, tracing, timeout, admission,
/// then rate limiting.
#[allow(deprecated)]
pub fn build_router(
    state: AppState,
    gate: AcceptGate,
    limiter: Arc<RateLimiter>,
    config: &ListenerConfig,
) -> Router {
    Router::new()
        .route("/healthz", get(handlers::healthz))
        .route("/readyz", get(handlers::readyz))
        .route("/v1/notifications", post(handlers::notify))
        .merge(admin::router(state.clone()))
        .with_state(state)
        .layer(middleware::from_fn_with_state(limiter, rate_limit_middleware))
        .layer(middleware::from_fn_with_state(gate, admission_middleware))
        .layer(TimeoutLayer::new(config.request_timeout()))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}
