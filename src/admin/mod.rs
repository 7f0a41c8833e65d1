//! Admin HTTP API.
//!
//! # Responsibilities
//! - Expose service statuses, session control and provider diagnostics
//! - Stream status changes as server-sent events
//! - Execute the capability fallback chain over HTTP
//!
//! # Design Decisions
//! - Every route sits behind the bearer-token middleware
//! - The API key is read from the live configuration on each request

pub mod auth;
pub mod handlers;

use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::SentinelConfig;
use crate::fallback::FallbackRouter;
use crate::lifecycle::Sentinel;
use crate::monitor::StatusMonitor;
use self::auth::admin_auth_middleware;
use self::handlers::*;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Shared handles injected into admin handlers.
#[derive(Clone)]
pub struct AppState {
    pub monitor: StatusMonitor,
    pub router: Arc<FallbackRouter>,
    pub config: Arc<ArcSwap<SentinelConfig>>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        monitor: StatusMonitor,
        router: Arc<FallbackRouter>,
        config: Arc<ArcSwap<SentinelConfig>>,
    ) -> Self {
        Self {
            monitor,
            router,
            config,
            started_at: Instant::now(),
        }
    }

    pub fn from_sentinel(sentinel: &Sentinel) -> Self {
        Self::new(
            sentinel.monitor.clone(),
            sentinel.router.clone(),
            sentinel.config.clone(),
        )
    }
}

#[allow(deprecated)]
pub fn setup_admin_router(state: AppState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/services", get(list_services))
        .route("/admin/services/{name}", get(get_service))
        .route("/admin/services/{name}/reset", post(reset_service))
        .route("/admin/services/{name}/start", post(start_service))
        .route("/admin/services/{name}/stop", post(stop_service))
        .route("/admin/providers", get(get_providers))
        .route("/admin/events", get(stream_events))
        .route("/capability", post(execute_capability))
        .route("/capability/stream", post(stream_capability))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(TraceLayer::new_for_http())
}
