use std::convert::Infallible;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use futures_util::stream::{self, Stream, StreamExt};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

use crate::admin::AppState;
use crate::error::SentinelError;
use crate::fallback::{CapabilityRequest, ProviderStatus};
use crate::health::state::unix_millis;
use crate::health::ServiceStatus;

/// Error body shared by every admin route.
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: String,
    pub error: String,
}

impl From<&SentinelError> for ApiError {
    fn from(err: &SentinelError) -> Self {
        Self {
            code: err.code(),
            error: err.to_string(),
        }
    }
}

fn error_response(status: StatusCode, err: SentinelError) -> Response {
    (status, Json(ApiError::from(&err))).into_response()
}

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub uptime_secs: u64,
    pub services_registered: usize,
    pub services_monitored: usize,
    pub services_up: usize,
    pub providers: usize,
}

#[derive(Serialize)]
pub struct ServiceView {
    pub name: String,
    pub display_name: String,
    pub target: String,
    pub monitoring: bool,
    pub consecutive_failures: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_check_at: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_response_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ServiceStatus>,
}

#[derive(Serialize)]
pub struct StopResult {
    pub service: String,
    pub stopped: bool,
}

async fn service_view(state: &AppState, name: &str) -> Option<ServiceView> {
    let endpoint = state.monitor.probe().endpoint(name)?;
    Some(ServiceView {
        name: endpoint.name.clone(),
        display_name: endpoint.display_name.clone(),
        target: endpoint.target.to_string(),
        monitoring: state.monitor.is_monitoring(name).await,
        consecutive_failures: endpoint.consecutive_failures(),
        last_check_at: endpoint.last_check_at.map(unix_millis),
        last_response_ms: endpoint.last_response_time.map(|d| d.as_millis() as u64),
        status: state.monitor.get_status(name).await,
    })
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    let statuses = state.monitor.get_all_statuses().await;
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        uptime_secs: state.started_at.elapsed().as_secs(),
        services_registered: state.monitor.probe().service_names().len(),
        services_monitored: state.monitor.monitored_services().await.len(),
        services_up: statuses.iter().filter(|s| s.state.is_up()).count(),
        providers: state.router.registry().len(),
    })
}

pub async fn list_services(State(state): State<AppState>) -> Json<Vec<ServiceView>> {
    let mut views = Vec::new();
    for name in state.monitor.probe().service_names() {
        if let Some(view) = service_view(&state, &name).await {
            views.push(view);
        }
    }
    Json(views)
}

pub async fn get_service(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    match service_view(&state, &name).await {
        Some(view) => Json(view).into_response(),
        None => error_response(StatusCode::NOT_FOUND, SentinelError::NotRegistered(name)),
    }
}

pub async fn reset_service(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    match state.monitor.probe().reset_failures(&name) {
        Ok(()) => {
            tracing::info!(service = %name, "Failure counter reset via admin API");
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => error_response(StatusCode::NOT_FOUND, e),
    }
}

pub async fn start_service(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    match state.monitor.start_monitoring(&name).await {
        Ok(()) => match service_view(&state, &name).await {
            Some(view) => (StatusCode::ACCEPTED, Json(view)).into_response(),
            None => StatusCode::ACCEPTED.into_response(),
        },
        Err(e) => error_response(StatusCode::NOT_FOUND, e),
    }
}

pub async fn stop_service(State(state): State<AppState>, Path(name): Path<String>) -> Json<StopResult> {
    let stopped = state.monitor.stop_monitoring(&name).await;
    Json(StopResult { service: name, stopped })
}

pub async fn get_providers(State(state): State<AppState>) -> Json<Vec<ProviderStatus>> {
    Json(state.router.status().await)
}

/// Status changes as server-sent events, one `status` event per change.
pub async fn stream_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.monitor.subscribe();

    let events = stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(status) => {
                    let event = Event::default()
                        .event("status")
                        .json_data(&status)
                        .unwrap_or_else(|_| Event::default().event("status").data(status.name.clone()));
                    return Some((Ok(event), rx));
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped = skipped, "Event stream subscriber lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    Sse::new(events).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

pub async fn execute_capability(
    State(state): State<AppState>,
    Json(request): Json<CapabilityRequest>,
) -> Response {
    let cancel = CancellationToken::new();
    // Cancels in-flight provider calls if the client goes away
    let _guard = cancel.clone().drop_guard();

    match state.router.execute(&request, &cancel).await {
        Ok(payload) if payload.is_empty() => StatusCode::NO_CONTENT.into_response(),
        Ok(payload) => (
            [(header::CONTENT_TYPE, "application/octet-stream")],
            payload,
        )
            .into_response(),
        Err(e) => error_response(StatusCode::SERVICE_UNAVAILABLE, e),
    }
}

pub async fn stream_capability(
    State(state): State<AppState>,
    Json(request): Json<CapabilityRequest>,
) -> Response {
    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();

    match state.router.stream_execute(request, cancel) {
        Ok(chunks) => {
            let body = chunks.map(move |chunk| {
                let _ = &guard;
                Ok::<_, Infallible>(chunk)
            });
            (
                [(header::CONTENT_TYPE, "application/octet-stream")],
                Body::from_stream(body),
            )
                .into_response()
        }
        Err(e) => error_response(StatusCode::SERVICE_UNAVAILABLE, e),
    }
}
