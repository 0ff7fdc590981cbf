//! Liveness, readiness and notification handlers.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tokio::time;

use crate::http::server::AppState;
use crate::lifecycle::ShutdownPhase;
use crate::messaging::{MessagingError, Notification};
use crate::storage::PoolStats;

#[derive(Debug, Serialize)]
pub struct Liveness {
    pub status: &'static str,
    pub phase: Option<ShutdownPhase>,
}

#[derive(Debug, Serialize)]
pub struct Readiness {
    pub status: &'static str,
    pub pool: PoolStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// The process is up. Reports the shutdown phase once one has begun.
pub async fn healthz(State(state): State<AppState>) -> Json<Liveness> {
    let phase = state.phase.current();
    Json(Liveness {
        status: if phase.is_some() { "shutting_down" } else { "ok" },
        phase,
    })
}

/// Storage answers a bounded probe and no shutdown is in progress.
pub async fn readyz(State(state): State<AppState>) -> (StatusCode, Json<Readiness>) {
    let unavailable = |reason: String| {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(Readiness {
                status: "unavailable",
                pool: state.storage.stats(),
                reason: Some(reason),
            }),
        )
    };

    if let Some(phase) = state.phase.current() {
        return unavailable(format!("shutdown in progress ({})", phase));
    }

    let resource = match state.storage.acquire() {
        Ok(resource) => resource,
        Err(e) => return unavailable(e.to_string()),
    };

    match time::timeout(state.probe_timeout, resource.probe()).await {
        Ok(Ok(())) => (
            StatusCode::OK,
            Json(Readiness {
                status: "ready",
                pool: resource.stats(),
                reason: None,
            }),
        ),
        Ok(Err(e)) => unavailable(e.to_string()),
        Err(_) => unavailable(format!("probe timed out after {:?}", state.probe_timeout)),
    }
}

/// Queue a notification. Answers 503 while messaging is degraded.
pub async fn notify(
    State(state): State<AppState>,
    Json(notification): Json<Notification>,
) -> Response {
    match state.messaging.notify(notification) {
        Ok(()) => (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({ "status": "queued" })),
        )
            .into_response(),
        Err(e) => {
            let (status, code) = match e {
                MessagingError::Disabled => (StatusCode::SERVICE_UNAVAILABLE, "messaging_disabled"),
                MessagingError::Stopped => (StatusCode::SERVICE_UNAVAILABLE, "shutting_down"),
                MessagingError::OutboxFull => (StatusCode::TOO_MANY_REQUESTS, "outbox_full"),
                MessagingError::Transport(_) | MessagingError::Status(_) => {
                    (StatusCode::BAD_GATEWAY, "messaging_unavailable")
                }
            };
            tracing::debug!(error = %e, "Notification not queued");
            (status, Json(serde_json::json!({ "error": code }))).into_response()
        }
    }
}
