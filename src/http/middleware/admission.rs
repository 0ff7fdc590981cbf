//! Admission middleware.
//! Rejects requests that arrive after the listener started draining.

use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};

use crate::net::AcceptGate;
use crate::observability::metrics;

pub async fn admission_middleware(
    State(gate): State<AcceptGate>,
    request: Request<Body>,
    next: Next,
) -> Response {
    // Held until the response is produced, so drain can count us.
    let Some(_in_flight) = gate.enter() else {
        tracing::debug!(path = %request.uri().path(), "Rejecting request while draining");
        metrics::record_rejected("draining");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            [(header::CONNECTION, "close")],
            Json(serde_json::json!({ "error": "shutting_down" })),
        )
            .into_response();
    };

    next.run(request).await
}
