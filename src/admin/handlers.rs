use axum::{extract::State, Json};
use serde::Serialize;

use crate::http::server::AppState;
use crate::lifecycle::{ShutdownPhase, TaskStatus};
use crate::storage::PoolStats;

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub phase: Option<ShutdownPhase>,
    pub tasks: Vec<TaskStatus>,
    pub pool: PoolStats,
    pub storage_closed: bool,
    pub messaging_enabled: bool,
    pub degraded: Vec<String>,
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        phase: state.phase.current(),
        tasks: state.supervisor.statuses(),
        pool: state.storage.stats(),
        storage_closed: state.storage.is_closed(),
        messaging_enabled: state.messaging.is_enabled(),
        degraded: state.degraded.iter().map(ToString::to_string).collect(),
    })
}
