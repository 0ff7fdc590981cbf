//! Metrics collection and exposition.
//!
//! # Metrics
//! - `booking_background_tasks_running` (gauge)
//! - `booking_background_task_failures_total` (counter): by task
//! - `booking_shutdown_phase_duration_seconds` (histogram): by phase
//! - `booking_storage_connections` (gauge): by state (active, idle)
//! - `booking_storage_probe_total` (counter): by outcome
//! - `booking_requests_rejected_total` (counter): by reason
//! - `booking_integration_degraded` (gauge): 1 = degraded, by integration
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   exporter every call is a no-op
//! - Prometheus exporter is opt-in via configuration

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;

use crate::lifecycle::ShutdownPhase;
use crate::storage::PoolStats;

/// Install the Prometheus exporter with an HTTP scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_task_started() {
    gauge!("booking_background_tasks_running").increment(1.0);
}

pub fn record_task_exited() {
    gauge!("booking_background_tasks_running").decrement(1.0);
}

pub fn record_task_failure(task: &str) {
    counter!("booking_background_task_failures_total", "task" => task.to_string()).increment(1);
}

pub fn record_shutdown_phase(phase: ShutdownPhase, elapsed: Duration) {
    histogram!("booking_shutdown_phase_duration_seconds", "phase" => phase.as_str())
        .record(elapsed.as_secs_f64());
}

pub fn record_pool_stats(stats: PoolStats) {
    gauge!("booking_storage_connections", "state" => "active").set(f64::from(stats.active));
    gauge!("booking_storage_connections", "state" => "idle").set(f64::from(stats.idle));
}

pub fn record_probe(healthy: bool) {
    let outcome = if healthy { "success" } else { "failure" };
    counter!("booking_storage_probe_total", "outcome" => outcome).increment(1);
}

pub fn record_rejected(reason: &'static str) {
    counter!("booking_requests_rejected_total", "reason" => reason).increment(1);
}

pub fn record_integration_degraded(integration: &'static str, degraded: bool) {
    gauge!("booking_integration_degraded", "integration" => integration)
        .set(if degraded { 1.0 } else { 0.0 });
}
