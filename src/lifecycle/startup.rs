//! Startup orchestration.
//!
//! # Responsibilities
//! - Initialize subsystems in dependency order
//! - Start each background task as soon as what it needs exists
//! - Handshake mandatory integrations; record optional ones as degraded
//! - Bind the listener last (traffic only when ready)
//!
//! # Design Decisions
//! - Never exits the process: failures come back as [`StartupError`]
//! - On failure, cancel only what this function started; storage belongs
//!   to the caller, who closes it exactly once
//! - Layers initialize in order, not concurrently

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::AppConfig;
use crate::health::{PoolStatsReporter, StorageProbe};
use crate::http::{build_router, AppState};
use crate::lifecycle::adapter::Adapter;
use crate::lifecycle::error::LifecycleError;
use crate::lifecycle::handle::ServiceHandle;
use crate::lifecycle::shutdown::PhaseTracker;
use crate::lifecycle::supervisor::{TaskHandle, TaskSupervisor};
use crate::messaging::{webhook, MessagingClient, Registration};
use crate::net::{AcceptGate, HttpListener};
use crate::observability::metrics;
use crate::payments::PaymentsClient;
use crate::security::RateLimiter;
use crate::storage::ResourceGuard;

/// Startup failed. `cancelled` lists the tasks started before the failure,
/// all of which have been signalled.
#[derive(Debug, Error)]
#[error("startup failed: {error}")]
pub struct StartupError {
    pub error: LifecycleError,
    pub cancelled: Vec<TaskHandle>,
}

/// What has been started so far, for scoped cleanup.
struct Started {
    supervisor: Arc<TaskSupervisor>,
    adapters: Vec<Arc<dyn Adapter>>,
}

impl Started {
    fn fail(self, error: LifecycleError) -> StartupError {
        tracing::error!(error = %error, "Startup failed, cancelling started work");
        let cancelled = self.supervisor.cancel_all();
        for adapter in &self.adapters {
            adapter.shutdown();
        }
        StartupError { error, cancelled }
    }
}

/// Build and wire every subsystem around an already opened `storage`.
pub async fn initialize(
    config: &AppConfig,
    storage: Arc<ResourceGuard>,
) -> Result<ServiceHandle, StartupError> {
    let mut started = Started {
        supervisor: Arc::new(TaskSupervisor::new()),
        adapters: Vec::new(),
    };
    let mut degraded = Vec::new();

    // 1. Data access. The probe only needs storage, so it starts now.
    if config.health.enabled {
        started
            .supervisor
            .spawn_periodic(StorageProbe::new(storage.clone(), &config.health));
    }

    // 2. Validation.
    let limiter = Arc::new(RateLimiter::new(&config.rate_limit));
    limiter.start_cleanup();
    started.adapters.push(limiter.clone());

    // 3. Domain services. Payments first: without it nothing else matters.
    if let Err(error) = handshake_payments(config).await {
        return Err(started.fail(error));
    }

    let messaging = connect_messaging(config, &mut degraded).await;
    started.adapters.push(messaging.clone());

    // 4. Handlers.
    let phase = PhaseTracker::new();
    let gate = AcceptGate::new();
    let degraded = Arc::new(degraded);
    let state = AppState {
        storage: storage.clone(),
        supervisor: started.supervisor.clone(),
        phase: phase.clone(),
        messaging,
        degraded: degraded.clone(),
        probe_timeout: config.storage.probe_timeout(),
        admin_key: config.admin.api_key.as_deref().map(Arc::from),
    };
    let router = build_router(state, gate.clone(), limiter, &config.listener);

    // 5. Remaining background tasks.
    started.supervisor.spawn_periodic(PoolStatsReporter::new(
        storage.clone(),
        Duration::from_secs(config.observability.pool_stats_interval_secs.max(1)),
    ));

    // 6. Listener.
    let listener = match HttpListener::start(&config.listener, router, gate).await {
        Ok(listener) => listener,
        Err(error) => return Err(started.fail(error)),
    };

    tracing::info!(
        tasks = started.supervisor.running(),
        adapters = started.adapters.len(),
        degraded = degraded.len(),
        "Startup complete"
    );

    let Started { supervisor, adapters } = started;
    Ok(ServiceHandle::new(storage, supervisor, Box::new(listener))
        .with_adapters(adapters)
        .with_phase(phase)
        .with_degraded(degraded.as_ref().clone()))
}

async fn handshake_payments(config: &AppConfig) -> Result<(), LifecycleError> {
    let unavailable = |reason: String| LifecycleError::MandatoryIntegrationUnavailable {
        integration: "payments",
        reason,
    };

    let client = PaymentsClient::new(&config.payments).map_err(|e| unavailable(e.to_string()))?;
    client
        .handshake()
        .await
        .map_err(|e| unavailable(e.to_string()))
}

/// Connect messaging, or fall back to a disabled client and record why.
async fn connect_messaging(
    config: &AppConfig,
    degraded: &mut Vec<LifecycleError>,
) -> Arc<MessagingClient> {
    let mut degrade = |reason: String| {
        tracing::warn!(integration = "messaging", reason = %reason, "Optional integration degraded");
        metrics::record_integration_degraded("messaging", true);
        degraded.push(LifecycleError::OptionalIntegrationDegraded {
            integration: "messaging",
            reason,
        });
    };

    if !config.messaging.is_configured() {
        degrade("bot token not configured".to_string());
        return Arc::new(MessagingClient::disabled());
    }

    let client = match MessagingClient::connect(&config.messaging).await {
        Ok(client) => client,
        Err(e) => {
            degrade(e.to_string());
            return Arc::new(MessagingClient::disabled());
        }
    };
    metrics::record_integration_degraded("messaging", false);
    client.start();

    let client = Arc::new(client);
    if let Some(url) = config.messaging.webhook_url.as_deref() {
        match webhook::register(&client, url, webhook::retry_policy(&config.messaging)).await {
            Registration::Registered => {}
            // Runs detached and stops with the adapter.
            Registration::Retrying(_) => {
                tracing::info!(url, "Webhook registration continues in background")
            }
            Registration::Failed(e) => degrade(format!("webhook registration failed: {}", e)),
        }
    }

    client
}
