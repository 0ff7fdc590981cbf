//! HTTP listener with bounded startup and drain.
//!
//! # Responsibilities
//! - Bind to the configured address off the caller's task
//! - Report bind errors within a bounded startup window
//! - On shutdown: close the accept gate, stop accepting, drain with a deadline

use async_trait::async_trait;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::config::ListenerConfig;
use crate::lifecycle::{InboundListener, LifecycleError};
use crate::net::gate::AcceptGate;

/// A running axum server.
pub struct HttpListener {
    local_addr: SocketAddr,
    gate: AcceptGate,
    stop: CancellationToken,
    serve: Mutex<Option<JoinHandle<()>>>,
}

impl HttpListener {
    /// Start serving `router`.
    ///
    /// Returns once the socket is bound, or with `ListenerBindFailure` if
    /// binding fails or is not reported within the startup window.
    pub async fn start(
        config: &ListenerConfig,
        router: Router,
        gate: AcceptGate,
    ) -> Result<Self, LifecycleError> {
        let bind_failure = |reason: String| LifecycleError::ListenerBindFailure {
            address: config.bind_address.clone(),
            reason,
        };

        let addr: SocketAddr = config
            .bind_address
            .parse()
            .map_err(|e: std::net::AddrParseError| bind_failure(e.to_string()))?;

        let stop = CancellationToken::new();
        let (ready_tx, ready_rx) = oneshot::channel::<std::io::Result<SocketAddr>>();
        let shutdown = stop.clone();

        let serve = tokio::spawn(async move {
            let listener = match TcpListener::bind(addr).await {
                Ok(listener) => listener,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            let local = listener.local_addr();
            let bound = local.is_ok();
            if ready_tx.send(local).is_err() || !bound {
                return;
            }

            let app = router.into_make_service_with_connect_info::<SocketAddr>();
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await
            {
                tracing::error!(error = %e, "HTTP server error");
            }
            tracing::info!("HTTP server stopped");
        });

        let window = config.startup_window();
        match time::timeout(window, ready_rx).await {
            Ok(Ok(Ok(local_addr))) => {
                tracing::info!(address = %local_addr, "Listener bound");
                Ok(Self {
                    local_addr,
                    gate,
                    stop,
                    serve: Mutex::new(Some(serve)),
                })
            }
            Ok(Ok(Err(e))) => Err(bind_failure(e.to_string())),
            Ok(Err(_)) => Err(bind_failure("listener task exited during startup".to_string())),
            Err(_) => {
                serve.abort();
                Err(bind_failure(format!("no bind report within {:?}", window)))
            }
        }
    }

    pub fn gate(&self) -> &AcceptGate {
        &self.gate
    }
}

#[async_trait]
impl InboundListener for HttpListener {
    fn local_addr(&self) -> Option<SocketAddr> {
        Some(self.local_addr)
    }

    async fn shutdown(&self, drain: Duration) -> Result<(), LifecycleError> {
        self.gate.close();
        self.stop.cancel();

        let serve = self
            .serve
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        let Some(mut serve) = serve else {
            return Ok(());
        };

        tracing::info!(in_flight = self.gate.in_flight(), drain = ?drain, "Draining in-flight requests");

        match time::timeout(drain, &mut serve).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "HTTP server task ended abnormally");
                Ok(())
            }
            Err(_) => {
                let abandoned = self.gate.in_flight();
                serve.abort();
                Err(LifecycleError::DrainTimeoutExceeded {
                    timeout: drain,
                    abandoned,
                })
            }
        }
    }
}
