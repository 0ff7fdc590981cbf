//! Per-client rate limiting with idle bucket cleanup.

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use dashmap::DashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::RateLimitConfig;
use crate::lifecycle::Adapter;
use crate::observability::metrics;

/// A simple token bucket.
#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn new(capacity: f64) -> Self {
        Self {
            tokens: capacity,
            last_update: Instant::now(),
        }
    }

    fn try_acquire(&mut self, capacity: f64, refill_rate: f64) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update).as_secs_f64();

        self.tokens = (self.tokens + elapsed * refill_rate).min(capacity);
        self.last_update = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Rate limiter keyed by client IP.
pub struct RateLimiter {
    buckets: DashMap<IpAddr, TokenBucket>,
    enabled: bool,
    rps: f64,
    burst: f64,
    cleanup_interval: Duration,
    idle_ttl: Duration,
    stop: CancellationToken,
    cleanup: Mutex<Option<JoinHandle<()>>>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            buckets: DashMap::new(),
            enabled: config.enabled,
            rps: f64::from(config.requests_per_second),
            burst: f64::from(config.burst_size.max(1)),
            cleanup_interval: Duration::from_secs(config.cleanup_interval_secs.max(1)),
            idle_ttl: Duration::from_secs(config.idle_ttl_secs),
            stop: CancellationToken::new(),
            cleanup: Mutex::new(None),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Take one token for `client`. Always true when disabled.
    pub fn check(&self, client: IpAddr) -> bool {
        if !self.enabled {
            return true;
        }
        let mut bucket = self
            .buckets
            .entry(client)
            .or_insert_with(|| TokenBucket::new(self.burst));
        bucket.try_acquire(self.burst, self.rps)
    }

    /// Drop buckets untouched for longer than `idle_ttl`. Returns how many.
    pub fn sweep(&self, idle_ttl: Duration) -> usize {
        let before = self.buckets.len();
        self.buckets
            .retain(|_, bucket| bucket.last_update.elapsed() <= idle_ttl);
        before.saturating_sub(self.buckets.len())
    }

    pub fn tracked_clients(&self) -> usize {
        self.buckets.len()
    }

    /// Start the idle-bucket cleanup loop. No-op when disabled or already running.
    pub fn start_cleanup(self: &Arc<Self>) {
        if !self.enabled || self.stop.is_cancelled() {
            return;
        }
        let mut slot = self.lock_cleanup();
        if slot.is_some() {
            return;
        }

        let limiter = Arc::downgrade(self);
        let stop = self.stop.clone();
        let interval = self.cleanup_interval;
        let idle_ttl = self.idle_ttl;

        *slot = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    biased;
                    _ = stop.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let Some(live) = limiter.upgrade() else { break };
                let removed = live.sweep(idle_ttl);
                if removed > 0 {
                    tracing::debug!(removed, remaining = live.tracked_clients(), "Swept idle rate-limit buckets");
                }
            }
            tracing::debug!("Rate-limit cleanup loop stopped");
        }));
    }

    /// Stop the cleanup loop. Safe to call at any time, any number of times.
    pub fn stop(&self) {
        self.stop.cancel();
        self.lock_cleanup().take();
    }

    pub fn is_cleanup_running(&self) -> bool {
        self.lock_cleanup()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    fn lock_cleanup(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.cleanup.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Adapter for RateLimiter {
    fn name(&self) -> &'static str {
        "rate-limit-cleanup"
    }

    fn shutdown(&self) {
        self.stop();
    }
}

/// Middleware rejecting clients that exceed their budget with 429.
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let client = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());

    match client {
        Some(ip) if !limiter.check(ip) => {
            tracing::warn!(client = %ip, "Rate limit exceeded");
            metrics::record_rejected("rate_limited");
            (
                StatusCode::TOO_MANY_REQUESTS,
                Json(serde_json::json!({ "error": "rate_limited" })),
            )
                .into_response()
        }
        _ => next.run(request).await,
    }
}
