//! Shared utilities for integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use booking_server::config::AppConfig;
use booking_server::lifecycle::{
    Adapter, InboundListener, LifecycleError, TaskContext, TaskHandle, TaskSupervisor,
};
use booking_server::storage::{PoolStats, ResourceGuard, SharedResource, StorageError};

/// Ordered record of what happened during a test run.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<(String, Instant)>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: impl Into<String>) {
        self.events.lock().unwrap().push((event.into(), Instant::now()));
    }

    pub fn names(&self) -> Vec<String> {
        self.events.lock().unwrap().iter().map(|(n, _)| n.clone()).collect()
    }

    pub fn position(&self, event: &str) -> Option<usize> {
        self.names().iter().position(|n| n == event)
    }

    pub fn positions_with_prefix(&self, prefix: &str) -> Vec<usize> {
        self.names()
            .iter()
            .enumerate()
            .filter(|(_, n)| n.starts_with(prefix))
            .map(|(i, _)| i)
            .collect()
    }

    pub fn time_of(&self, event: &str) -> Option<Instant> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .find(|(n, _)| n == event)
            .map(|(_, at)| *at)
    }
}

/// Shared resource that timestamps every access and the close.
#[derive(Debug, Default)]
pub struct InstrumentedResource {
    accesses: Mutex<Vec<Instant>>,
    closed_at: Mutex<Option<Instant>>,
    close_calls: AtomicU32,
    post_close_accesses: AtomicU32,
    fail_probes: AtomicBool,
    fail_close: AtomicBool,
    log: Option<EventLog>,
}

impl InstrumentedResource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_log(log: EventLog) -> Arc<Self> {
        Arc::new(Self {
            log: Some(log),
            ..Default::default()
        })
    }

    pub fn failing_probes() -> Arc<Self> {
        let resource = Self::default();
        resource.fail_probes.store(true, Ordering::SeqCst);
        Arc::new(resource)
    }

    pub fn failing_close() -> Arc<Self> {
        let resource = Self::default();
        resource.fail_close.store(true, Ordering::SeqCst);
        Arc::new(resource)
    }

    fn record_access(&self) -> bool {
        let now = Instant::now();
        self.accesses.lock().unwrap().push(now);
        let closed = self.closed_at.lock().unwrap().is_some();
        if closed {
            self.post_close_accesses.fetch_add(1, Ordering::SeqCst);
        }
        closed
    }

    pub fn access_count(&self) -> usize {
        self.accesses.lock().unwrap().len()
    }

    pub fn accesses_after(&self, at: Instant) -> usize {
        self.accesses.lock().unwrap().iter().filter(|t| **t > at).count()
    }

    pub fn close_calls(&self) -> u32 {
        self.close_calls.load(Ordering::SeqCst)
    }

    pub fn post_close_accesses(&self) -> u32 {
        self.post_close_accesses.load(Ordering::SeqCst)
    }

    pub fn closed_at(&self) -> Option<Instant> {
        *self.closed_at.lock().unwrap()
    }
}

#[async_trait]
impl SharedResource for InstrumentedResource {
    async fn probe(&self) -> Result<(), StorageError> {
        if self.record_access() {
            return Err(StorageError::Closed);
        }
        if self.fail_probes.load(Ordering::SeqCst) {
            return Err(StorageError::Connect("injected probe failure".into()));
        }
        Ok(())
    }

    fn stats(&self) -> PoolStats {
        PoolStats { active: 1, idle: 4 }
    }

    async fn close(&self) -> Result<(), StorageError> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        *self.closed_at.lock().unwrap() = Some(Instant::now());
        if let Some(log) = &self.log {
            log.push("resource:close");
        }
        if self.fail_close.load(Ordering::SeqCst) {
            return Err(StorageError::Query("injected close failure".into()));
        }
        Ok(())
    }
}

pub fn guard_for(resource: &Arc<InstrumentedResource>) -> Arc<ResourceGuard> {
    Arc::new(ResourceGuard::new(resource.clone()))
}

/// Register a loop that touches storage every `every`, check-then-act.
pub fn spawn_storage_worker(
    supervisor: &TaskSupervisor,
    name: String,
    storage: Arc<ResourceGuard>,
    every: Duration,
    log: Option<EventLog>,
) -> TaskHandle {
    supervisor.register(name, move |ctx: TaskContext| async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            tokio::select! {
                biased;
                _ = ctx.cancelled() => break,
                _ = ticker.tick() => {}
            }
            if ctx.is_cancelled() {
                break;
            }
            if let Ok(resource) = storage.acquire() {
                let _ = resource.probe().await;
            }
        }
        if let Some(log) = log {
            log.push(format!("task:{}:exit", ctx.name()));
        }
    })
}

/// Inbound listener double with a configurable drain time.
pub struct RecordingListener {
    log: EventLog,
    drain_takes: Duration,
    shutdown_calls: Arc<AtomicU32>,
}

impl RecordingListener {
    pub fn new(log: EventLog) -> Self {
        Self::slow(log, Duration::ZERO)
    }

    /// A listener whose in-flight work needs `drain_takes` to finish.
    pub fn slow(log: EventLog, drain_takes: Duration) -> Self {
        Self {
            log,
            drain_takes,
            shutdown_calls: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Counter that stays readable after the listener is boxed into a handle.
    pub fn shutdown_counter(&self) -> Arc<AtomicU32> {
        self.shutdown_calls.clone()
    }
}

#[async_trait]
impl InboundListener for RecordingListener {
    async fn shutdown(&self, drain: Duration) -> Result<(), LifecycleError> {
        self.shutdown_calls.fetch_add(1, Ordering::SeqCst);
        self.log.push("listener:stop");
        let drained = tokio::time::timeout(drain, tokio::time::sleep(self.drain_takes)).await;
        self.log.push("listener:drained");
        drained.map_err(|_| LifecycleError::DrainTimeoutExceeded {
            timeout: drain,
            abandoned: 1,
        })
    }
}

/// Listener whose shutdown never returns, whatever drain window it is given.
pub struct HungListener {
    log: EventLog,
}

impl HungListener {
    pub fn new(log: EventLog) -> Self {
        Self { log }
    }
}

#[async_trait]
impl InboundListener for HungListener {
    async fn shutdown(&self, _drain: Duration) -> Result<(), LifecycleError> {
        self.log.push("listener:stop");
        std::future::pending().await
    }
}

/// Adapter double that records whether every task was already cancelled.
pub struct RecordingAdapter {
    name: &'static str,
    log: EventLog,
    supervisor: Option<Arc<TaskSupervisor>>,
    calls: AtomicU32,
    saw_all_cancelled: AtomicBool,
}

impl RecordingAdapter {
    pub fn new(name: &'static str, log: EventLog, supervisor: Option<Arc<TaskSupervisor>>) -> Arc<Self> {
        Arc::new(Self {
            name,
            log,
            supervisor,
            calls: AtomicU32::new(0),
            saw_all_cancelled: AtomicBool::new(false),
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn saw_all_tasks_cancelled(&self) -> bool {
        self.saw_all_cancelled.load(Ordering::SeqCst)
    }
}

impl Adapter for RecordingAdapter {
    fn name(&self) -> &'static str {
        self.name
    }

    fn shutdown(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let all_cancelled = self
            .supervisor
            .as_ref()
            .map(|s| s.tasks().iter().all(TaskHandle::is_cancelled))
            .unwrap_or(true);
        self.saw_all_cancelled.store(all_cancelled, Ordering::SeqCst);
        self.log.push(format!("adapter:{}", self.name));
    }
}

/// Start a programmable mock HTTP backend on an ephemeral port.
///
/// The handler gets `"METHOD /path"` and returns a status and body.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        let _ = serve_one(socket, f.as_ref()).await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

async fn serve_one<F, Fut>(mut socket: TcpStream, f: &F) -> std::io::Result<()>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = (u16, String)>,
{
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    let header_end = loop {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let content_length = head
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())
                .flatten()
        })
        .unwrap_or(0);
    while buf.len() < header_end + content_length {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let request_line = head.lines().next().unwrap_or_default();
    let route = request_line
        .rsplit_once(' ')
        .map(|(route, _version)| route.to_string())
        .unwrap_or_default();

    let (status, body) = f(route).await;
    let status_text = match status {
        200 => "200 OK",
        202 => "202 Accepted",
        401 => "401 Unauthorized",
        404 => "404 Not Found",
        500 => "500 Internal Server Error",
        503 => "503 Service Unavailable",
        _ => "200 OK",
    };
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status_text,
        body.len(),
        body
    );
    socket.write_all(response.as_bytes()).await?;
    socket.shutdown().await
}

/// A provider that accepts every call.
pub async fn start_healthy_provider() -> SocketAddr {
    start_programmable_backend(|_| async { (200, "{}".to_string()) }).await
}

/// Config wired to local mocks, with short intervals for tests.
pub fn test_config(payments: SocketAddr) -> AppConfig {
    let mut config = AppConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.listener.startup_window_ms = 500;
    config.storage.url = "postgres://unused".into();
    config.health.interval_ms = 20;
    config.health.timeout_ms = 100;
    config.health.failure_threshold = 3;
    config.lifecycle.grace_period_ms = 100;
    config.lifecycle.drain_timeout_secs = 1;
    config.payments.api_url = format!("http://{}", payments);
    config.payments.api_key = "sk_test".into();
    config.payments.handshake_timeout_secs = 1;
    config.observability.pool_stats_interval_secs = 1;
    config
}

/// Wait until `cond` holds, polling every few milliseconds.
pub async fn eventually(limit: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    cond()
}
