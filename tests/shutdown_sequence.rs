//! Shutdown sequencer behaviour against recording doubles.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use booking_server::lifecycle::{
    Adapter, LifecycleError, ServiceHandle, ShutdownPhase, ShutdownSequencer, TaskSupervisor,
};
use booking_server::messaging::MessagingClient;
use booking_server::security::RateLimiter;

mod common;
use common::{EventLog, HungListener, InstrumentedResource, RecordingAdapter, RecordingListener};

const GRACE: Duration = Duration::from_millis(100);

fn sequencer() -> ShutdownSequencer {
    ShutdownSequencer::new(Duration::from_millis(200), GRACE)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_phases_run_in_order() {
    let log = EventLog::new();
    let resource = InstrumentedResource::with_log(log.clone());
    let storage = common::guard_for(&resource);
    let supervisor = Arc::new(TaskSupervisor::new());

    for i in 0..5 {
        common::spawn_storage_worker(
            &supervisor,
            format!("worker-{}", i),
            storage.clone(),
            Duration::from_millis(5),
            Some(log.clone()),
        );
    }
    let adapter = RecordingAdapter::new("recorder", log.clone(), Some(supervisor.clone()));

    let handle = ServiceHandle::new(
        storage.clone(),
        supervisor.clone(),
        Box::new(RecordingListener::new(log.clone())),
    )
    .with_adapter(adapter.clone());

    sequencer().execute(&handle).await.unwrap();

    // StopAccepting finished before any task saw cancellation.
    let drained = log.position("listener:drained").unwrap();
    let exits = log.positions_with_prefix("task:");
    assert_eq!(exits.len(), 5);
    assert!(exits.iter().all(|&i| i > drained));

    // Adapters ran only after every task had been signalled.
    assert_eq!(adapter.calls(), 1);
    assert!(adapter.saw_all_tasks_cancelled());
    assert!(log.position("adapter:recorder").unwrap() > drained);

    // Close came last, at least a grace period after the adapters.
    let close = log.position("resource:close").unwrap();
    assert!(exits.iter().all(|&i| i < close));
    let adapters_done = log.time_of("adapter:recorder").unwrap();
    let closed = log.time_of("resource:close").unwrap();
    assert!(closed.duration_since(adapters_done) >= GRACE);

    assert_eq!(handle.phase().current(), Some(ShutdownPhase::Done));
    assert!(storage.is_closed());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_no_storage_access_after_close() {
    let resource = InstrumentedResource::new();
    let storage = common::guard_for(&resource);
    let supervisor = Arc::new(TaskSupervisor::new());

    let handles: Vec<_> = (0..20)
        .map(|i| {
            common::spawn_storage_worker(
                &supervisor,
                format!("worker-{}", i),
                storage.clone(),
                Duration::from_millis(2),
                None,
            )
        })
        .collect();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(resource.access_count() > 0);

    let handle = ServiceHandle::new(
        storage,
        supervisor.clone(),
        Box::new(RecordingListener::new(EventLog::new())),
    );
    sequencer().execute(&handle).await.unwrap();

    // Every task finished within the grace period.
    assert!(handles.iter().all(|h| h.is_finished()));
    assert_eq!(supervisor.running(), 0);

    tokio::time::sleep(Duration::from_millis(50)).await;
    let closed_at = resource.closed_at().unwrap();
    assert_eq!(resource.accesses_after(closed_at), 0);
    assert_eq!(resource.post_close_accesses(), 0);
}

#[tokio::test]
async fn test_second_execute_returns_same_result() {
    let log = EventLog::new();
    let resource = InstrumentedResource::new();
    let listener = RecordingListener::slow(log, Duration::from_secs(5));
    let shutdown_calls = listener.shutdown_counter();

    let handle = ServiceHandle::new(
        common::guard_for(&resource),
        Arc::new(TaskSupervisor::new()),
        Box::new(listener),
    );
    let sequencer = ShutdownSequencer::new(Duration::from_millis(20), Duration::from_millis(10));

    let first = sequencer.execute(&handle).await;
    let second = sequencer.execute(&handle).await;

    assert!(first.is_err());
    assert_eq!(first, second);
    assert_eq!(shutdown_calls.load(Ordering::SeqCst), 1);
    assert_eq!(resource.close_calls(), 1);
}

#[tokio::test]
async fn test_drain_timeout_does_not_block_later_phases() {
    let log = EventLog::new();
    let resource = InstrumentedResource::with_log(log.clone());
    let storage = common::guard_for(&resource);
    let supervisor = Arc::new(TaskSupervisor::new());
    let task = common::spawn_storage_worker(
        &supervisor,
        "worker".into(),
        storage.clone(),
        Duration::from_millis(5),
        None,
    );
    let adapter = RecordingAdapter::new("recorder", log.clone(), None);

    let handle = ServiceHandle::new(
        storage,
        supervisor,
        Box::new(RecordingListener::slow(log.clone(), Duration::from_secs(30))),
    )
    .with_adapter(adapter.clone());

    let drain = Duration::from_millis(50);
    let started = std::time::Instant::now();
    let err = ShutdownSequencer::new(drain, Duration::from_millis(20))
        .execute(&handle)
        .await
        .unwrap_err();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(
        err.for_phase(ShutdownPhase::StopAccepting),
        Some(&LifecycleError::DrainTimeoutExceeded {
            timeout: drain,
            abandoned: 1
        })
    );
    assert_eq!(err.errors.len(), 1);

    // Phases 2 through 4 still ran.
    assert!(task.is_cancelled());
    assert_eq!(adapter.calls(), 1);
    assert_eq!(resource.close_calls(), 1);
    assert_eq!(handle.phase().current(), Some(ShutdownPhase::Done));
}

#[tokio::test]
async fn test_hung_listener_cannot_stall_shutdown() {
    let log = EventLog::new();
    let resource = InstrumentedResource::with_log(log.clone());
    let storage = common::guard_for(&resource);
    let supervisor = Arc::new(TaskSupervisor::new());
    let task = common::spawn_storage_worker(
        &supervisor,
        "worker".into(),
        storage.clone(),
        Duration::from_millis(5),
        None,
    );

    let handle = ServiceHandle::new(
        storage,
        supervisor,
        Box::new(HungListener::new(log.clone())),
    );

    let drain = Duration::from_millis(50);
    let err = tokio::time::timeout(
        Duration::from_secs(2),
        ShutdownSequencer::new(drain, Duration::from_millis(10)).execute(&handle),
    )
    .await
    .expect("shutdown stalled on the listener")
    .unwrap_err();

    assert_eq!(
        err.for_phase(ShutdownPhase::StopAccepting),
        Some(&LifecycleError::DrainTimeoutExceeded {
            timeout: drain,
            abandoned: 0
        })
    );
    assert!(log.position("listener:stop").is_some());
    assert!(task.is_cancelled());
    assert_eq!(resource.close_calls(), 1);
    assert_eq!(handle.phase().current(), Some(ShutdownPhase::Done));
}

#[tokio::test]
async fn test_close_error_is_recorded_not_raised() {
    let resource = InstrumentedResource::failing_close();
    let handle = ServiceHandle::new(
        common::guard_for(&resource),
        Arc::new(TaskSupervisor::new()),
        Box::new(RecordingListener::new(EventLog::new())),
    );

    let err = sequencer().execute(&handle).await.unwrap_err();

    assert!(matches!(
        err.for_phase(ShutdownPhase::CloseSharedResource),
        Some(LifecycleError::ResourceCloseError(_))
    ));
    assert!(err.for_phase(ShutdownPhase::StopAccepting).is_none());
    assert_eq!(resource.close_calls(), 1);
}

#[tokio::test]
async fn test_adapters_shut_down_in_construction_order() {
    let log = EventLog::new();
    let first = RecordingAdapter::new("first", log.clone(), None);
    let second = RecordingAdapter::new("second", log.clone(), None);
    let third = RecordingAdapter::new("third", log.clone(), None);

    let handle = ServiceHandle::new(
        common::guard_for(&InstrumentedResource::new()),
        Arc::new(TaskSupervisor::new()),
        Box::new(RecordingListener::new(log.clone())),
    )
    .with_adapters([
        first as Arc<dyn Adapter>,
        second as Arc<dyn Adapter>,
        third as Arc<dyn Adapter>,
    ]);

    sequencer().execute(&handle).await.unwrap();

    let order: Vec<_> = log
        .names()
        .into_iter()
        .filter(|n| n.starts_with("adapter:"))
        .collect();
    assert_eq!(order, ["adapter:first", "adapter:second", "adapter:third"]);
}

#[tokio::test]
async fn test_never_started_adapters_shut_down_safely() {
    let limiter = Arc::new(RateLimiter::new(&Default::default()));
    let messaging = Arc::new(MessagingClient::disabled());

    let handle = ServiceHandle::new(
        common::guard_for(&InstrumentedResource::new()),
        Arc::new(TaskSupervisor::new()),
        Box::new(RecordingListener::new(EventLog::new())),
    )
    .with_adapter(limiter.clone())
    .with_adapter(messaging.clone());

    sequencer().execute(&handle).await.unwrap();

    assert!(!limiter.is_cleanup_running());
    assert!(!messaging.is_enabled());
}
