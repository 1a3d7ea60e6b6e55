//! Integration tests for WorkerPool
//!
//! These tests validate:
//! - Async executors running on per-worker runtimes
//! - Result forwarding through the builder
//! - Observer events across the worker lifecycle
//! - Failure policies
//! - Admission-controlled submission
//! - Concurrent producers

use async_trait::async_trait;
use dispatch_lot::builders::{build_pool, PoolBuilder};
use dispatch_lot::config::{DispatchConfig, FailurePolicy, WorkerPoolConfig};
use dispatch_lot::core::{
    Admission, DispatchError, DispatchEvent, DispatchObserver, FanOut, OverflowPolicy, PoolState,
    SignalChannel, TaskMeta, WorkerExecutor,
};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

// ============================================================================
// TEST EXECUTORS
// ============================================================================

/// Simple executor that adds two numbers
#[derive(Clone)]
struct AddExecutor;

#[async_trait]
impl WorkerExecutor<(i32, i32), i32> for AddExecutor {
    async fn execute(&self, payload: (i32, i32), _meta: TaskMeta) -> i32 {
        tokio::time::sleep(Duration::from_millis(2)).await;
        payload.0 + payload.1
    }
}

/// Executor that tracks concurrency and which workers ran
#[derive(Clone)]
struct CountingExecutor {
    concurrent: Arc<AtomicU64>,
    max_concurrent: Arc<AtomicU64>,
    workers_seen: Arc<Mutex<HashSet<usize>>>,
}

impl CountingExecutor {
    fn new() -> Self {
        Self {
            concurrent: Arc::new(AtomicU64::new(0)),
            max_concurrent: Arc::new(AtomicU64::new(0)),
            workers_seen: Arc::new(Mutex::new(HashSet::new())),
        }
    }
}

#[async_trait]
impl WorkerExecutor<u64, u64> for CountingExecutor {
    async fn execute(&self, payload: u64, meta: TaskMeta) -> u64 {
        let now = self.concurrent.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent.fetch_max(now, Ordering::SeqCst);
        self.workers_seen.lock().insert(meta.worker_id);
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.concurrent.fetch_sub(1, Ordering::SeqCst);
        payload
    }
}

/// Executor that panics on odd payloads
#[derive(Clone)]
struct OddPanics;

#[async_trait]
impl WorkerExecutor<u32, u32> for OddPanics {
    async fn execute(&self, payload: u32, _meta: TaskMeta) -> u32 {
        if payload % 2 == 1 {
            panic!("odd payload {payload}");
        }
        payload
    }
}

/// Observer collecting every event
#[derive(Default)]
struct Collector {
    events: Mutex<Vec<DispatchEvent>>,
}

impl DispatchObserver for Collector {
    fn on_event(&self, event: &DispatchEvent) {
        self.events.lock().push(event.clone());
    }
}

// ============================================================================
// BASIC EXECUTION
// ============================================================================

#[test]
fn test_async_executor_results_forwarded() {
    let results = SignalChannel::unbounded();
    let pool = PoolBuilder::new(AddExecutor)
        .config(WorkerPoolConfig::new().with_worker_count(2).with_queue_capacity(8))
        .results(results.clone())
        .build()
        .unwrap();

    for i in 0..10 {
        pool.submit((i, i)).unwrap();
    }
    pool.shutdown().unwrap();
    results.close().unwrap();

    let mut sums: Vec<i32> = results.iter().collect();
    sums.sort_unstable();
    assert_eq!(sums, (0..10).map(|i| i * 2).collect::<Vec<_>>());
}

#[test]
fn test_concurrency_bounded_by_worker_count() {
    let executor = CountingExecutor::new();
    let pool = PoolBuilder::new(executor.clone())
        .config(WorkerPoolConfig::new().with_worker_count(3))
        .results(SignalChannel::unbounded())
        .build()
        .unwrap();

    for i in 0..30 {
        pool.submit(i).unwrap();
    }
    pool.shutdown().unwrap();

    assert!(executor.max_concurrent.load(Ordering::SeqCst) <= 3);
    assert!(executor.workers_seen.lock().iter().all(|id| *id < 3));
    assert_eq!(pool.stats().completed, 30);
}

#[test]
fn test_build_pool_from_config() {
    let cfg = DispatchConfig {
        pool: WorkerPoolConfig::new().with_worker_count(2).with_queue_capacity(2),
        ..DispatchConfig::default()
    };
    let pool = build_pool(&cfg, AddExecutor).unwrap();
    assert_eq!(pool.config().worker_count, 2);
    assert_eq!(pool.input().capacity(), Some(2));
    pool.submit((1, 2)).unwrap();
    pool.shutdown().unwrap();
    assert_eq!(pool.stats().completed, 1);
}

// ============================================================================
// OBSERVER
// ============================================================================

#[test]
fn test_observer_sees_worker_lifecycle() {
    let collector = Arc::new(Collector::default());
    let pool = PoolBuilder::new(AddExecutor)
        .config(WorkerPoolConfig::new().with_worker_count(2))
        .observer(collector.clone())
        .build()
        .unwrap();

    pool.submit((1, 1)).unwrap();
    pool.submit((2, 2)).unwrap();
    pool.shutdown().unwrap();

    let events = collector.events.lock();
    let count = |pred: fn(&DispatchEvent) -> bool| events.iter().filter(|e| pred(e)).count();
    assert_eq!(count(|e| matches!(e, DispatchEvent::WorkerStarted { .. })), 2);
    assert_eq!(count(|e| matches!(e, DispatchEvent::WorkerStopped { .. })), 2);
    assert_eq!(count(|e| matches!(e, DispatchEvent::TaskCompleted { .. })), 2);
}

/// Observer that panics whenever a task completes
struct PanickyObserver;

impl DispatchObserver for PanickyObserver {
    fn on_event(&self, event: &DispatchEvent) {
        if matches!(event, DispatchEvent::TaskCompleted { .. }) {
            panic!("observer failure");
        }
    }
}

#[test]
fn test_panicking_observer_does_not_stall_pool() {
    let results = SignalChannel::unbounded();
    let pool = PoolBuilder::new(AddExecutor)
        .config(WorkerPoolConfig::new().with_worker_count(1))
        .results(results.clone())
        .observer(Arc::new(PanickyObserver))
        .build()
        .unwrap();

    pool.submit((1, 1)).unwrap();
    pool.submit((2, 2)).unwrap();
    pool.shutdown().unwrap();
    results.close().unwrap();

    assert_eq!(results.iter().collect::<Vec<_>>(), vec![2, 4]);
}

#[test]
fn test_panicking_observer_does_not_stall_fan_out() {
    let mut out = FanOut::default()
        .with_observer(Arc::new(PanickyObserver))
        .run(0..2, |x: u32| x)
        .unwrap();
    out.sort_unstable();
    assert_eq!(out, vec![0, 1]);
}

// ============================================================================
// FAILURE POLICIES
// ============================================================================

#[test]
fn test_isolate_policy_processes_remaining_items() {
    let results = SignalChannel::unbounded();
    let pool = PoolBuilder::new(OddPanics)
        .config(WorkerPoolConfig::new().with_worker_count(2).with_queue_capacity(16))
        .results(results.clone())
        .build()
        .unwrap();

    for n in 0..10 {
        pool.submit(n).unwrap();
    }
    pool.shutdown().unwrap();
    results.close().unwrap();

    let mut evens: Vec<u32> = results.iter().collect();
    evens.sort_unstable();
    assert_eq!(evens, vec![0, 2, 4, 6, 8]);
    let stats = pool.stats();
    assert_eq!(stats.failed, 5);
    assert_eq!(stats.completed, 5);
}

#[test]
fn test_fatal_policy_reports_failure_on_shutdown() {
    let pool = PoolBuilder::new(OddPanics)
        .config(
            WorkerPoolConfig::new()
                .with_worker_count(2)
                .with_queue_capacity(16)
                .with_failure_policy(FailurePolicy::Fatal),
        )
        .results(SignalChannel::unbounded())
        .build()
        .unwrap();

    for n in 0..10 {
        pool.submit(n).unwrap();
    }

    match pool.shutdown() {
        Err(DispatchError::ExecutorFailure { message, .. }) => {
            assert!(message.starts_with("odd payload"));
        }
        other => panic!("expected executor failure, got {other:?}"),
    }
    let stats = pool.stats();
    assert_eq!(stats.alive_workers, 0);
    assert_eq!(stats.completed + stats.failed + stats.discarded, 10);
}

// ============================================================================
// SUBMISSION
// ============================================================================

#[test]
fn test_try_submit_on_closed_pool_fails() {
    let pool = PoolBuilder::new(AddExecutor)
        .config(WorkerPoolConfig::new().with_worker_count(1).with_queue_capacity(1))
        .build()
        .unwrap();
    pool.close().unwrap();
    assert_eq!(pool.try_submit((0, 0)), Err(DispatchError::SendOnClosedChannel));
    pool.shutdown().unwrap();
}

#[test]
fn test_try_submit_accepts_with_room() {
    let pool = PoolBuilder::new(AddExecutor)
        .config(WorkerPoolConfig::new().with_worker_count(1).with_queue_capacity(4))
        .build()
        .unwrap();
    assert_eq!(pool.try_submit((1, 1)).unwrap(), Admission::Accepted);
    pool.shutdown().unwrap();
    assert_eq!(pool.stats().submitted, 1);
}

#[test]
fn test_builder_block_overflow_waits_for_room() {
    let pool = PoolBuilder::new(AddExecutor)
        .config(WorkerPoolConfig::new().with_worker_count(1).with_queue_capacity(1))
        .overflow(OverflowPolicy::Block)
        .build()
        .unwrap();

    for i in 0..5 {
        assert_eq!(pool.try_submit((i, i)).unwrap(), Admission::Accepted);
    }
    pool.shutdown().unwrap();
    let stats = pool.stats();
    assert_eq!(stats.submitted, 5);
    assert_eq!(stats.dropped, 0);
    assert_eq!(stats.completed, 5);
}

#[test]
fn test_concurrent_producers() {
    let executor = CountingExecutor::new();
    let results = SignalChannel::unbounded();
    let pool = Arc::new(
        PoolBuilder::new(executor)
            .config(WorkerPoolConfig::new().with_worker_count(4).with_queue_capacity(4))
            .results(results.clone())
            .build()
            .unwrap(),
    );

    let producers: Vec<_> = (0..4_u64)
        .map(|p| {
            let pool = Arc::clone(&pool);
            thread::spawn(move || {
                for i in 0..25 {
                    pool.submit(p * 100 + i).unwrap();
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }

    pool.close().unwrap();
    assert_eq!(pool.state(), PoolState::Draining);
    pool.shutdown().unwrap();
    results.close().unwrap();

    assert_eq!(results.iter().count(), 100);
    assert_eq!(pool.stats().submitted, 100);
}
