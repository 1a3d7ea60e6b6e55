//! Fixed-size worker pool draining a shared [`SignalChannel`].
//!
//! The pool spawns `worker_count` dedicated OS threads. Each owns a
//! single-threaded tokio runtime and loops `receive -> execute -> emit` until
//! the input channel is closed and drained, then returns.
//!
//! # Lifecycle
//!
//! ```text
//! Created ──spawn──► Running ──close()──► Draining ──all workers returned──► Stopped
//! ```
//!
//! - **No polling**: workers block on channel receive.
//! - **Drain on close**: items buffered before `close()` are still processed.
//! - **Joined shutdown**: `shutdown()` returns only after every worker exited.
//!
//! # Failure handling
//!
//! Work bodies and observer callbacks run under `catch_unwind`. With [`FailurePolicy::Isolate`] a
//! panic is counted and reported, the worker rebuilds its runtime and moves
//! on. With [`FailurePolicy::Fatal`] the first panic poisons the pool: workers
//! keep draining so producers never block forever, but discard what they
//! receive, and `shutdown()` returns the failure.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use dispatch_lot::config::WorkerPoolConfig;
//! use dispatch_lot::core::{FnExecutor, TaskMeta, WorkerPool};
//!
//! let processed = Arc::new(AtomicUsize::new(0));
//! let counter = Arc::clone(&processed);
//! let pool = WorkerPool::new(
//!     WorkerPoolConfig::new().with_worker_count(4),
//!     FnExecutor::new(move |_item: &'static str, _meta: TaskMeta| {
//!         counter.fetch_add(1, Ordering::SeqCst);
//!     }),
//! )
//! .unwrap();
//!
//! for _ in 0..100 {
//!     pool.submit("paper").unwrap();
//! }
//! pool.close().unwrap();
//! pool.shutdown().unwrap();
//! assert_eq!(processed.load(Ordering::SeqCst), 100);
//! ```

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use tokio::runtime::Runtime;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::{FailurePolicy, WorkerPoolConfig};

use super::admission::{Admission, OverflowPolicy};
use super::channel::SignalChannel;
use super::error::{panic_message, DispatchError};
use super::executor::{TaskMeta, WorkerExecutor};
use super::observer::{self, DispatchEvent, SharedObserver};

/// Lifecycle state of a [`WorkerPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    /// Configured, workers not yet spawned.
    Created,
    /// Workers are receiving from an open channel.
    Running,
    /// The input channel is closed; workers are finishing buffered items.
    Draining,
    /// Every worker has returned.
    Stopped,
}

const CREATED: u8 = 0;
const RUNNING: u8 = 1;
const STOPPED: u8 = 2;

/// Statistics about pool utilization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Configured number of workers.
    pub worker_count: usize,
    /// Workers that have not yet returned.
    pub alive_workers: usize,
    /// Items accepted through `submit`/`try_submit`.
    pub submitted: u64,
    /// Work bodies that returned.
    pub completed: u64,
    /// Work bodies that panicked.
    pub failed: u64,
    /// Items drained unprocessed after the pool was poisoned.
    pub discarded: u64,
    /// Items `try_submit` sent to the overflow channel.
    pub redirected: u64,
    /// Items shed by `try_submit`.
    pub dropped: u64,
}

/// Internal counters for pool statistics (lock-free atomics).
#[derive(Debug, Default)]
pub(crate) struct PoolCounters {
    pub alive_workers: AtomicUsize,
    pub next_task_id: AtomicU64,
    pub submitted: AtomicU64,
    pub completed: AtomicU64,
    pub failed: AtomicU64,
    pub discarded: AtomicU64,
    pub redirected: AtomicU64,
    pub dropped: AtomicU64,
}

impl PoolCounters {
    /// Get a snapshot of current statistics.
    pub fn snapshot(&self, worker_count: usize) -> PoolStats {
        PoolStats {
            worker_count,
            alive_workers: self.alive_workers.load(Ordering::Acquire),
            submitted: self.submitted.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            redirected: self.redirected.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Everything a worker thread shares with its pool.
struct WorkerShared<P, R> {
    pool_id: Uuid,
    input: SignalChannel<P>,
    results: Option<SignalChannel<R>>,
    counters: Arc<PoolCounters>,
    poisoned: Arc<Mutex<Option<DispatchError>>>,
    policy: FailurePolicy,
    observer: SharedObserver,
}

impl<P, R> Clone for WorkerShared<P, R> {
    fn clone(&self) -> Self {
        Self {
            pool_id: self.pool_id,
            input: self.input.clone(),
            results: self.results.clone(),
            counters: Arc::clone(&self.counters),
            poisoned: Arc::clone(&self.poisoned),
            policy: self.policy,
            observer: Arc::clone(&self.observer),
        }
    }
}

/// Decrements the alive count however the worker thread exits.
struct AliveGuard(Arc<PoolCounters>);

impl Drop for AliveGuard {
    fn drop(&mut self) {
        self.0.alive_workers.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Fixed-size pool of long-lived worker threads.
pub struct WorkerPool<P: Send + 'static> {
    pool_id: Uuid,
    config: WorkerPoolConfig,
    input: SignalChannel<P>,
    counters: Arc<PoolCounters>,
    poisoned: Arc<Mutex<Option<DispatchError>>>,
    state: AtomicU8,
    workers: Mutex<Vec<JoinHandle<()>>>,
    observer: SharedObserver,
    overflow: OverflowPolicy<P>,
}

impl<P: Send + 'static> WorkerPool<P> {
    /// Create a pool with its own input channel of `config.queue_capacity`.
    ///
    /// # Errors
    ///
    /// - `DispatchError::InvalidConfig` if the configuration is invalid
    /// - `DispatchError::Spawn` if a worker thread or runtime could not be created
    pub fn new<R, E>(config: WorkerPoolConfig, executor: E) -> Result<Self, DispatchError>
    where
        R: Send + 'static,
        E: WorkerExecutor<P, R>,
    {
        let input = SignalChannel::bounded(config.queue_capacity);
        Self::start(config, input, executor, None, observer::noop())
    }

    /// Create a pool draining a caller-supplied channel.
    ///
    /// The caller may keep sending on (and must eventually close) its own
    /// handle to `channel`.
    ///
    /// # Errors
    ///
    /// Same as [`WorkerPool::new`].
    pub fn with_channel<R, E>(
        config: WorkerPoolConfig,
        channel: SignalChannel<P>,
        executor: E,
    ) -> Result<Self, DispatchError>
    where
        R: Send + 'static,
        E: WorkerExecutor<P, R>,
    {
        Self::start(config, channel, executor, None, observer::noop())
    }

    /// Spawn all workers. Used by the constructors and `PoolBuilder`.
    pub(crate) fn start<R, E>(
        config: WorkerPoolConfig,
        input: SignalChannel<P>,
        executor: E,
        results: Option<SignalChannel<R>>,
        observer: SharedObserver,
    ) -> Result<Self, DispatchError>
    where
        R: Send + 'static,
        E: WorkerExecutor<P, R>,
    {
        config.validate().map_err(DispatchError::InvalidConfig)?;

        let pool = Self {
            pool_id: Uuid::new_v4(),
            config,
            input,
            counters: Arc::new(PoolCounters::default()),
            poisoned: Arc::new(Mutex::new(None)),
            state: AtomicU8::new(CREATED),
            workers: Mutex::new(Vec::new()),
            observer,
            overflow: OverflowPolicy::Drop,
        };

        let shared = WorkerShared {
            pool_id: pool.pool_id,
            input: pool.input.clone(),
            results,
            counters: Arc::clone(&pool.counters),
            poisoned: Arc::clone(&pool.poisoned),
            policy: pool.config.failure_policy,
            observer: Arc::clone(&pool.observer),
        };

        // Workers wait on the gate until every thread exists. Closing it empty
        // makes them exit without receiving input.
        let gate = SignalChannel::<()>::unbounded();
        for worker_id in 0..pool.config.worker_count {
            let spawned = build_runtime().and_then(|rt| {
                spawn_worker(
                    worker_id,
                    shared.clone(),
                    executor.clone(),
                    gate.clone(),
                    rt,
                    pool.config.thread_stack_size,
                )
            });
            match spawned {
                Ok(handle) => pool.workers.lock().push(handle),
                Err(e) => {
                    error!(pool_id = %pool.pool_id, worker_id, error = %e, "Failed to start worker");
                    let _ = gate.close();
                    let _ = pool.join_workers();
                    pool.state.store(STOPPED, Ordering::Release);
                    return Err(e);
                }
            }
        }
        for _ in 0..pool.config.worker_count {
            gate.send(())?;
        }
        gate.close()?;

        pool.state.store(RUNNING, Ordering::Release);
        info!(
            pool_id = %pool.pool_id,
            worker_count = pool.config.worker_count,
            queue_capacity = ?pool.input.capacity(),
            failure_policy = ?pool.config.failure_policy,
            "WorkerPool initialized with dedicated OS threads"
        );
        Ok(pool)
    }

    /// Submit an item, blocking until the channel accepts it.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::SendOnClosedChannel` after `close()`.
    pub fn submit(&self, item: P) -> Result<(), DispatchError> {
        self.input.send(item)?;
        self.counters.submitted.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Replace the policy `try_submit` applies when the input is saturated.
    /// The default is [`OverflowPolicy::Drop`].
    #[must_use]
    pub fn with_overflow(mut self, policy: OverflowPolicy<P>) -> Self {
        self.overflow = policy;
        self
    }

    /// Submit under the pool's [`OverflowPolicy`]. Only `Block` may block.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::SendOnClosedChannel` after `close()`, or when
    /// redirecting to a closed overflow channel.
    pub fn try_submit(&self, item: P) -> Result<Admission, DispatchError> {
        let admission = self.overflow.admit(&self.input, item, &self.observer)?;
        let counter = match admission {
            Admission::Accepted => &self.counters.submitted,
            Admission::Redirected => &self.counters.redirected,
            Admission::Dropped => &self.counters.dropped,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        if admission != Admission::Accepted {
            debug!(pool_id = %self.pool_id, ?admission, "Worker pool input saturated");
        }
        Ok(admission)
    }

    /// Policy applied by `try_submit`.
    #[must_use]
    pub const fn overflow_policy(&self) -> &OverflowPolicy<P> {
        &self.overflow
    }

    /// Signal that no more work will be submitted.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::AlreadyClosed` if the input channel was already closed.
    pub fn close(&self) -> Result<(), DispatchError> {
        self.input.close()?;
        info!(pool_id = %self.pool_id, "Worker pool input closed, draining");
        Ok(())
    }

    /// Close the input (if still open) and block until every worker returned.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::ExecutorFailure` if the pool was poisoned under
    /// [`FailurePolicy::Fatal`] or a worker thread died outside its work body.
    pub fn shutdown(&self) -> Result<(), DispatchError> {
        if !self.input.is_closed() {
            // Losing a race with another closer is fine.
            let _ = self.input.close();
        }

        let lost = self.join_workers();
        self.state.store(STOPPED, Ordering::Release);
        info!(pool_id = %self.pool_id, "Worker pool shut down complete");

        match self.poisoned.lock().clone().or(lost) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Join every spawned worker, returning the first that died outside its work body.
    fn join_workers(&self) -> Option<DispatchError> {
        let workers: Vec<_> = self.workers.lock().drain(..).collect();
        let mut lost = None;
        for handle in workers {
            let name = handle.thread().name().unwrap_or("dispatch-worker").to_string();
            if let Err(payload) = handle.join() {
                let message = panic_message(payload.as_ref());
                warn!(pool_id = %self.pool_id, worker = %name, error = %message, "Worker thread panicked");
                lost.get_or_insert(DispatchError::ExecutorFailure {
                    executor: name,
                    message,
                });
            }
        }
        lost
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> PoolState {
        match self.state.load(Ordering::Acquire) {
            CREATED => PoolState::Created,
            STOPPED => PoolState::Stopped,
            _ if self.input.is_closed() => PoolState::Draining,
            _ => PoolState::Running,
        }
    }

    /// Current pool statistics.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.counters.snapshot(self.config.worker_count)
    }

    /// Identifier used in this pool's log records.
    #[must_use]
    pub const fn pool_id(&self) -> Uuid {
        self.pool_id
    }

    /// The channel workers drain.
    #[must_use]
    pub const fn input(&self) -> &SignalChannel<P> {
        &self.input
    }

    /// The configuration the pool was started with.
    #[must_use]
    pub const fn config(&self) -> &WorkerPoolConfig {
        &self.config
    }
}

impl<P: Send + 'static> Drop for WorkerPool<P> {
    fn drop(&mut self) {
        // Close but don't join: explicit shutdown() is required for a joined exit.
        if self.state.load(Ordering::Acquire) != STOPPED && !self.input.is_closed() {
            let _ = self.input.close();
            debug!(pool_id = %self.pool_id, "WorkerPool dropped without shutdown - workers will be detached");
        }
    }
}

fn build_runtime() -> Result<Runtime, DispatchError> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| DispatchError::Spawn(format!("worker runtime: {e}")))
}

/// Spawn a worker thread.
fn spawn_worker<P, R, E>(
    worker_id: usize,
    shared: WorkerShared<P, R>,
    executor: E,
    gate: SignalChannel<()>,
    rt: Runtime,
    stack_size: usize,
) -> Result<JoinHandle<()>, DispatchError>
where
    P: Send + 'static,
    R: Send + 'static,
    E: WorkerExecutor<P, R>,
{
    let counters = Arc::clone(&shared.counters);
    counters.alive_workers.fetch_add(1, Ordering::AcqRel);
    let spawned = thread::Builder::new()
        .name(format!("dispatch-worker-{worker_id}"))
        .stack_size(stack_size)
        .spawn(move || {
            let _alive = AliveGuard(Arc::clone(&shared.counters));
            if gate.receive().is_none() {
                debug!(pool_id = %shared.pool_id, worker_id, "Pool start aborted, worker exiting");
                return;
            }
            run_worker(worker_id, &shared, &executor, rt);
        });
    spawned.map_err(|e| {
        counters.alive_workers.fetch_sub(1, Ordering::AcqRel);
        DispatchError::Spawn(e.to_string())
    })
}

/// Worker loop: blocking receive, no polling. Returns once the channel is
/// closed and drained.
fn run_worker<P, R, E>(worker_id: usize, shared: &WorkerShared<P, R>, executor: &E, mut rt: Runtime)
where
    P: Send + 'static,
    R: Send + 'static,
    E: WorkerExecutor<P, R>,
{
    debug!(pool_id = %shared.pool_id, worker_id, "Worker thread started");
    observer::notify(&shared.observer, &DispatchEvent::WorkerStarted { worker_id });

    while let Some(payload) = shared.input.receive() {
        if shared.poisoned.lock().is_some() {
            shared.counters.discarded.fetch_add(1, Ordering::Relaxed);
            observer::notify(&shared.observer, &DispatchEvent::TaskDiscarded { worker_id });
            continue;
        }

        let task_id = shared.counters.next_task_id.fetch_add(1, Ordering::Relaxed);
        let meta = TaskMeta { task_id, worker_id };
        observer::notify(&shared.observer, &DispatchEvent::TaskReceived { worker_id, task_id });

        let outcome = catch_unwind(AssertUnwindSafe(|| rt.block_on(executor.execute(payload, meta))));
        match outcome {
            Ok(result) => {
                shared.counters.completed.fetch_add(1, Ordering::Relaxed);
                observer::notify(&shared.observer, &DispatchEvent::TaskCompleted { worker_id, task_id });
                if let Some(results) = &shared.results {
                    if results.send(result).is_err() {
                        warn!(pool_id = %shared.pool_id, worker_id, task_id, "Result channel closed, result dropped");
                    }
                }
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                shared.counters.failed.fetch_add(1, Ordering::Relaxed);
                error!(pool_id = %shared.pool_id, worker_id, task_id, error = %message, "Work body panicked");
                observer::notify(&shared.observer, &DispatchEvent::TaskFailed {
                    worker_id,
                    task_id,
                    message: message.clone(),
                });
                match shared.policy {
                    FailurePolicy::Isolate => match build_runtime() {
                        Ok(fresh) => rt = fresh,
                        Err(e) => {
                            warn!(pool_id = %shared.pool_id, worker_id, error = %e, "Keeping previous runtime");
                        }
                    },
                    FailurePolicy::Fatal => {
                        shared.poisoned.lock().get_or_insert(DispatchError::ExecutorFailure {
                            executor: format!("dispatch-worker-{worker_id}"),
                            message,
                        });
                    }
                }
            }
        }
    }

    observer::notify(&shared.observer, &DispatchEvent::WorkerStopped { worker_id });
    debug!(pool_id = %shared.pool_id, worker_id, "Worker channel closed, exiting");
}
