//! Observer hooks for dispatch events.
//!
//! Pools and dispatchers never print. They report lifecycle events to an
//! injected [`DispatchObserver`]; [`TracingObserver`] forwards them to
//! `tracing`, [`NoopObserver`] discards them.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::error::panic_message;

/// Something that happened inside a pool or dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchEvent {
    /// A worker thread entered its receive loop.
    WorkerStarted {
        /// Worker index within its pool.
        worker_id: usize,
    },
    /// A worker observed the closed channel and returned.
    WorkerStopped {
        /// Worker index within its pool.
        worker_id: usize,
    },
    /// A worker took an item off the channel.
    TaskReceived {
        /// Worker index (fan-out executor index for fan-out).
        worker_id: usize,
        /// Sequence number assigned on receipt.
        task_id: u64,
    },
    /// A work body returned.
    TaskCompleted {
        /// Worker index (fan-out executor index for fan-out).
        worker_id: usize,
        /// Sequence number assigned on receipt.
        task_id: u64,
    },
    /// A work body panicked.
    TaskFailed {
        /// Worker index (fan-out executor index for fan-out).
        worker_id: usize,
        /// Sequence number assigned on receipt.
        task_id: u64,
        /// Panic message.
        message: String,
    },
    /// An item was drained unprocessed from a poisoned pool.
    TaskDiscarded {
        /// Worker index within its pool.
        worker_id: usize,
    },
    /// Admission control shed an item.
    ItemDropped,
    /// Admission control sent an item to the overflow channel.
    ItemRedirected,
}

/// Receives dispatch events. Called synchronously on the executor thread.
pub trait DispatchObserver: Send + Sync {
    /// Called for every emitted event.
    fn on_event(&self, event: &DispatchEvent);
}

/// Shared observer handle.
pub type SharedObserver = Arc<dyn DispatchObserver>;

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl DispatchObserver for NoopObserver {
    fn on_event(&self, _event: &DispatchEvent) {}
}

/// Logs every event through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl DispatchObserver for TracingObserver {
    fn on_event(&self, event: &DispatchEvent) {
        match event {
            DispatchEvent::WorkerStarted { worker_id } => {
                debug!(worker_id, "worker started");
            }
            DispatchEvent::WorkerStopped { worker_id } => {
                debug!(worker_id, "worker received shutdown signal");
            }
            DispatchEvent::TaskReceived { worker_id, task_id } => {
                debug!(worker_id, task_id, "worker received task");
            }
            DispatchEvent::TaskCompleted { worker_id, task_id } => {
                debug!(worker_id, task_id, "worker completed task");
            }
            DispatchEvent::TaskFailed {
                worker_id,
                task_id,
                message,
            } => {
                warn!(worker_id, task_id, error = %message, "task failed");
            }
            DispatchEvent::TaskDiscarded { worker_id } => {
                warn!(worker_id, "task discarded by poisoned pool");
            }
            DispatchEvent::ItemDropped => info!("item dropped at admission"),
            DispatchEvent::ItemRedirected => debug!("item redirected to overflow"),
        }
    }
}

/// Default observer used when none is configured.
pub(crate) fn noop() -> SharedObserver {
    Arc::new(NoopObserver)
}

/// Deliver `event` to `observer`. A panicking observer is logged and the
/// event is lost; the calling executor carries on.
pub(crate) fn notify(observer: &SharedObserver, event: &DispatchEvent) {
    if let Err(panic) = catch_unwind(AssertUnwindSafe(|| observer.on_event(event))) {
        warn!(?event, error = %panic_message(panic.as_ref()), "Observer panicked, event dropped");
    }
}
