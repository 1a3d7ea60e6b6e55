//! Work-body abstraction for pool workers.

use async_trait::async_trait;

/// Identifiers handed to a work body alongside its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskMeta {
    /// Pool-wide sequence number, assigned when a worker receives the item.
    pub task_id: u64,
    /// Index of the worker executing the item.
    pub worker_id: usize,
}

/// Executor trait for worker pools.
///
/// Payloads and results only need to be `Send`; results may be channels,
/// handles or anything else that crosses threads.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use dispatch_lot::core::{TaskMeta, WorkerExecutor};
///
/// #[derive(Clone)]
/// struct Shout;
///
/// #[async_trait]
/// impl WorkerExecutor<String, String> for Shout {
///     async fn execute(&self, payload: String, _meta: TaskMeta) -> String {
///         payload.to_uppercase()
///     }
/// }
/// ```
///
/// # Threading
///
/// Each pool worker is a dedicated OS thread driving its own single-threaded
/// tokio runtime, so `execute` may await timers and channels without touching
/// the caller's runtime.
#[async_trait]
pub trait WorkerExecutor<P, R>: Send + Sync + Clone + 'static
where
    P: Send + 'static,
    R: Send + 'static,
{
    /// Process one payload and produce its result.
    async fn execute(&self, payload: P, meta: TaskMeta) -> R;
}

/// Adapts a plain closure into a [`WorkerExecutor`].
#[derive(Clone)]
pub struct FnExecutor<F> {
    work: F,
}

impl<F> FnExecutor<F> {
    /// Wrap `work`.
    pub const fn new(work: F) -> Self {
        Self { work }
    }
}

#[async_trait]
impl<P, R, F> WorkerExecutor<P, R> for FnExecutor<F>
where
    P: Send + 'static,
    R: Send + 'static,
    F: Fn(P, TaskMeta) -> R + Send + Sync + Clone + 'static,
{
    async fn execute(&self, payload: P, meta: TaskMeta) -> R {
        (self.work)(payload, meta)
    }
}
