//! Builders to construct worker pools and dispatchers from configuration.

use crate::config::{DispatchConfig, WorkerPoolConfig};
use crate::core::observer::{self, SharedObserver};
use crate::core::{DispatchError, FanOut, OverflowPolicy, SignalChannel, WorkerExecutor, WorkerPool};

/// Step-by-step construction of a [`WorkerPool`].
///
/// ```rust
/// use dispatch_lot::builders::PoolBuilder;
/// use dispatch_lot::config::WorkerPoolConfig;
/// use dispatch_lot::core::{FnExecutor, SignalChannel, TaskMeta};
///
/// let results = SignalChannel::unbounded();
/// let pool = PoolBuilder::new(FnExecutor::new(|n: u32, _: TaskMeta| n + 1))
///     .config(WorkerPoolConfig::new().with_worker_count(2))
///     .results(results.clone())
///     .build()
///     .unwrap();
///
/// pool.submit(41).unwrap();
/// pool.shutdown().unwrap();
/// assert_eq!(results.receive(), Some(42));
/// ```
pub struct PoolBuilder<P, R, E> {
    executor: E,
    config: WorkerPoolConfig,
    channel: Option<SignalChannel<P>>,
    results: Option<SignalChannel<R>>,
    observer: SharedObserver,
    overflow: OverflowPolicy<P>,
}

impl<P, R, E> PoolBuilder<P, R, E>
where
    P: Send + 'static,
    R: Send + 'static,
    E: WorkerExecutor<P, R>,
{
    /// Start from default configuration.
    pub fn new(executor: E) -> Self {
        Self {
            executor,
            config: WorkerPoolConfig::new(),
            channel: None,
            results: None,
            observer: observer::noop(),
            overflow: OverflowPolicy::Drop,
        }
    }

    /// Use `config` instead of the defaults.
    #[must_use]
    pub fn config(mut self, config: WorkerPoolConfig) -> Self {
        self.config = config;
        self
    }

    /// Drain `channel` instead of creating one of `queue_capacity`.
    #[must_use]
    pub fn channel(mut self, channel: SignalChannel<P>) -> Self {
        self.channel = Some(channel);
        self
    }

    /// Forward every result into `results`.
    ///
    /// Workers block on a full result channel, so it must be drained (or
    /// unbounded) for `shutdown` to return.
    #[must_use]
    pub fn results(mut self, results: SignalChannel<R>) -> Self {
        self.results = Some(results);
        self
    }

    /// Report worker events to `observer`.
    #[must_use]
    pub fn observer(mut self, observer: SharedObserver) -> Self {
        self.observer = observer;
        self
    }

    /// Policy `try_submit` applies when the input channel is saturated.
    #[must_use]
    pub fn overflow(mut self, policy: OverflowPolicy<P>) -> Self {
        self.overflow = policy;
        self
    }

    /// Spawn the pool.
    ///
    /// # Errors
    ///
    /// See [`WorkerPool::new`].
    pub fn build(self) -> Result<WorkerPool<P>, DispatchError> {
        let input = self
            .channel
            .unwrap_or_else(|| SignalChannel::bounded(self.config.queue_capacity));
        WorkerPool::start(self.config, input, self.executor, self.results, self.observer)
            .map(|pool| pool.with_overflow(self.overflow))
    }
}

/// Build a worker pool from the `pool` section of dispatch configuration.
///
/// # Errors
///
/// Returns `DispatchError::InvalidConfig` if the configuration is invalid, or
/// any error from [`PoolBuilder::build`].
pub fn build_pool<P, R, E>(cfg: &DispatchConfig, executor: E) -> Result<WorkerPool<P>, DispatchError>
where
    P: Send + 'static,
    R: Send + 'static,
    E: WorkerExecutor<P, R>,
{
    cfg.validate()
        .map_err(|e| DispatchError::InvalidConfig(format!("config invalid: {e}")))?;
    PoolBuilder::new(executor).config(cfg.pool.clone()).build()
}

/// Build a fan-out dispatcher from the `fan_out` section of dispatch configuration.
///
/// # Errors
///
/// Returns `DispatchError::InvalidConfig` if the configuration is invalid.
pub fn build_fan_out(cfg: &DispatchConfig) -> Result<FanOut, DispatchError> {
    cfg.validate()
        .map_err(|e| DispatchError::InvalidConfig(format!("config invalid: {e}")))?;
    FanOut::new(cfg.fan_out.clone())
}
