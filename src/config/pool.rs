//! Worker pool and fan-out configuration structures.

use std::env;

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};

use crate::core::AppResult;

/// Default stack size for executor threads (256 KiB).
pub const DEFAULT_STACK_SIZE: usize = 256 * 1024;

/// What a pool does when a work body panics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Count the failure, rebuild the worker's runtime and keep going.
    #[default]
    Isolate,
    /// Poison the pool: remaining items are drained unprocessed and
    /// `shutdown` reports the failure.
    Fatal,
}

impl std::str::FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "isolate" => Ok(Self::Isolate),
            "fatal" => Ok(Self::Fatal),
            other => Err(format!("unknown failure policy `{other}`")),
        }
    }
}

fn host_parallelism() -> usize {
    num_cpus::get().max(1)
}

const fn default_stack_size() -> usize {
    DEFAULT_STACK_SIZE
}

/// Worker pool configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerPoolConfig {
    /// Number of long-lived worker threads.
    #[serde(default = "host_parallelism")]
    pub worker_count: usize,
    /// Capacity of the input channel the pool creates (0 = rendezvous).
    #[serde(default)]
    pub queue_capacity: usize,
    /// Stack size for worker threads.
    #[serde(default = "default_stack_size")]
    pub thread_stack_size: usize,
    /// Behavior when a work body panics.
    #[serde(default)]
    pub failure_policy: FailurePolicy,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerPoolConfig {
    /// One worker per available processing unit, rendezvous input channel.
    #[must_use]
    pub fn new() -> Self {
        Self {
            worker_count: host_parallelism(),
            queue_capacity: 0,
            thread_stack_size: DEFAULT_STACK_SIZE,
            failure_policy: FailurePolicy::Isolate,
        }
    }

    /// Override the worker count.
    #[must_use]
    pub const fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    /// Override the input channel capacity.
    #[must_use]
    pub const fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    /// Override the worker thread stack size.
    #[must_use]
    pub const fn with_thread_stack_size(mut self, thread_stack_size: usize) -> Self {
        self.thread_stack_size = thread_stack_size;
        self
    }

    /// Override the failure policy.
    #[must_use]
    pub const fn with_failure_policy(mut self, failure_policy: FailurePolicy) -> Self {
        self.failure_policy = failure_policy;
        self
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.worker_count == 0 {
            return Err("worker_count must be greater than 0".into());
        }
        if self.thread_stack_size == 0 {
            return Err("thread_stack_size must be greater than 0".into());
        }
        Ok(())
    }
}

/// Fan-out configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FanOutConfig {
    /// Permits used by bounded fan-out.
    #[serde(default = "host_parallelism")]
    pub permits: usize,
    /// Stack size for fan-out executor threads.
    #[serde(default = "default_stack_size")]
    pub thread_stack_size: usize,
}

impl Default for FanOutConfig {
    fn default() -> Self {
        Self {
            permits: host_parallelism(),
            thread_stack_size: DEFAULT_STACK_SIZE,
        }
    }
}

impl FanOutConfig {
    /// Override the permit count.
    #[must_use]
    pub const fn with_permits(mut self, permits: usize) -> Self {
        self.permits = permits;
        self
    }

    /// Override the executor thread stack size.
    #[must_use]
    pub const fn with_thread_stack_size(mut self, thread_stack_size: usize) -> Self {
        self.thread_stack_size = thread_stack_size;
        self
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.permits == 0 {
            return Err("permits must be greater than 0".into());
        }
        if self.thread_stack_size == 0 {
            return Err("thread_stack_size must be greater than 0".into());
        }
        Ok(())
    }
}

/// Root dispatch configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Worker pool settings.
    #[serde(default)]
    pub pool: WorkerPoolConfig,
    /// Fan-out settings.
    #[serde(default)]
    pub fan_out: FanOutConfig,
}

impl DispatchConfig {
    /// Validate every section.
    ///
    /// # Errors
    ///
    /// Returns a description naming the invalid section.
    pub fn validate(&self) -> Result<(), String> {
        self.pool.validate().map_err(|e| format!("pool invalid: {e}"))?;
        self.fan_out
            .validate()
            .map_err(|e| format!("fan_out invalid: {e}"))?;
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Returns a parse or validation message.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Build configuration from `DISPATCH_*` environment variables, loading a
    /// `.env` file first if present. Unset variables keep their defaults.
    ///
    /// # Errors
    ///
    /// Fails if a variable cannot be parsed or the result does not validate.
    pub fn from_env() -> AppResult<Self> {
        let _ = dotenvy::dotenv();
        let mut cfg = Self::default();

        if let Some(n) = env_var::<usize>("DISPATCH_WORKER_COUNT")? {
            cfg.pool.worker_count = n;
        }
        if let Some(n) = env_var::<usize>("DISPATCH_QUEUE_CAPACITY")? {
            cfg.pool.queue_capacity = n;
        }
        if let Some(n) = env_var::<usize>("DISPATCH_PERMITS")? {
            cfg.fan_out.permits = n;
        }
        if let Some(n) = env_var::<usize>("DISPATCH_STACK_SIZE")? {
            cfg.pool.thread_stack_size = n;
            cfg.fan_out.thread_stack_size = n;
        }
        if let Some(policy) = env::var("DISPATCH_FAILURE_POLICY").ok() {
            cfg.pool.failure_policy = policy
                .parse()
                .map_err(|e: String| anyhow!(e))
                .context("DISPATCH_FAILURE_POLICY")?;
        }

        cfg.validate().map_err(|e| anyhow!(e))?;
        Ok(cfg)
    }
}

fn env_var<T>(name: &str) -> AppResult<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("{name} is not valid: `{raw}`")),
        Err(_) => Ok(None),
    }
}
