//! Configuration models for pools and fan-out.

pub mod pool;

pub use pool::{DispatchConfig, FailurePolicy, FanOutConfig, WorkerPoolConfig, DEFAULT_STACK_SIZE};
