//! Dispatch primitives: channels, pools, fan-out, permits, admission and deadlines.

pub mod admission;
pub mod cancellation;
pub mod channel;
pub mod error;
pub mod executor;
pub mod fan_out;
pub mod observer;
pub mod permit;
pub mod worker_pool;

pub use admission::{Admission, AdmissionController, AdmissionStats, OverflowPolicy};
pub use cancellation::{await_until, await_with_deadline, Deadline, Outcome, PendingResult};
pub use channel::{Recv, SignalChannel, TrySend};
pub use error::{AppResult, DispatchError};
pub use executor::{FnExecutor, TaskMeta, WorkerExecutor};
pub use fan_out::{fan_out, fan_out_bounded, fan_out_settled, FanOut};
pub use observer::{DispatchEvent, DispatchObserver, NoopObserver, SharedObserver, TracingObserver};
pub use permit::{Permit, PermitPool};
pub use worker_pool::{PoolState, PoolStats, WorkerPool};
