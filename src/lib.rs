//! # Dispatch Lot
//!
//! Composable concurrency primitives for dispatching units of work to a
//! bounded set of executors and collecting their results.
//!
//! ## Components
//!
//! - **`SignalChannel`**: bounded, rendezvous or unbounded FIFO handoff with explicit, one-shot close
//! - **`WorkerPool`**: a fixed number of OS-thread workers draining a channel until it closes
//! - **`fan_out`**: one executor per work item, results collected over a channel sized to the input
//! - **`PermitPool` / `fan_out_bounded`**: a counting semaphore capping how many executors do work at once
//! - **`AdmissionController`**: drop, block or redirect when a channel is saturated
//! - **`await_with_deadline` / `PendingResult`**: advisory cancellation of a single-result wait
//!
//! Cancellation never kills an executor. Anything that might send after its
//! receiver has walked away writes into a buffer sized to absorb that send.
//!
//! ## WorkerPool
//!
//! ```rust
//! use dispatch_lot::config::WorkerPoolConfig;
//! use dispatch_lot::core::{FnExecutor, SignalChannel, TaskMeta, WorkerPool};
//!
//! let work = SignalChannel::bounded(4);
//! let pool = WorkerPool::with_channel(
//!     WorkerPoolConfig::new().with_worker_count(4),
//!     work.clone(),
//!     FnExecutor::new(|item: String, meta: TaskMeta| {
//!         format!("child {}: recvd signal: {item}", meta.worker_id)
//!     }),
//! )?;
//!
//! for _ in 0..2000 {
//!     work.send("paper".to_string())?;
//! }
//! work.close()?;
//! pool.shutdown()?;
//! # Ok::<(), dispatch_lot::core::DispatchError>(())
//! ```
//!
//! ## Fan-out and deadlines
//!
//! ```rust
//! use std::time::Duration;
//! use dispatch_lot::core::{fan_out_bounded, Outcome, PendingResult};
//!
//! let results = fan_out_bounded(0..100, 4, |n: u32| n * 2)?;
//! assert_eq!(results.len(), 100);
//!
//! let pending = PendingResult::spawn(|| "data")?;
//! match pending.await_with_deadline(Duration::from_secs(1)) {
//!     Outcome::Completed(d) => assert_eq!(d, "data"),
//!     Outcome::Cancelled | Outcome::Closed => {}
//! }
//! # Ok::<(), dispatch_lot::core::DispatchError>(())
//! ```
//!
//! For complete scenarios, see `tests/dispatch_patterns_test.rs`.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Dispatch primitives and their error types.
pub mod core;
/// Configuration models for pools and fan-out.
pub mod config;
/// Builders to construct dispatch components from configuration.
pub mod builders;
/// Shared utilities.
pub mod util;
