//! Deadline-bounded waits for a single result.
//!
//! Cancellation here is advisory: giving up on a wait never stops the executor
//! producing the result. The executor writes into a buffer with room for one
//! item, so a late result is deposited without blocking and is simply dropped
//! along with the channel if nobody collects it.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::channel::{Recv, SignalChannel};
use super::error::{panic_message, DispatchError};

/// Upper bound used when `now + timeout` overflows `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// One-shot, monotonic cutoff instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    /// Deadline `timeout` from now.
    #[must_use]
    pub fn after(timeout: Duration) -> Self {
        let now = Instant::now();
        let at = now
            .checked_add(timeout)
            .or_else(|| now.checked_add(FAR_FUTURE))
            .unwrap_or(now);
        Self { at }
    }

    /// Deadline at an absolute instant.
    #[must_use]
    pub const fn at(at: Instant) -> Self {
        Self { at }
    }

    /// The cutoff instant.
    #[must_use]
    pub const fn instant(&self) -> Instant {
        self.at
    }

    /// Whether the cutoff has passed. Once true, stays true.
    #[must_use]
    pub fn is_elapsed(&self) -> bool {
        Instant::now() >= self.at
    }

    /// Time left before the cutoff, zero once elapsed.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }
}

/// Outcome of a deadline-bounded wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<R> {
    /// The result arrived in time.
    Completed(R),
    /// The deadline elapsed first. The producer keeps running.
    Cancelled,
    /// The source was closed without producing a result.
    Closed,
}

impl<R> Outcome<R> {
    /// Whether the wait was cancelled by its deadline.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// The result, if one arrived.
    #[must_use]
    pub fn completed(self) -> Option<R> {
        match self {
            Self::Completed(r) => Some(r),
            Self::Cancelled | Self::Closed => None,
        }
    }
}

/// Race one result on `source` against a deadline `timeout` from now.
pub fn await_with_deadline<R>(source: &SignalChannel<R>, timeout: Duration) -> Outcome<R> {
    await_until(source, Deadline::after(timeout))
}

/// Race one result on `source` against an existing deadline.
pub fn await_until<R>(source: &SignalChannel<R>, deadline: Deadline) -> Outcome<R> {
    match source.receive_until(deadline) {
        Recv::Item(result) => Outcome::Completed(result),
        Recv::Pending => {
            debug!("deadline elapsed before result arrived; abandoning wait");
            Outcome::Cancelled
        }
        Recv::Closed => Outcome::Closed,
    }
}

/// A single executor producing one result into a one-slot buffer.
///
/// Dropping a `PendingResult` abandons the executor; it still completes and
/// deposits its result without blocking.
#[derive(Debug)]
pub struct PendingResult<R> {
    results: SignalChannel<R>,
    /// Yields the panic message if the work body failed.
    handle: JoinHandle<Result<(), String>>,
}

impl<R: Send + 'static> PendingResult<R> {
    /// Spawn an executor running `work`.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Spawn`] if the thread could not be created.
    pub fn spawn<F>(work: F) -> Result<Self, DispatchError>
    where
        F: FnOnce() -> R + Send + 'static,
    {
        let results = SignalChannel::bounded(1);
        let tx = results.clone();
        let handle = thread::Builder::new()
            .name("dispatch-pending".into())
            .spawn(move || {
                let body = match catch_unwind(AssertUnwindSafe(work)) {
                    Ok(result) => {
                        // Capacity one and nobody else sends: never blocks.
                        let _ = tx.send(result);
                        Ok(())
                    }
                    Err(payload) => {
                        let message = panic_message(payload.as_ref());
                        warn!(error = %message, "pending executor panicked");
                        Err(message)
                    }
                };
                let _ = tx.close();
                body
            })
            .map_err(|e| DispatchError::Spawn(e.to_string()))?;
        Ok(Self { results, handle })
    }

    /// Wait up to `timeout` for the result.
    pub fn await_with_deadline(&self, timeout: Duration) -> Outcome<R> {
        await_with_deadline(&self.results, timeout)
    }

    /// Wait until `deadline` for the result.
    pub fn await_until(&self, deadline: Deadline) -> Outcome<R> {
        await_until(&self.results, deadline)
    }

    /// Whether the executor has returned.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the executor to finish and take any result not yet collected.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::ExecutorFailure`] if the work body panicked.
    pub fn join(self) -> Result<Option<R>, DispatchError> {
        let executor = self
            .handle
            .thread()
            .name()
            .unwrap_or("dispatch-pending")
            .to_string();
        let finished = self
            .handle
            .join()
            .map_err(|payload| panic_message(payload.as_ref()))
            .and_then(|body| body);
        if let Err(message) = finished {
            return Err(DispatchError::ExecutorFailure { executor, message });
        }
        match self.results.try_receive() {
            Recv::Item(result) => Ok(Some(result)),
            Recv::Pending | Recv::Closed => Ok(None),
        }
    }
}
