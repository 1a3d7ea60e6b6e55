//! One executor per work item, optionally capped by a [`PermitPool`].
//!
//! `fan_out` spawns exactly `K` executors for `K` items. Each sends exactly one
//! outcome into a result channel of capacity `K`, so no executor ever blocks
//! on its send; the caller performs exactly `K` receives. Results come back in
//! arrival order, not submission order.
//!
//! `fan_out_bounded` additionally makes each executor hold a permit while its
//! work body runs: up to `K` executors exist, at most `P` do work at once.
//!
//! Executors are scoped threads, so work closures and items may borrow from
//! the caller. Every executor has returned by the time either function does.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread;

use tracing::{debug, warn};

use crate::config::FanOutConfig;

use super::channel::SignalChannel;
use super::error::{panic_message, DispatchError};
use super::observer::{self, DispatchEvent, SharedObserver};
use super::permit::PermitPool;

/// Spawns one executor per item and collects their results.
#[derive(Clone)]
pub struct FanOut {
    config: FanOutConfig,
    observer: SharedObserver,
}

impl Default for FanOut {
    fn default() -> Self {
        Self {
            config: FanOutConfig::default(),
            observer: observer::noop(),
        }
    }
}

impl std::fmt::Debug for FanOut {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanOut").field("config", &self.config).finish_non_exhaustive()
    }
}

impl FanOut {
    /// Create a dispatcher from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::InvalidConfig` if the configuration is invalid.
    pub fn new(config: FanOutConfig) -> Result<Self, DispatchError> {
        config.validate().map_err(DispatchError::InvalidConfig)?;
        Ok(Self {
            config,
            observer: observer::noop(),
        })
    }

    /// Report executor events to `observer`.
    #[must_use]
    pub fn with_observer(mut self, observer: SharedObserver) -> Self {
        self.observer = observer;
        self
    }

    /// The active configuration.
    #[must_use]
    pub const fn config(&self) -> &FanOutConfig {
        &self.config
    }

    /// Unbounded fan-out: every executor runs its work body immediately.
    ///
    /// # Errors
    ///
    /// - `DispatchError::Spawn` if an executor thread could not be created
    /// - `DispatchError::ExecutorFailure` if any work body panicked (reported
    ///   after every executor has finished). Use [`FanOut::run_settled`] to
    ///   keep the results of the bodies that returned.
    pub fn run<P, R, F>(&self, items: impl IntoIterator<Item = P>, work: F) -> Result<Vec<R>, DispatchError>
    where
        P: Send,
        R: Send,
        F: Fn(P) -> R + Sync,
    {
        first_failure(self.dispatch(items, None, &work)?)
    }

    /// Fan-out capped at `config.permits` concurrent work bodies.
    ///
    /// # Errors
    ///
    /// Same as [`FanOut::run`].
    pub fn run_bounded<P, R, F>(&self, items: impl IntoIterator<Item = P>, work: F) -> Result<Vec<R>, DispatchError>
    where
        P: Send,
        R: Send,
        F: Fn(P) -> R + Sync,
    {
        let permits = PermitPool::new(self.config.permits)?;
        first_failure(self.dispatch(items, Some(&permits), &work)?)
    }

    /// Fan-out sharing a caller-owned permit pool.
    ///
    /// # Errors
    ///
    /// Same as [`FanOut::run`].
    pub fn run_with_permits<P, R, F>(
        &self,
        items: impl IntoIterator<Item = P>,
        permits: &PermitPool,
        work: F,
    ) -> Result<Vec<R>, DispatchError>
    where
        P: Send,
        R: Send,
        F: Fn(P) -> R + Sync,
    {
        first_failure(self.dispatch(items, Some(permits), &work)?)
    }

    /// Fan-out returning one outcome per item, in submission order.
    ///
    /// A panicking work body yields `Err(DispatchError::ExecutorFailure)` in
    /// its own slot; every other slot holds that item's result. `permits`
    /// caps concurrent work bodies when given.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::Spawn` if an executor thread could not be created.
    pub fn run_settled<P, R, F>(
        &self,
        items: impl IntoIterator<Item = P>,
        permits: Option<&PermitPool>,
        work: F,
    ) -> Result<Vec<Result<R, DispatchError>>, DispatchError>
    where
        P: Send,
        R: Send,
        F: Fn(P) -> R + Sync,
    {
        let mut outcomes = self.dispatch(items, permits, &work)?;
        outcomes.sort_unstable_by_key(|(index, _)| *index);
        Ok(outcomes
            .into_iter()
            .map(|(index, outcome)| outcome.map_err(|message| executor_failure(index, message)))
            .collect())
    }

    /// Run every executor and return `(index, outcome)` pairs in arrival order.
    fn dispatch<P, R, F>(
        &self,
        items: impl IntoIterator<Item = P>,
        permits: Option<&PermitPool>,
        work: &F,
    ) -> Result<Vec<(usize, Result<R, String>)>, DispatchError>
    where
        P: Send,
        R: Send,
        F: Fn(P) -> R + Sync,
    {
        let items: Vec<P> = items.into_iter().collect();
        let children = items.len();
        if children == 0 {
            return Ok(Vec::new());
        }

        let results = SignalChannel::<(usize, Result<R, String>)>::bounded(children);
        debug!(children, permits = ?permits.map(PermitPool::size), "Fanning out");

        thread::scope(|scope| {
            for (index, item) in items.into_iter().enumerate() {
                let tx = results.clone();
                let sink = &self.observer;
                let spawned = thread::Builder::new()
                    .name(format!("dispatch-fanout-{index}"))
                    .stack_size(self.config.thread_stack_size)
                    .spawn_scoped(scope, move || {
                        let task_id = index as u64;
                        let outcome = {
                            let _permit = permits.map(PermitPool::acquire);
                            observer::notify(sink, &DispatchEvent::TaskReceived {
                                worker_id: index,
                                task_id,
                            });
                            catch_unwind(AssertUnwindSafe(|| work(item)))
                                .map_err(|panic| panic_message(panic.as_ref()))
                        };
                        let event = match &outcome {
                            Ok(_) => DispatchEvent::TaskCompleted {
                                worker_id: index,
                                task_id,
                            },
                            Err(message) => DispatchEvent::TaskFailed {
                                worker_id: index,
                                task_id,
                                message: message.clone(),
                            },
                        };
                        observer::notify(sink, &event);
                        // Capacity equals the number of executors: never blocks.
                        let _ = tx.send((index, outcome));
                    });
                if let Err(e) = spawned {
                    warn!(index, error = %e, "Failed to spawn fan-out executor");
                    // Executors already running finish on their own and are
                    // joined when the scope ends.
                    return Err(DispatchError::Spawn(e.to_string()));
                }
            }

            let mut outcomes = Vec::with_capacity(children);
            for _ in 0..children {
                let Some(outcome) = results.receive() else {
                    break;
                };
                outcomes.push(outcome);
            }
            Ok(outcomes)
        })
    }
}

fn executor_failure(index: usize, message: String) -> DispatchError {
    DispatchError::ExecutorFailure {
        executor: format!("dispatch-fanout-{index}"),
        message,
    }
}

/// Collapse arrival-ordered outcomes into results or the first failure.
fn first_failure<R>(outcomes: Vec<(usize, Result<R, String>)>) -> Result<Vec<R>, DispatchError> {
    let mut collected = Vec::with_capacity(outcomes.len());
    let mut failure = None;
    for (index, outcome) in outcomes {
        match outcome {
            Ok(result) => collected.push(result),
            Err(message) => {
                failure.get_or_insert_with(|| executor_failure(index, message));
            }
        }
    }
    failure.map_or(Ok(collected), Err)
}

/// Spawn one executor per item with unbounded concurrency and collect every result.
///
/// # Errors
///
/// See [`FanOut::run`].
pub fn fan_out<P, R, F>(items: impl IntoIterator<Item = P>, work: F) -> Result<Vec<R>, DispatchError>
where
    P: Send,
    R: Send,
    F: Fn(P) -> R + Sync,
{
    FanOut::default().run(items, work)
}

/// Spawn one executor per item and return every item's outcome in submission order.
///
/// # Errors
///
/// See [`FanOut::run_settled`].
pub fn fan_out_settled<P, R, F>(
    items: impl IntoIterator<Item = P>,
    work: F,
) -> Result<Vec<Result<R, DispatchError>>, DispatchError>
where
    P: Send,
    R: Send,
    F: Fn(P) -> R + Sync,
{
    FanOut::default().run_settled(items, None, work)
}

/// Spawn one executor per item, at most `permits` running their work body at once.
///
/// # Errors
///
/// - `DispatchError::InvalidConfig` if `permits` is zero
/// - otherwise see [`FanOut::run`]
pub fn fan_out_bounded<P, R, F>(
    items: impl IntoIterator<Item = P>,
    permits: usize,
    work: F,
) -> Result<Vec<R>, DispatchError>
where
    P: Send,
    R: Send,
    F: Fn(P) -> R + Sync,
{
    let pool = PermitPool::new(permits)?;
    FanOut::default().run_with_permits(items, &pool, work)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::observer::testing::{PanicOnCompleted, RecordingObserver};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_empty_input_spawns_nothing() {
        let out: Vec<u8> = fan_out(Vec::<u8>::new(), |x| x).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_every_item_yields_one_result() {
        let mut out = fan_out(0..64_u32, |x| x * 10).unwrap();
        out.sort_unstable();
        assert_eq!(out, (0..64).map(|x| x * 10).collect::<Vec<_>>());
    }

    #[test]
    fn test_work_may_borrow_from_caller() {
        let prefix = String::from("child");
        let out = fan_out(["a", "b"], |s| format!("{prefix}:{s}")).unwrap();
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|s| s.starts_with("child:")));
    }

    #[test]
    fn test_bounded_zero_permits_rejected() {
        let err = fan_out_bounded(0..4, 0, |x: i32| x).unwrap_err();
        assert!(matches!(err, DispatchError::InvalidConfig(_)));
    }

    #[test]
    fn test_bounded_caps_concurrency() {
        let current = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        let out = fan_out_bounded(0..40, 3, |x: usize| {
            let now = current.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(1));
            current.fetch_sub(1, Ordering::SeqCst);
            x
        })
        .unwrap();
        assert_eq!(out.len(), 40);
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[test]
    fn test_panicking_body_reports_failure_without_hanging() {
        let observer = Arc::new(RecordingObserver::default());
        let fan = FanOut::new(FanOutConfig::default().with_permits(2))
            .unwrap()
            .with_observer(observer.clone());
        let err = fan
            .run_bounded(0..8, |x: u32| {
                assert!(x != 5, "item five");
                x
            })
            .unwrap_err();
        match err {
            DispatchError::ExecutorFailure { executor, message } => {
                assert_eq!(executor, "dispatch-fanout-5");
                assert_eq!(message, "item five");
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(
            observer.count(|e| matches!(e, DispatchEvent::TaskCompleted { .. })),
            7
        );
    }

    #[test]
    fn test_settled_keeps_results_around_a_failure() {
        let permits = PermitPool::new(2).unwrap();
        let outcomes = FanOut::default()
            .run_settled(0..6_u32, Some(&permits), |x| {
                assert!(x != 2, "item two");
                x * 10
            })
            .unwrap();

        assert_eq!(outcomes.len(), 6);
        for (index, outcome) in outcomes.iter().enumerate() {
            match outcome {
                Ok(value) => assert_eq!(*value, index as u32 * 10),
                Err(DispatchError::ExecutorFailure { executor, message }) => {
                    assert_eq!(index, 2);
                    assert_eq!(executor, "dispatch-fanout-2");
                    assert_eq!(message, "item two");
                }
                Err(other) => panic!("unexpected error {other:?}"),
            }
        }
        assert_eq!(outcomes.iter().filter(|o| o.is_ok()).count(), 5);
    }

    #[test]
    fn test_fan_out_settled_all_ok() {
        let outcomes = fan_out_settled(["a", "b", "c"], str::to_uppercase).unwrap();
        let values: Vec<String> = outcomes.into_iter().map(Result::unwrap).collect();
        assert_eq!(values, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_panicking_observer_does_not_hang_fan_out() {
        let observer = Arc::new(PanicOnCompleted::default());
        let mut out = FanOut::default()
            .with_observer(observer.clone())
            .run(0..4_u32, |x| x)
            .unwrap();
        out.sort_unstable();
        assert_eq!(out, vec![0, 1, 2, 3]);
        assert_eq!(
            observer
                .seen
                .count(|e| matches!(e, DispatchEvent::TaskCompleted { .. })),
            4
        );
    }
}
