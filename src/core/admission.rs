//! Admission control at the producer side of a [`SignalChannel`].
//!
//! The controller decides what happens to an item when the channel has no
//! immediate capacity. Shedding load ([`OverflowPolicy::Drop`]) is the
//! default; blocking and redirecting to an overflow channel are available for
//! services that prefer them.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, trace};

use super::channel::{SignalChannel, TrySend};
use super::error::DispatchError;
use super::observer::{self, DispatchEvent, SharedObserver};

/// Outcome of submitting an item through admission control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The item was enqueued on the primary channel.
    Accepted,
    /// The item was enqueued on the overflow channel.
    Redirected,
    /// The item was discarded.
    Dropped,
}

/// What to do with an item when the primary channel is saturated.
pub enum OverflowPolicy<T> {
    /// Discard the item without blocking.
    Drop,
    /// Block until the primary channel accepts the item.
    Block,
    /// Try the overflow channel without blocking; discard if it is also full.
    Redirect(SignalChannel<T>),
}

impl<T> Default for OverflowPolicy<T> {
    fn default() -> Self {
        Self::Drop
    }
}

impl<T> OverflowPolicy<T> {
    /// Offer `item` to `channel` under this policy and report drops and
    /// redirects to `sink`.
    pub(crate) fn admit(
        &self,
        channel: &SignalChannel<T>,
        item: T,
        sink: &SharedObserver,
    ) -> Result<Admission, DispatchError> {
        let item = match self {
            Self::Block => {
                channel.send(item)?;
                return Ok(Admission::Accepted);
            }
            Self::Drop | Self::Redirect(_) => match channel.try_send(item)? {
                TrySend::Sent => return Ok(Admission::Accepted),
                TrySend::Full(item) => item,
            },
        };

        if let Self::Redirect(overflow) = self {
            if let TrySend::Sent = overflow.try_send(item)? {
                observer::notify(sink, &DispatchEvent::ItemRedirected);
                trace!("primary channel saturated, item redirected");
                return Ok(Admission::Redirected);
            }
        }

        observer::notify(sink, &DispatchEvent::ItemDropped);
        debug!("channel saturated, item dropped");
        Ok(Admission::Dropped)
    }
}

impl<T> fmt::Debug for OverflowPolicy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Drop => f.write_str("Drop"),
            Self::Block => f.write_str("Block"),
            Self::Redirect(ch) => f.debug_tuple("Redirect").field(ch).finish(),
        }
    }
}

/// Counts of admission outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdmissionStats {
    /// Items enqueued on the primary channel.
    pub accepted: u64,
    /// Items enqueued on the overflow channel.
    pub redirected: u64,
    /// Items discarded.
    pub dropped: u64,
}

#[derive(Debug, Default)]
struct Counters {
    accepted: AtomicU64,
    redirected: AtomicU64,
    dropped: AtomicU64,
}

/// Producer-side wrapper applying an [`OverflowPolicy`] to a channel.
///
/// # Example
///
/// ```
/// use dispatch_lot::core::{Admission, AdmissionController, OverflowPolicy, SignalChannel};
///
/// let ch = SignalChannel::bounded(1);
/// let ctl = AdmissionController::new(ch.clone(), OverflowPolicy::Drop);
/// assert_eq!(ctl.submit("a").unwrap(), Admission::Accepted);
/// assert_eq!(ctl.submit("b").unwrap(), Admission::Dropped);
/// ```
pub struct AdmissionController<T> {
    channel: SignalChannel<T>,
    policy: OverflowPolicy<T>,
    counters: Arc<Counters>,
    observer: SharedObserver,
}

impl<T> AdmissionController<T> {
    /// Wrap `channel` with `policy`.
    #[must_use]
    pub fn new(channel: SignalChannel<T>, policy: OverflowPolicy<T>) -> Self {
        Self {
            channel,
            policy,
            counters: Arc::new(Counters::default()),
            observer: observer::noop(),
        }
    }

    /// Report drops and redirects to `observer`.
    #[must_use]
    pub fn with_observer(mut self, observer: SharedObserver) -> Self {
        self.observer = observer;
        self
    }

    /// Submit an item according to the policy. Only `Block` may block.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::SendOnClosedChannel`] if the primary channel
    /// (or, when redirecting, the overflow channel) is closed.
    pub fn submit(&self, item: T) -> Result<Admission, DispatchError> {
        let admission = self.policy.admit(&self.channel, item, &self.observer)?;
        let counter = match admission {
            Admission::Accepted => &self.counters.accepted,
            Admission::Redirected => &self.counters.redirected,
            Admission::Dropped => &self.counters.dropped,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        Ok(admission)
    }

    /// Snapshot of outcome counts.
    #[must_use]
    pub fn stats(&self) -> AdmissionStats {
        AdmissionStats {
            accepted: self.counters.accepted.load(Ordering::Relaxed),
            redirected: self.counters.redirected.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }

    /// The primary channel.
    #[must_use]
    pub const fn channel(&self) -> &SignalChannel<T> {
        &self.channel
    }

    /// The active policy.
    #[must_use]
    pub const fn policy(&self) -> &OverflowPolicy<T> {
        &self.policy
    }
}
