//! Signal channel: the FIFO handoff every other component builds on.
//!
//! A [`SignalChannel`] is a bounded (`bounded(0)` is a rendezvous) or unbounded
//! buffer shared by any number of producers and consumers. Unlike a bare
//! `crossbeam_channel` pair, closing is an explicit, one-shot operation:
//!
//! - `close()` succeeds once and fails with [`DispatchError::AlreadyClosed`] after.
//! - `send()` after `close()` fails with [`DispatchError::SendOnClosedChannel`].
//! - Receivers drain buffered items first, then observe the closed state forever.
//!
//! # Example
//!
//! ```
//! use dispatch_lot::core::SignalChannel;
//!
//! let ch = SignalChannel::bounded(2);
//! ch.send("paper").unwrap();
//! ch.close().unwrap();
//!
//! assert_eq!(ch.receive(), Some("paper"));
//! assert_eq!(ch.receive(), None);
//! assert!(ch.close().is_err());
//! ```

use std::fmt;
use std::sync::Arc;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};
use parking_lot::Mutex;

use super::cancellation::Deadline;
use super::error::DispatchError;

/// Result of a non-blocking send.
#[derive(Debug, PartialEq, Eq)]
pub enum TrySend<T> {
    /// The item was enqueued (or handed to a waiting receiver).
    Sent,
    /// No capacity was immediately available; the item is handed back.
    Full(T),
}

/// Result of a non-blocking or deadline-bounded receive.
#[derive(Debug, PartialEq, Eq)]
pub enum Recv<T> {
    /// An item was received.
    Item(T),
    /// Nothing was available (before the deadline, if any).
    Pending,
    /// The channel is closed and fully drained.
    Closed,
}

struct Inner<T> {
    /// Taken on close. Sends clone it out so that no lock is held while blocking.
    tx: Mutex<Option<Sender<T>>>,
    rx: Receiver<T>,
}

/// FIFO handoff buffer between producers and consumers.
///
/// Cloning yields another handle to the same buffer.
pub struct SignalChannel<T> {
    inner: Arc<Inner<T>>,
}

impl<T> SignalChannel<T> {
    /// Create a channel buffering up to `capacity` items.
    ///
    /// A capacity of zero makes every send a rendezvous with a receiver.
    #[must_use]
    pub fn bounded(capacity: usize) -> Self {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        Self::from_parts(tx, rx)
    }

    /// Create a channel whose sends never block.
    #[must_use]
    pub fn unbounded() -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self::from_parts(tx, rx)
    }

    fn from_parts(tx: Sender<T>, rx: Receiver<T>) -> Self {
        Self {
            inner: Arc::new(Inner {
                tx: Mutex::new(Some(tx)),
                rx,
            }),
        }
    }

    fn sender(&self) -> Result<Sender<T>, DispatchError> {
        self.inner
            .tx
            .lock()
            .as_ref()
            .cloned()
            .ok_or(DispatchError::SendOnClosedChannel)
    }

    /// Send an item, blocking until it is buffered or taken by a receiver.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::SendOnClosedChannel`] if the channel was closed.
    pub fn send(&self, item: T) -> Result<(), DispatchError> {
        self.sender()?
            .send(item)
            .map_err(|_| DispatchError::SendOnClosedChannel)
    }

    /// Attempt to send without blocking.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::SendOnClosedChannel`] if the channel was closed.
    pub fn try_send(&self, item: T) -> Result<TrySend<T>, DispatchError> {
        match self.sender()?.try_send(item) {
            Ok(()) => Ok(TrySend::Sent),
            Err(TrySendError::Full(item)) => Ok(TrySend::Full(item)),
            Err(TrySendError::Disconnected(_)) => Err(DispatchError::SendOnClosedChannel),
        }
    }

    /// Receive the next item, blocking until one arrives.
    ///
    /// Returns `None` once the channel is closed and drained.
    #[must_use]
    pub fn receive(&self) -> Option<T> {
        self.inner.rx.recv().ok()
    }

    /// Receive without blocking.
    #[must_use]
    pub fn try_receive(&self) -> Recv<T> {
        match self.inner.rx.try_recv() {
            Ok(item) => Recv::Item(item),
            Err(TryRecvError::Empty) => Recv::Pending,
            Err(TryRecvError::Disconnected) => Recv::Closed,
        }
    }

    /// Receive, giving up once `deadline` has elapsed.
    #[must_use]
    pub fn receive_until(&self, deadline: Deadline) -> Recv<T> {
        match self.inner.rx.recv_deadline(deadline.instant()) {
            Ok(item) => Recv::Item(item),
            Err(RecvTimeoutError::Timeout) => Recv::Pending,
            Err(RecvTimeoutError::Disconnected) => Recv::Closed,
        }
    }

    /// Close the channel. Buffered items remain receivable.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::AlreadyClosed`] on every call after the first.
    pub fn close(&self) -> Result<(), DispatchError> {
        self.inner
            .tx
            .lock()
            .take()
            .map(drop)
            .ok_or(DispatchError::AlreadyClosed)
    }

    /// Whether `close` has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.tx.lock().is_none()
    }

    /// Number of buffered items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.rx.len()
    }

    /// Whether no items are buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.rx.is_empty()
    }

    /// Buffer capacity, or `None` for an unbounded channel.
    #[must_use]
    pub fn capacity(&self) -> Option<usize> {
        self.inner.rx.capacity()
    }

    /// Iterate over received items until the channel is closed and drained.
    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        std::iter::from_fn(move || self.receive())
    }
}

impl<T> Clone for SignalChannel<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for SignalChannel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalChannel")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .field("closed", &self.is_closed())
            .finish()
    }
}
