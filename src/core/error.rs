//! Error types for dispatch operations.

use thiserror::Error;

/// Structural errors produced by channels, pools and dispatchers.
///
/// Saturation and deadline expiry are not errors: they are reported as
/// [`Admission::Dropped`](crate::core::Admission) and
/// [`Outcome::Cancelled`](crate::core::Outcome) values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// `close` was called on a channel that is already closed.
    #[error("channel already closed")]
    AlreadyClosed,
    /// `send` was called after the channel was closed.
    #[error("send on closed channel")]
    SendOnClosedChannel,
    /// A work body panicked.
    #[error("executor {executor} failed: {message}")]
    ExecutorFailure {
        /// Name of the executor that failed (thread name).
        executor: String,
        /// Panic message, if one could be extracted.
        message: String,
    },
    /// Configuration validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// The OS refused to spawn an executor thread.
    #[error("failed to spawn executor: {0}")]
    Spawn(String),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;

/// Extract a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
