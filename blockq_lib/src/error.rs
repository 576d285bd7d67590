//! Error types.

use thiserror::Error;

/// Errors reported by [`BoundedBlockingQueue`](crate::core::BoundedBlockingQueue) operations.
///
/// A timed call running out of time is not an error: `offer_timeout` returns `Ok(false)` and
/// `poll_timeout` returns `Ok(None)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    /// The argument cannot be accepted: an absent element, a zero capacity, or draining a queue
    /// into itself.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    /// A fail-fast removal or inspection found the queue empty.
    #[error("queue is empty")]
    EmptyQueue,
    /// A fail-fast insertion found the queue full.
    #[error("queue capacity exceeded")]
    CapacityExceeded,
    /// The caller's cancellation token fired while it was waiting.
    #[error("operation cancelled")]
    Cancelled,
}

/// A specialized `Result` for queue operations.
pub type Result<T> = std::result::Result<T, QueueError>;

/// Errors raised while loading a [`QueueConfig`](crate::config::QueueConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read queue config: {0}")]
    Io(#[from] std::io::Error),
    /// The configuration is not valid JSON for `QueueConfig`.
    #[error("failed to parse queue config: {0}")]
    Parse(#[from] serde_json::Error),
    /// The configuration parsed but describes an impossible queue.
    #[error("invalid queue config: {0}")]
    Invalid(QueueError),
}
