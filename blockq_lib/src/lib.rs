//! blockq is a bounded, thread-safe FIFO queue for producer-consumer coordination.
//!
//! The queue is a classic monitor: one mutex guards the elements, and two condition variables
//! wake producers when space frees up and consumers when data arrives. Every insertion and
//! removal comes in a fail-fast, a sentinel-returning, a blocking and a timed flavor; the
//! blocking flavors can be interrupted through a [`CancellationToken`].
//!
//! See [`BoundedBlockingQueue`] for the full API.

#![deny(missing_docs)]

pub mod cancel;
pub mod config;
pub mod core;
pub mod error;

mod utils;

pub use crate::cancel::CancellationToken;
pub use crate::config::QueueConfig;
pub use crate::core::{BoundedBlockingQueue, SignalStats, UNBOUNDED};
pub use crate::error::{ConfigError, QueueError, Result};
