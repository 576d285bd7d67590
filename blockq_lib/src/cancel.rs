//! Cancellation of blocked queue calls.
//!
//! A [`CancellationToken`] is handed to every blocking queue operation. Cancelling the token
//! wakes each wait registered with it; the woken caller releases the queue lock and returns
//! [`QueueError::Cancelled`](crate::error::QueueError::Cancelled) without touching the queue.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

/// Something a cancelled token has to wake up.
///
/// Implementors must acquire the lock their waiters sleep under before notifying, so that a
/// waiter which checked the token just before suspending cannot miss the wakeup.
pub(crate) trait Wake: Send + Sync {
    fn wake_all(&self);
}

#[derive(Default)]
struct Inner {
    cancelled: AtomicBool,
    next_id: AtomicU64,
    waiters: Mutex<Vec<(u64, Arc<dyn Wake>)>>,
}

/// A shareable cancellation signal for blocking queue operations.
///
/// Clones share the same state: cancelling any clone cancels all of them. A token cannot be
/// reset; once cancelled, every blocking call made with it fails as soon as it would have to
/// wait. Calls that can complete immediately still succeed.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use std::thread;
/// use blockq_lib::{BoundedBlockingQueue, CancellationToken, QueueError};
///
/// let queue = Arc::new(BoundedBlockingQueue::<u32>::new());
/// let token = CancellationToken::new();
///
/// let consumer = {
///     let queue = queue.clone();
///     let token = token.clone();
///     thread::spawn(move || queue.take(&token))
/// };
///
/// token.cancel();
/// assert_eq!(consumer.join().unwrap(), Err(QueueError::Cancelled));
/// ```
#[derive(Clone, Default)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

impl CancellationToken {
    /// Creates a token that has not been cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels the token and wakes every queue call currently waiting on it.
    pub fn cancel(&self) {
        if self.inner.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        // Snapshot, then release the registry before taking any queue lock.
        let waiters: Vec<Arc<dyn Wake>> = self
            .waiters()
            .iter()
            .map(|(_, waker)| waker.clone())
            .collect();
        debug!(waiters = waiters.len(), "cancellation requested");
        for waker in waiters {
            waker.wake_all();
        }
    }

    /// Returns `true` once [`cancel`](Self::cancel) has been called on this token or a clone.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Registers `waker` until the returned guard is dropped.
    ///
    /// Callers must register before checking [`is_cancelled`](Self::is_cancelled) for the last
    /// time ahead of a wait.
    pub(crate) fn register(&self, waker: Arc<dyn Wake>) -> Registration<'_> {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.waiters().push((id, waker));
        Registration { token: self, id }
    }

    fn waiters(&self) -> std::sync::MutexGuard<'_, Vec<(u64, Arc<dyn Wake>)>> {
        self.inner
            .waiters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    fn registered(&self) -> usize {
        self.waiters().len()
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Keeps a waker registered with a token; deregisters on drop.
pub(crate) struct Registration<'a> {
    token: &'a CancellationToken,
    id: u64,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        let id = self.id;
        self.token.waiters().retain(|(other, _)| *other != id);
    }
}
