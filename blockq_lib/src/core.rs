//! The bounded blocking queue.
//!
//! This module provides [`BoundedBlockingQueue`], a FIFO queue guarded by a single mutex with two
//! condition variables: one signaled when space frees up and one signaled when data arrives.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, trace};

use crate::cancel::{CancellationToken, Wake};
use crate::config::QueueConfig;
use crate::error::{QueueError, Result};
use crate::utils::deadline::Deadline;

/// Capacity of an unbounded queue, and the value [`BoundedBlockingQueue::remaining_capacity`]
/// reports for one.
pub const UNBOUNDED: usize = usize::MAX;

/// Number of signals a queue has issued on each of its condition variables.
///
/// A signal is only issued when the queue size actually changes, once per inserted or freed
/// slot, so these counters double as a record of how many waiters could have been woken.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SignalStats {
    /// Signals on the data-available condition (one per inserted element).
    pub data_signals: u64,
    /// Signals on the space-available condition (one per removed element).
    pub space_signals: u64,
}

struct State<E> {
    elements: VecDeque<E>,
    stats: SignalStats,
}

struct Monitor<E> {
    state: Mutex<State<E>>,
    space_available: Condvar,
    data_available: Condvar,
}

impl<E> Monitor<E> {
    fn lock(&self) -> MutexGuard<'_, State<E>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn signal_data(&self, state: &mut State<E>, inserted: usize) {
        notify(&self.data_available, inserted);
        state.stats.data_signals += inserted as u64;
    }

    fn signal_space(&self, state: &mut State<E>, freed: usize) {
        notify(&self.space_available, freed);
        state.stats.space_signals += freed as u64;
    }
}

fn notify(condvar: &Condvar, count: usize) {
    match count {
        0 => {}
        1 => condvar.notify_one(),
        _ => condvar.notify_all(),
    }
}

impl<E: Send> Wake for Monitor<E> {
    fn wake_all(&self) {
        // Holding the lock orders this wakeup after any waiter's last cancellation check.
        let _state = self.lock();
        self.space_available.notify_all();
        self.data_available.notify_all();
    }
}

/// Which condition a blocked caller waits on.
#[derive(Clone, Copy, Debug)]
enum Waiting {
    ForSpace,
    ForData,
}

/// A bounded, thread-safe FIFO queue with blocking, timed and non-blocking operations.
///
/// Every operation takes the same lock, so each one is atomic with respect to every other.
/// Elements leave the queue in the order they entered it; no ordering is promised among threads
/// blocked on the same condition.
///
/// Operations come in families that differ only in how they handle a full or empty queue:
///
/// | | fails | returns a sentinel | blocks | blocks with timeout |
/// |---|---|---|---|---|
/// | insert | [`add`](Self::add) | [`offer`](Self::offer) | [`put`](Self::put) | [`offer_timeout`](Self::offer_timeout) |
/// | remove | [`remove`](Self::remove) | [`poll`](Self::poll) | [`take`](Self::take) | [`poll_timeout`](Self::poll_timeout) |
/// | inspect | [`element`](Self::element) | [`peek`](Self::peek) | | |
///
/// Share a queue between threads by wrapping it in an [`Arc`].
///
/// The blocking and timed operations require `E: Send + 'static`, because a waiting call
/// registers the queue with its [`CancellationToken`], which may outlive the call. Queues of
/// borrowed elements (`BoundedBlockingQueue<&'a T>` for a non-`'static` `'a`) can only use the
/// non-blocking operations.
///
/// User code (`PartialEq`, `Clone`, `Extend`, `Drop`) never runs while the queue is being
/// mutated: comparisons and clones happen in read-only passes, and removed elements are handed
/// to the caller or dropped after the lock is released. A panic in such code therefore leaves the
/// queue in a consistent state, and later calls keep working.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use std::thread;
/// use blockq_lib::{BoundedBlockingQueue, CancellationToken};
///
/// let queue = Arc::new(BoundedBlockingQueue::with_capacity(2).unwrap());
/// let token = CancellationToken::new();
///
/// let producer = {
///     let queue = queue.clone();
///     let token = token.clone();
///     thread::spawn(move || {
///         for i in 0..10 {
///             queue.put(i, &token).unwrap();
///         }
///     })
/// };
///
/// let received: Vec<i32> = (0..10).map(|_| queue.take(&token).unwrap()).collect();
/// producer.join().unwrap();
/// assert_eq!(received, (0..10).collect::<Vec<_>>());
/// ```
pub struct BoundedBlockingQueue<E> {
    monitor: Arc<Monitor<E>>,
    capacity: usize,
}

impl<E> BoundedBlockingQueue<E> {
    /// Creates an unbounded queue.
    pub fn new() -> Self {
        Self::with_bound(UNBOUNDED)
    }

    /// Creates a queue holding at most `capacity` elements.
    ///
    /// Fails with [`QueueError::InvalidArgument`] if `capacity` is zero.
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(QueueError::InvalidArgument("capacity must be positive"));
        }
        Ok(Self::with_bound(capacity))
    }

    /// Creates a queue described by `config`.
    pub fn from_config(config: &QueueConfig) -> Result<Self> {
        config.validate()?;
        match config.capacity {
            Some(capacity) => Self::with_capacity(capacity),
            None => Ok(Self::new()),
        }
    }

    fn with_bound(capacity: usize) -> Self {
        BoundedBlockingQueue {
            monitor: Arc::new(Monitor {
                state: Mutex::new(State {
                    elements: VecDeque::new(),
                    stats: SignalStats::default(),
                }),
                space_available: Condvar::new(),
                data_available: Condvar::new(),
            }),
            capacity,
        }
    }

    /// The maximum number of elements, or [`UNBOUNDED`].
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn lock(&self) -> MutexGuard<'_, State<E>> {
        self.monitor.lock()
    }

    fn has_space(&self, state: &State<E>) -> bool {
        state.elements.len() < self.capacity
    }

    fn has_data(&self, state: &State<E>) -> bool {
        !state.elements.is_empty()
    }

    /// Inserts `element` at the tail, failing with [`QueueError::CapacityExceeded`] if the queue
    /// is full.
    pub fn add(&self, element: E) -> Result<()> {
        let mut state = self.lock();
        if !self.has_space(&state) {
            return Err(QueueError::CapacityExceeded);
        }
        state.elements.push_back(element);
        self.monitor.signal_data(&mut state, 1);
        Ok(())
    }

    /// Like [`add`](Self::add), but rejects an absent element with
    /// [`QueueError::InvalidArgument`] before touching the queue.
    pub fn add_opt(&self, element: Option<E>) -> Result<()> {
        match element {
            Some(element) => self.add(element),
            None => Err(QueueError::InvalidArgument("element must not be absent")),
        }
    }

    /// Inserts `element` at the tail if there is room. Returns `false` (dropping `element`) if the
    /// queue is full.
    pub fn offer(&self, element: E) -> bool {
        let mut state = self.lock();
        if !self.has_space(&state) {
            return false;
        }
        state.elements.push_back(element);
        self.monitor.signal_data(&mut state, 1);
        true
    }

    /// Removes and returns the head, failing with [`QueueError::EmptyQueue`] if there is none.
    pub fn remove(&self) -> Result<E> {
        self.poll().ok_or(QueueError::EmptyQueue)
    }

    /// Removes and returns the head, or `None` if the queue is empty.
    pub fn poll(&self) -> Option<E> {
        let mut state = self.lock();
        let head = state.elements.pop_front()?;
        self.monitor.signal_space(&mut state, 1);
        Some(head)
    }

    /// The number of queued elements.
    pub fn len(&self) -> usize {
        self.lock().elements.len()
    }

    /// Returns `true` if no element is queued.
    pub fn is_empty(&self) -> bool {
        self.lock().elements.is_empty()
    }

    /// How many more elements fit, or [`UNBOUNDED`] for an unbounded queue.
    pub fn remaining_capacity(&self) -> usize {
        if self.capacity == UNBOUNDED {
            return UNBOUNDED;
        }
        self.capacity - self.lock().elements.len()
    }

    /// Removes every element, waking producers waiting for space.
    pub fn clear(&self) {
        let mut state = self.lock();
        let removed = std::mem::take(&mut state.elements);
        self.monitor.signal_space(&mut state, removed.len());
        drop(state);
    }

    /// Inserts every element of `elements`, or none of them.
    ///
    /// The batch is collected before the lock is taken. If it does not fit in the remaining
    /// capacity the call fails with [`QueueError::CapacityExceeded`] and the queue is unchanged.
    /// Returns the number of inserted elements.
    pub fn add_all<I>(&self, elements: I) -> Result<usize>
    where
        I: IntoIterator<Item = E>,
    {
        let batch: Vec<E> = elements.into_iter().collect();
        let mut state = self.lock();
        if batch.len() > self.capacity - state.elements.len() {
            return Err(QueueError::CapacityExceeded);
        }
        let inserted = batch.len();
        state.elements.extend(batch);
        self.monitor.signal_data(&mut state, inserted);
        Ok(inserted)
    }

    /// Moves every element, in FIFO order, into `destination`. Returns the number moved.
    pub fn drain_to<C>(&self, destination: &mut C) -> usize
    where
        C: Extend<E>,
    {
        self.drain_to_max(destination, usize::MAX)
    }

    /// Moves at most `max_elements` elements, in FIFO order, into `destination`. Returns the number
    /// moved.
    pub fn drain_to_max<C>(&self, destination: &mut C, max_elements: usize) -> usize
    where
        C: Extend<E>,
    {
        let mut state = self.lock();
        let moved = max_elements.min(state.elements.len());
        let batch: Vec<E> = state.elements.drain(..moved).collect();
        self.monitor.signal_space(&mut state, moved);
        drop(state);
        // The caller's collection is filled after the lock is released.
        destination.extend(batch);
        moved
    }

    /// Moves up to `max_elements` elements (all, if `None`) into another queue, stopping early
    /// when `destination` is full.
    ///
    /// Both queues are locked for the duration of the move, so no other thread observes a
    /// partial transfer. Fails with [`QueueError::InvalidArgument`] if `destination` is this
    /// queue.
    pub fn drain_into(
        &self,
        destination: &BoundedBlockingQueue<E>,
        max_elements: Option<usize>,
    ) -> Result<usize> {
        let source_addr = Arc::as_ptr(&self.monitor) as usize;
        let destination_addr = Arc::as_ptr(&destination.monitor) as usize;
        if source_addr == destination_addr {
            return Err(QueueError::InvalidArgument("cannot drain a queue into itself"));
        }
        // Always lock the lower address first so two opposing drains cannot deadlock.
        let (mut source, mut target) = if source_addr < destination_addr {
            let source = self.lock();
            (source, destination.lock())
        } else {
            let target = destination.lock();
            (self.lock(), target)
        };
        let room = destination.capacity - target.elements.len();
        let moved = max_elements
            .unwrap_or(usize::MAX)
            .min(source.elements.len())
            .min(room);
        target.elements.extend(source.elements.drain(..moved));
        destination.monitor.signal_data(&mut target, moved);
        self.monitor.signal_space(&mut source, moved);
        Ok(moved)
    }

    /// Signals issued so far on each condition variable.
    pub fn signal_stats(&self) -> SignalStats {
        self.lock().stats
    }
}

impl<E: Clone> BoundedBlockingQueue<E> {
    /// Returns a copy of the head, failing with [`QueueError::EmptyQueue`] if there is none.
    pub fn element(&self) -> Result<E> {
        self.peek().ok_or(QueueError::EmptyQueue)
    }

    /// Returns a copy of the head, or `None` if the queue is empty.
    pub fn peek(&self) -> Option<E> {
        self.lock().elements.front().cloned()
    }

    /// Copies the current contents, head first.
    pub fn to_vec(&self) -> Vec<E> {
        self.to_vec_in(Vec::new())
    }

    /// Copies the current contents into `buffer`, replacing whatever it held and reusing its
    /// allocation.
    pub fn to_vec_in(&self, mut buffer: Vec<E>) -> Vec<E> {
        buffer.clear();
        let state = self.lock();
        buffer.reserve(state.elements.len());
        buffer.extend(state.elements.iter().cloned());
        buffer
    }

    /// Iterates over a point-in-time snapshot of the contents.
    ///
    /// The snapshot is taken under the lock; later changes to the queue are not reflected.
    pub fn iter(&self) -> std::vec::IntoIter<E> {
        self.to_vec().into_iter()
    }
}

impl<E: PartialEq> BoundedBlockingQueue<E> {
    /// Returns `true` if an element equal to `element` is queued.
    pub fn contains(&self, element: &E) -> bool {
        self.lock().elements.contains(element)
    }

    /// Returns `true` if every element of `elements` is queued.
    pub fn contains_all<'a, I>(&self, elements: I) -> bool
    where
        I: IntoIterator<Item = &'a E>,
        E: 'a,
    {
        let state = self.lock();
        elements
            .into_iter()
            .all(|element| state.elements.contains(element))
    }

    /// Removes the first element equal to `element`. Returns whether anything was removed; a
    /// producer is only woken if it was.
    pub fn remove_item(&self, element: &E) -> bool {
        let mut state = self.lock();
        let Some(index) = state.elements.iter().position(|queued| queued == element) else {
            return false;
        };
        let removed = state.elements.remove(index);
        self.monitor.signal_space(&mut state, 1);
        drop(state);
        drop(removed);
        true
    }

    /// Removes every element equal to one in `elements`. Returns the number removed.
    pub fn remove_all(&self, elements: &[E]) -> usize {
        self.retain_where(|queued| !elements.contains(queued))
    }

    /// Removes every element not equal to one in `elements`. Returns the number removed.
    pub fn retain_all(&self, elements: &[E]) -> usize {
        self.retain_where(|queued| elements.contains(queued))
    }

    fn retain_where(&self, keep: impl FnMut(&E) -> bool) -> usize {
        let mut state = self.lock();
        // Decide first: a panicking `PartialEq` must leave the queue untouched.
        let flags: Vec<bool> = state.elements.iter().map(keep).collect();
        let mut removed = Vec::new();
        for (element, kept) in std::mem::take(&mut state.elements).into_iter().zip(flags) {
            if kept {
                state.elements.push_back(element);
            } else {
                removed.push(element);
            }
        }
        self.monitor.signal_space(&mut state, removed.len());
        drop(state);
        removed.len()
    }
}

impl<E: Send + 'static> BoundedBlockingQueue<E> {
    /// Inserts `element` at the tail, waiting for space as long as it takes.
    ///
    /// Fails with [`QueueError::Cancelled`] if `cancel` fires while waiting; `element` is then
    /// dropped without having been inserted.
    pub fn put(&self, element: E, cancel: &CancellationToken) -> Result<()> {
        let state = self.lock();
        let mut state = self
            .wait_until(state, Waiting::ForSpace, None, cancel)?
            .ok_or(QueueError::Cancelled)?;
        state.elements.push_back(element);
        self.monitor.signal_data(&mut state, 1);
        Ok(())
    }

    /// Removes and returns the head, waiting for data as long as it takes.
    ///
    /// Fails with [`QueueError::Cancelled`] if `cancel` fires while waiting; nothing is removed.
    pub fn take(&self, cancel: &CancellationToken) -> Result<E> {
        let state = self.lock();
        let mut state = self
            .wait_until(state, Waiting::ForData, None, cancel)?
            .ok_or(QueueError::Cancelled)?;
        let head = state.elements.pop_front().ok_or(QueueError::EmptyQueue)?;
        self.monitor.signal_space(&mut state, 1);
        Ok(head)
    }

    /// Inserts `element` at the tail, waiting at most `timeout` for space.
    ///
    /// Returns `Ok(false)` if no space appeared in time and `Err(QueueError::Cancelled)` if
    /// `cancel` fired first; `element` is dropped in both cases.
    pub fn offer_timeout(
        &self,
        element: E,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        let deadline = Deadline::after(timeout);
        let state = self.lock();
        let Some(mut state) = self.wait_until(state, Waiting::ForSpace, Some(deadline), cancel)?
        else {
            return Ok(false);
        };
        state.elements.push_back(element);
        self.monitor.signal_data(&mut state, 1);
        Ok(true)
    }

    /// Removes and returns the head, waiting at most `timeout` for data.
    ///
    /// Returns `Ok(None)` if nothing arrived in time and `Err(QueueError::Cancelled)` if `cancel`
    /// fired first.
    pub fn poll_timeout(&self, timeout: Duration, cancel: &CancellationToken) -> Result<Option<E>> {
        let deadline = Deadline::after(timeout);
        let state = self.lock();
        let Some(mut state) = self.wait_until(state, Waiting::ForData, Some(deadline), cancel)?
        else {
            return Ok(None);
        };
        let head = state.elements.pop_front();
        if head.is_some() {
            self.monitor.signal_space(&mut state, 1);
        }
        Ok(head)
    }

    /// Waits until the condition described by `waiting` holds.
    ///
    /// Returns the guard with the condition satisfied, `Ok(None)` once `deadline` passes, or
    /// `Err(Cancelled)`. The predicate is re-checked after every wakeup, before the deadline or
    /// the token, so a signal that arrives together with a timeout is never dropped.
    fn wait_until<'a>(
        &'a self,
        mut state: MutexGuard<'a, State<E>>,
        waiting: Waiting,
        deadline: Option<Deadline>,
        cancel: &CancellationToken,
    ) -> Result<Option<MutexGuard<'a, State<E>>>> {
        let (condvar, ready): (&Condvar, fn(&Self, &State<E>) -> bool) = match waiting {
            Waiting::ForSpace => (&self.monitor.space_available, Self::has_space),
            Waiting::ForData => (&self.monitor.data_available, Self::has_data),
        };
        let mut registration = None;
        loop {
            if ready(self, &state) {
                return Ok(Some(state));
            }
            if registration.is_none() {
                let waker: Arc<dyn Wake> = self.monitor.clone();
                registration = Some(cancel.register(waker));
            }
            if cancel.is_cancelled() {
                debug!(?waiting, len = state.elements.len(), "wait cancelled");
                return Err(QueueError::Cancelled);
            }
            trace!(
                ?waiting,
                capacity = self.capacity,
                len = state.elements.len(),
                "suspending"
            );
            state = match deadline {
                None => condvar.wait(state).unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let Some(remaining) = deadline.remaining() else {
                        debug!(?waiting, len = state.elements.len(), "wait timed out");
                        return Ok(None);
                    };
                    let (state, _) = condvar
                        .wait_timeout(state, remaining)
                        .unwrap_or_else(PoisonError::into_inner);
                    state
                }
            };
            trace!(?waiting, len = state.elements.len(), "woken");
        }
    }
}

impl<E> Default for BoundedBlockingQueue<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> std::fmt::Debug for BoundedBlockingQueue<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedBlockingQueue")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish()
    }
}

impl<'a, E: Clone> IntoIterator for &'a BoundedBlockingQueue<E> {
    type Item = E;
    type IntoIter = std::vec::IntoIter<E>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
