use crate::errors::{RecvError, RecvTimeoutError, SendError};
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// What a bounded queue does with a `send` that finds it full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FullPolicy {
    /// The sender waits until the consumer frees a slot.
    #[default]
    Block,
    /// The offered item is rejected with `SendError::Full`.
    DropNewest,
    /// The head item is evicted to make room (keep the freshest frames).
    DropOldest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueuePolicy {
    #[default]
    Unbounded,
    Bounded { capacity: usize, on_full: FullPolicy },
}

impl QueuePolicy {
    /// A capacity of zero means unbounded.
    pub fn bounded(capacity: usize, on_full: FullPolicy) -> Self {
        if capacity == 0 {
            QueuePolicy::Unbounded
        } else {
            QueuePolicy::Bounded { capacity, on_full }
        }
    }

    pub fn capacity(&self) -> Option<usize> {
        match self {
            QueuePolicy::Unbounded => None,
            QueuePolicy::Bounded { capacity, .. } => Some(*capacity),
        }
    }
}

struct State<T> {
    items: VecDeque<T>,
    closed: bool,
    dropped: u64,
}

/// Thread-safe FIFO with a blocking receive, built for exactly one producer
/// and one consumer.
///
/// `send` only blocks for a bounded queue with [`FullPolicy::Block`]. Every
/// mutation happens under one mutex; receivers are woken only by `send` and
/// `close`.
pub struct BlockingQueue<T> {
    state: Mutex<State<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    policy: QueuePolicy,
}

impl<T> Default for BlockingQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> BlockingQueue<T> {
    pub fn new() -> Self {
        Self::with_policy(QueuePolicy::Unbounded)
    }

    pub fn bounded(capacity: usize, on_full: FullPolicy) -> Self {
        Self::with_policy(QueuePolicy::bounded(capacity, on_full))
    }

    pub fn with_policy(policy: QueuePolicy) -> Self {
        let policy = match policy {
            QueuePolicy::Bounded { capacity, on_full } => QueuePolicy::Bounded {
                capacity: capacity.max(1),
                on_full,
            },
            QueuePolicy::Unbounded => QueuePolicy::Unbounded,
        };

        Self {
            state: Mutex::new(State {
                items: VecDeque::with_capacity(policy.capacity().unwrap_or(0)),
                closed: false,
                dropped: 0,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            policy,
        }
    }

    // No operation panics while holding the lock, so a poisoned state is
    // still consistent.
    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append `item` to the tail and wake one blocked receiver.
    pub fn send(&self, item: T) -> Result<(), SendError<T>> {
        let mut state = self.lock();
        if state.closed {
            return Err(SendError::Closed(item));
        }

        let mut evicted = None;
        if let QueuePolicy::Bounded { capacity, on_full } = self.policy
            && state.items.len() >= capacity
        {
            match on_full {
                FullPolicy::Block => {
                    state = self
                        .not_full
                        .wait_while(state, |s| !s.closed && s.items.len() >= capacity)
                        .unwrap_or_else(PoisonError::into_inner);
                    if state.closed {
                        return Err(SendError::Closed(item));
                    }
                }
                FullPolicy::DropNewest => {
                    state.dropped += 1;
                    tracing::trace!(dropped = state.dropped, "Queue full, rejecting newest item");
                    return Err(SendError::Full(item));
                }
                FullPolicy::DropOldest => {
                    evicted = state.items.pop_front();
                    state.dropped += 1;
                    tracing::trace!(dropped = state.dropped, "Queue full, evicting oldest item");
                }
            }
        }

        state.items.push_back(item);
        drop(state);
        self.not_empty.notify_one();
        drop(evicted);
        Ok(())
    }

    /// Block until an item is available, then remove and return the head.
    ///
    /// Ignores `close()`: with no producer left this never returns. Stages
    /// that must observe end-of-stream use [`BlockingQueue::recv`].
    pub fn receive(&self) -> T {
        let mut state = self.lock();
        loop {
            if let Some(item) = state.items.pop_front() {
                drop(state);
                self.not_full.notify_one();
                return item;
            }
            state = self
                .not_empty
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Like `receive`, but returns `RecvError::Closed` once the queue has been
    /// closed and every item sent before the close has been delivered.
    pub fn recv(&self) -> Result<T, RecvError> {
        let mut state = self.lock();
        loop {
            if let Some(item) = state.items.pop_front() {
                drop(state);
                self.not_full.notify_one();
                return Ok(item);
            }
            if state.closed {
                return Err(RecvError::Closed);
            }
            state = self
                .not_empty
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<T, RecvTimeoutError> {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return self.recv().map_err(Into::into);
        };

        let mut state = self.lock();
        loop {
            if let Some(item) = state.items.pop_front() {
                drop(state);
                self.not_full.notify_one();
                return Ok(item);
            }
            if state.closed {
                return Err(RecvTimeoutError::Closed);
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(RecvTimeoutError::Timeout);
            }

            let (guard, _) = self
                .not_empty
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
        }
    }

    pub fn try_receive(&self) -> Option<T> {
        let item = self.lock().items.pop_front();
        if item.is_some() {
            self.not_full.notify_one();
        }
        item
    }

    /// Snapshot only; may be stale as soon as it returns.
    pub fn empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    /// Discard every queued item and return how many were removed.
    ///
    /// Receivers already blocked are NOT woken; they keep waiting for the
    /// next `send`. Senders blocked on a full queue are woken.
    pub fn clear(&self) -> usize {
        let drained: Vec<T> = self.lock().items.drain(..).collect();
        self.not_full.notify_all();
        drained.len()
    }

    /// Mark the queue closed and wake every blocked sender and receiver.
    pub fn close(&self) {
        let mut state = self.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        drop(state);
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Items discarded by a bounded drop policy.
    pub fn dropped(&self) -> u64 {
        self.lock().dropped
    }

    pub fn policy(&self) -> QueuePolicy {
        self.policy
    }

    pub fn capacity(&self) -> Option<usize> {
        self.policy.capacity()
    }
}
