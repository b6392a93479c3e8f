use super::provider::{QueueProvider, SignalFuture};
use crate::error::QueueError;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::futures::Notified;
use tokio::sync::Notify;

/// Thread-safe FIFO of pending items paired with an auto-resetting wake signal.
///
/// Every successful [`QueueStore::enqueue`] posts the signal. The signal holds at most one
/// permit, so several posts before a wait collapse into a single wakeup: waiters must treat it
/// as "data may be available, recheck" rather than as a count.
pub struct QueueStore<T> {
    items: Mutex<VecDeque<T>>,
    signal: Notify,
}

impl<T> QueueStore<T> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            signal: Notify::new(),
        }
    }

    /// Appends `item` to the tail and posts the enqueue signal.
    ///
    /// Passing `None` is rejected with [`QueueError::InvalidArgument`] and leaves the queue
    /// untouched.
    pub fn enqueue(&self, item: impl Into<Option<T>>) -> Result<(), QueueError> {
        let item = item.into().ok_or(QueueError::InvalidArgument("item"))?;
        self.lock().push_back(item);
        self.signal.notify_one();
        Ok(())
    }

    /// Removes and returns the head of the queue without blocking.
    pub fn try_dequeue(&self) -> Option<T> {
        self.lock().pop_front()
    }

    /// Drops every queued item. Items already dequeued are unaffected and the signal is left
    /// as is.
    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Resolves once the enqueue signal has been posted, consuming the stored permit.
    pub fn notified(&self) -> Notified<'_> {
        self.signal.notified()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        // A panic while holding the lock cannot leave the deque half-mutated.
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Default for QueueStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> QueueProvider for QueueStore<T> {
    type Item = T;

    fn enqueue(&self, item: Option<T>) -> Result<(), QueueError> {
        QueueStore::enqueue(self, item)
    }

    fn try_dequeue(&self) -> Option<T> {
        QueueStore::try_dequeue(self)
    }

    fn clear(&self) {
        QueueStore::clear(self)
    }

    fn len(&self) -> usize {
        QueueStore::len(self)
    }

    fn notified(&self) -> SignalFuture<'_> {
        Box::pin(QueueStore::notified(self))
    }
}
