use crate::error::QueueError;
use core::future::Future;
use core::pin::Pin;

pub type SignalFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// Storage backend the queue worker drains.
///
/// Implementations pair a thread-safe sequence with an auto-reset signal: every successful
/// `enqueue` posts it, and at most one post is remembered while nobody waits. The worker treats
/// a wakeup as "recheck with `try_dequeue`", never as an item count.
pub trait QueueProvider: Send + Sync + 'static {
    type Item: Send + 'static;

    /// Adds `item` and posts the signal. `None` is rejected with
    /// [`QueueError::InvalidArgument`] and must leave the queue untouched.
    fn enqueue(&self, item: Option<Self::Item>) -> Result<(), QueueError>;

    /// Takes the next item without blocking.
    fn try_dequeue(&self) -> Option<Self::Item>;

    /// Drops every pending item. The signal is left as is.
    fn clear(&self);

    /// Pending item count, used for logging and metrics.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolves once the signal has been posted, consuming the remembered post.
    fn notified(&self) -> SignalFuture<'_>;
}
