use crate::error::ProcessError;
use core::future::Future;
use core::pin::Pin;
use tokio_util::sync::CancellationToken;

pub type ProcessFuture<'a> = Pin<Box<dyn Future<Output = Result<(), ProcessError>> + Send + 'a>>;

/// Trait implemented by downstream consumers of queued items.
///
/// The worker invokes [`ItemProcessor::process`] once per dequeued item, concurrently up to the
/// configured `max_worker_tasks`. Errors are isolated to the item that raised them.
pub trait ItemProcessor: Send + Sync + 'static {
    type Item: core::fmt::Debug + Send + 'static;

    /// Handles one item. `token` is cancelled when the worker begins shutting down; observing it
    /// is up to the implementation, the worker never aborts a running call.
    fn process(&self, item: Self::Item, token: CancellationToken) -> ProcessFuture<'_>;
}
