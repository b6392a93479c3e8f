use crate::error::QueueError;
use crate::runtime::telemetry::Telemetry;
use crate::worker::processor::ItemProcessor;
use futures::FutureExt;
use std::any::Any;
use std::fmt::Debug;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// State shared between the dispatch loop and every processing task it spawns.
pub(crate) struct WorkerShared<P: ItemProcessor> {
    pub(super) processor: Arc<P>,
    pub(super) slot_freed: Arc<Notify>,
    pub(super) telemetry: Arc<Telemetry>,
}

impl<P: ItemProcessor> WorkerShared<P> {
    pub(crate) fn new(processor: Arc<P>, telemetry: Arc<Telemetry>) -> Self {
        Self {
            processor,
            slot_freed: Arc::new(Notify::new()),
            telemetry,
        }
    }

    /// Validates `item`, then hands it to [`Self::run_item`].
    pub(crate) async fn process_item(
        &self,
        item: impl Into<Option<P::Item>>,
        token: CancellationToken,
    ) -> Result<(), QueueError> {
        let item = item.into().ok_or(QueueError::InvalidArgument("item"))?;
        self.run_item(item, token, Arc::default()).await;
        Ok(())
    }

    /// Invokes the processor for one item. Errors and panics stop here; on every exit path
    /// `released` is set and then the slot-freed signal is posted, exactly once.
    pub(super) async fn run_item(
        &self,
        item: P::Item,
        token: CancellationToken,
        released: Arc<AtomicBool>,
    ) {
        let _slot = self.occupy_slot(released);
        let label = describe(&item);
        let processor = &self.processor;

        let outcome = AssertUnwindSafe(async move { processor.process(item, token).await })
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(())) => {
                self.telemetry.record_success();
                tracing::debug!(item = %label, "processed queued item");
            }
            Ok(Err(err)) => {
                self.telemetry.record_failure();
                tracing::error!(
                    item = %label,
                    error = %err,
                    "an error occurred while processing item"
                );
            }
            Err(panic_payload) => {
                self.telemetry.record_panic();
                let panic_msg = panic_message(panic_payload.as_ref());
                tracing::error!(
                    item = %label,
                    panic = %panic_msg,
                    "item processor panicked"
                );
            }
        }
    }

    fn occupy_slot(&self, released: Arc<AtomicBool>) -> SlotGuard {
        self.telemetry.record_started();
        SlotGuard {
            released,
            slot_freed: Arc::clone(&self.slot_freed),
            telemetry: Arc::clone(&self.telemetry),
        }
    }
}

impl<P: ItemProcessor> Clone for WorkerShared<P> {
    fn clone(&self) -> Self {
        Self {
            processor: Arc::clone(&self.processor),
            slot_freed: Arc::clone(&self.slot_freed),
            telemetry: Arc::clone(&self.telemetry),
        }
    }
}

/// Held for the lifetime of one processing operation; releasing it wakes the dispatch loop.
pub(super) struct SlotGuard {
    released: Arc<AtomicBool>,
    slot_freed: Arc<Notify>,
    telemetry: Arc<Telemetry>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.released.store(true, Ordering::SeqCst);
        self.telemetry.record_finished();
        self.slot_freed.notify_one();
    }
}

const UNPRINTABLE_ITEM: &str = "<unprintable item>";

/// `Debug` rendering of `item` for log fields. A panicking `Debug` impl yields a placeholder
/// so the item still reaches the processor.
fn describe<T: Debug>(item: &T) -> String {
    std::panic::catch_unwind(AssertUnwindSafe(|| format!("{item:?}")))
        .unwrap_or_else(|_| UNPRINTABLE_ITEM.to_string())
}

pub(super) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
