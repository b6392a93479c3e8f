use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::support::helpers::{init_tracing, options, wait_for_completed, RecordingProcessor};
use anyhow::Result;
use queue_worker::{
    ItemProcessor, ProcessError, ProcessFuture, QueueError, QueueStore, QueueWorker,
};
use tokio_util::sync::CancellationToken;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failing_item_does_not_stop_later_items() -> Result<()> {
    init_tracing();
    let processor = RecordingProcessor::failing_on(&["x"]);
    let store = Arc::new(QueueStore::new());
    let mut worker = QueueWorker::new(processor.clone(), store.clone(), options(1)?);
    worker.start()?;

    store.enqueue("x".to_string())?;
    store.enqueue("y".to_string())?;

    let telemetry = worker.telemetry();
    wait_for_completed(&telemetry, 2, Duration::from_secs(5)).await?;
    worker.stop().await?;

    assert_eq!(processor.seen(), vec!["x", "y"]);
    let snapshot = telemetry.snapshot();
    assert_eq!(snapshot.failed, 1);
    assert_eq!(snapshot.succeeded, 1);
    assert_eq!(snapshot.coordination_faults, 0);
    assert_eq!(telemetry.in_flight(), 0);
    Ok(())
}

/// Panics on odd items, succeeds on even ones.
#[derive(Clone, Default)]
struct OddPanicProcessor {
    succeeded: Arc<AtomicUsize>,
}

impl ItemProcessor for OddPanicProcessor {
    type Item = u32;

    fn process(&self, item: u32, _token: CancellationToken) -> ProcessFuture<'_> {
        Box::pin(async move {
            tokio::task::yield_now().await;
            if item % 2 == 1 {
                panic!("odd item {item}");
            }
            self.succeeded.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn processor_panics_are_contained() -> Result<()> {
    init_tracing();
    let processor = OddPanicProcessor::default();
    let store = Arc::new(QueueStore::new());
    let mut worker = QueueWorker::new(processor.clone(), store.clone(), options(2)?);
    worker.start()?;

    for item in 0..10u32 {
        store.enqueue(item)?;
    }

    let telemetry = worker.telemetry();
    wait_for_completed(&telemetry, 10, Duration::from_secs(5)).await?;
    worker
        .stop()
        .await
        .expect("contained panics should not fail stop");

    assert_eq!(processor.succeeded.load(Ordering::SeqCst), 5);
    assert_eq!(telemetry.panicked(), 5);
    assert_eq!(telemetry.coordination_faults(), 0);
    assert_eq!(telemetry.in_flight(), 0);
    Ok(())
}

#[tokio::test]
async fn absent_item_is_rejected_by_the_store() -> Result<()> {
    init_tracing();
    let store: QueueStore<String> = QueueStore::new();
    store.enqueue("kept".to_string())?;

    let err = store
        .enqueue(None)
        .expect_err("absent item should be rejected");
    assert_eq!(err, QueueError::InvalidArgument("item"));
    assert_eq!(format!("{err}"), "invalid argument: item must be present");
    assert_eq!(store.len(), 1);
    assert_eq!(store.try_dequeue().as_deref(), Some("kept"));
    Ok(())
}

#[tokio::test]
async fn absent_item_is_rejected_by_process_item() -> Result<()> {
    init_tracing();
    let processor = RecordingProcessor::default();
    let worker = QueueWorker::new(
        processor.clone(),
        Arc::new(QueueStore::new()),
        options(1)?,
    );

    let err = worker
        .process_item(None, CancellationToken::new())
        .await
        .expect_err("absent item should be rejected");
    assert_eq!(err, QueueError::InvalidArgument("item"));
    assert!(processor.seen().is_empty());
    assert_eq!(worker.telemetry().completed(), 0);
    Ok(())
}

#[test]
fn process_error_keeps_its_cause() {
    let err: ProcessError = anyhow::anyhow!("disk full").into();
    assert_eq!(format!("{err}"), "item processing failed: disk full");
    assert_eq!(err.into_source().to_string(), "disk full");
}
