//! Queue worker orchestration.
//!
//! `QueueWorker` owns the lifecycle (start, stop, drain) while the dispatch loop defined here
//! does the coordination: it waits on the enqueue signal, the run token, and the slot-freed
//! signal, prunes finished operations, and dispatches queued items while a slot is free.

use super::processor::ItemProcessor;
use super::shared::{panic_message, WorkerShared};
use crate::error::QueueError;
use crate::queue::provider::QueueProvider;
use crate::queue::store::QueueStore;
use crate::runtime::config::WorkerOptions;
use crate::runtime::telemetry::{self, Telemetry};
use anyhow::{bail, Context, Result};
use futures::future::join_all;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::select;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

/// Background consumer that drains a [`QueueProvider`] (a [`QueueStore`] unless stated
/// otherwise) into an [`ItemProcessor`], keeping at most `max_worker_tasks` items in flight.
pub struct QueueWorker<P, Q = QueueStore<<P as ItemProcessor>::Item>>
where
    P: ItemProcessor,
    Q: QueueProvider<Item = P::Item>,
{
    options: WorkerOptions,
    store: Arc<Q>,
    shared: WorkerShared<P>,
    shutdown_root: CancellationToken,
    run: Option<RunHandles>,
}

struct RunHandles {
    run_token: CancellationToken,
    dispatch_handle: JoinHandle<()>,
    metrics_handle: JoinHandle<()>,
}

impl<P, Q> QueueWorker<P, Q>
where
    P: ItemProcessor,
    Q: QueueProvider<Item = P::Item>,
{
    /// Creates a stopped worker with its own root cancellation token.
    pub fn new(processor: P, store: Arc<Q>, options: WorkerOptions) -> Self {
        Self::with_cancellation_token(processor, store, options, CancellationToken::new())
    }

    /// Creates a stopped worker whose per-run tokens are children of `shutdown_token`.
    pub fn with_cancellation_token(
        processor: P,
        store: Arc<Q>,
        options: WorkerOptions,
        shutdown_token: CancellationToken,
    ) -> Self {
        debug_assert!(
            options.validate().is_ok(),
            "WorkerOptions should have been validated at construction time"
        );
        let telemetry = Arc::new(Telemetry::default());
        Self {
            options,
            store,
            shared: WorkerShared::new(Arc::new(processor), telemetry),
            shutdown_root: shutdown_token,
            run: None,
        }
    }

    pub fn options(&self) -> &WorkerOptions {
        &self.options
    }

    /// The queue this worker drains. Producers enqueue through it.
    pub fn store(&self) -> &Arc<Q> {
        &self.store
    }

    pub fn processor(&self) -> &Arc<P> {
        &self.shared.processor
    }

    pub fn telemetry(&self) -> Arc<Telemetry> {
        self.shared.telemetry.clone()
    }

    pub fn is_running(&self) -> bool {
        self.run.is_some()
    }

    /// Number of processing operations currently executing.
    pub fn active_operations(&self) -> usize {
        self.shared.telemetry.in_flight()
    }

    /// Replaces the root shutdown token used to derive per-run cancellation tokens.
    /// This must only be called while the worker is stopped.
    pub fn replace_shutdown_root(&mut self, shutdown: CancellationToken) {
        debug_assert!(
            self.run.is_none(),
            "shutdown token should not change while the worker is running"
        );
        self.shutdown_root = shutdown;
    }

    /// Spawns the dispatch loop and the metrics reporter.
    ///
    /// Must be called from within a tokio runtime. Returns an error if the worker is already
    /// running; the existing run is left untouched.
    pub fn start(&mut self) -> Result<()> {
        if self.run.is_some() {
            bail!("queue worker already running");
        }

        let max_worker_tasks = self.options.max_worker_tasks();
        tracing::info!(max_worker_tasks, queued = self.store.len(), "starting queue worker");

        let run_token = self.shutdown_root.child_token();
        let metrics_handle = telemetry::spawn_metrics_reporter(
            self.shared.telemetry.clone(),
            self.store.clone(),
            run_token.clone(),
            self.options.metrics_interval(),
        );
        let dispatch = DispatchLoop {
            store: self.store.clone(),
            shared: self.shared.clone(),
            max_worker_tasks,
            token: run_token.clone(),
            active: Vec::with_capacity(max_worker_tasks),
            retiring: Vec::new(),
        };
        let dispatch_handle = tokio::spawn(dispatch.run());

        self.run = Some(RunHandles {
            run_token,
            dispatch_handle,
            metrics_handle,
        });

        tracing::info!("started queue worker");
        Ok(())
    }

    /// Stops dispatching and waits until every dispatched item has finished processing.
    ///
    /// Items still sitting in the store are left there. Calling `stop` on a stopped worker is
    /// a no-op.
    ///
    /// Cancel-safe: if the returned future is dropped early, the worker keeps reporting
    /// itself as running (and refuses `start`) until a later `stop` sees the drain through.
    pub async fn stop(&mut self) -> Result<()> {
        let Some(run) = self.run.as_mut() else {
            return Ok(());
        };

        let active = self.shared.telemetry.in_flight();
        tracing::info!(active, "stopping queue worker");

        run.run_token.cancel();
        let dispatch_result = (&mut run.dispatch_handle).await;
        // The dispatch handle has resolved and must not be polled again.
        let Some(run) = self.run.take() else {
            return Ok(());
        };

        if let Err(err) = run.metrics_handle.await {
            tracing::warn!(error = %err, "metrics reporter task panicked");
        }

        dispatch_result.context("queue worker dispatch loop terminated abnormally")?;

        tracing::info!(queued = self.store.len(), "stopped queue worker");
        Ok(())
    }

    /// Runs a single item through the processor exactly as a dispatched item would be.
    ///
    /// Fails with [`QueueError::InvalidArgument`] for `None`. Processing errors and panics are
    /// logged and swallowed.
    pub async fn process_item(
        &self,
        item: impl Into<Option<P::Item>>,
        token: CancellationToken,
    ) -> Result<(), QueueError> {
        self.shared.process_item(item, token).await
    }
}

impl<P, Q> Drop for QueueWorker<P, Q>
where
    P: ItemProcessor,
    Q: QueueProvider<Item = P::Item>,
{
    fn drop(&mut self) {
        if let Some(run) = self.run.as_ref() {
            run.run_token.cancel();
        }
    }
}

struct DispatchLoop<P: ItemProcessor, Q> {
    store: Arc<Q>,
    shared: WorkerShared<P>,
    max_worker_tasks: usize,
    token: CancellationToken,
    active: Vec<ActiveOperation>,
    retiring: Vec<JoinHandle<()>>,
}

/// A dispatched item. `released` flips once its slot is freed, which may be slightly before
/// the task itself reports finished.
struct ActiveOperation {
    handle: JoinHandle<()>,
    released: Arc<AtomicBool>,
}

impl ActiveOperation {
    fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

impl<P, Q> DispatchLoop<P, Q>
where
    P: ItemProcessor,
    Q: QueueProvider<Item = P::Item>,
{
    async fn run(mut self) {
        loop {
            // Items left over from a previous run posted no fresh signal.
            let step = std::panic::catch_unwind(AssertUnwindSafe(|| self.dispatch_ready()));
            if let Err(panic_payload) = step {
                self.shared.telemetry.record_coordination_fault();
                tracing::error!(
                    panic = %panic_message(panic_payload.as_ref()),
                    "error occurred while dispatching queued items"
                );
            }

            if self.token.is_cancelled() {
                break;
            }

            select! {
                _ = self.store.notified() => {}
                _ = self.token.cancelled() => {}
                _ = self.shared.slot_freed.notified() => {}
            }
        }

        self.drain().await;
    }

    fn dispatch_ready(&mut self) {
        self.prune_finished();

        while self.active.len() < self.max_worker_tasks {
            let Some(item) = self.store.try_dequeue() else {
                break;
            };

            let shared = self.shared.clone();
            let token = self.token.clone();
            let released = Arc::new(AtomicBool::new(false));
            let task_released = released.clone();
            self.shared.telemetry.record_dispatched();
            let handle = tokio::spawn(async move {
                shared.run_item(item, token, task_released).await;
            });
            self.active.push(ActiveOperation { handle, released });
        }
    }

    fn prune_finished(&mut self) {
        let (released, still_active): (Vec<_>, Vec<_>) = std::mem::take(&mut self.active)
            .into_iter()
            .partition(ActiveOperation::is_released);
        self.active = still_active;
        self.retiring
            .extend(released.into_iter().map(|operation| operation.handle));

        let telemetry = &self.shared.telemetry;
        self.retiring.retain_mut(|handle| {
            if !handle.is_finished() {
                return true;
            }
            if let Some(Err(err)) = handle.now_or_never() {
                report_task_failure(telemetry, &err);
            }
            false
        });
    }

    async fn drain(self) {
        let pending = self.active.len();
        if pending > 0 {
            tracing::info!(pending, "waiting for in-flight items to finish");
        }

        let handles = self
            .active
            .into_iter()
            .map(|operation| operation.handle)
            .chain(self.retiring);
        for result in join_all(handles).await {
            if let Err(err) = result {
                report_task_failure(&self.shared.telemetry, &err);
            }
        }
    }
}

fn report_task_failure(telemetry: &Telemetry, err: &JoinError) {
    telemetry.record_coordination_fault();
    tracing::error!(error = %err, "processing task terminated abnormally");
}
