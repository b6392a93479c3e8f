use crate::queue::provider::QueueProvider;
use crate::{ItemProcessor, QueueStore, QueueWorker, WorkerOptions};
use anyhow::Result;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Hosts a [`QueueWorker`] for a process: start/stop entry points plus Ctrl-C handling.
pub struct Runner<P, Q = QueueStore<<P as ItemProcessor>::Item>>
where
    P: ItemProcessor,
    Q: QueueProvider<Item = P::Item>,
{
    worker: QueueWorker<P, Q>,
    shutdown: CancellationToken,
}

impl<P, Q> Runner<P, Q>
where
    P: ItemProcessor,
    Q: QueueProvider<Item = P::Item>,
{
    /// Creates a new runner and wires a root [`CancellationToken`] that propagates into every
    /// run of the worker and, through it, into each processor call.
    pub fn new(processor: P, store: Arc<Q>, options: WorkerOptions) -> Self {
        let shutdown = CancellationToken::new();
        let worker =
            QueueWorker::with_cancellation_token(processor, store, options, shutdown.clone());
        Self { worker, shutdown }
    }

    /// Clone of the root token. Cancelling it makes [`Runner::run_until_ctrl_c`] stop the worker.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn worker(&self) -> &QueueWorker<P, Q> {
        &self.worker
    }

    /// Starts the worker. Does nothing if it is already running.
    ///
    /// A root token left cancelled (by an interrupted `stop`, or by a caller while the worker
    /// was idle) is replaced first, so the new run is not cancelled at birth. Earlier clones
    /// from [`Runner::cancellation_token`] no longer reach the new run.
    pub fn start(&mut self) -> Result<()> {
        if self.worker.is_running() {
            return Ok(());
        }

        if self.shutdown.is_cancelled() {
            self.reset_root_token();
        }
        self.worker.start()
    }

    /// Stops the worker gracefully, draining in-flight items. Does nothing if it is stopped.
    pub async fn stop(&mut self) -> Result<()> {
        if !self.worker.is_running() {
            return Ok(());
        }

        self.shutdown.cancel();
        let stopped = self.worker.stop().await;
        self.reset_root_token();
        stopped
    }

    /// Starts the worker and keeps it running until SIGINT arrives or the root token is
    /// cancelled, then stops it and waits for the drain.
    pub async fn run_until_ctrl_c(&mut self) -> Result<()> {
        self.start()?;
        tracing::info!("queue worker running until Ctrl-C or cancellation");

        tokio::select! {
            _ = signal::ctrl_c() => {
                tracing::info!("received Ctrl-C, draining queue worker");
            }
            _ = self.shutdown.cancelled() => {
                tracing::info!("runner token cancelled, draining queue worker");
            }
        }

        self.stop().await
    }

    /// A cancelled root would cancel every later run at birth.
    fn reset_root_token(&mut self) {
        let fresh = CancellationToken::new();
        self.worker.replace_shutdown_root(fresh.clone());
        self.shutdown = fresh;
    }
}
