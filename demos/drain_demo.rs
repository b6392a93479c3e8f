//! Feeds a worker from a producer task and shuts down once the queue is drained or on Ctrl-C.
//!
//! ```text
//! QUEUE_WORKER_MAX_TASKS=3 RUST_LOG=info cargo run --example drain_demo
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use queue_worker::{
    init_tracing, CancellationToken, ItemProcessor, ProcessFuture, QueueStore, Runner,
    WorkerOptions,
};
use tokio::time::sleep;

const JOBS: u64 = 24;

#[derive(Debug)]
struct Job {
    id: u64,
    cost: Duration,
}

struct SimulatedProcessor;

impl ItemProcessor for SimulatedProcessor {
    type Item = Job;

    fn process(&self, job: Job, token: CancellationToken) -> ProcessFuture<'_> {
        Box::pin(async move {
            tokio::select! {
                _ = sleep(job.cost) => {}
                _ = token.cancelled() => {
                    tracing::warn!(job = job.id, "job interrupted by shutdown");
                    return Ok(());
                }
            }
            if job.id % 7 == 0 {
                return Err(anyhow!("job {} hit a simulated fault", job.id).into());
            }
            tracing::info!(job = job.id, "job done");
            Ok(())
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let options = WorkerOptions::from_env()?;
    let store = Arc::new(QueueStore::new());
    let mut runner = Runner::new(SimulatedProcessor, store.clone(), options);

    let telemetry = runner.worker().telemetry();
    let shutdown = runner.cancellation_token();
    let producer = tokio::spawn(async move {
        for id in 1..=JOBS {
            store.enqueue(Job {
                id,
                cost: Duration::from_millis(50 + (id % 5) * 40),
            })?;
            sleep(Duration::from_millis(20)).await;
        }
        while telemetry.completed() < JOBS && !shutdown.is_cancelled() {
            sleep(Duration::from_millis(25)).await;
        }
        shutdown.cancel();
        anyhow::Ok(())
    });

    runner.run_until_ctrl_c().await?;
    producer.await??;

    let snapshot = runner.worker().telemetry().snapshot();
    tracing::info!(
        dispatched = snapshot.dispatched,
        succeeded = snapshot.succeeded,
        failed = snapshot.failed,
        "demo finished"
    );
    Ok(())
}
