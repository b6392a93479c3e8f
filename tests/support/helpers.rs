use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::{Duration, Instant},
};

use anyhow::{anyhow, bail, Result};
use once_cell::sync::Lazy;
use queue_worker::{ItemProcessor, ProcessFuture, Telemetry, WorkerOptions};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

static TRACING_SUBSCRIBER: Lazy<()> = Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
});

pub fn init_tracing() {
    Lazy::force(&TRACING_SUBSCRIBER);
}

pub fn options(max_worker_tasks: usize) -> Result<WorkerOptions> {
    WorkerOptions::builder()
        .max_worker_tasks(max_worker_tasks)
        .metrics_interval(Duration::from_millis(50))
        .build()
}

/// Records every item it sees. Items listed in `failing` are recorded and then rejected with
/// an error.
#[derive(Clone, Default)]
pub struct RecordingProcessor {
    seen: Arc<Mutex<Vec<String>>>,
    failing: Arc<Vec<String>>,
}

impl RecordingProcessor {
    pub fn failing_on(items: &[&str]) -> Self {
        Self {
            seen: Arc::default(),
            failing: Arc::new(items.iter().map(|item| item.to_string()).collect()),
        }
    }

    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().expect("recording lock poisoned").clone()
    }

    pub fn sorted_seen(&self) -> Vec<String> {
        let mut seen = self.seen();
        seen.sort();
        seen
    }
}

impl ItemProcessor for RecordingProcessor {
    type Item = String;

    fn process(&self, item: String, _token: CancellationToken) -> ProcessFuture<'_> {
        Box::pin(async move {
            self.seen
                .lock()
                .expect("recording lock poisoned")
                .push(item.clone());
            if self.failing.contains(&item) {
                return Err(anyhow!("refusing to process {item}").into());
            }
            Ok(())
        })
    }
}

/// Holds every call open until `release` is called or the call's token is cancelled.
#[derive(Clone)]
pub struct GatedProcessor {
    gate: CancellationToken,
    entered: Arc<AtomicUsize>,
    finished: Arc<AtomicUsize>,
    observed_cancellation: Arc<AtomicUsize>,
    honour_cancellation: bool,
}

impl GatedProcessor {
    pub fn new() -> Self {
        Self {
            gate: CancellationToken::new(),
            entered: Arc::default(),
            finished: Arc::default(),
            observed_cancellation: Arc::default(),
            honour_cancellation: false,
        }
    }

    /// Returns early with success once the call's token is cancelled.
    pub fn cancellable() -> Self {
        Self {
            honour_cancellation: true,
            ..Self::new()
        }
    }

    pub fn release(&self) {
        self.gate.cancel();
    }

    pub fn entered(&self) -> usize {
        self.entered.load(Ordering::SeqCst)
    }

    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }

    pub fn observed_cancellation(&self) -> usize {
        self.observed_cancellation.load(Ordering::SeqCst)
    }
}

impl ItemProcessor for GatedProcessor {
    type Item = u64;

    fn process(&self, _item: u64, token: CancellationToken) -> ProcessFuture<'_> {
        Box::pin(async move {
            self.entered.fetch_add(1, Ordering::SeqCst);
            if self.honour_cancellation {
                tokio::select! {
                    _ = self.gate.cancelled() => {}
                    _ = token.cancelled() => {
                        self.observed_cancellation.fetch_add(1, Ordering::SeqCst);
                    }
                }
            } else {
                self.gate.cancelled().await;
            }
            self.finished.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }
}

pub async fn wait_for_completed(
    telemetry: &Arc<Telemetry>,
    expected: u64,
    timeout: Duration,
) -> Result<()> {
    let start = Instant::now();
    loop {
        let completed = telemetry.completed();
        if completed >= expected {
            return Ok(());
        }
        if start.elapsed() > timeout {
            bail!(
                "worker completed {completed} items within {:?}, expected {expected}",
                timeout
            );
        }
        sleep(Duration::from_millis(10)).await;
    }
}

pub async fn wait_for_in_flight(
    telemetry: &Arc<Telemetry>,
    expected: usize,
    timeout: Duration,
) -> Result<()> {
    let start = Instant::now();
    loop {
        let current = telemetry.in_flight();
        if current == expected {
            return Ok(());
        }
        if start.elapsed() > timeout {
            bail!(
                "in-flight count stayed at {current} for {:?}, expected {expected}",
                timeout
            );
        }
        sleep(Duration::from_millis(10)).await;
    }
}
