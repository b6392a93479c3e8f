use crate::runtime::telemetry;
use anyhow::{bail, Context, Result};
use std::env;
use std::num::NonZeroUsize;
use std::time::Duration;

/// Environment variable overriding [`WorkerOptions::max_worker_tasks`].
pub const MAX_TASKS_ENV: &str = "QUEUE_WORKER_MAX_TASKS";
/// Environment variable overriding [`WorkerOptions::metrics_interval`], in whole seconds.
pub const METRICS_INTERVAL_ENV: &str = "QUEUE_WORKER_METRICS_INTERVAL_SECS";

/// Runtime configuration for the queue worker.
///
/// All instances are constructed via [`WorkerOptions::builder`], [`WorkerOptions::new`], or
/// [`Default`], so invariants hold before the worker observes the values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerOptions {
    max_worker_tasks: usize,
    metrics_interval: Duration,
}

pub struct WorkerOptionsParams {
    pub max_worker_tasks: usize,
    pub metrics_interval: Duration,
}

impl WorkerOptions {
    /// Returns a builder to incrementally construct and validate options.
    pub fn builder() -> WorkerOptionsBuilder {
        WorkerOptionsBuilder::default()
    }

    /// Constructs options directly from the provided values, running validation.
    pub fn new(params: WorkerOptionsParams) -> Result<Self> {
        let WorkerOptionsParams {
            max_worker_tasks,
            metrics_interval,
        } = params;

        let options = Self {
            max_worker_tasks,
            metrics_interval,
        };

        options.validate()?;
        Ok(options)
    }

    /// Builds options from `QUEUE_WORKER_*` environment variables, falling back to defaults for
    /// anything unset.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = Self::builder();

        if let Some(raw) = lookup(MAX_TASKS_ENV) {
            let tasks = raw
                .trim()
                .parse::<usize>()
                .with_context(|| format!("{MAX_TASKS_ENV} must be a positive integer, got {raw:?}"))?;
            builder = builder.max_worker_tasks(tasks);
        }

        if let Some(raw) = lookup(METRICS_INTERVAL_ENV) {
            let secs = raw.trim().parse::<u64>().with_context(|| {
                format!("{METRICS_INTERVAL_ENV} must be a number of seconds, got {raw:?}")
            })?;
            builder = builder.metrics_interval(Duration::from_secs(secs));
        }

        builder.build()
    }

    /// Maximum number of processing operations allowed in flight at once.
    pub fn max_worker_tasks(&self) -> usize {
        self.max_worker_tasks
    }

    /// Interval used by the telemetry reporter.
    pub fn metrics_interval(&self) -> Duration {
        self.metrics_interval
    }

    /// Performs validation on an existing options instance.
    pub fn validate(&self) -> Result<()> {
        if self.max_worker_tasks == 0 {
            bail!("max_worker_tasks must be greater than 0");
        }

        if self.metrics_interval.is_zero() {
            bail!("metrics_interval must be greater than 0");
        }

        Ok(())
    }
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            max_worker_tasks: default_max_worker_tasks(),
            metrics_interval: telemetry::DEFAULT_METRICS_INTERVAL,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct WorkerOptionsBuilder {
    max_worker_tasks: Option<usize>,
    metrics_interval: Option<Duration>,
}

impl WorkerOptionsBuilder {
    pub fn max_worker_tasks(mut self, tasks: usize) -> Self {
        self.max_worker_tasks = Some(tasks);
        self
    }

    pub fn metrics_interval(mut self, interval: Duration) -> Self {
        self.metrics_interval = Some(interval);
        self
    }

    pub fn build(self) -> Result<WorkerOptions> {
        let params = WorkerOptionsParams {
            max_worker_tasks: self
                .max_worker_tasks
                .unwrap_or_else(default_max_worker_tasks),
            metrics_interval: self
                .metrics_interval
                .unwrap_or(telemetry::DEFAULT_METRICS_INTERVAL),
        };

        WorkerOptions::new(params)
    }
}

/// Host parallelism, or 1 when the platform cannot report it.
fn default_max_worker_tasks() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}
