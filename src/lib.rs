pub mod error;
pub mod queue;
pub mod runtime;
pub mod worker;

pub use error::{ProcessError, QueueError};
pub use queue::provider::{QueueProvider, SignalFuture};
pub use queue::store::QueueStore;
pub use runtime::config::{WorkerOptions, WorkerOptionsBuilder, WorkerOptionsParams};
pub use runtime::runner::Runner;
pub use runtime::telemetry::{init_tracing, Telemetry, TelemetrySnapshot};
pub use tokio_util::sync::CancellationToken;
pub use worker::{ItemProcessor, ProcessFuture, QueueWorker};
