use anyhow::Error as AnyError;
use core::fmt;

/// Rejections raised by the queue and worker entry points before any state changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// An absent item was handed to `enqueue` or `process_item`.
    InvalidArgument(&'static str),
}

impl fmt::Display for QueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument(name) => write!(f, "invalid argument: {name} must be present"),
        }
    }
}

impl std::error::Error for QueueError {}

/// Error surfaced by an [`ItemProcessor`](crate::ItemProcessor) for a single item.
///
/// The worker logs and counts it, then moves on. It is never propagated to the
/// caller of `start`/`stop`.
#[derive(Debug)]
pub struct ProcessError {
    source: AnyError,
}

impl ProcessError {
    pub fn new(source: AnyError) -> Self {
        Self { source }
    }

    pub fn msg(message: impl fmt::Display + fmt::Debug + Send + Sync + 'static) -> Self {
        Self::new(AnyError::msg(message))
    }

    pub fn into_source(self) -> AnyError {
        self.source
    }
}

impl From<AnyError> for ProcessError {
    fn from(source: AnyError) -> Self {
        Self::new(source)
    }
}

impl fmt::Display for ProcessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "item processing failed: {}", self.source)
    }
}

impl std::error::Error for ProcessError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&*self.source)
    }
}
