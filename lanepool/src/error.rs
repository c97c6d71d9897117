//! Error types shared by the pools.

/// Construction-time failures.
///
/// Returned immediately by constructors and helpers; never produced by a
/// running lane.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl PoolError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Validate a lane count, rejecting zero.
    pub(crate) fn check_lane_count(lane_count: usize) -> Result<usize, Self> {
        if lane_count == 0 {
            return Err(Self::invalid_argument(
                "lane_count must be a positive integer",
            ));
        }
        Ok(lane_count)
    }
}

/// Outcome of a submitted item that did not produce a value.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError<E> {
    /// The queue was at capacity when the item was offered.
    #[error("queue is full")]
    QueueFull,

    /// The pool was shut down before the item was offered.
    #[error("pool is shut down")]
    Closed,

    /// The processor returned an error for this item.
    #[error("processing failed: {0}")]
    Processing(E),

    /// The processor panicked while handling this item.
    #[error("processor panicked: {0}")]
    Panicked(String),

    /// The completion was dropped without being settled (runtime teardown).
    #[error("completion abandoned before the item was processed")]
    Abandoned,
}

impl<E> SubmitError<E> {
    /// Backpressure rejections are recoverable: the caller may offer the item again.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::QueueFull | Self::Closed)
    }

    pub fn into_processing(self) -> Option<E> {
        match self {
            Self::Processing(e) => Some(e),
            _ => None,
        }
    }
}

/// Failure of a single self-service processing step.
#[derive(Debug, thiserror::Error)]
pub enum StepError<E> {
    #[error("processing failed: {0}")]
    Failed(E),

    #[error("processor panicked: {0}")]
    Panicked(String),
}

/// Extract a readable message from a caught panic payload.
pub(crate) fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
