use crate::reliability::{Cancellation, MetricsError, RetryError};
use crate::sender::StoreError;
use crate::wire::EncodeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Invalid queue options: {0}")]
    InvalidOptions(String),
    /// Building the write request failed; never retried.
    #[error("Failed to build write request: {0}")]
    Encode(#[from] EncodeError),
    /// The write client returned a non-recoverable error.
    #[error("Non-recoverable store error: {0}")]
    Store(#[from] StoreError),
    #[error("{0}")]
    Cancelled(#[from] Cancellation),
    #[error("Shard task failed: {0}")]
    ShardTask(#[from] tokio::task::JoinError),
    #[error("Metrics error: {0}")]
    Metrics(#[from] MetricsError),
}

impl QueueError {
    /// True when the send was abandoned because its context was cancelled or timed out.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, QueueError::Cancelled(_))
    }
}

impl From<RetryError> for QueueError {
    fn from(err: RetryError) -> Self {
        match err {
            RetryError::Fatal(err) => QueueError::Store(err),
            RetryError::Cancelled(cause) => QueueError::Cancelled(cause),
        }
    }
}
