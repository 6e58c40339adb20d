use chrono::TimeDelta;
use thiserror::Error;

/// A store failure the queue is allowed to retry.
///
/// `retry_after` carries the delay the server asked for. Zero means "use the
/// regular backoff"; a negative delay (a `Retry-After` date already in the past)
/// is ignored by the retry driver.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct RecoverableError {
    message: String,
    retry_after: TimeDelta,
}

impl RecoverableError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retry_after: TimeDelta::zero(),
        }
    }

    pub fn with_retry_after(mut self, retry_after: TimeDelta) -> Self {
        self.retry_after = retry_after;
        self
    }

    pub fn retry_after(&self) -> TimeDelta {
        self.retry_after
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Errors returned by a [`WriteClient`](super::WriteClient) store call.
///
/// Only [`StoreError::Recoverable`] is retried; everything else aborts the send.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Recoverable error: {0}")]
    Recoverable(#[from] RecoverableError),
    #[error("HTTP error: {status} - {message}")]
    Http { status: u16, message: String },
    #[error("Transport error: {0}")]
    Transport(String),
}

impl StoreError {
    pub fn as_recoverable(&self) -> Option<&RecoverableError> {
        match self {
            StoreError::Recoverable(err) => Some(err),
            _ => None,
        }
    }

    pub fn is_recoverable(&self) -> bool {
        self.as_recoverable().is_some()
    }
}
