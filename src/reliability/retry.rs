use super::context::{Cancellation, SendContext};
use crate::sender::{RecoverableError, StoreError};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// How a send driven by [`send_with_backoff`] ended, when it did not succeed.
#[derive(Error, Debug)]
pub enum RetryError {
    /// The attempt failed with an error that is not retryable.
    #[error(transparent)]
    Fatal(StoreError),
    /// The context was cancelled or timed out before the send completed.
    #[error(transparent)]
    Cancelled(Cancellation),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffConfig {
    pub min_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            min_backoff: Duration::from_millis(30),
            max_backoff: Duration::from_secs(5),
        }
    }
}

/// Exponential backoff between `min_backoff` and `max_backoff`.
#[derive(Debug, Clone)]
pub struct Backoff {
    current: Duration,
    max: Duration,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            current: config.min_backoff,
            max: config.max_backoff,
        }
    }

    pub fn current(&self) -> Duration {
        self.current
    }

    /// Delay before retrying after `err`.
    ///
    /// A positive server-directed delay replaces the backoff for this retry only;
    /// zero or negative delays fall back to the running backoff.
    pub fn delay_for(&self, err: &RecoverableError) -> Duration {
        let retry_after = err.retry_after();
        match retry_after.to_std() {
            Ok(delay) if !delay.is_zero() => {
                info!(duration = ?delay, "Retrying after duration specified by Retry-After header");
                delay
            }
            Ok(_) => self.current,
            Err(_) => {
                debug!(
                    retry_after_ms = retry_after.num_milliseconds(),
                    "retry-after cannot be in past, retrying using default backoff mechanism"
                );
                self.current
            }
        }
    }

    /// Doubles the backoff, clamped to the maximum.
    pub fn advance(&mut self) {
        self.current = self.current.saturating_mul(2).min(self.max);
    }
}

/// Drives `attempt` until it succeeds, fails fatally, or `ctx` is done.
///
/// Recoverable errors are retried without limit. `attempt` receives the number of
/// previous tries; `on_retry` fires after each completed backoff sleep. Both the
/// in-flight attempt and the sleep are abandoned as soon as `ctx` is done.
pub async fn send_with_backoff<A, Fut, R>(
    ctx: &SendContext,
    config: BackoffConfig,
    mut attempt: A,
    mut on_retry: R,
) -> Result<(), RetryError>
where
    A: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<(), StoreError>>,
    R: FnMut(),
{
    let mut backoff = Backoff::new(config);
    let mut tries: u32 = 0;

    loop {
        if let Some(cause) = ctx.err() {
            return Err(RetryError::Cancelled(cause));
        }

        let result = tokio::select! {
            biased;
            cause = ctx.done() => return Err(RetryError::Cancelled(cause)),
            result = attempt(tries) => result,
        };

        let err = match result {
            Ok(()) => return Ok(()),
            Err(err) => err,
        };

        let Some(recoverable) = err.as_recoverable() else {
            return Err(RetryError::Fatal(err));
        };
        let sleep = backoff.delay_for(recoverable);

        tokio::select! {
            biased;
            cause = ctx.done() => return Err(RetryError::Cancelled(cause)),
            _ = tokio::time::sleep(sleep) => {}
        }

        on_retry();
        warn!(error = %err, tries, "Failed to send batch, retrying");

        backoff.advance();
        tries += 1;
    }
}
