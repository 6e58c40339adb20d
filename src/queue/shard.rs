use super::error::QueueError;
use super::manager::Shared;
use crate::reliability::{RetryError, SendContext, send_with_backoff};
use crate::wire::{SeriesCounts, build_write_request, prompb};
use std::sync::Arc;
use std::time::Instant;
use tracing::{Instrument, debug, error, info_span};

/// One send lane for a single append call.
///
/// Holds nothing but the manager's shared state and is dropped when the append
/// returns.
pub(crate) struct Shard {
    qm: Arc<Shared>,
}

impl Shard {
    pub(crate) fn new(qm: Arc<Shared>) -> Self {
        Self { qm }
    }

    /// Sends `batches` in order, stopping at the first failure.
    ///
    /// Batches after a failed one are not attempted and their data is dropped;
    /// the caller only sees the error.
    pub(crate) async fn send_batches(
        &self,
        ctx: &SendContext,
        batches: Vec<Vec<prompb::TimeSeries>>,
    ) -> Result<(), QueueError> {
        for batch in batches {
            self.send_samples_with_backoff(ctx, batch).await?;
        }
        Ok(())
    }

    /// Encodes one batch and stores it, retrying recoverable errors.
    pub(crate) async fn send_samples_with_backoff(
        &self,
        ctx: &SendContext,
        series: Vec<prompb::TimeSeries>,
    ) -> Result<(), QueueError> {
        let counts = SeriesCounts::of(&series);
        // Encoding only fails on a malformed request, so it is not retried.
        let request = build_write_request(series, Vec::new())?;
        let payload_len = request.payload.len();

        let shared = &*self.qm;
        let result = send_with_backoff(
            ctx,
            shared.options.backoff(),
            |tries| {
                let client = shared.client();
                let payload = request.payload.clone();
                let span = info_span!(
                    "remote_send_batch",
                    tries,
                    remote_name = %client.name(),
                    remote_url = %client.endpoint(),
                );
                async move {
                    let begin = Instant::now();
                    let result = client.store(payload).await;
                    shared.metrics.observe_batch_duration(begin.elapsed());
                    if let Err(e) = &result {
                        debug!(error = %e, "store attempt failed");
                    }
                    result
                }
                .instrument(span)
            },
            || shared.metrics.record_series_retried(counts),
        )
        .await;

        match result {
            Ok(()) => {
                shared.metrics.record_sent_bytes(payload_len);
                shared.metrics.record_highest_sent(request.highest_timestamp);
                shared.metrics.record_series_sent(counts);
                Ok(())
            }
            // Nothing was delivered, so sent and watermark metrics stay untouched.
            Err(RetryError::Cancelled(cause)) => Err(QueueError::Cancelled(cause)),
            Err(RetryError::Fatal(err)) => {
                shared.metrics.record_series_failed(counts);
                error!(
                    series = counts.total(),
                    error = %err,
                    "non-recoverable error while sending samples"
                );
                Err(QueueError::Store(err))
            }
        }
    }
}
