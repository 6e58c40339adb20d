use super::error::QueueError;
use super::options::{Features, MetadataOptions, QueueOptions};
use super::shard::Shard;
use super::splitter::fill_queues;
use crate::domain::{
    Exemplar, FloatHistogramSample, HistogramSample, Metadata, Sample, SeriesRecord,
};
use crate::reliability::{QueueManagerMetrics, SendContext, send_with_backoff};
use crate::sender::WriteClient;
use crate::wire::{build_write_request, metadata_to_proto, populate_time_series, prompb};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tracing::{Instrument, debug, error, info_span};

/// State shared by the manager and the shards it spawns.
pub(crate) struct Shared {
    pub(crate) options: QueueOptions,
    pub(crate) metadata_options: MetadataOptions,
    pub(crate) features: Features,
    pub(crate) metrics: QueueManagerMetrics,
    client: RwLock<Arc<dyn WriteClient>>,
}

impl Shared {
    /// Current write client. The lock is released before any send starts, so a
    /// concurrent `set_client` never waits on in-flight requests.
    pub(crate) fn client(&self) -> Arc<dyn WriteClient> {
        self.client.read().clone()
    }
}

/// Converts appended points into write requests and delivers them.
///
/// Each append blocks until its data has been sent or has failed. Appends larger
/// than one request are split over up to four concurrent shards that exist only
/// for the duration of the call. Nothing is persisted or re-queued: data from a
/// failed append is the caller's to drop or resubmit.
///
/// Cloning is cheap and shares the underlying state.
#[derive(Clone)]
pub struct QueueManager {
    shared: Arc<Shared>,
}

impl QueueManager {
    pub fn new(
        options: QueueOptions,
        metadata_options: MetadataOptions,
        features: Features,
        client: Arc<dyn WriteClient>,
        metrics: QueueManagerMetrics,
    ) -> Result<Self, QueueError> {
        options.validate()?;
        metadata_options.validate()?;

        Ok(Self {
            shared: Arc::new(Shared {
                options,
                metadata_options,
                features,
                metrics,
                client: RwLock::new(client),
            }),
        })
    }

    /// Name of the remote storage the queue writes to.
    pub fn name(&self) -> String {
        self.shared.client().name().to_string()
    }

    pub fn endpoint(&self) -> String {
        self.shared.client().endpoint().to_string()
    }

    pub fn options(&self) -> &QueueOptions {
        &self.shared.options
    }

    pub fn metrics(&self) -> &QueueManagerMetrics {
        &self.shared.metrics
    }

    /// Replaces the write client. Sends already in flight finish on the old one.
    pub fn set_client(&self, client: Arc<dyn WriteClient>) {
        *self.shared.client.write() = client;
    }

    /// Registers the queue's metrics. Does not block and spawns nothing.
    pub fn start(&self) -> Result<(), QueueError> {
        self.shared.metrics.register()?;
        self.shared
            .metrics
            .set_max_samples_per_send(self.shared.options.max_samples_per_send);
        Ok(())
    }

    /// Sends samples, blocking until all are delivered or the send fails.
    pub async fn append(&self, ctx: &SendContext, samples: &[Sample]) -> Result<(), QueueError> {
        let records = samples.iter().map(SeriesRecord::from).collect();
        self.append_records(ctx, records).await
    }

    /// Sends exemplars. Dropped with success when exemplar forwarding is off.
    pub async fn append_exemplars(
        &self,
        ctx: &SendContext,
        exemplars: &[Exemplar],
    ) -> Result<(), QueueError> {
        if !self.shared.features.send_exemplars {
            return Ok(());
        }
        let records = exemplars.iter().map(SeriesRecord::from).collect();
        self.append_records(ctx, records).await
    }

    /// Sends native histograms. Dropped with success when native histograms are off.
    pub async fn append_histograms(
        &self,
        ctx: &SendContext,
        histograms: &[HistogramSample],
    ) -> Result<(), QueueError> {
        if !self.shared.features.send_native_histograms {
            return Ok(());
        }
        let records = histograms.iter().map(SeriesRecord::from).collect();
        self.append_records(ctx, records).await
    }

    /// Sends float native histograms. Dropped with success when native histograms are off.
    pub async fn append_float_histograms(
        &self,
        ctx: &SendContext,
        histograms: &[FloatHistogramSample],
    ) -> Result<(), QueueError> {
        if !self.shared.features.send_native_histograms {
            return Ok(());
        }
        let records = histograms.iter().map(SeriesRecord::from).collect();
        self.append_records(ctx, records).await
    }

    /// Encodes the records and sends them on one or more shards.
    ///
    /// When several shards fail concurrently only the error of the last shard to
    /// finish is returned.
    async fn append_records(
        &self,
        ctx: &SendContext,
        records: Vec<SeriesRecord<'_>>,
    ) -> Result<(), QueueError> {
        if records.is_empty() {
            return Ok(());
        }

        let mut pending = Vec::with_capacity(records.len());
        populate_time_series(&records, &mut pending);

        let max_per_send = self.shared.options.max_samples_per_send;
        if pending.len() <= max_per_send {
            return Shard::new(Arc::clone(&self.shared))
                .send_samples_with_backoff(ctx, pending)
                .await;
        }

        let total = pending.len();
        let queues = fill_queues(pending, max_per_send);
        debug!(series = total, shards = queues.len(), "splitting append across shards");

        let mut tasks = JoinSet::new();
        for (index, batches) in queues {
            let shard = Shard::new(Arc::clone(&self.shared));
            let ctx = ctx.clone();
            tasks.spawn(
                async move { shard.send_batches(&ctx, batches).await }
                    .instrument(info_span!("shard", index)),
            );
        }

        let mut outcome = Ok(());
        while let Some(joined) = tasks.join_next().await {
            if let Err(err) = joined.map_err(QueueError::from).and_then(|sent| sent) {
                outcome = Err(err);
            }
        }
        outcome
    }

    /// Sends metadata in pages, one page at a time.
    ///
    /// The whole call shares one `batch_send_deadline`. A failed page is counted
    /// and logged and the remaining pages are still sent. Returns whether every
    /// page was delivered.
    pub async fn append_metadata(&self, ctx: &SendContext, metadata: &[Metadata]) -> bool {
        let ctx = ctx.with_timeout(self.shared.options.batch_send_deadline);
        let entries = metadata_to_proto(metadata);
        let page_size = self.shared.metadata_options.max_samples_per_send;

        let mut delivered = true;
        for page in entries.chunks(page_size) {
            if let Err(err) = self.send_metadata_with_backoff(&ctx, page.to_vec()).await {
                self.shared.metrics.record_metadata_failed(page.len());
                error!(
                    count = page.len(),
                    error = %err,
                    "non-recoverable error while sending metadata"
                );
                delivered = false;
            }
        }
        delivered
    }

    async fn send_metadata_with_backoff(
        &self,
        ctx: &SendContext,
        metadata: Vec<prompb::MetricMetadata>,
    ) -> Result<(), QueueError> {
        let count = metadata.len();
        let request = build_write_request(Vec::new(), metadata)?;

        let shared = &*self.shared;
        send_with_backoff(
            ctx,
            shared.options.backoff(),
            |tries| {
                let client = shared.client();
                let payload = request.payload.clone();
                let span = info_span!(
                    "remote_metadata_send",
                    metadata = count,
                    tries,
                    remote_name = %client.name(),
                    remote_url = %client.endpoint(),
                );
                async move {
                    let begin = Instant::now();
                    let result = client.store(payload).await;
                    shared.metrics.observe_batch_duration(begin.elapsed());
                    result
                }
                .instrument(span)
            },
            || shared.metrics.record_metadata_retried(count),
        )
        .await?;

        shared
            .metrics
            .record_metadata_sent(count, request.payload.len());
        Ok(())
    }
}
