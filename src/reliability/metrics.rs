use crate::wire::SeriesCounts;
use parking_lot::Mutex;
use prometheus::core::Collector;
use prometheus::{Counter, Encoder, Gauge, HistogramOpts, Opts, Registry, TextEncoder};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

const NAMESPACE: &str = "prometheus";
const SUBSYSTEM: &str = "remote_storage";

#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("Prometheus error: {0}")]
    PrometheusError(#[from] prometheus::Error),
    #[error("Metrics encoding error: {0}")]
    EncodingError(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsSnapshot {
    pub samples_sent: f64,
    pub exemplars_sent: f64,
    pub histograms_sent: f64,
    pub samples_failed: f64,
    pub exemplars_failed: f64,
    pub histograms_failed: f64,
    pub samples_retried: f64,
    pub exemplars_retried: f64,
    pub histograms_retried: f64,
    pub metadata_sent: f64,
    pub metadata_failed: f64,
    pub metadata_retried: f64,
    pub sent_bytes: f64,
    pub metadata_bytes: f64,
    pub sent_batches: u64,
    pub highest_sent_timestamp_seconds: f64,
    pub max_samples_per_send: f64,
}

/// Counters for one pair of (sent, failed, retried) series of a payload kind.
#[derive(Clone)]
struct Outcomes {
    sent: Counter,
    failed: Counter,
    retried: Counter,
}

impl Outcomes {
    fn new(kind: &str, remote_name: &str, url: &str) -> Result<Self, MetricsError> {
        Ok(Self {
            sent: counter(
                &format!("{kind}_total"),
                &format!("Total number of {kind} sent to remote storage."),
                remote_name,
                url,
            )?,
            failed: counter(
                &format!("{kind}_failed_total"),
                &format!("Total number of {kind} which failed on send to remote storage, non-recoverable errors."),
                remote_name,
                url,
            )?,
            retried: counter(
                &format!("{kind}_retried_total"),
                &format!("Total number of {kind} which failed on send to remote storage but were retried because the send error was recoverable."),
                remote_name,
                url,
            )?,
        })
    }

    fn collectors(&self) -> [Box<dyn Collector>; 3] {
        [
            Box::new(self.sent.clone()),
            Box::new(self.failed.clone()),
            Box::new(self.retried.clone()),
        ]
    }
}

/// Telemetry for one queue manager, labelled by remote name and URL.
///
/// Cloning shares the underlying metrics.
#[derive(Clone)]
pub struct QueueManagerMetrics {
    registry: Option<Registry>,

    samples: Outcomes,
    exemplars: Outcomes,
    histograms: Outcomes,
    metadata: Outcomes,

    sent_batch_duration: prometheus::Histogram,
    highest_sent_timestamp: Gauge,
    max_samples_per_send: Gauge,
    sent_bytes_total: Counter,
    metadata_bytes_total: Counter,

    // Serializes the compare-and-set on the watermark gauge.
    highest_lock: Arc<Mutex<()>>,
}

impl QueueManagerMetrics {
    /// Builds the metrics. They are only registered when `register` is called and
    /// a registry was supplied.
    pub fn new(
        registry: Option<Registry>,
        remote_name: &str,
        url: &str,
    ) -> Result<Self, MetricsError> {
        let sent_batch_duration = prometheus::Histogram::with_opts(
            HistogramOpts::new(
                "sent_batch_duration_seconds",
                "Duration of send calls to the remote storage.",
            )
            .namespace(NAMESPACE)
            .subsystem(SUBSYSTEM)
            .const_label("remote_name", remote_name)
            .const_label("url", url)
            .buckets(vec![
                0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 25.0, 60.0, 120.0,
                300.0,
            ]),
        )?;

        Ok(Self {
            registry,
            samples: Outcomes::new("samples", remote_name, url)?,
            exemplars: Outcomes::new("exemplars", remote_name, url)?,
            histograms: Outcomes::new("histograms", remote_name, url)?,
            metadata: Outcomes::new("metadata", remote_name, url)?,
            sent_batch_duration,
            highest_sent_timestamp: gauge(
                "queue_highest_sent_timestamp_seconds",
                "Timestamp from a WAL sample, the highest timestamp successfully sent by this queue, in seconds since epoch.",
                remote_name,
                url,
            )?,
            max_samples_per_send: gauge(
                "max_samples_per_send",
                "The maximum number of samples to be sent, in a single request, to the remote storage.",
                remote_name,
                url,
            )?,
            sent_bytes_total: counter(
                "bytes_total",
                "The total number of bytes of data (not metadata) sent by the queue after compression.",
                remote_name,
                url,
            )?,
            metadata_bytes_total: counter(
                "metadata_bytes_total",
                "The total number of bytes of metadata sent by the queue after compression.",
                remote_name,
                url,
            )?,
            highest_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Registers every metric with the registry, if there is one.
    pub fn register(&self) -> Result<(), MetricsError> {
        let Some(registry) = &self.registry else {
            return Ok(());
        };
        for collector in self.collectors() {
            registry.register(collector)?;
        }
        Ok(())
    }

    pub fn set_max_samples_per_send(&self, max: usize) {
        self.max_samples_per_send.set(max as f64);
    }

    pub fn observe_batch_duration(&self, elapsed: Duration) {
        self.sent_batch_duration.observe(elapsed.as_secs_f64());
    }

    pub fn record_sent_bytes(&self, bytes: usize) {
        self.sent_bytes_total.inc_by(bytes as f64);
    }

    /// Moves the highest-sent watermark forward. `timestamp_ms` is in milliseconds.
    pub fn record_highest_sent(&self, timestamp_ms: i64) {
        let seconds = (timestamp_ms / 1000) as f64;
        let _guard = self.highest_lock.lock();
        if seconds > self.highest_sent_timestamp.get() {
            self.highest_sent_timestamp.set(seconds);
        }
    }

    pub fn record_series_sent(&self, counts: SeriesCounts) {
        self.samples.sent.inc_by(counts.samples as f64);
        self.exemplars.sent.inc_by(counts.exemplars as f64);
        self.histograms.sent.inc_by(counts.histograms as f64);
    }

    pub fn record_series_failed(&self, counts: SeriesCounts) {
        self.samples.failed.inc_by(counts.samples as f64);
        self.exemplars.failed.inc_by(counts.exemplars as f64);
        self.histograms.failed.inc_by(counts.histograms as f64);
    }

    pub fn record_series_retried(&self, counts: SeriesCounts) {
        self.samples.retried.inc_by(counts.samples as f64);
        self.exemplars.retried.inc_by(counts.exemplars as f64);
        self.histograms.retried.inc_by(counts.histograms as f64);
    }

    pub fn record_metadata_sent(&self, count: usize, bytes: usize) {
        self.metadata.sent.inc_by(count as f64);
        self.metadata_bytes_total.inc_by(bytes as f64);
    }

    pub fn record_metadata_failed(&self, count: usize) {
        self.metadata.failed.inc_by(count as f64);
    }

    pub fn record_metadata_retried(&self, count: usize) {
        self.metadata.retried.inc_by(count as f64);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            samples_sent: self.samples.sent.get(),
            exemplars_sent: self.exemplars.sent.get(),
            histograms_sent: self.histograms.sent.get(),
            samples_failed: self.samples.failed.get(),
            exemplars_failed: self.exemplars.failed.get(),
            histograms_failed: self.histograms.failed.get(),
            samples_retried: self.samples.retried.get(),
            exemplars_retried: self.exemplars.retried.get(),
            histograms_retried: self.histograms.retried.get(),
            metadata_sent: self.metadata.sent.get(),
            metadata_failed: self.metadata.failed.get(),
            metadata_retried: self.metadata.retried.get(),
            sent_bytes: self.sent_bytes_total.get(),
            metadata_bytes: self.metadata_bytes_total.get(),
            sent_batches: self.sent_batch_duration.get_sample_count(),
            highest_sent_timestamp_seconds: self.highest_sent_timestamp.get(),
            max_samples_per_send: self.max_samples_per_send.get(),
        }
    }

    /// Renders the metrics in the Prometheus text exposition format.
    pub fn encode_text(&self) -> Result<String, MetricsError> {
        let families: Vec<_> = self
            .collectors()
            .iter()
            .flat_map(|c| c.collect())
            .collect();

        let mut buffer = Vec::new();
        TextEncoder::new().encode(&families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| MetricsError::EncodingError(e.to_string()))
    }

    fn collectors(&self) -> Vec<Box<dyn Collector>> {
        let mut collectors: Vec<Box<dyn Collector>> = Vec::with_capacity(17);
        for outcomes in [&self.samples, &self.exemplars, &self.histograms, &self.metadata] {
            collectors.extend(outcomes.collectors());
        }
        collectors.push(Box::new(self.sent_batch_duration.clone()));
        collectors.push(Box::new(self.highest_sent_timestamp.clone()));
        collectors.push(Box::new(self.max_samples_per_send.clone()));
        collectors.push(Box::new(self.sent_bytes_total.clone()));
        collectors.push(Box::new(self.metadata_bytes_total.clone()));
        collectors
    }
}

fn counter(name: &str, help: &str, remote_name: &str, url: &str) -> Result<Counter, MetricsError> {
    Ok(Counter::with_opts(opts(name, help, remote_name, url))?)
}

fn gauge(name: &str, help: &str, remote_name: &str, url: &str) -> Result<Gauge, MetricsError> {
    Ok(Gauge::with_opts(opts(name, help, remote_name, url))?)
}

fn opts(name: &str, help: &str, remote_name: &str, url: &str) -> Opts {
    Opts::new(name, help)
        .namespace(NAMESPACE)
        .subsystem(SUBSYSTEM)
        .const_label("remote_name", remote_name)
        .const_label("url", url)
}
