pub mod config;
pub mod input;
pub mod logging_system;
pub mod shutdown;

pub use config::{Config, ConfigError, LogFormat, LogLevel};
pub use input::{InputBatch, InputError, InputRecord, read_ndjson};
pub use logging_system::{LoggingError, setup_logging};

use crate::queue::QueueManager;
use crate::reliability::{MetricsSnapshot, QueueManagerMetrics, SendContext};
use crate::sender::{HttpWriteClient, WriteClient};
use anyhow::Context;
use prometheus::Registry;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Outcome of one dispatch run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchSummary {
    pub records: usize,
    pub failed_appends: usize,
    pub metadata_delivered: bool,
    pub cancelled: bool,
    pub metrics: MetricsSnapshot,
}

impl DispatchSummary {
    pub fn is_success(&self) -> bool {
        self.failed_appends == 0 && self.metadata_delivered && !self.cancelled
    }
}

pub struct App {
    config: Config,
    manager: QueueManager,
    token: CancellationToken,
}

impl App {
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let client = HttpWriteClient::new(config.to_client_config())
            .context("failed to build remote write client")?;
        Self::with_client(config, Arc::new(client))
    }

    /// Builds the app around an arbitrary write client.
    pub fn with_client(config: Config, client: Arc<dyn WriteClient>) -> anyhow::Result<Self> {
        let metrics = QueueManagerMetrics::new(
            Some(Registry::new()),
            client.name(),
            client.endpoint(),
        )?;
        let manager = QueueManager::new(
            config.queue.clone(),
            config.metadata.clone(),
            config.features,
            client,
            metrics,
        )?;
        manager.start()?;

        Ok(Self {
            config,
            manager,
            token: CancellationToken::new(),
        })
    }

    pub fn manager(&self) -> &QueueManager {
        &self.manager
    }

    /// Token cancelling every send of this app.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Reads the configured input and dispatches it, honouring Ctrl-C.
    pub async fn run(&self) -> anyhow::Result<DispatchSummary> {
        let listener = shutdown::spawn_signal_listener(self.token.clone());
        let result = match &self.config.input {
            Some(path) => {
                let file = tokio::fs::File::open(path)
                    .await
                    .with_context(|| format!("failed to open input {}", path.display()))?;
                self.dispatch_from(BufReader::new(file)).await
            }
            None => self.dispatch_from(BufReader::new(tokio::io::stdin())).await,
        };
        listener.abort();

        if self.config.print_metrics {
            println!("{}", self.manager.metrics().encode_text()?);
        }
        result
    }

    pub async fn dispatch_from<R>(&self, reader: R) -> anyhow::Result<DispatchSummary>
    where
        R: AsyncBufRead + Unpin,
    {
        let now_ms = chrono::Utc::now().timestamp_millis();
        let batch = read_ndjson(reader, now_ms).await?;
        Ok(self.dispatch(&batch).await)
    }

    /// Sends every group of `batch` in turn. Stops early once cancelled.
    pub async fn dispatch(&self, batch: &InputBatch) -> DispatchSummary {
        let ctx = SendContext::from_token(self.token.child_token());
        let mut summary = DispatchSummary {
            records: batch.len(),
            metadata_delivered: true,
            ..Default::default()
        };

        info!(
            remote_name = %self.manager.name(),
            samples = batch.samples.len(),
            exemplars = batch.exemplars.len(),
            histograms = batch.histograms.len(),
            float_histograms = batch.float_histograms.len(),
            metadata = batch.metadata.len(),
            "dispatching input"
        );

        let appends = [
            ("samples", self.manager.append(&ctx, &batch.samples).await),
            (
                "exemplars",
                self.manager.append_exemplars(&ctx, &batch.exemplars).await,
            ),
            (
                "histograms",
                self.manager.append_histograms(&ctx, &batch.histograms).await,
            ),
            (
                "float_histograms",
                self.manager
                    .append_float_histograms(&ctx, &batch.float_histograms)
                    .await,
            ),
        ];

        for (kind, result) in appends {
            match result {
                Ok(()) => {}
                Err(err) if err.is_cancellation() => {
                    warn!(kind, error = %err, "append abandoned");
                    summary.cancelled = true;
                }
                Err(err) => {
                    error!(kind, error = %err, "append failed");
                    summary.failed_appends += 1;
                }
            }
        }

        if ctx.err().is_some() {
            summary.cancelled = true;
        } else if !batch.metadata.is_empty() {
            summary.metadata_delivered = self.manager.append_metadata(&ctx, &batch.metadata).await;
        }

        summary.metrics = self.manager.metrics().snapshot();
        summary
    }
}

pub fn get_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

// Main entry point for the application
pub async fn main() -> anyhow::Result<()> {
    let config = Config::from_args_and_env(std::env::args())?;
    setup_logging(config.log_level, config.log_format)?;

    info!("Starting rask-remote-write v{}", get_version());
    info!(
        "Configuration: remote_name={}, endpoint={}, max_samples_per_send={}",
        config.remote_name, config.endpoint, config.queue.max_samples_per_send
    );

    let app = App::from_config(config)?;
    let summary = app.run().await?;

    info!(
        records = summary.records,
        failed_appends = summary.failed_appends,
        metadata_delivered = summary.metadata_delivered,
        cancelled = summary.cancelled,
        samples_sent = summary.metrics.samples_sent,
        bytes_sent = summary.metrics.sent_bytes,
        "dispatch finished"
    );

    if !summary.is_success() {
        anyhow::bail!("dispatch did not complete");
    }
    Ok(())
}
