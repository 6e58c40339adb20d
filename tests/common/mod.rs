#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use chrono::TimeDelta;
use parking_lot::Mutex;
use prost::Message;
use rask_remote_write::domain::{Labels, Metadata, Sample};
use rask_remote_write::queue::{Features, MetadataOptions, QueueManager, QueueOptions};
use rask_remote_write::reliability::QueueManagerMetrics;
use rask_remote_write::sender::{RecoverableError, StoreError, WriteClient};
use rask_remote_write::wire::prompb::WriteRequest;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// What a scripted store call does.
#[derive(Debug, Clone)]
pub enum Step {
    Ok,
    Recoverable(TimeDelta),
    Fatal(u16),
    Slow(Duration),
    Hang,
}

type Responder = dyn Fn(usize, &WriteRequest) -> Step + Send + Sync;

/// In-process `WriteClient` that decodes every payload and answers from a script.
pub struct ScriptedClient {
    name: String,
    endpoint: String,
    responder: Box<Responder>,
    calls: AtomicUsize,
    requests: Mutex<Vec<WriteRequest>>,
}

impl ScriptedClient {
    pub fn new<F>(name: &str, responder: F) -> Arc<Self>
    where
        F: Fn(usize, &WriteRequest) -> Step + Send + Sync + 'static,
    {
        Arc::new(Self {
            name: name.to_string(),
            endpoint: format!("http://{name}.test/api/v1/write"),
            responder: Box::new(responder),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn ok(name: &str) -> Arc<Self> {
        Self::new(name, |_, _| Step::Ok)
    }

    /// Answers call `i` with `steps[i]`, then `Ok` once the script runs out.
    pub fn sequence(name: &str, steps: Vec<Step>) -> Arc<Self> {
        Self::new(name, move |call, _| {
            steps.get(call).cloned().unwrap_or(Step::Ok)
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<WriteRequest> {
        self.requests.lock().clone()
    }

    /// Every `idx` label value seen across all requests, sorted.
    pub fn delivered_indices(&self) -> Vec<usize> {
        let mut seen: Vec<usize> = self
            .requests
            .lock()
            .iter()
            .flat_map(|req| req.timeseries.iter())
            .filter_map(|ts| ts.labels.iter().find(|l| l.name == "idx"))
            .filter_map(|l| l.value.parse().ok())
            .collect();
        seen.sort_unstable();
        seen
    }
}

pub fn decode(payload: &[u8]) -> WriteRequest {
    let raw = snap::raw::Decoder::new()
        .decompress_vec(payload)
        .expect("payload is snappy compressed");
    WriteRequest::decode(raw.as_slice()).expect("payload is a WriteRequest")
}

pub fn contains_index(request: &WriteRequest, idx: usize) -> bool {
    let idx = idx.to_string();
    request
        .timeseries
        .iter()
        .any(|ts| ts.labels.iter().any(|l| l.name == "idx" && l.value == idx))
}

#[async_trait]
impl WriteClient for ScriptedClient {
    async fn store(&self, payload: Bytes) -> Result<(), StoreError> {
        let request = decode(&payload);
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let step = (self.responder)(call, &request);
        self.requests.lock().push(request);

        match step {
            Step::Ok => Ok(()),
            Step::Recoverable(retry_after) => Err(RecoverableError::new("scripted outage")
                .with_retry_after(retry_after)
                .into()),
            Step::Fatal(status) => Err(StoreError::Http {
                status,
                message: "scripted rejection".to_string(),
            }),
            Step::Slow(delay) => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
            Step::Hang => std::future::pending().await,
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Timestamp of the first generated sample, in milliseconds.
pub const BASE_TS: i64 = 1_700_000_000_000;

pub fn samples(n: usize) -> Vec<Sample> {
    (0..n)
        .map(|i| Sample {
            labels: Labels::from_pairs([
                ("__name__", "test_metric".to_string()),
                ("idx", i.to_string()),
            ]),
            timestamp: BASE_TS + i as i64,
            value: i as f64,
        })
        .collect()
}

pub fn metadata(n: usize) -> Vec<Metadata> {
    (0..n)
        .map(|i| Metadata {
            name: format!("metric_{i}"),
            metric_type: "counter".to_string(),
            help: format!("Help for metric {i}."),
            unit: String::new(),
        })
        .collect()
}

pub fn options(max_samples_per_send: usize) -> QueueOptions {
    QueueOptions {
        max_samples_per_send,
        ..QueueOptions::default()
    }
}

pub fn manager_with(
    options: QueueOptions,
    metadata_options: MetadataOptions,
    features: Features,
    client: Arc<ScriptedClient>,
) -> QueueManager {
    let metrics = QueueManagerMetrics::new(None, client.name(), client.endpoint())
        .expect("metrics build");
    QueueManager::new(options, metadata_options, features, client, metrics)
        .expect("valid options")
}

pub fn manager(max_samples_per_send: usize, client: Arc<ScriptedClient>) -> QueueManager {
    manager_with(
        options(max_samples_per_send),
        MetadataOptions::default(),
        Features::default(),
        client,
    )
}
