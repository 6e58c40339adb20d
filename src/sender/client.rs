use super::WriteClient;
use super::error::{RecoverableError, StoreError};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, TimeDelta, Utc};
use reqwest::header::{
    CONTENT_ENCODING, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, RETRY_AFTER, USER_AGENT,
};
use reqwest::{Client, ClientBuilder, StatusCode};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;
use url::Url;

const REMOTE_WRITE_VERSION: &str = "0.1.0";
const MAX_ERROR_BODY_BYTES: usize = 256;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub endpoint: String,
    pub remote_name: String,
    pub timeout: Duration,
    pub connection_timeout: Duration,
    pub max_connections: usize,
    pub keep_alive_timeout: Duration,
    pub user_agent: String,
    /// Treat HTTP 429 as recoverable instead of fatal.
    pub retry_on_rate_limit: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:9090/api/v1/write".to_string(),
            remote_name: "default".to_string(),
            timeout: Duration::from_secs(30),
            connection_timeout: Duration::from_secs(10),
            max_connections: 20,
            keep_alive_timeout: Duration::from_secs(60),
            user_agent: format!("rask-remote-write/{}", env!("CARGO_PKG_VERSION")),
            retry_on_rate_limit: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConnectionStats {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub average_response_time: Duration,
}

#[derive(Debug, Default)]
struct ClientStats {
    total_requests: AtomicU64,
    successful_requests: AtomicU64,
    failed_requests: AtomicU64,
    total_response_time: AtomicU64,
}

impl ClientStats {
    fn record_request(&self, success: bool, response_time: Duration) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.total_response_time
            .fetch_add(response_time.as_millis() as u64, Ordering::Relaxed);

        if success {
            self.successful_requests.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_requests.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Remote-write client speaking the snappy/protobuf HTTP protocol.
#[derive(Debug, Clone)]
pub struct HttpWriteClient {
    client: Client,
    config: ClientConfig,
    url: Url,
    headers: HeaderMap,
    stats: Arc<ClientStats>,
}

impl HttpWriteClient {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let url: Url = config
            .endpoint
            .parse()
            .map_err(|e| ClientError::InvalidConfiguration(format!("Invalid endpoint URL: {e}")))?;

        let client = ClientBuilder::new()
            .timeout(config.timeout)
            .connect_timeout(config.connection_timeout)
            .pool_max_idle_per_host(config.max_connections)
            .pool_idle_timeout(config.keep_alive_timeout)
            .build()
            .map_err(|e| {
                ClientError::InvalidConfiguration(format!("Failed to build HTTP client: {e}"))
            })?;

        let headers = build_headers(&config)?;

        Ok(Self {
            client,
            config,
            url,
            headers,
            stats: Arc::new(ClientStats::default()),
        })
    }

    pub fn connection_stats(&self) -> ConnectionStats {
        let total_requests = self.stats.total_requests.load(Ordering::Relaxed);
        let total_response_time = self.stats.total_response_time.load(Ordering::Relaxed);

        let average_response_time = if total_requests > 0 {
            Duration::from_millis(total_response_time / total_requests)
        } else {
            Duration::ZERO
        };

        ConnectionStats {
            total_requests,
            successful_requests: self.stats.successful_requests.load(Ordering::Relaxed),
            failed_requests: self.stats.failed_requests.load(Ordering::Relaxed),
            average_response_time,
        }
    }

    fn is_recoverable_status(&self, status: StatusCode) -> bool {
        status.is_server_error()
            || (status == StatusCode::TOO_MANY_REQUESTS && self.config.retry_on_rate_limit)
    }
}

#[async_trait]
impl WriteClient for HttpWriteClient {
    async fn store(&self, payload: Bytes) -> Result<(), StoreError> {
        let start = Instant::now();
        let size = payload.len();

        let response = match self
            .client
            .post(self.url.clone())
            .headers(self.headers.clone())
            .body(payload)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                self.stats.record_request(false, start.elapsed());
                // Connection resets and timeouts are worth another attempt.
                return Err(RecoverableError::new(format!("request failed: {e}")).into());
            }
        };

        let status = response.status();
        self.stats.record_request(status.is_success(), start.elapsed());

        if status.is_success() {
            debug!(bytes = size, status = status.as_u16(), "remote write accepted");
            return Ok(());
        }

        let retry_after = retry_after_duration(response.headers().get(RETRY_AFTER), Utc::now());
        let body = response.text().await.unwrap_or_default();
        let message = format!("server returned HTTP status {status}: {}", truncate(&body));

        if self.is_recoverable_status(status) {
            Err(RecoverableError::new(message)
                .with_retry_after(retry_after)
                .into())
        } else {
            Err(StoreError::Http {
                status: status.as_u16(),
                message,
            })
        }
    }

    fn name(&self) -> &str {
        &self.config.remote_name
    }

    fn endpoint(&self) -> &str {
        &self.config.endpoint
    }
}

fn build_headers(config: &ClientConfig) -> Result<HeaderMap, ClientError> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_ENCODING, HeaderValue::from_static("snappy"));
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("application/x-protobuf"),
    );
    headers.insert(
        HeaderName::from_static("x-prometheus-remote-write-version"),
        HeaderValue::from_static(REMOTE_WRITE_VERSION),
    );
    headers.insert(
        USER_AGENT,
        HeaderValue::from_str(&config.user_agent).map_err(|e| {
            ClientError::InvalidConfiguration(format!("Invalid user agent: {e}"))
        })?,
    );
    Ok(headers)
}

/// Parses a `Retry-After` header given as delay-seconds or an HTTP date.
///
/// Dates in the past yield a negative delta. Missing or unparsable values yield zero.
pub fn retry_after_duration(value: Option<&HeaderValue>, now: DateTime<Utc>) -> TimeDelta {
    let Some(raw) = value.and_then(|v| v.to_str().ok()).map(str::trim) else {
        return TimeDelta::zero();
    };

    if let Ok(secs) = raw.parse::<i64>() {
        return TimeDelta::try_seconds(secs).unwrap_or_else(TimeDelta::zero);
    }

    match DateTime::parse_from_rfc2822(raw) {
        Ok(at) => at.with_timezone(&Utc) - now,
        Err(_) => TimeDelta::zero(),
    }
}

fn truncate(body: &str) -> &str {
    let mut end = body.len().min(MAX_ERROR_BODY_BYTES);
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}
