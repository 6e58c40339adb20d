pub mod client;
pub mod error;

pub use client::{ClientConfig, ClientError, ConnectionStats, HttpWriteClient};
pub use error::{RecoverableError, StoreError};

use async_trait::async_trait;
use bytes::Bytes;

/// Destination for encoded write requests.
///
/// Implementations must tag retryable failures as [`StoreError::Recoverable`];
/// any other error is treated as fatal by the queue.
#[async_trait]
pub trait WriteClient: Send + Sync {
    /// Stores one snappy-compressed `WriteRequest`.
    async fn store(&self, payload: Bytes) -> Result<(), StoreError>;
    /// Uniquely identifies the remote storage.
    fn name(&self) -> &str;
    /// The remote write endpoint.
    fn endpoint(&self) -> &str;
}
