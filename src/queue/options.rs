use super::error::QueueError;
use crate::reliability::BackoffConfig;
use crate::serde_helpers::duration_ms;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Sample queue tuning. Fixed for the lifetime of a queue manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueOptions {
    /// Maximum number of series per write request.
    pub max_samples_per_send: usize,
    /// Deadline applied to a whole metadata send.
    #[serde(with = "duration_ms")]
    pub batch_send_deadline: Duration,
    #[serde(with = "duration_ms")]
    pub min_backoff: Duration,
    #[serde(with = "duration_ms")]
    pub max_backoff: Duration,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            max_samples_per_send: 2000,
            batch_send_deadline: Duration::from_secs(5),
            min_backoff: Duration::from_millis(30),
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl QueueOptions {
    pub fn backoff(&self) -> BackoffConfig {
        BackoffConfig {
            min_backoff: self.min_backoff,
            max_backoff: self.max_backoff,
        }
    }

    pub fn validate(&self) -> Result<(), QueueError> {
        if self.max_samples_per_send == 0 {
            return Err(QueueError::InvalidOptions(
                "max_samples_per_send must be greater than 0".to_string(),
            ));
        }
        if self.min_backoff > self.max_backoff {
            return Err(QueueError::InvalidOptions(format!(
                "min_backoff ({:?}) must not exceed max_backoff ({:?})",
                self.min_backoff, self.max_backoff
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataOptions {
    /// Maximum number of metadata entries per write request.
    pub max_samples_per_send: usize,
}

impl Default for MetadataOptions {
    fn default() -> Self {
        Self {
            max_samples_per_send: 2000,
        }
    }
}

impl MetadataOptions {
    pub fn validate(&self) -> Result<(), QueueError> {
        if self.max_samples_per_send == 0 {
            return Err(QueueError::InvalidOptions(
                "metadata max_samples_per_send must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Which optional payload kinds are forwarded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Features {
    pub send_exemplars: bool,
    pub send_native_histograms: bool,
}
