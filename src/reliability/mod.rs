pub mod context;
pub mod metrics;
pub mod retry;

pub use context::{Cancellation, SendContext};
pub use metrics::{MetricsError, MetricsSnapshot, QueueManagerMetrics};
pub use retry::{Backoff, BackoffConfig, RetryError, send_with_backoff};
