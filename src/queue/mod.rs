//! The sample dispatch engine: splitting, sharding and sending appends.

pub mod error;
pub mod manager;
pub mod options;
mod shard;
pub mod splitter;

pub use error::QueueError;
pub use manager::QueueManager;
pub use options::{Features, MetadataOptions, QueueOptions};
pub use splitter::{MAX_SHARDS, fill_queues};
