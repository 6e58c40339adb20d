//! Domain layer for rask-remote-write.
//!
//! Contains the types handed to the queue by the ingestion side:
//! - `Labels`: sorted, name-unique label sets
//! - `Sample`, `Exemplar`, `HistogramSample`, `FloatHistogramSample`, `Metadata`
//! - `SeriesRecord`: the tagged internal record the wire encoder consumes

pub mod histogram;
pub mod labels;
pub mod series;

pub use histogram::{CounterResetHint, FloatHistogram, Histogram, Span};
pub use labels::{Label, Labels, METRIC_NAME_LABEL};
pub use series::{
    Exemplar, FloatHistogramSample, HistogramSample, Metadata, Sample, SeriesRecord,
};
