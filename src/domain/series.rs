use super::histogram::{FloatHistogram, Histogram};
use super::labels::Labels;
use serde::{Deserialize, Serialize};

/// A float sample for one series. Timestamps are milliseconds since the epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub labels: Labels,
    pub timestamp: i64,
    pub value: f64,
}

/// An exemplar attached to a series, with its own label set (trace ids and the like).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exemplar {
    pub labels: Labels,
    #[serde(default)]
    pub exemplar_labels: Labels,
    pub timestamp: i64,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramSample {
    pub labels: Labels,
    pub timestamp: i64,
    pub histogram: Histogram,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloatHistogramSample {
    pub labels: Labels,
    pub timestamp: i64,
    pub histogram: FloatHistogram,
}

/// Metric family metadata. `metric_type` is the exposition-format type name
/// (`counter`, `gauge`, `histogram`, ...), matched case-insensitively on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub name: String,
    #[serde(rename = "type", default)]
    pub metric_type: String,
    #[serde(default)]
    pub help: String,
    #[serde(default)]
    pub unit: String,
}

/// One point queued for delivery, tagged by payload shape.
///
/// Borrows from the caller's append input; it only lives until the batch has
/// been converted to wire form.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SeriesRecord<'a> {
    Sample {
        labels: &'a Labels,
        timestamp: i64,
        value: f64,
    },
    Exemplar {
        labels: &'a Labels,
        exemplar_labels: &'a Labels,
        timestamp: i64,
        value: f64,
    },
    Histogram {
        labels: &'a Labels,
        timestamp: i64,
        histogram: &'a Histogram,
    },
    FloatHistogram {
        labels: &'a Labels,
        timestamp: i64,
        histogram: &'a FloatHistogram,
    },
}

impl<'a> SeriesRecord<'a> {
    pub fn labels(&self) -> &'a Labels {
        match *self {
            SeriesRecord::Sample { labels, .. }
            | SeriesRecord::Exemplar { labels, .. }
            | SeriesRecord::Histogram { labels, .. }
            | SeriesRecord::FloatHistogram { labels, .. } => labels,
        }
    }

    pub fn timestamp(&self) -> i64 {
        match *self {
            SeriesRecord::Sample { timestamp, .. }
            | SeriesRecord::Exemplar { timestamp, .. }
            | SeriesRecord::Histogram { timestamp, .. }
            | SeriesRecord::FloatHistogram { timestamp, .. } => timestamp,
        }
    }
}

impl<'a> From<&'a Sample> for SeriesRecord<'a> {
    fn from(s: &'a Sample) -> Self {
        SeriesRecord::Sample {
            labels: &s.labels,
            timestamp: s.timestamp,
            value: s.value,
        }
    }
}

impl<'a> From<&'a Exemplar> for SeriesRecord<'a> {
    fn from(e: &'a Exemplar) -> Self {
        SeriesRecord::Exemplar {
            labels: &e.labels,
            exemplar_labels: &e.exemplar_labels,
            timestamp: e.timestamp,
            value: e.value,
        }
    }
}

impl<'a> From<&'a HistogramSample> for SeriesRecord<'a> {
    fn from(h: &'a HistogramSample) -> Self {
        SeriesRecord::Histogram {
            labels: &h.labels,
            timestamp: h.timestamp,
            histogram: &h.histogram,
        }
    }
}

impl<'a> From<&'a FloatHistogramSample> for SeriesRecord<'a> {
    fn from(h: &'a FloatHistogramSample) -> Self {
        SeriesRecord::FloatHistogram {
            labels: &h.labels,
            timestamp: h.timestamp,
            histogram: &h.histogram,
        }
    }
}
