use crate::domain::{
    Exemplar, FloatHistogram, FloatHistogramSample, Histogram, HistogramSample, Labels, Metadata,
    Sample,
};
use serde::Deserialize;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

#[derive(Error, Debug)]
pub enum InputError {
    #[error("Failed to read input: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid record on line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// One NDJSON line, tagged by `kind`. Timestamps are epoch milliseconds and
/// default to the time the input is read.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InputRecord {
    Sample {
        labels: Labels,
        timestamp: Option<i64>,
        value: f64,
    },
    Exemplar {
        labels: Labels,
        #[serde(default)]
        exemplar_labels: Labels,
        timestamp: Option<i64>,
        value: f64,
    },
    Histogram {
        labels: Labels,
        timestamp: Option<i64>,
        histogram: Histogram,
    },
    FloatHistogram {
        labels: Labels,
        timestamp: Option<i64>,
        histogram: FloatHistogram,
    },
    Metadata(Metadata),
}

/// Records grouped by the append call that dispatches them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputBatch {
    pub samples: Vec<Sample>,
    pub exemplars: Vec<Exemplar>,
    pub histograms: Vec<HistogramSample>,
    pub float_histograms: Vec<FloatHistogramSample>,
    pub metadata: Vec<Metadata>,
}

impl InputBatch {
    pub fn push(&mut self, record: InputRecord, now_ms: i64) {
        match record {
            InputRecord::Sample {
                labels,
                timestamp,
                value,
            } => self.samples.push(Sample {
                labels,
                timestamp: timestamp.unwrap_or(now_ms),
                value,
            }),
            InputRecord::Exemplar {
                labels,
                exemplar_labels,
                timestamp,
                value,
            } => self.exemplars.push(Exemplar {
                labels,
                exemplar_labels,
                timestamp: timestamp.unwrap_or(now_ms),
                value,
            }),
            InputRecord::Histogram {
                labels,
                timestamp,
                histogram,
            } => self.histograms.push(HistogramSample {
                labels,
                timestamp: timestamp.unwrap_or(now_ms),
                histogram,
            }),
            InputRecord::FloatHistogram {
                labels,
                timestamp,
                histogram,
            } => self.float_histograms.push(FloatHistogramSample {
                labels,
                timestamp: timestamp.unwrap_or(now_ms),
                histogram,
            }),
            InputRecord::Metadata(metadata) => self.metadata.push(metadata),
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
            + self.exemplars.len()
            + self.histograms.len()
            + self.float_histograms.len()
            + self.metadata.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Reads every record from `reader`. Blank lines are skipped; the first
/// malformed line aborts the read.
pub async fn read_ndjson<R>(reader: R, now_ms: i64) -> Result<InputBatch, InputError>
where
    R: AsyncBufRead + Unpin,
{
    let mut batch = InputBatch::default();
    let mut lines = reader.lines();
    let mut line_no = 0;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let record: InputRecord =
            serde_json::from_str(trimmed).map_err(|source| InputError::Parse {
                line: line_no,
                source,
            })?;
        batch.push(record, now_ms);
    }

    Ok(batch)
}
