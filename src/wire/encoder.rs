use super::prompb::{self, histogram, metric_metadata::MetricType};
use crate::domain::{
    CounterResetHint, FloatHistogram, Histogram, Labels, Metadata, SeriesRecord, Span,
};
use bytes::Bytes;
use prost::Message;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("Protobuf encoding failed: {0}")]
    Protobuf(#[from] prost::EncodeError),
    #[error("Snappy compression failed: {0}")]
    Compression(#[from] snap::Error),
}

/// A serialized, snappy-compressed `WriteRequest` ready for the write client.
#[derive(Debug, Clone)]
pub struct EncodedRequest {
    pub payload: Bytes,
    /// Highest sample/exemplar/histogram timestamp in the request, 0 if none.
    pub highest_timestamp: i64,
}

/// Number of wire series carrying each payload kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeriesCounts {
    pub samples: usize,
    pub exemplars: usize,
    pub histograms: usize,
}

impl SeriesCounts {
    pub fn of(series: &[prompb::TimeSeries]) -> Self {
        series.iter().fold(Self::default(), |mut acc, ts| {
            if !ts.samples.is_empty() {
                acc.samples += 1;
            }
            if !ts.exemplars.is_empty() {
                acc.exemplars += 1;
            }
            if !ts.histograms.is_empty() {
                acc.histograms += 1;
            }
            acc
        })
    }

    pub fn total(&self) -> usize {
        self.samples + self.exemplars + self.histograms
    }
}

/// Converts records into wire series, one series per record.
///
/// `pending` is resized to `records.len()`; existing entries are cleared and their
/// label buffers reused.
pub fn populate_time_series(
    records: &[SeriesRecord<'_>],
    pending: &mut Vec<prompb::TimeSeries>,
) -> SeriesCounts {
    pending.truncate(records.len());
    pending.resize_with(records.len(), prompb::TimeSeries::default);

    let mut counts = SeriesCounts::default();
    for (record, ts) in records.iter().zip(pending.iter_mut()) {
        ts.samples.clear();
        ts.exemplars.clear();
        ts.histograms.clear();
        ts.labels = labels_to_labels_proto(record.labels(), std::mem::take(&mut ts.labels));

        match *record {
            SeriesRecord::Sample {
                timestamp, value, ..
            } => {
                ts.samples.push(prompb::Sample { value, timestamp });
                counts.samples += 1;
            }
            SeriesRecord::Exemplar {
                exemplar_labels,
                timestamp,
                value,
                ..
            } => {
                ts.exemplars.push(prompb::Exemplar {
                    labels: labels_to_labels_proto(exemplar_labels, Vec::new()),
                    value,
                    timestamp,
                });
                counts.exemplars += 1;
            }
            SeriesRecord::Histogram {
                timestamp,
                histogram,
                ..
            } => {
                ts.histograms.push(histogram_to_proto(timestamp, histogram));
                counts.histograms += 1;
            }
            SeriesRecord::FloatHistogram {
                timestamp,
                histogram,
                ..
            } => {
                ts.histograms
                    .push(float_histogram_to_proto(timestamp, histogram));
                counts.histograms += 1;
            }
        }
    }
    counts
}

/// Serializes and compresses a write request.
///
/// The send paths never mix data and metadata: sample batches pass an empty
/// `metadata`, the metadata path passes no series.
pub fn build_write_request(
    timeseries: Vec<prompb::TimeSeries>,
    metadata: Vec<prompb::MetricMetadata>,
) -> Result<EncodedRequest, EncodeError> {
    let highest_timestamp = highest_timestamp(&timeseries);

    let request = prompb::WriteRequest {
        timeseries,
        metadata,
    };

    let mut buf = Vec::with_capacity(request.encoded_len());
    request.encode(&mut buf)?;

    let compressed = snap::raw::Encoder::new().compress_vec(&buf)?;

    Ok(EncodedRequest {
        payload: Bytes::from(compressed),
        highest_timestamp,
    })
}

fn highest_timestamp(timeseries: &[prompb::TimeSeries]) -> i64 {
    // Each series carries a single point, so only the first entry is inspected.
    timeseries
        .iter()
        .flat_map(|ts| {
            [
                ts.samples.first().map(|s| s.timestamp),
                ts.exemplars.first().map(|e| e.timestamp),
                ts.histograms.first().map(|h| h.timestamp),
            ]
        })
        .flatten()
        .fold(0, i64::max)
}

/// Converts labels into wire labels, reusing `buf` when it has room.
pub fn labels_to_labels_proto(labels: &Labels, mut buf: Vec<prompb::Label>) -> Vec<prompb::Label> {
    buf.clear();
    buf.extend(labels.iter().map(|l| prompb::Label {
        name: l.name.clone(),
        value: l.value.clone(),
    }));
    buf
}

pub fn labels_from_labels_proto(labels: &[prompb::Label]) -> Labels {
    Labels::from_pairs(labels.iter().map(|l| (l.name.as_str(), l.value.as_str())))
}

pub fn metadata_to_proto(metadata: &[Metadata]) -> Vec<prompb::MetricMetadata> {
    metadata
        .iter()
        .map(|entry| prompb::MetricMetadata {
            r#type: metric_type_to_metric_type_proto(&entry.metric_type) as i32,
            metric_family_name: entry.name.clone(),
            help: entry.help.clone(),
            unit: entry.unit.clone(),
        })
        .collect()
}

/// Maps an exposition-format type name onto the wire enum; unknown names map to `UNKNOWN`.
pub fn metric_type_to_metric_type_proto(metric_type: &str) -> MetricType {
    MetricType::from_str_name(&metric_type.to_uppercase()).unwrap_or(MetricType::Unknown)
}

pub fn histogram_to_proto(timestamp: i64, h: &Histogram) -> prompb::Histogram {
    prompb::Histogram {
        count: Some(histogram::Count::CountInt(h.count)),
        sum: h.sum,
        schema: h.schema,
        zero_threshold: h.zero_threshold,
        zero_count: Some(histogram::ZeroCount::ZeroCountInt(h.zero_count)),
        negative_spans: spans_to_spans_proto(&h.negative_spans),
        negative_deltas: h.negative_buckets.clone(),
        negative_counts: Vec::new(),
        positive_spans: spans_to_spans_proto(&h.positive_spans),
        positive_deltas: h.positive_buckets.clone(),
        positive_counts: Vec::new(),
        reset_hint: reset_hint_to_proto(h.counter_reset_hint) as i32,
        timestamp,
    }
}

pub fn float_histogram_to_proto(timestamp: i64, fh: &FloatHistogram) -> prompb::Histogram {
    prompb::Histogram {
        count: Some(histogram::Count::CountFloat(fh.count)),
        sum: fh.sum,
        schema: fh.schema,
        zero_threshold: fh.zero_threshold,
        zero_count: Some(histogram::ZeroCount::ZeroCountFloat(fh.zero_count)),
        negative_spans: spans_to_spans_proto(&fh.negative_spans),
        negative_deltas: Vec::new(),
        negative_counts: fh.negative_buckets.clone(),
        positive_spans: spans_to_spans_proto(&fh.positive_spans),
        positive_deltas: Vec::new(),
        positive_counts: fh.positive_buckets.clone(),
        reset_hint: reset_hint_to_proto(fh.counter_reset_hint) as i32,
        timestamp,
    }
}

fn spans_to_spans_proto(spans: &[Span]) -> Vec<prompb::BucketSpan> {
    spans
        .iter()
        .map(|s| prompb::BucketSpan {
            offset: s.offset,
            length: s.length,
        })
        .collect()
}

fn reset_hint_to_proto(hint: CounterResetHint) -> histogram::ResetHint {
    match hint {
        CounterResetHint::Unknown => histogram::ResetHint::Unknown,
        CounterResetHint::CounterReset => histogram::ResetHint::Yes,
        CounterResetHint::NotCounterReset => histogram::ResetHint::No,
        CounterResetHint::Gauge => histogram::ResetHint::Gauge,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Exemplar, HistogramSample, Sample};

    fn decode(payload: &[u8]) -> prompb::WriteRequest {
        let raw = snap::raw::Decoder::new().decompress_vec(payload).unwrap();
        prompb::WriteRequest::decode(raw.as_slice()).unwrap()
    }

    #[test]
    fn test_labels_round_trip_preserves_order() {
        let labels = Labels::from_pairs([
            ("__name__", "node_cpu_seconds_total"),
            ("cpu", "0"),
            ("mode", "idle"),
        ]);

        let proto = labels_to_labels_proto(&labels, Vec::new());
        let names: Vec<&str> = proto.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["__name__", "cpu", "mode"]);

        assert_eq!(labels_from_labels_proto(&proto), labels);
    }

    #[test]
    fn test_label_buffer_is_reused() {
        let labels = Labels::from_pairs([("a", "1"), ("b", "2")]);
        let buf = Vec::with_capacity(8);
        let ptr = buf.as_ptr();

        let out = labels_to_labels_proto(&labels, buf);
        assert_eq!(out.len(), 2);
        assert_eq!(out.as_ptr(), ptr);
    }

    #[test]
    fn test_populate_tags_each_variant() {
        let sample = Sample {
            labels: Labels::from_pairs([("__name__", "up")]),
            timestamp: 1_000,
            value: 1.0,
        };
        let exemplar = Exemplar {
            labels: Labels::from_pairs([("__name__", "latency")]),
            exemplar_labels: Labels::from_pairs([("trace_id", "abc")]),
            timestamp: 2_000,
            value: 0.25,
        };
        let hist = HistogramSample {
            labels: Labels::from_pairs([("__name__", "rpc")]),
            timestamp: 3_000,
            histogram: Histogram {
                count: 4,
                sum: 10.0,
                positive_spans: vec![Span {
                    offset: 0,
                    length: 2,
                }],
                positive_buckets: vec![1, 2],
                ..Default::default()
            },
        };
        let records = vec![
            SeriesRecord::from(&sample),
            SeriesRecord::from(&exemplar),
            SeriesRecord::from(&hist),
        ];

        let mut pending = Vec::new();
        let counts = populate_time_series(&records, &mut pending);

        assert_eq!(
            counts,
            SeriesCounts {
                samples: 1,
                exemplars: 1,
                histograms: 1
            }
        );
        assert_eq!(pending.len(), 3);
        assert_eq!(pending[0].samples.len(), 1);
        assert!(pending[0].exemplars.is_empty());
        assert_eq!(pending[1].exemplars[0].labels[0].name, "trace_id");
        assert_eq!(pending[2].histograms[0].positive_deltas, vec![1, 2]);
        assert_eq!(
            pending[2].histograms[0].count,
            Some(histogram::Count::CountInt(4))
        );
        assert_eq!(SeriesCounts::of(&pending), counts);
    }

    #[test]
    fn test_populate_reuses_pending_entries() {
        let sample = Sample {
            labels: Labels::from_pairs([("__name__", "up")]),
            timestamp: 5,
            value: 0.0,
        };
        let mut pending = vec![prompb::TimeSeries {
            exemplars: vec![prompb::Exemplar::default()],
            ..Default::default()
        }; 4];

        populate_time_series(&[SeriesRecord::from(&sample)], &mut pending);

        assert_eq!(pending.len(), 1);
        assert!(pending[0].exemplars.is_empty());
        assert_eq!(pending[0].samples[0].timestamp, 5);
    }

    #[test]
    fn test_build_write_request_tracks_highest_timestamp() {
        let series = vec![
            prompb::TimeSeries {
                samples: vec![prompb::Sample {
                    value: 1.0,
                    timestamp: 10,
                }],
                ..Default::default()
            },
            prompb::TimeSeries {
                histograms: vec![prompb::Histogram {
                    timestamp: 42,
                    ..Default::default()
                }],
                ..Default::default()
            },
            prompb::TimeSeries {
                exemplars: vec![prompb::Exemplar {
                    timestamp: 7,
                    ..Default::default()
                }],
                ..Default::default()
            },
        ];

        let encoded = build_write_request(series.clone(), Vec::new()).unwrap();
        assert_eq!(encoded.highest_timestamp, 42);

        let decoded = decode(&encoded.payload);
        assert_eq!(decoded.timeseries, series);
        assert!(decoded.metadata.is_empty());
    }

    #[test]
    fn test_build_write_request_empty() {
        let encoded = build_write_request(Vec::new(), Vec::new()).unwrap();
        assert_eq!(encoded.highest_timestamp, 0);
        assert_eq!(decode(&encoded.payload), prompb::WriteRequest::default());
    }

    #[test]
    fn test_metric_type_mapping() {
        assert_eq!(metric_type_to_metric_type_proto("counter"), MetricType::Counter);
        assert_eq!(
            metric_type_to_metric_type_proto("GaugeHistogram"),
            MetricType::Gaugehistogram
        );
        assert_eq!(metric_type_to_metric_type_proto("stateset"), MetricType::Stateset);
        assert_eq!(metric_type_to_metric_type_proto("bogus"), MetricType::Unknown);
        assert_eq!(metric_type_to_metric_type_proto(""), MetricType::Unknown);
    }

    #[test]
    fn test_metadata_to_proto() {
        let metadata = vec![Metadata {
            name: "http_requests_total".to_string(),
            metric_type: "counter".to_string(),
            help: "Total requests.".to_string(),
            unit: String::new(),
        }];

        let proto = metadata_to_proto(&metadata);
        assert_eq!(proto[0].metric_family_name, "http_requests_total");
        assert_eq!(proto[0].r#type(), MetricType::Counter);
        assert_eq!(proto[0].help, "Total requests.");
    }

    #[test]
    fn test_float_histogram_uses_absolute_counts() {
        let fh = FloatHistogram {
            count: 3.0,
            zero_count: 1.0,
            counter_reset_hint: CounterResetHint::Gauge,
            negative_spans: vec![Span {
                offset: -1,
                length: 1,
            }],
            negative_buckets: vec![2.0],
            ..Default::default()
        };

        let proto = float_histogram_to_proto(99, &fh);
        assert_eq!(proto.count, Some(histogram::Count::CountFloat(3.0)));
        assert_eq!(
            proto.zero_count,
            Some(histogram::ZeroCount::ZeroCountFloat(1.0))
        );
        assert_eq!(proto.negative_counts, vec![2.0]);
        assert!(proto.negative_deltas.is_empty());
        assert_eq!(proto.negative_spans[0].offset, -1);
        assert_eq!(proto.reset_hint(), histogram::ResetHint::Gauge);
        assert_eq!(proto.timestamp, 99);
    }
}
