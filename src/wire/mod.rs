pub mod encoder;
pub mod prompb;

pub use encoder::{
    EncodeError, EncodedRequest, SeriesCounts, build_write_request, labels_from_labels_proto,
    labels_to_labels_proto, metadata_to_proto, metric_type_to_metric_type_proto,
    populate_time_series,
};
