//! JSON document encoding.
//!
//! ```json
//! {"buckets":{"1.0":3,"3.0":1},"min":1.0,"max":3.0,"sum":6.0,"mean":1.5,"precision":10}
//! ```
//!
//! Bucket keys are written in their shortest round-tripping decimal form, so parsing a key yields
//! the exact bucket value that was written.  Summary fields that are not finite (as in an empty
//! histogram) are written as `null`.
use std::collections::HashMap;

use ordered_float::OrderedFloat;
use serde::{ser::SerializeMap, Deserialize, Serialize, Serializer};

use crate::error::{check_precision, HistogramError};
use crate::histogram::{Buckets, Histogram};

struct BucketKeys<'a>(&'a Buckets);

impl Serialize for BucketKeys<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut buffer = ryu::Buffer::new();
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (bucket, count) in self.0 {
            map.serialize_entry(buffer.format(bucket.0), count)?;
        }
        map.end()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Document<'a> {
    buckets: BucketKeys<'a>,
    min: f64,
    max: f64,
    sum: f64,
    mean: f64,
    precision: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    original_count: Option<u64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OwnedDocument {
    buckets: HashMap<String, i64>,
    min: Option<f64>,
    max: Option<f64>,
    sum: Option<f64>,
    mean: Option<f64>,
    precision: u32,
    #[serde(default)]
    original_count: Option<i64>,
}

/// Encodes a histogram as a JSON document.
///
/// # Errors
///
/// Encoding into an in-memory buffer does not fail in practice, but serializer errors are
/// propagated.
pub fn to_vec(histogram: &Histogram) -> Result<Vec<u8>, HistogramError> {
    Ok(serde_json::to_vec(&Document::new(histogram))?)
}

/// Encodes a histogram as a JSON string.
///
/// # Errors
///
/// See [`to_vec`].
pub fn to_string(histogram: &Histogram) -> Result<String, HistogramError> {
    Ok(serde_json::to_string(&Document::new(histogram))?)
}

impl<'a> Document<'a> {
    fn new(histogram: &'a Histogram) -> Document<'a> {
        Document {
            buckets: BucketKeys(histogram.bucket_map()),
            min: histogram.min(),
            max: histogram.max(),
            sum: histogram.sum(),
            mean: histogram.mean(),
            precision: histogram.precision(),
            original_count: histogram.original_count(),
        }
    }
}

/// Decodes a histogram from a JSON document.
///
/// # Errors
///
/// If the document is malformed, holds a bucket key that is not a number, a negative count, or a
/// precision out of range, an error is returned.
pub fn from_slice(bytes: &[u8]) -> Result<Histogram, HistogramError> {
    let document: OwnedDocument = serde_json::from_slice(bytes)?;
    let precision = check_precision(document.precision)?;

    let mut buckets = Buckets::new();
    for (key, count) in document.buckets {
        let bucket = key
            .parse::<f64>()
            .map_err(|_| HistogramError::InvalidBucketKey { key: key.clone() })?;
        let count = u64::try_from(count)
            .map_err(|_| HistogramError::NegativeCount { field: "bucket count", value: count })?;
        *buckets.entry(OrderedFloat(bucket)).or_insert(0) += count;
    }

    let histogram = Histogram::from_parts(
        buckets,
        document.min.unwrap_or(f64::INFINITY),
        document.max.unwrap_or(f64::NEG_INFINITY),
        document.sum.unwrap_or(0.0),
        document.mean.unwrap_or(f64::NAN),
        precision,
    )?;

    match document.original_count {
        None => Ok(histogram),
        Some(value) => u64::try_from(value)
            .map(|original| histogram.with_original_count(original))
            .map_err(|_| HistogramError::NegativeCount { field: "original count", value }),
    }
}

/// Decodes a histogram from a JSON string.
///
/// # Errors
///
/// See [`from_slice`].
pub fn from_str(document: &str) -> Result<Histogram, HistogramError> {
    from_slice(document.as_bytes())
}
