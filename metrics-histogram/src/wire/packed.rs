//! Length-delimited packed record encoding.
//!
//! Buckets are stored as packed integer keys (see [`pack`](crate::pack)) in a protobuf message,
//! which is prefixed with its varint-encoded length.  The record carries its own precision, so
//! it can be decoded without any out-of-band information.
//!
//! .proto:
//! ```protobuf
//! message PackedHistogram {
//!   repeated uint64 keys = 1;
//!   repeated uint64 counts = 2;
//!   double min = 3;
//!   double max = 4;
//!   double mean = 5;
//!   double sum = 6;
//!   uint32 precision = 7;
//!   optional uint64 original_count = 8;
//! }
//! ```
use bytes::{Buf, BufMut};
use ordered_float::OrderedFloat;
use prost::Message;

use crate::bucket::{pack, unpack};
use crate::error::{check_precision, HistogramError};
use crate::histogram::{Buckets, Histogram};

/// A histogram with packed bucket keys.
#[derive(prost::Message, Clone, PartialEq)]
pub struct PackedHistogram {
    /// Packed bucket keys, in ascending bucket order.
    #[prost(uint64, repeated, tag = "1")]
    pub keys: Vec<u64>,
    /// Sample count of each bucket in `keys`.
    #[prost(uint64, repeated, tag = "2")]
    pub counts: Vec<u64>,
    /// Smallest sample value.
    #[prost(double, tag = "3")]
    pub min: f64,
    /// Largest sample value.
    #[prost(double, tag = "4")]
    pub max: f64,
    /// Mean of all sample values.
    #[prost(double, tag = "5")]
    pub mean: f64,
    /// Sum of all sample values.
    #[prost(double, tag = "6")]
    pub sum: f64,
    /// Precision the keys were packed with.
    #[prost(uint32, tag = "7")]
    pub precision: u32,
    /// Sample count of the unfiltered histogram.
    #[prost(uint64, optional, tag = "8")]
    pub original_count: Option<u64>,
}

impl From<&Histogram> for PackedHistogram {
    fn from(histogram: &Histogram) -> Self {
        let precision = histogram.precision();
        let (keys, counts): (Vec<u64>, Vec<u64>) =
            histogram.buckets().map(|(bucket, count)| (pack(bucket, precision), count)).unzip();

        PackedHistogram {
            keys,
            counts,
            min: histogram.min(),
            max: histogram.max(),
            mean: histogram.mean(),
            sum: histogram.sum(),
            precision: u32::from(precision),
            original_count: histogram.original_count(),
        }
    }
}

impl TryFrom<PackedHistogram> for Histogram {
    type Error = HistogramError;

    fn try_from(packed: PackedHistogram) -> Result<Self, Self::Error> {
        if packed.keys.len() != packed.counts.len() {
            return Err(HistogramError::MismatchedBuckets {
                keys: packed.keys.len(),
                counts: packed.counts.len(),
            });
        }

        let precision = check_precision(packed.precision)?;

        let mut buckets = Buckets::new();
        for (key, count) in packed.keys.into_iter().zip(packed.counts) {
            *buckets.entry(OrderedFloat(unpack(key, precision))).or_insert(0) += count;
        }

        let histogram = Histogram::from_parts(
            buckets,
            packed.min,
            packed.max,
            packed.sum,
            packed.mean,
            precision,
        )?;

        Ok(match packed.original_count {
            Some(original) => histogram.with_original_count(original),
            None => histogram,
        })
    }
}

/// Encodes a histogram, prefixed with its length, into `buf`.
///
/// # Errors
///
/// If `buf` does not have enough remaining capacity for the record, an error is returned.
pub fn encode<B>(histogram: &Histogram, buf: &mut B) -> Result<(), prost::EncodeError>
where
    B: BufMut,
{
    PackedHistogram::from(histogram).encode_length_delimited(buf)
}

/// Encodes a histogram, prefixed with its length, into a new buffer.
pub fn to_vec(histogram: &Histogram) -> Vec<u8> {
    PackedHistogram::from(histogram).encode_length_delimited_to_vec()
}

/// Decodes a length-prefixed histogram record from `buf`.
///
/// # Errors
///
/// If the record is malformed, or its precision is out of range, an error is returned.
pub fn decode<B>(buf: B) -> Result<Histogram, HistogramError>
where
    B: Buf,
{
    let packed = PackedHistogram::decode_length_delimited(buf)?;
    Histogram::try_from(packed)
}
