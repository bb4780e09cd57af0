//! Fixed-width binary record encoding.
//!
//! All fields are big-endian:
//!
//! ```text
//! count: i32
//! count x (bucket: f64, occurrences: i32)
//! min: f64, max: f64, mean: f64, sum: f64
//! ```
//!
//! The record does not carry the precision of the histogram or its original count.  Decoders
//! must be handed the precision the record was written with; prefer the
//! [packed](super::packed) encoding, which is self-describing, for new data.
use bytes::{Buf, BufMut};

use crate::error::HistogramError;
use crate::histogram::{Buckets, Histogram};

use ordered_float::OrderedFloat;

const COUNT_LEN: usize = 4;
const BUCKET_LEN: usize = 8 + 4;
const SUMMARY_LEN: usize = 4 * 8;

fn to_i32(field: &'static str, value: u64) -> Result<i32, HistogramError> {
    i32::try_from(value).map_err(|_| HistogramError::CountOverflow { field, value })
}

/// Gets the encoded length of a histogram, in bytes.
pub fn encoded_len(histogram: &Histogram) -> usize {
    COUNT_LEN + histogram.bucket_count() * BUCKET_LEN + SUMMARY_LEN
}

/// Encodes a histogram into `buf`.
///
/// # Errors
///
/// If the histogram has more buckets, or more samples in a single bucket, than fit in a 32-bit
/// signed integer, an error is returned and nothing is written.
pub fn encode<B>(histogram: &Histogram, buf: &mut B) -> Result<(), HistogramError>
where
    B: BufMut,
{
    let bucket_count = to_i32("bucket count", histogram.bucket_count() as u64)?;
    let buckets = histogram
        .buckets()
        .map(|(bucket, count)| to_i32("bucket occurrences", count).map(|count| (bucket, count)))
        .collect::<Result<Vec<_>, _>>()?;

    buf.put_i32(bucket_count);
    for (bucket, count) in buckets {
        buf.put_f64(bucket);
        buf.put_i32(count);
    }
    buf.put_f64(histogram.min());
    buf.put_f64(histogram.max());
    buf.put_f64(histogram.mean());
    buf.put_f64(histogram.sum());

    Ok(())
}

/// Encodes a histogram into a new buffer.
///
/// # Errors
///
/// See [`encode`].
pub fn to_vec(histogram: &Histogram) -> Result<Vec<u8>, HistogramError> {
    let mut buf = Vec::with_capacity(encoded_len(histogram));
    encode(histogram, &mut buf)?;
    Ok(buf)
}

fn ensure<B: Buf>(buf: &B, needed: usize) -> Result<(), HistogramError> {
    let remaining = buf.remaining();
    if remaining < needed {
        return Err(HistogramError::Truncated { needed, remaining });
    }
    Ok(())
}

/// Decodes a histogram from `buf`, using the precision the record was encoded with.
///
/// Bucket values are taken as-is.  Decoding with a different precision than the one the buckets
/// were truncated to is not detected.
///
/// # Errors
///
/// If the record is truncated, holds a negative count, or `precision` is out of range, an error is
/// returned.
pub fn decode<B>(buf: &mut B, precision: u8) -> Result<Histogram, HistogramError>
where
    B: Buf,
{
    ensure(buf, COUNT_LEN)?;
    let bucket_count = buf.get_i32();
    let bucket_count = usize::try_from(bucket_count).map_err(|_| HistogramError::NegativeCount {
        field: "bucket count",
        value: i64::from(bucket_count),
    })?;

    ensure(buf, bucket_count.saturating_mul(BUCKET_LEN).saturating_add(SUMMARY_LEN))?;

    let mut buckets = Buckets::new();
    for _ in 0..bucket_count {
        let bucket = buf.get_f64();
        let occurrences = buf.get_i32();
        let occurrences = u64::try_from(occurrences).map_err(|_| HistogramError::NegativeCount {
            field: "bucket occurrences",
            value: i64::from(occurrences),
        })?;
        *buckets.entry(OrderedFloat(bucket)).or_insert(0) += occurrences;
    }

    let min = buf.get_f64();
    let max = buf.get_f64();
    let mean = buf.get_f64();
    let sum = buf.get_f64();

    Histogram::from_parts(buckets, min, max, sum, mean, precision)
}
