use thiserror::Error;

use crate::bucket::MAX_PRECISION;

/// Errors that could occur while building, encoding or decoding a histogram.
#[derive(Debug, Error)]
pub enum HistogramError {
    /// The precision does not fit within the mantissa of a double.
    #[error("precision {precision} exceeds the maximum of {max}", max = MAX_PRECISION)]
    InvalidPrecision {
        /// The rejected precision.
        precision: u32,
    },

    /// A binary record ended before all of its fields could be read.
    #[error("histogram record truncated: needed {needed} bytes, {remaining} remaining")]
    Truncated {
        /// Bytes required by the next field.
        needed: usize,
        /// Bytes left in the buffer.
        remaining: usize,
    },

    /// A count field held a negative value.
    #[error("negative {field} in histogram record: {value}")]
    NegativeCount {
        /// Name of the offending field.
        field: &'static str,
        /// The value that was read.
        value: i64,
    },

    /// A count does not fit the fixed-width field of the binary record.
    #[error("{field} of {value} does not fit in a binary histogram record")]
    CountOverflow {
        /// Name of the offending field.
        field: &'static str,
        /// The value that was too large.
        value: u64,
    },

    /// A bucket key could not be parsed back into a double.
    #[error("invalid bucket key {key:?}")]
    InvalidBucketKey {
        /// The raw key.
        key: String,
    },

    /// A packed record had a different number of bucket keys and counts.
    #[error("packed histogram has {keys} bucket keys but {counts} counts")]
    MismatchedBuckets {
        /// Number of bucket keys.
        keys: usize,
        /// Number of counts.
        counts: usize,
    },

    /// The JSON document was malformed.
    #[error("malformed histogram document: {0}")]
    Json(#[from] serde_json::Error),

    /// The packed record was malformed.
    #[error("malformed packed histogram: {0}")]
    Protobuf(#[from] prost::DecodeError),
}

/// Validates a precision read from configuration or from the wire.
pub(crate) fn check_precision(precision: u32) -> Result<u8, HistogramError> {
    match u8::try_from(precision) {
        Ok(p) if p <= MAX_PRECISION => Ok(p),
        _ => Err(HistogramError::InvalidPrecision { precision }),
    }
}
