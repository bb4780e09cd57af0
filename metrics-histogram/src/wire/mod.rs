//! Wire encodings for histograms.
//!
//! Three encodings are supported:
//!
//! - [`json`]: a JSON document with decimal bucket keys,
//! - [`binary`]: a fixed-width, big-endian record with raw `f64` bucket values,
//! - [`packed`]: a length-delimited protobuf message with packed integer bucket keys.
//!
//! Every encoding reproduces bucket values bit-for-bit.  Only the binary record lacks the
//! histogram's precision, which then has to be supplied when decoding.
pub mod binary;
pub mod json;
pub mod packed;

use crate::{error::HistogramError, Histogram};

/// A histogram wire encoding.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum WireFormat {
    /// JSON document.
    Json,
    /// Fixed-width binary record.
    Binary,
    /// Length-delimited packed record.
    Packed,
}

impl WireFormat {
    /// Whether or not the encoding stores the histogram's precision.
    pub fn is_self_describing(self) -> bool {
        !matches!(self, WireFormat::Binary)
    }

    /// Encodes a histogram.
    ///
    /// # Errors
    ///
    /// See the encoding-specific `to_vec` functions.
    pub fn encode(self, histogram: &Histogram) -> Result<Vec<u8>, HistogramError> {
        match self {
            WireFormat::Json => json::to_vec(histogram),
            WireFormat::Binary => binary::to_vec(histogram),
            WireFormat::Packed => Ok(packed::to_vec(histogram)),
        }
    }

    /// Decodes a histogram.
    ///
    /// `precision` is only consulted for encodings that do not store it themselves.
    ///
    /// # Errors
    ///
    /// See the encoding-specific decoding functions.
    pub fn decode(self, mut bytes: &[u8], precision: u8) -> Result<Histogram, HistogramError> {
        match self {
            WireFormat::Json => json::from_slice(bytes),
            WireFormat::Binary => binary::decode(&mut bytes, precision),
            WireFormat::Packed => packed::decode(bytes),
        }
    }
}
