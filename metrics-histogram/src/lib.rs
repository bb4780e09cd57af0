//! Mergeable histograms with precision-bounded buckets.
//!
//! This crate provides the histogram data type stored alongside regular time series: every sample
//! is truncated to a fixed number of mantissa bits, and the histogram counts samples per truncated
//! value.  Truncation is deterministic, so histograms recorded at the same precision by different
//! writers can be merged by simply adding up their bucket counts.
//!
//! # Buckets
//!
//! The [`truncate`], [`pack`] and [`unpack`] functions form the bucket codec.  A precision of `p`
//! bounds the relative width of a bucket to `2^-p`: with the [`DEFAULT_PRECISION`] of 10, every
//! bucket is within roughly 0.1% of the samples it holds.
//!
//! ```rust
//! # use metrics_histogram::{truncate, pack, unpack};
//! let bucket = truncate(1234.5678, 10);
//! assert_eq!(bucket, 1234.0);
//! assert_eq!(unpack(pack(1234.5678, 10), 10), bucket);
//! ```
//!
//! # Histograms
//!
//! ```rust
//! # use metrics_histogram::{Histogram, DEFAULT_PRECISION};
//! let histogram = Histogram::from_samples([1.0, 3.0, 5.0, 7.0, 9.0], DEFAULT_PRECISION)
//!     .expect("default precision is valid");
//! assert_eq!(histogram.sample_count(), 5);
//! assert_eq!(histogram.mean(), 5.0);
//! ```
//!
//! # Wire encodings
//!
//! See [`wire`] for the JSON, binary and packed encodings.
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg), deny(rustdoc::broken_intra_doc_links))]

mod bucket;
pub use self::bucket::{
    bucket_edges, bucket_upper_bound, pack, truncate, unpack, DEFAULT_PRECISION, MAX_PRECISION,
};

mod error;
pub use self::error::HistogramError;

mod histogram;
pub use self::histogram::{Buckets, Histogram, HistogramBuilder};

pub mod wire;
