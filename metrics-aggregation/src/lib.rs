//! Aggregation operators over streams of histograms and scalar datapoints.
//!
//! Series either hold scalars (`Long` or `Double` values) or [histograms](metrics_histogram).  An
//! [`Aggregator`] reduces the datapoints of one time window to at most one value, and the
//! algorithms in [`algorithms`] cover both kinds of series:
//!
//! - histogram merge, mean, sum, minimum, maximum, standard deviation, percentiles, Apdex score,
//!   bin filtering and the share of samples left after filtering,
//! - the classic scalar reductions, through [`ScalarAggregator`](algorithms::ScalarAggregator).
//!
//! A query rarely knows up front what a series holds, so operations are resolved through an
//! [`AggregatorCatalog`] into a [`DispatchingAggregator`], which picks the right algorithm based
//! on the first datapoint of each window.
//!
//! ```rust
//! # use std::sync::Arc;
//! # use chrono::{TimeDelta, TimeZone, Utc};
//! # use metrics_aggregation::{AggregationParams, AggregatorCatalog, DataPoint, Downsample, Value};
//! # use metrics_histogram::Histogram;
//! let catalog = AggregatorCatalog::builder().build().expect("default precision is valid");
//! let avg = catalog.resolve_named("avg", &AggregationParams::default()).expect("known operation");
//!
//! let start = Utc.with_ymd_and_hms(2018, 1, 1, 0, 0, 0).unwrap();
//! let points = vec![
//!     DataPoint::new(start, Histogram::from_samples([1.0, 3.0], 10).unwrap()),
//!     DataPoint::new(start, Histogram::from_samples([5.0, 7.0, 9.0], 10).unwrap()),
//! ];
//!
//! let mut windows = Downsample::new(points, TimeDelta::minutes(1), avg).unwrap();
//! assert_eq!(windows.next().unwrap().unwrap().value, Value::Double(5.0));
//! ```
//!
//! # Moving windows
//!
//! [`MovingWindow`] turns a stream into overlapping, calendar-aligned windows ahead of
//! aggregation: see the [`window`] module.
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg), deny(rustdoc::broken_intra_doc_links))]

mod aggregator;
pub use self::aggregator::Aggregator;

pub mod algorithms;
pub use self::algorithms::{FilterOp, Indeterminate};

mod catalog;
pub use self::catalog::{AggregationParams, AggregatorCatalog, AggregatorCatalogBuilder, Operation};

mod dispatch;
pub use self::dispatch::DispatchingAggregator;

mod downsample;
pub use self::downsample::Downsample;

mod error;
pub use self::error::{AggregationError, BuildError};

mod value;
pub use self::value::{DataPoint, DataType, GroupType, StandardTypeRegistry, TypeRegistry, Value};

pub mod window;
pub use self::window::{CalendarUnit, MovingWindow, MovingWindowConfig, Sampling};
