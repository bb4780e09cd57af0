//! Aggregation algorithms.
//!
//! Histogram-aware algorithms only ever look at histogram datapoints, while [`ScalarAggregator`]
//! only ever looks at scalar ones.  [`DispatchingAggregator`](crate::DispatchingAggregator) picks
//! between them based on what a series actually holds.
mod apdex;
pub use self::apdex::Apdex;

mod filter;
pub use self::filter::{BinFilter, FilterOp, Indeterminate};

mod merge;
pub use self::merge::HistogramMerge;

mod percent_remaining;
pub use self::percent_remaining::PercentRemaining;

mod percentile;
pub use self::percentile::HistogramPercentile;
pub(crate) use self::percentile::{check_percentile, percentile_label};

mod scalar;
pub use self::scalar::{ScalarAggregator, ScalarFunction};

mod std_dev;
pub use self::std_dev::HistogramStdDev;

mod summary;
pub use self::summary::{HistogramStatistic, Statistic};
