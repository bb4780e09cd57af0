use std::{fmt, str::FromStr, sync::Arc};

use metrics_histogram::{bucket_edges, Histogram, HistogramBuilder};
use serde::Deserialize;

use crate::{
    aggregator::{histograms, Aggregator},
    error::AggregationError,
    value::{DataPoint, GroupType, Value},
};

/// Comparison applied between a bucket and the filter threshold.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum FilterOp {
    /// Less than.
    Lt,
    /// Less than or equal.
    Lte,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Gte,
    /// Equal.
    Equal,
}

impl FilterOp {
    /// Gets the name of the comparison.
    pub fn as_str(self) -> &'static str {
        match self {
            FilterOp::Lt => "lt",
            FilterOp::Lte => "lte",
            FilterOp::Gt => "gt",
            FilterOp::Gte => "gte",
            FilterOp::Equal => "equal",
        }
    }
}

impl fmt::Display for FilterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterOp {
    type Err = AggregationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lt" => Ok(FilterOp::Lt),
            "lte" => Ok(FilterOp::Lte),
            "gt" => Ok(FilterOp::Gt),
            "gte" => Ok(FilterOp::Gte),
            "equal" => Ok(FilterOp::Equal),
            other => Err(AggregationError::invalid_parameter(
                "filter_op",
                format!("unknown comparison `{other}`"),
            )),
        }
    }
}

/// How buckets that straddle the threshold are treated.
///
/// A bucket covers a range of sample values, so it may hold samples on both sides of the
/// threshold.  Such buckets are indeterminate.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Indeterminate {
    /// Compare using the bucket edge that keeps straddling buckets out of the comparison.
    #[default]
    Keep,
    /// Compare using the bucket edge that brings straddling buckets into the comparison.
    Discard,
}

impl FromStr for Indeterminate {
    type Err = AggregationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "keep" => Ok(Indeterminate::Keep),
            "discard" => Ok(Indeterminate::Discard),
            other => Err(AggregationError::invalid_parameter(
                "filter_indeterminate",
                format!("unknown policy `{other}`"),
            )),
        }
    }
}

/// Filters the buckets of a histogram against a threshold.
///
/// | op      | keep                  | discard                        |
/// |---------|-----------------------|--------------------------------|
/// | `lt`    | `upper < threshold`   | `lower < threshold`            |
/// | `lte`   | `upper <= threshold`  | `lower <= threshold`           |
/// | `gt`    | `lower > threshold`   | `upper > threshold`            |
/// | `gte`   | `lower >= threshold`  | `upper >= threshold`           |
/// | `equal` | never                 | `lower <= threshold <= upper`  |
///
/// `lower` and `upper` are the [edges](metrics_histogram::bucket_edges) of the bucket, and a
/// bucket matching its row is retained.  The filtered histogram remembers how many samples the
/// unfiltered one held as its original count.
#[derive(Clone, Copy, Debug)]
pub struct BinFilter {
    op: FilterOp,
    threshold: f64,
    indeterminate: Indeterminate,
}

impl BinFilter {
    /// Creates a new `BinFilter`.
    ///
    /// # Errors
    ///
    /// If `threshold` is NaN, an error is returned.
    pub fn new(
        op: FilterOp,
        threshold: f64,
        indeterminate: Indeterminate,
    ) -> Result<Self, AggregationError> {
        if threshold.is_nan() {
            return Err(AggregationError::invalid_parameter("threshold", "threshold is NaN"));
        }
        Ok(BinFilter { op, threshold, indeterminate })
    }

    /// Whether or not the bucket holding `bucket` is retained.
    pub fn retains(&self, bucket: f64, precision: u8) -> bool {
        let (lower, upper) = bucket_edges(bucket, precision);
        let threshold = self.threshold;

        match (self.op, self.indeterminate) {
            (FilterOp::Lt, Indeterminate::Keep) => upper < threshold,
            (FilterOp::Lt, Indeterminate::Discard) => lower < threshold,
            (FilterOp::Lte, Indeterminate::Keep) => upper <= threshold,
            (FilterOp::Lte, Indeterminate::Discard) => lower <= threshold,
            (FilterOp::Gt, Indeterminate::Keep) => lower > threshold,
            (FilterOp::Gt, Indeterminate::Discard) => upper > threshold,
            (FilterOp::Gte, Indeterminate::Keep) => lower >= threshold,
            (FilterOp::Gte, Indeterminate::Discard) => upper >= threshold,
            (FilterOp::Equal, Indeterminate::Keep) => false,
            (FilterOp::Equal, Indeterminate::Discard) => lower <= threshold && threshold <= upper,
        }
    }

    /// Splits a histogram into its retained and filtered-out buckets.
    ///
    /// Both halves carry the sample count of `histogram` (or its own original count, when it has
    /// one) as their original count.
    ///
    /// # Errors
    ///
    /// If the precision of `histogram` is invalid, an error is returned.
    pub fn partition(
        &self,
        histogram: &Histogram,
    ) -> Result<(Histogram, Histogram), AggregationError> {
        let precision = histogram.precision();
        let original = histogram.original_count().unwrap_or_else(|| histogram.sample_count());

        let (retained, dropped): (Vec<_>, Vec<_>) =
            histogram.buckets().partition(|(bucket, _)| self.retains(*bucket, precision));

        let retained = Histogram::from_buckets(retained, precision)?.with_original_count(original);
        let dropped = Histogram::from_buckets(dropped, precision)?.with_original_count(original);
        Ok((retained, dropped))
    }

    /// Filters a histogram, keeping only the retained buckets.
    ///
    /// # Errors
    ///
    /// If the precision of `histogram` is invalid, an error is returned.
    pub fn apply(&self, histogram: &Histogram) -> Result<Histogram, AggregationError> {
        self.partition(histogram).map(|(retained, _)| retained)
    }
}

/// Merges the histograms of a window at the coarsest precision among them.
///
/// A single histogram is handed back as-is.
pub(crate) fn combine(
    histograms: Vec<Arc<Histogram>>,
) -> Result<Option<Arc<Histogram>>, AggregationError> {
    let Some(precision) = histograms.iter().map(|h| h.precision()).min() else {
        return Ok(None);
    };
    if histograms.len() == 1 {
        return Ok(histograms.into_iter().next());
    }

    let mut builder = HistogramBuilder::new(precision)?;
    for histogram in &histograms {
        builder.merge(histogram);
    }
    Ok(Some(Arc::new(builder.build())))
}

impl Aggregator for BinFilter {
    fn name(&self) -> &str {
        "bin_filter"
    }

    fn can_aggregate(&self, group: GroupType) -> bool {
        group == GroupType::Histogram
    }

    fn output_group(&self, _input: GroupType) -> GroupType {
        GroupType::Histogram
    }

    fn aggregate(
        &self,
        points: &mut dyn Iterator<Item = DataPoint>,
    ) -> Result<Option<Value>, AggregationError> {
        match combine(histograms(points).collect())? {
            Some(histogram) => Ok(Some(self.apply(&histogram)?.into())),
            None => Ok(None),
        }
    }
}
