use metrics_histogram::Buckets;
use ordered_float::OrderedFloat;

use crate::{
    aggregator::{histograms, Aggregator},
    error::AggregationError,
    value::{DataPoint, GroupType, Value},
};

/// Validates a percentile, expressed as a fraction in `(0, 1]`.
pub(crate) fn check_percentile(percentile: f64) -> Result<f64, AggregationError> {
    if percentile > 0.0 && percentile <= 1.0 {
        Ok(percentile)
    } else {
        Err(AggregationError::invalid_parameter(
            "percentile",
            format!("{percentile} is not within (0, 1]"),
        ))
    }
}

/// Nearest-rank percentile over counted values.
///
/// Returns the smallest value whose cumulative count reaches `ceil(percentile * total)`.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub(crate) fn nearest_rank(buckets: &Buckets, percentile: f64) -> Option<f64> {
    let total = buckets.values().sum::<u64>();
    if total == 0 {
        return None;
    }

    let target = ((percentile * total as f64).ceil() as u64).clamp(1, total);
    let mut cumulative = 0;
    for (bucket, count) in buckets {
        cumulative += count;
        if cumulative >= target {
            return Some(bucket.0);
        }
    }
    None
}

/// Computes a percentile over the combined buckets of a window.
#[derive(Clone, Debug)]
pub struct HistogramPercentile {
    name: String,
    percentile: f64,
}

impl HistogramPercentile {
    /// Creates a new `HistogramPercentile`.
    ///
    /// `percentile` is a fraction: `0.99` computes the 99th percentile.
    ///
    /// # Errors
    ///
    /// If `percentile` is not within `(0, 1]`, an error is returned.
    pub fn new(percentile: f64) -> Result<Self, AggregationError> {
        let percentile = check_percentile(percentile)?;
        Ok(HistogramPercentile { name: percentile_label(percentile), percentile })
    }

    /// Gets the percentile, as a fraction.
    pub fn percentile(&self) -> f64 {
        self.percentile
    }
}

impl Aggregator for HistogramPercentile {
    fn name(&self) -> &str {
        &self.name
    }

    fn can_aggregate(&self, group: GroupType) -> bool {
        group == GroupType::Histogram
    }

    fn output_group(&self, _input: GroupType) -> GroupType {
        GroupType::Numeric
    }

    fn aggregate(
        &self,
        points: &mut dyn Iterator<Item = DataPoint>,
    ) -> Result<Option<Value>, AggregationError> {
        let mut combined = Buckets::new();
        for histogram in histograms(points) {
            for (bucket, count) in histogram.buckets() {
                *combined.entry(OrderedFloat(bucket)).or_insert(0) += count;
            }
        }

        Ok(nearest_rank(&combined, self.percentile).map(Value::Double))
    }
}

/// Formats a percentile the way operation names spell it: `0.5` is `p50`, `0.999` is `p999`.
///
/// The digits are the decimals of the fraction, padded to at least two.
pub(crate) fn percentile_label(percentile: f64) -> String {
    if percentile >= 1.0 {
        return "p100".to_string();
    }

    let formatted = percentile.to_string();
    let decimals = formatted.split_once('.').map_or("", |(_, decimals)| decimals);
    format!("p{decimals:0<2}")
}
