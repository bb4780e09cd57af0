use crate::{
    aggregator::{histograms, Aggregator},
    error::AggregationError,
    value::{DataPoint, GroupType, Value},
};

/// A summary statistic derived from histogram summaries.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Statistic {
    /// Total sum divided by total sample count.
    Mean,
    /// Total sum.
    Sum,
    /// Smallest minimum.
    Min,
    /// Largest maximum.
    Max,
}

impl Statistic {
    /// Gets the name of the statistic.
    pub fn as_str(self) -> &'static str {
        match self {
            Statistic::Mean => "avg",
            Statistic::Sum => "sum",
            Statistic::Min => "min",
            Statistic::Max => "max",
        }
    }
}

/// Reduces the histograms of a window to a single summary statistic.
///
/// Only the stored summaries of each histogram are read, never its buckets, so the result is as
/// exact as the summaries themselves.  A window holding histograms without samples yields `NaN`
/// for the mean and the neutral element for the other statistics.
#[derive(Clone, Copy, Debug)]
pub struct HistogramStatistic {
    statistic: Statistic,
}

impl HistogramStatistic {
    /// Creates a new `HistogramStatistic`.
    pub fn new(statistic: Statistic) -> Self {
        HistogramStatistic { statistic }
    }

    /// Gets the computed statistic.
    pub fn statistic(&self) -> Statistic {
        self.statistic
    }
}

impl Aggregator for HistogramStatistic {
    fn name(&self) -> &str {
        self.statistic.as_str()
    }

    fn can_aggregate(&self, group: GroupType) -> bool {
        group == GroupType::Histogram
    }

    fn output_group(&self, _input: GroupType) -> GroupType {
        GroupType::Numeric
    }

    #[allow(clippy::cast_precision_loss)]
    fn aggregate(
        &self,
        points: &mut dyn Iterator<Item = DataPoint>,
    ) -> Result<Option<Value>, AggregationError> {
        let mut seen = false;
        let mut sum = 0.0;
        let mut count = 0u64;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;

        for histogram in histograms(points) {
            seen = true;
            sum += histogram.sum();
            count += histogram.sample_count();
            min = min.min(histogram.min());
            max = max.max(histogram.max());
        }

        if !seen {
            return Ok(None);
        }

        let value = match self.statistic {
            Statistic::Mean => sum / count as f64,
            Statistic::Sum => sum,
            Statistic::Min => min,
            Statistic::Max => max,
        };
        Ok(Some(Value::Double(value)))
    }
}
