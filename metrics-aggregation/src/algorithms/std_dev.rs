use crate::{
    aggregator::{histograms, Aggregator},
    error::AggregationError,
    value::{DataPoint, GroupType, Value},
};

/// Weighted running variance.
///
/// Each observation carries an integer weight, so a histogram bucket is accounted for in a single
/// step instead of once per sample.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct Welford {
    count: u64,
    mean: f64,
    m2: f64,
}

impl Welford {
    #[allow(clippy::cast_precision_loss)]
    pub(crate) fn observe(&mut self, value: f64, weight: u64) {
        if weight == 0 {
            return;
        }

        self.count += weight;
        let weight = weight as f64;
        let delta = value - self.mean;
        self.mean += delta * weight / self.count as f64;
        self.m2 += delta * (value - self.mean) * weight;
    }

    /// Sample standard deviation.
    ///
    /// `NaN` unless at least two observations were made.
    #[allow(clippy::cast_precision_loss)]
    pub(crate) fn std_dev(&self) -> f64 {
        (self.m2 / self.count.saturating_sub(1) as f64).sqrt()
    }
}

/// Computes the sample standard deviation of every histogram bucket in a window.
///
/// Buckets stand in for the samples they hold, so the result carries the truncation error of the
/// histogram precision.
#[derive(Clone, Copy, Debug, Default)]
pub struct HistogramStdDev;

impl Aggregator for HistogramStdDev {
    fn name(&self) -> &str {
        "dev"
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
        let mut seen = false;
        let mut welford = Welford::default();
        for histogram in histograms(points) {
            seen = true;
            for (bucket, count) in histogram.buckets() {
                welford.observe(bucket, count);
            }
        }

        Ok(seen.then(|| Value::Double(welford.std_dev())))
    }
}
