use metrics_histogram::{HistogramBuilder, DEFAULT_PRECISION};

use crate::{
    aggregator::{histograms, Aggregator},
    error::AggregationError,
    value::{DataPoint, GroupType, Value},
};

/// Merges every histogram of a window into a single histogram.
///
/// Buckets are re-truncated to the merge precision, so histograms recorded at different
/// precisions can be merged as long as none of them is coarser than the merge precision.
#[derive(Clone, Debug)]
pub struct HistogramMerge {
    precision: u8,
}

impl HistogramMerge {
    /// Creates a new `HistogramMerge` producing histograms at the given precision.
    ///
    /// # Errors
    ///
    /// If `precision` is out of range, an error is returned.
    pub fn new(precision: u8) -> Result<Self, AggregationError> {
        HistogramBuilder::new(precision)?;
        Ok(HistogramMerge { precision })
    }

    /// Gets the precision of merged histograms.
    pub fn precision(&self) -> u8 {
        self.precision
    }
}

impl Default for HistogramMerge {
    fn default() -> Self {
        HistogramMerge { precision: DEFAULT_PRECISION }
    }
}

impl Aggregator for HistogramMerge {
    fn name(&self) -> &str {
        "merge"
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
        let mut builder = HistogramBuilder::new(self.precision)?;
        let mut merged = 0usize;
        for histogram in histograms(points) {
            builder.merge(&histogram);
            merged += 1;
        }

        if merged == 0 {
            return Ok(None);
        }
        Ok(Some(builder.build().into()))
    }
}

#[cfg(test)]
mod tests {
    use super::HistogramMerge;
    use crate::{
        algorithms::test_util::{epoch, window},
        Aggregator, Value,
    };
    use metrics_histogram::Histogram;

    #[test]
    fn merge_matches_concatenation() {
        let a = Histogram::from_samples([1.0, 2.0, 3.0], 10).unwrap();
        let b = Histogram::from_samples([10.0, 20.0, 24.0], 10).unwrap();
        let expected = Histogram::from_samples([1.0, 2.0, 3.0, 10.0, 20.0, 24.0], 10).unwrap();

        let merge = HistogramMerge::new(10).unwrap();
        let merged = merge.aggregate(&mut window([a, b]).into_iter()).unwrap().unwrap();
        let merged = merged.as_histogram().unwrap();

        assert_eq!(merged.bucket_map(), expected.bucket_map());
        assert_eq!(merged.sample_count(), 6);
        assert_eq!(merged.mean(), 10.0);
        assert_eq!(merged.min(), 1.0);
        assert_eq!(merged.max(), 24.0);
    }

    #[test]
    fn scalars_are_skipped() {
        let mut points = window([Histogram::from_samples([4.0], 10).unwrap()]);
        points.push(crate::DataPoint::new(points[0].timestamp, 7.0));

        let merged = HistogramMerge::default().aggregate(&mut points.into_iter()).unwrap().unwrap();
        assert_eq!(merged.as_histogram().unwrap().sample_count(), 1);
    }

    #[test]
    fn empty_window() {
        let merge = HistogramMerge::default();
        assert_eq!(merge.aggregate(&mut std::iter::empty()).unwrap(), None);

        let scalars = vec![crate::DataPoint::new(epoch(), Value::Long(1))];
        assert_eq!(merge.aggregate(&mut scalars.into_iter()).unwrap(), None);
    }

    #[test]
    fn invalid_precision() {
        assert!(HistogramMerge::new(60).is_err());
    }
}
