use crate::{
    aggregator::Aggregator,
    error::AggregationError,
    value::{DataPoint, GroupType, Value},
};

const NAME: &str = "percent_remaining";

/// Computes the share of samples a filtered histogram kept, as a fraction.
///
/// Every histogram of the window must carry the original count it was filtered from.  Several
/// histograms in a window are combined by adding up their sample and original counts.
#[derive(Clone, Copy, Debug, Default)]
pub struct PercentRemaining;

impl Aggregator for PercentRemaining {
    fn name(&self) -> &str {
        NAME
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
        let (mut remaining, mut original) = (0u64, 0u64);

        for point in points {
            let data_type = point.data_type();
            let Value::Histogram(histogram) = point.value else {
                return Err(AggregationError::malformed(
                    NAME,
                    format!("expected a histogram, got {data_type:?} at {}", point.timestamp),
                ));
            };
            let Some(count) = histogram.original_count() else {
                return Err(AggregationError::malformed(
                    NAME,
                    format!("histogram at {} has no original count", point.timestamp),
                ));
            };

            seen = true;
            remaining += histogram.sample_count();
            original += count;
        }

        if !seen {
            return Ok(None);
        }
        if original == 0 {
            return Err(AggregationError::malformed(NAME, "original count is zero"));
        }

        Ok(Some(Value::Double(remaining as f64 / original as f64)))
    }
}
