use std::sync::Arc;

use metrics_histogram::Histogram;

use crate::{
    error::AggregationError,
    value::{DataPoint, GroupType, Value},
};

/// An aggregation algorithm.
///
/// An aggregator reduces the datapoints of a single window to at most one value.  Implementations
/// must be stateless between calls: the same instance is shared across threads and windows.
pub trait Aggregator: Send + Sync {
    /// Gets the name of the algorithm.
    fn name(&self) -> &str;

    /// Whether or not this algorithm handles series of the given group.
    fn can_aggregate(&self, group: GroupType) -> bool;

    /// Gets the group of the values produced when aggregating series of the given group.
    fn output_group(&self, input: GroupType) -> GroupType;

    /// Aggregates the datapoints of a window.
    ///
    /// Returns `Ok(None)` when the window contains nothing this algorithm can aggregate.
    ///
    /// # Errors
    ///
    /// If the window contents violate the contract of the algorithm, an error is returned.
    fn aggregate(
        &self,
        points: &mut dyn Iterator<Item = DataPoint>,
    ) -> Result<Option<Value>, AggregationError>;
}

impl<A: Aggregator + ?Sized> Aggregator for Arc<A> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn can_aggregate(&self, group: GroupType) -> bool {
        (**self).can_aggregate(group)
    }

    fn output_group(&self, input: GroupType) -> GroupType {
        (**self).output_group(input)
    }

    fn aggregate(
        &self,
        points: &mut dyn Iterator<Item = DataPoint>,
    ) -> Result<Option<Value>, AggregationError> {
        (**self).aggregate(points)
    }
}

/// Iterates over the histograms of a window, skipping scalar values.
pub(crate) fn histograms<'a>(
    points: &'a mut dyn Iterator<Item = DataPoint>,
) -> impl Iterator<Item = Arc<Histogram>> + 'a {
    points.filter_map(|point| match point.value {
        Value::Histogram(h) => Some(h),
        _ => None,
    })
}
