use std::{collections::HashMap, sync::Arc};

use parking_lot::RwLock;
use tracing::debug;

use crate::{
    aggregator::Aggregator,
    error::AggregationError,
    value::{DataPoint, DataType, GroupType, TypeRegistry, Value},
};

/// Routes each window to the algorithm able to aggregate its values.
///
/// A dispatcher stands for one logical operation, such as `avg`, which may be implemented once for
/// histograms and once for scalars.  The data type of the first datapoint of a window decides which
/// implementation runs: the candidates are asked first, in order, and the legacy scalar algorithm
/// last.  Empty windows always go to the legacy algorithm, and produce nothing without one.
///
/// Routing decisions are memoized per group type and per data type, so looking up the algorithm for
/// a window takes a read lock in the common case.
pub struct DispatchingAggregator {
    operation: String,
    candidates: Vec<Arc<dyn Aggregator>>,
    legacy: Option<Arc<dyn Aggregator>>,
    registry: Arc<dyn TypeRegistry>,
    by_group: RwLock<HashMap<GroupType, Arc<dyn Aggregator>>>,
    by_data_type: RwLock<HashMap<DataType, Arc<dyn Aggregator>>>,
}

impl DispatchingAggregator {
    /// Creates a new `DispatchingAggregator`.
    pub fn new<S: Into<String>>(
        operation: S,
        candidates: Vec<Arc<dyn Aggregator>>,
        registry: Arc<dyn TypeRegistry>,
    ) -> Self {
        DispatchingAggregator {
            operation: operation.into(),
            candidates,
            legacy: None,
            registry,
            by_group: RwLock::new(HashMap::new()),
            by_data_type: RwLock::new(HashMap::new()),
        }
    }

    /// Sets the legacy scalar algorithm.
    #[must_use]
    pub fn with_legacy(mut self, legacy: Arc<dyn Aggregator>) -> Self {
        self.legacy = Some(legacy);
        self
    }

    fn unsupported_group(&self, group: GroupType) -> AggregationError {
        AggregationError::UnsupportedGroup { operation: self.operation.clone(), group }
    }

    /// Gets the algorithm aggregating series of the given group.
    ///
    /// # Errors
    ///
    /// If no algorithm handles the group, an error is returned.
    pub fn for_group(&self, group: GroupType) -> Result<Arc<dyn Aggregator>, AggregationError> {
        if let Some(aggregator) = self.by_group.read().get(&group) {
            return Ok(Arc::clone(aggregator));
        }

        let found = self
            .candidates
            .iter()
            .chain(self.legacy.iter())
            .find(|aggregator| aggregator.can_aggregate(group))
            .ok_or_else(|| self.unsupported_group(group))?;

        debug!(
            operation = %self.operation,
            ?group,
            algorithm = found.name(),
            "Resolved aggregator."
        );

        let mut by_group = self.by_group.write();
        Ok(Arc::clone(by_group.entry(group).or_insert_with(|| Arc::clone(found))))
    }

    /// Gets the algorithm aggregating values of the given data type.
    ///
    /// # Errors
    ///
    /// If the data type is not registered, or no algorithm handles its group, an error is
    /// returned.
    pub fn for_data_type(
        &self,
        data_type: DataType,
    ) -> Result<Arc<dyn Aggregator>, AggregationError> {
        if let Some(aggregator) = self.by_data_type.read().get(&data_type) {
            return Ok(Arc::clone(aggregator));
        }

        let group = self.registry.group_type(data_type).ok_or_else(|| {
            AggregationError::UnsupportedDataType { operation: self.operation.clone(), data_type }
        })?;
        let found = self.for_group(group)?;

        let mut by_data_type = self.by_data_type.write();
        Ok(Arc::clone(by_data_type.entry(data_type).or_insert(found)))
    }
}

impl Aggregator for DispatchingAggregator {
    fn name(&self) -> &str {
        &self.operation
    }

    fn can_aggregate(&self, group: GroupType) -> bool {
        self.for_group(group).is_ok()
    }

    fn output_group(&self, input: GroupType) -> GroupType {
        self.for_group(input).map_or(input, |aggregator| aggregator.output_group(input))
    }

    fn aggregate(
        &self,
        points: &mut dyn Iterator<Item = DataPoint>,
    ) -> Result<Option<Value>, AggregationError> {
        let mut points = points.peekable();
        let aggregator = match points.peek() {
            Some(first) => self.for_data_type(first.data_type())?,
            None => match &self.legacy {
                Some(legacy) => Arc::clone(legacy),
                None => return Ok(None),
            },
        };
        aggregator.aggregate(&mut points)
    }
}

impl std::fmt::Debug for DispatchingAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let candidates = self.candidates.iter().map(|a| a.name()).collect::<Vec<_>>();
        f.debug_struct("DispatchingAggregator")
            .field("operation", &self.operation)
            .field("candidates", &candidates)
            .field("legacy", &self.legacy.as_ref().map(|a| a.name()))
            .finish_non_exhaustive()
    }
}
