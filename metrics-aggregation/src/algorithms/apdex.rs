use crate::{
    aggregator::{histograms, Aggregator},
    error::AggregationError,
    value::{DataPoint, GroupType, Value},
};

/// Computes the Apdex score of a window.
///
/// Samples at or below the target are satisfied, samples at or below four times the target are
/// tolerating, and everything else is frustrated.  The score is `(satisfied + tolerating / 2) /
/// total`, which is `NaN` for a window without samples.
#[derive(Clone, Copy, Debug)]
pub struct Apdex {
    target: f64,
}

impl Apdex {
    /// Creates a new `Apdex` with the given satisfied threshold.
    ///
    /// # Errors
    ///
    /// If `target` is negative or not finite, an error is returned.
    pub fn new(target: f64) -> Result<Self, AggregationError> {
        if !target.is_finite() || target < 0.0 {
            return Err(AggregationError::invalid_parameter(
                "target",
                format!("{target} is not a finite, non-negative threshold"),
            ));
        }
        Ok(Apdex { target })
    }

    /// Gets the satisfied threshold.
    pub fn target(&self) -> f64 {
        self.target
    }
}

impl Aggregator for Apdex {
    fn name(&self) -> &str {
        "apdex"
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
        let tolerable = self.target * 4.0;

        let mut seen = false;
        let (mut satisfied, mut tolerating, mut total) = (0u64, 0u64, 0u64);
        for histogram in histograms(points) {
            seen = true;
            for (bucket, count) in histogram.buckets() {
                total += count;
                if bucket <= self.target {
                    satisfied += count;
                } else if bucket <= tolerable {
                    tolerating += count;
                }
            }
        }

        if !seen {
            return Ok(None);
        }

        let score = (satisfied as f64 + tolerating as f64 / 2.0) / total as f64;
        Ok(Some(Value::Double(score)))
    }
}

#[cfg(test)]
mod tests {
    use super::Apdex;
    use crate::{algorithms::test_util::window, Aggregator, Value};
    use metrics_histogram::Histogram;

    #[test]
    fn score() {
        // 2 satisfied, 2 tolerating, 1 frustrated.
        let histogram = Histogram::from_samples([0.1, 0.5, 0.9, 1.5, 3.0], 10).unwrap();

        let apdex = Apdex::new(0.5).unwrap();
        let score = apdex.aggregate(&mut window([histogram]).into_iter()).unwrap();
        assert_eq!(score, Some(Value::Double(0.6)));
    }

    #[test]
    fn boundaries_are_inclusive() {
        let histogram = Histogram::from_samples([1.0, 4.0], 10).unwrap();

        let score = Apdex::new(1.0).unwrap().aggregate(&mut window([histogram]).into_iter());
        assert_eq!(score.unwrap(), Some(Value::Double(0.75)));
    }

    #[test]
    fn no_samples() {
        let apdex = Apdex::new(1.0).unwrap();
        let score = apdex.aggregate(&mut window([Histogram::empty(10).unwrap()]).into_iter());
        assert!(score.unwrap().unwrap().as_f64().unwrap().is_nan());

        assert_eq!(apdex.aggregate(&mut std::iter::empty()).unwrap(), None);
    }

    #[test]
    fn invalid_target() {
        assert!(Apdex::new(-1.0).is_err());
        assert!(Apdex::new(f64::NAN).is_err());
    }
}
