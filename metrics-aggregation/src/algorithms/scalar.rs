use crate::{
    algorithms::{
        percentile::{check_percentile, percentile_label},
        std_dev::Welford,
    },
    aggregator::Aggregator,
    error::AggregationError,
    value::{DataPoint, GroupType, Value},
};

/// A reduction over scalar values.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ScalarFunction {
    /// Arithmetic mean.
    Avg,
    /// Sum.
    Sum,
    /// Minimum.
    Min,
    /// Maximum.
    Max,
    /// Sample standard deviation.
    Dev,
    /// Number of values.
    Count,
    /// Nearest-rank percentile, as a fraction in `(0, 1]`.
    Percentile(f64),
}

/// Reduces the scalar values of a window.
///
/// Histograms are skipped.  Sums, minimums and maximums over windows holding only `Long` values
/// stay integers; every other reduction produces a `Double`, except for the count.
#[derive(Clone, Debug)]
pub struct ScalarAggregator {
    name: String,
    function: ScalarFunction,
}

impl ScalarAggregator {
    /// Creates a new `ScalarAggregator`.
    ///
    /// # Errors
    ///
    /// If the function is a percentile outside of `(0, 1]`, an error is returned.
    pub fn new(function: ScalarFunction) -> Result<Self, AggregationError> {
        let name = match function {
            ScalarFunction::Avg => "avg".to_string(),
            ScalarFunction::Sum => "sum".to_string(),
            ScalarFunction::Min => "min".to_string(),
            ScalarFunction::Max => "max".to_string(),
            ScalarFunction::Dev => "dev".to_string(),
            ScalarFunction::Count => "count".to_string(),
            ScalarFunction::Percentile(p) => percentile_label(check_percentile(p)?),
        };
        Ok(ScalarAggregator { name, function })
    }

    /// Gets the reduction applied by this aggregator.
    pub fn function(&self) -> ScalarFunction {
        self.function
    }

    fn reduce_longs(&self, values: &[i64]) -> Option<Value> {
        let value = match self.function {
            ScalarFunction::Sum => values.iter().fold(0i64, |acc, v| acc.saturating_add(*v)),
            ScalarFunction::Min => values.iter().copied().min()?,
            ScalarFunction::Max => values.iter().copied().max()?,
            _ => return None,
        };
        Some(Value::Long(value))
    }

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn reduce(&self, mut values: Vec<f64>) -> Value {
        let value = match self.function {
            ScalarFunction::Avg => values.iter().sum::<f64>() / values.len() as f64,
            ScalarFunction::Sum => values.iter().sum(),
            ScalarFunction::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            ScalarFunction::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            ScalarFunction::Dev => {
                let mut welford = Welford::default();
                for value in &values {
                    welford.observe(*value, 1);
                }
                welford.std_dev()
            }
            ScalarFunction::Count => return Value::Long(values.len() as i64),
            ScalarFunction::Percentile(p) => {
                values.sort_by(f64::total_cmp);
                let rank = ((p * values.len() as f64).ceil() as usize).clamp(1, values.len());
                values[rank - 1]
            }
        };
        Value::Double(value)
    }
}

impl Aggregator for ScalarAggregator {
    fn name(&self) -> &str {
        &self.name
    }

    fn can_aggregate(&self, group: GroupType) -> bool {
        group == GroupType::Numeric
    }

    fn output_group(&self, _input: GroupType) -> GroupType {
        GroupType::Numeric
    }

    #[allow(clippy::cast_precision_loss)]
    fn aggregate(
        &self,
        points: &mut dyn Iterator<Item = DataPoint>,
    ) -> Result<Option<Value>, AggregationError> {
        let mut longs = Vec::new();
        let mut doubles = Vec::new();
        for point in points {
            match point.value {
                Value::Long(v) => longs.push(v),
                Value::Double(v) => doubles.push(v),
                Value::Histogram(_) => {}
            }
        }

        if longs.is_empty() && doubles.is_empty() {
            return Ok(None);
        }
        if doubles.is_empty() {
            if let Some(value) = self.reduce_longs(&longs) {
                return Ok(Some(value));
            }
        }

        doubles.extend(longs.into_iter().map(|v| v as f64));
        Ok(Some(self.reduce(doubles)))
    }
}

#[cfg(test)]
mod tests {
    use super::{ScalarAggregator, ScalarFunction};
    use crate::{algorithms::test_util::epoch, Aggregator, DataPoint, Value};
    use approx::assert_relative_eq;
    use chrono::TimeDelta;
    use metrics_histogram::Histogram;

    fn points<V: Into<Value> + Copy>(values: &[V]) -> Vec<DataPoint> {
        values
            .iter()
            .zip(0..)
            .map(|(v, i)| DataPoint::new(epoch() + TimeDelta::seconds(i), *v))
            .collect()
    }

    fn run(function: ScalarFunction, points: Vec<DataPoint>) -> Option<Value> {
        ScalarAggregator::new(function).unwrap().aggregate(&mut points.into_iter()).unwrap()
    }

    #[test]
    fn doubles() {
        let p = || points(&[1.0, 3.0, 5.0, 7.0, 9.0]);

        assert_eq!(run(ScalarFunction::Avg, p()), Some(Value::Double(5.0)));
        assert_eq!(run(ScalarFunction::Sum, p()), Some(Value::Double(25.0)));
        assert_eq!(run(ScalarFunction::Min, p()), Some(Value::Double(1.0)));
        assert_eq!(run(ScalarFunction::Max, p()), Some(Value::Double(9.0)));
        assert_eq!(run(ScalarFunction::Count, p()), Some(Value::Long(5)));
        assert_eq!(run(ScalarFunction::Percentile(0.5), p()), Some(Value::Double(5.0)));

        let dev = run(ScalarFunction::Dev, p()).and_then(|v| v.as_f64()).unwrap();
        assert_relative_eq!(dev, 10.0f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn longs_stay_integers() {
        let p = || points(&[4i64, -2, 10]);

        assert_eq!(run(ScalarFunction::Sum, p()), Some(Value::Long(12)));
        assert_eq!(run(ScalarFunction::Min, p()), Some(Value::Long(-2)));
        assert_eq!(run(ScalarFunction::Max, p()), Some(Value::Long(10)));
        assert_eq!(run(ScalarFunction::Avg, p()), Some(Value::Double(4.0)));
    }

    #[test]
    fn mixed_values() {
        let mut p = points(&[1i64, 2]);
        p.push(DataPoint::new(epoch(), 0.5));
        assert_eq!(run(ScalarFunction::Sum, p), Some(Value::Double(3.5)));
    }

    #[test]
    fn histograms_are_skipped() {
        let mut p = points(&[2.0]);
        p.push(DataPoint::new(epoch(), Histogram::from_samples([100.0], 10).unwrap()));
        assert_eq!(run(ScalarFunction::Max, p), Some(Value::Double(2.0)));

        let only = vec![DataPoint::new(epoch(), Histogram::from_samples([1.0], 10).unwrap())];
        assert_eq!(run(ScalarFunction::Count, only), None);
    }

    #[test]
    fn names() {
        assert_eq!(ScalarAggregator::new(ScalarFunction::Dev).unwrap().name(), "dev");
        assert_eq!(ScalarAggregator::new(ScalarFunction::Percentile(0.95)).unwrap().name(), "p95");
        assert!(ScalarAggregator::new(ScalarFunction::Percentile(2.0)).is_err());
    }
}
