use std::{collections::HashMap, fmt, str::FromStr, sync::Arc};

use chrono::{DateTime, Utc};
use metrics_histogram::{HistogramBuilder, DEFAULT_PRECISION};
use parking_lot::RwLock;
use serde::Deserialize;
use tracing::debug;

use crate::{
    aggregator::Aggregator,
    algorithms::{
        check_percentile, percentile_label, Apdex, BinFilter, FilterOp, HistogramMerge,
        HistogramPercentile, HistogramStatistic, HistogramStdDev, Indeterminate, PercentRemaining,
        ScalarAggregator, ScalarFunction, Statistic,
    },
    dispatch::DispatchingAggregator,
    error::{AggregationError, BuildError},
    value::{StandardTypeRegistry, TypeRegistry},
    window::{MovingWindowConfig, Sampling},
};

/// A logical aggregation operation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Operation {
    /// Mean.
    Avg,
    /// Sum.
    Sum,
    /// Minimum.
    Min,
    /// Maximum.
    Max,
    /// Sample standard deviation.
    Dev,
    /// Number of scalar values.
    Count,
    /// Percentile, as a fraction.
    ///
    /// When `None`, the percentile is taken from [`AggregationParams::percentile`].
    Percentile(Option<f64>),
    /// Apdex score.
    Apdex,
    /// Histogram merge.
    Merge,
    /// Histogram bin filter.
    BinFilter,
    /// Share of samples kept by a bin filter.
    PercentRemaining,
}

impl Operation {
    /// Whether or not building this operation reads [`AggregationParams`].
    pub fn is_parameterized(&self) -> bool {
        matches!(self, Operation::Percentile(None) | Operation::Apdex | Operation::BinFilter)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Avg => f.write_str("avg"),
            Operation::Sum => f.write_str("sum"),
            Operation::Min => f.write_str("min"),
            Operation::Max => f.write_str("max"),
            Operation::Dev => f.write_str("dev"),
            Operation::Count => f.write_str("count"),
            Operation::Percentile(None) => f.write_str("percentile"),
            Operation::Percentile(Some(p)) => f.write_str(&percentile_label(*p)),
            Operation::Apdex => f.write_str("apdex"),
            Operation::Merge => f.write_str("merge"),
            Operation::BinFilter => f.write_str("bin_filter"),
            Operation::PercentRemaining => f.write_str("percent_remaining"),
        }
    }
}

impl FromStr for Operation {
    type Err = AggregationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let op = match s {
            "avg" | "mean" => Operation::Avg,
            "sum" => Operation::Sum,
            "min" => Operation::Min,
            "max" => Operation::Max,
            "dev" | "stddev" => Operation::Dev,
            "count" => Operation::Count,
            "percentile" => Operation::Percentile(None),
            "apdex" => Operation::Apdex,
            "merge" => Operation::Merge,
            "bin_filter" => Operation::BinFilter,
            "percent_remaining" => Operation::PercentRemaining,
            other => match parse_percentile_name(other) {
                Some(p) => Operation::Percentile(Some(check_percentile(p)?)),
                None => return Err(AggregationError::UnknownOperation(other.to_string())),
            },
        };
        Ok(op)
    }
}

/// Parses `pNN` names: the digits are the decimals of the fraction, so `p5` and `p50` are both the
/// median and `p999` is the 99.9th percentile.
fn parse_percentile_name(name: &str) -> Option<f64> {
    let digits = name.strip_prefix('p')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if digits == "100" {
        return Some(1.0);
    }
    format!("0.{digits}").parse().ok()
}

/// Parameters of parameterized operations.
///
/// Field names follow the query parameters they are deserialized from.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct AggregationParams {
    /// Percentile for `percentile`, as a fraction in `(0, 1]`.
    pub percentile: Option<f64>,
    /// Satisfied threshold for `apdex`.
    pub target: Option<f64>,
    /// Comparison for `bin_filter`.
    pub filter_op: Option<FilterOp>,
    /// Treatment of straddling buckets for `bin_filter`.  Defaults to keep.
    pub filter_indeterminate: Option<Indeterminate>,
    /// Threshold for `bin_filter`.
    pub threshold: Option<f64>,
    /// Moving window length.
    pub sampling: Option<Sampling>,
    /// Whether or not the moving window anchor is aligned to its unit.
    pub align_start_time: bool,
}

impl AggregationParams {
    /// Gets the moving window configuration, if a sampling is set.
    ///
    /// # Errors
    ///
    /// If the sampling is invalid, an error is returned.
    pub fn moving_window(
        &self,
        start: DateTime<Utc>,
    ) -> Result<Option<MovingWindowConfig>, AggregationError> {
        self.sampling
            .map(|sampling| {
                MovingWindowConfig::new(sampling, start)
                    .map(|config| config.with_align_start_time(self.align_start_time))
            })
            .transpose()
    }

    fn require<T>(name: &'static str, value: Option<T>) -> Result<T, AggregationError> {
        value.ok_or_else(|| AggregationError::invalid_parameter(name, "missing"))
    }
}

/// Builds [`DispatchingAggregator`]s for operations.
///
/// Dispatchers for operations that do not depend on parameters are built once and shared.
pub struct AggregatorCatalog {
    merge_precision: u8,
    registry: Arc<dyn TypeRegistry>,
    cache: RwLock<HashMap<String, Arc<DispatchingAggregator>>>,
}

impl AggregatorCatalog {
    /// Creates an [`AggregatorCatalogBuilder`].
    pub fn builder() -> AggregatorCatalogBuilder {
        AggregatorCatalogBuilder::new()
    }

    /// Gets the precision of merged histograms.
    pub fn merge_precision(&self) -> u8 {
        self.merge_precision
    }

    /// Resolves an operation name, such as `avg` or `p99`.
    ///
    /// # Errors
    ///
    /// If the name is unknown, or the parameters of the operation are invalid, an error is
    /// returned.
    pub fn resolve_named(
        &self,
        name: &str,
        params: &AggregationParams,
    ) -> Result<Arc<DispatchingAggregator>, AggregationError> {
        self.resolve(name.parse()?, params)
    }

    /// Resolves an operation.
    ///
    /// # Errors
    ///
    /// If the parameters of the operation are missing or invalid, an error is returned.
    pub fn resolve(
        &self,
        operation: Operation,
        params: &AggregationParams,
    ) -> Result<Arc<DispatchingAggregator>, AggregationError> {
        if operation.is_parameterized() {
            return self.build(operation, params).map(Arc::new);
        }

        let key = operation.to_string();
        if let Some(dispatcher) = self.cache.read().get(&key) {
            return Ok(Arc::clone(dispatcher));
        }

        let dispatcher = Arc::new(self.build(operation, params)?);
        let mut cache = self.cache.write();
        Ok(Arc::clone(cache.entry(key).or_insert(dispatcher)))
    }

    fn build(
        &self,
        operation: Operation,
        params: &AggregationParams,
    ) -> Result<DispatchingAggregator, AggregationError> {
        let statistic = |statistic: Statistic, function: ScalarFunction| {
            let candidate: Arc<dyn Aggregator> = Arc::new(HistogramStatistic::new(statistic));
            (vec![candidate], Some(function))
        };

        // Dispatchers over a parameterized percentile are named after the resolved value.
        let operation = match operation {
            Operation::Percentile(None) => Operation::Percentile(Some(AggregationParams::require(
                "percentile",
                params.percentile,
            )?)),
            operation => operation,
        };

        let (candidates, legacy) = match operation {
            Operation::Avg => statistic(Statistic::Mean, ScalarFunction::Avg),
            Operation::Sum => statistic(Statistic::Sum, ScalarFunction::Sum),
            Operation::Min => statistic(Statistic::Min, ScalarFunction::Min),
            Operation::Max => statistic(Statistic::Max, ScalarFunction::Max),
            Operation::Dev => {
                let candidate: Arc<dyn Aggregator> = Arc::new(HistogramStdDev);
                (vec![candidate], Some(ScalarFunction::Dev))
            }
            Operation::Count => (Vec::new(), Some(ScalarFunction::Count)),
            Operation::Percentile(percentile) => {
                let p = AggregationParams::require("percentile", percentile)?;
                let candidate: Arc<dyn Aggregator> = Arc::new(HistogramPercentile::new(p)?);
                (vec![candidate], Some(ScalarFunction::Percentile(p)))
            }
            Operation::Apdex => {
                let target = AggregationParams::require("target", params.target)?;
                let candidate: Arc<dyn Aggregator> = Arc::new(Apdex::new(target)?);
                (vec![candidate], None)
            }
            Operation::Merge => {
                let candidate: Arc<dyn Aggregator> =
                    Arc::new(HistogramMerge::new(self.merge_precision)?);
                (vec![candidate], None)
            }
            Operation::BinFilter => {
                let op = AggregationParams::require("filter_op", params.filter_op)?;
                let threshold = AggregationParams::require("threshold", params.threshold)?;
                let indeterminate = params.filter_indeterminate.unwrap_or_default();
                let candidate: Arc<dyn Aggregator> =
                    Arc::new(BinFilter::new(op, threshold, indeterminate)?);
                (vec![candidate], None)
            }
            Operation::PercentRemaining => {
                let candidate: Arc<dyn Aggregator> = Arc::new(PercentRemaining);
                (vec![candidate], None)
            }
        };

        debug!(
            %operation,
            candidates = candidates.len(),
            legacy = legacy.is_some(),
            "Built dispatching aggregator."
        );

        let registry = Arc::clone(&self.registry);
        let mut dispatcher = DispatchingAggregator::new(operation.to_string(), candidates, registry);
        if let Some(function) = legacy {
            dispatcher = dispatcher.with_legacy(Arc::new(ScalarAggregator::new(function)?));
        }
        Ok(dispatcher)
    }
}

impl fmt::Debug for AggregatorCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregatorCatalog")
            .field("merge_precision", &self.merge_precision)
            .field("cached", &self.cache.read().len())
            .finish_non_exhaustive()
    }
}

/// Builder for an [`AggregatorCatalog`].
pub struct AggregatorCatalogBuilder {
    merge_precision: u8,
    registry: Arc<dyn TypeRegistry>,
}

impl AggregatorCatalogBuilder {
    /// Creates a new `AggregatorCatalogBuilder` with default settings.
    pub fn new() -> Self {
        AggregatorCatalogBuilder {
            merge_precision: DEFAULT_PRECISION,
            registry: Arc::new(StandardTypeRegistry),
        }
    }

    /// Sets the precision of merged histograms.
    ///
    /// Defaults to [`DEFAULT_PRECISION`].
    #[must_use]
    pub fn with_merge_precision(mut self, precision: u8) -> Self {
        self.merge_precision = precision;
        self
    }

    /// Sets the registry mapping data types to groups.
    ///
    /// Defaults to [`StandardTypeRegistry`].
    #[must_use]
    pub fn with_type_registry<R>(mut self, registry: R) -> Self
    where
        R: TypeRegistry + 'static,
    {
        self.registry = Arc::new(registry);
        self
    }

    /// Builds the catalog.
    ///
    /// # Errors
    ///
    /// If the merge precision is out of range, an error is returned.
    pub fn build(self) -> Result<AggregatorCatalog, BuildError> {
        HistogramBuilder::new(self.merge_precision).map_err(BuildError::InvalidPrecision)?;

        Ok(AggregatorCatalog {
            merge_precision: self.merge_precision,
            registry: self.registry,
            cache: RwLock::new(HashMap::new()),
        })
    }
}

impl Default for AggregatorCatalogBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{AggregationParams, AggregatorCatalog, Operation};
    use crate::{
        AggregationError, Aggregator, CalendarUnit, DataPoint, FilterOp, GroupType, Indeterminate,
        Sampling, Value,
    };
    use chrono::{DateTime, Utc};
    use metrics_histogram::Histogram;

    fn catalog() -> AggregatorCatalog {
        AggregatorCatalog::builder().build().unwrap()
    }

    fn point<V: Into<Value>>(value: V) -> DataPoint {
        DataPoint::new(DateTime::<Utc>::UNIX_EPOCH, value)
    }

    #[test]
    fn parse_operations() {
        assert_eq!("avg".parse::<Operation>().unwrap(), Operation::Avg);
        assert_eq!("stddev".parse::<Operation>().unwrap(), Operation::Dev);
        assert_eq!("p99".parse::<Operation>().unwrap(), Operation::Percentile(Some(0.99)));
        assert_eq!("p999".parse::<Operation>().unwrap(), Operation::Percentile(Some(0.999)));
        assert_eq!("p50".parse::<Operation>().unwrap(), Operation::Percentile(Some(0.5)));
        assert_eq!("p100".parse::<Operation>().unwrap(), Operation::Percentile(Some(1.0)));
        assert_eq!("percentile".parse::<Operation>().unwrap(), Operation::Percentile(None));
        assert_eq!("bin_filter".parse::<Operation>().unwrap(), Operation::BinFilter);

        let unknown = |name: &str| {
            matches!(name.parse::<Operation>(), Err(AggregationError::UnknownOperation(_)))
        };
        assert!(unknown("median"));
        assert!(unknown("p"));
        assert!(unknown("p9x"));
        assert!(matches!(
            "p0".parse::<Operation>(),
            Err(AggregationError::InvalidParameter { name: "percentile", .. })
        ));
    }

    #[test]
    fn operation_names_round_trip() {
        let names = ["avg", "sum", "min", "max", "dev", "count", "p95", "p100", "apdex", "merge"];
        for name in names {
            assert_eq!(name.parse::<Operation>().unwrap().to_string(), name);
        }
    }

    #[test]
    fn parameterless_dispatchers_are_shared() {
        let catalog = catalog();
        let params = AggregationParams::default();

        let a = catalog.resolve_named("avg", &params).unwrap();
        let b = catalog.resolve_named("avg", &params).unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let c = catalog.resolve_named("mean", &params).unwrap();
        assert!(Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn resolves_both_groups() {
        let avg = catalog().resolve(Operation::Avg, &AggregationParams::default()).unwrap();
        assert_eq!(avg.name(), "avg");
        assert!(avg.can_aggregate(GroupType::Histogram));
        assert!(avg.can_aggregate(GroupType::Numeric));

        let merge = catalog().resolve(Operation::Merge, &AggregationParams::default()).unwrap();
        assert!(merge.can_aggregate(GroupType::Histogram));
        assert!(!merge.can_aggregate(GroupType::Numeric));
        assert_eq!(merge.output_group(GroupType::Histogram), GroupType::Histogram);
    }

    #[test]
    fn missing_parameters() {
        let catalog = catalog();
        let params = AggregationParams::default();

        for operation in [Operation::Apdex, Operation::BinFilter, Operation::Percentile(None)] {
            assert!(matches!(
                catalog.resolve(operation, &params),
                Err(AggregationError::InvalidParameter { .. })
            ));
        }
    }

    #[test]
    fn parameters_from_json() {
        let params: AggregationParams = serde_json::from_str(
            r#"{
                "filter_op": "lte",
                "filter_indeterminate": "discard",
                "threshold": 3.0,
                "sampling": { "value": 7, "unit": "days" },
                "align_start_time": true
            }"#,
        )
        .unwrap();

        assert_eq!(params.filter_op, Some(FilterOp::Lte));
        assert_eq!(params.filter_indeterminate, Some(Indeterminate::Discard));
        assert_eq!(params.sampling, Some(Sampling::new(7, CalendarUnit::Days)));

        let filter = catalog().resolve(Operation::BinFilter, &params).unwrap();
        let points = vec![point(Histogram::from_samples([1.0, 3.0, 5.0], 10).unwrap())];
        let value = filter.aggregate(&mut points.into_iter()).unwrap().unwrap();
        assert_eq!(value.as_histogram().unwrap().sample_count(), 2);

        let start = "2018-01-03T12:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let window = params.moving_window(start).unwrap().unwrap();
        let midnight = "2018-01-03T00:00:00Z".parse::<DateTime<Utc>>().unwrap();
        assert_eq!(window.anchor().unwrap(), midnight);
    }

    #[test]
    fn percentile_from_parameters() {
        let params = AggregationParams { percentile: Some(0.5), ..Default::default() };
        let p50 = catalog().resolve(Operation::Percentile(None), &params).unwrap();
        assert_eq!(p50.name(), "p50");

        let points = vec![point(Histogram::from_samples([1.0, 2.0, 3.0], 10).unwrap())];
        assert_eq!(p50.aggregate(&mut points.into_iter()).unwrap(), Some(Value::Double(2.0)));

        let points = vec![point(1i64), point(2i64), point(3i64)];
        assert_eq!(p50.aggregate(&mut points.into_iter()).unwrap(), Some(Value::Double(2.0)));
    }

    #[test]
    fn invalid_merge_precision() {
        assert!(AggregatorCatalog::builder().with_merge_precision(53).build().is_err());
        let catalog = AggregatorCatalog::builder().with_merge_precision(52).build().unwrap();
        assert_eq!(catalog.merge_precision(), 52);
    }
}
