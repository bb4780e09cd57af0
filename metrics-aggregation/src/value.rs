use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics_histogram::Histogram;

/// The storage type of a datapoint value.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum DataType {
    /// Signed 64-bit integer.
    Long,
    /// 64-bit floating point number.
    Double,
    /// Bucketed histogram.
    Histogram,
}

/// The logical group of a data type.
///
/// Aggregation algorithms declare which groups they handle rather than which data types: `Long`
/// and `Double` values are both [`GroupType::Numeric`].
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum GroupType {
    /// Scalar numbers.
    Numeric,
    /// Histograms.
    Histogram,
}

/// A datapoint value.
///
/// Histograms are shared rather than copied: an aggregation window may hold the same histogram
/// more than once, and every read of it is immutable.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// Signed 64-bit integer.
    Long(i64),
    /// 64-bit floating point number.
    Double(f64),
    /// Bucketed histogram.
    Histogram(Arc<Histogram>),
}

impl Value {
    /// Gets the data type of this value.
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Long(_) => DataType::Long,
            Value::Double(_) => DataType::Double,
            Value::Histogram(_) => DataType::Histogram,
        }
    }

    /// Gets this value as a floating point number, if it is a scalar.
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Long(v) => Some(*v as f64),
            Value::Double(v) => Some(*v),
            Value::Histogram(_) => None,
        }
    }

    /// Gets this value as a histogram, if it is one.
    pub fn as_histogram(&self) -> Option<&Arc<Histogram>> {
        match self {
            Value::Histogram(h) => Some(h),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Long(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<Histogram> for Value {
    fn from(h: Histogram) -> Self {
        Value::Histogram(Arc::new(h))
    }
}

impl From<Arc<Histogram>> for Value {
    fn from(h: Arc<Histogram>) -> Self {
        Value::Histogram(h)
    }
}

/// A timestamped value.
#[derive(Clone, Debug, PartialEq)]
pub struct DataPoint {
    /// Time at which the value was observed, or the time of the window it was aggregated into.
    pub timestamp: DateTime<Utc>,
    /// The value.
    pub value: Value,
}

impl DataPoint {
    /// Creates a new `DataPoint`.
    pub fn new<V: Into<Value>>(timestamp: DateTime<Utc>, value: V) -> Self {
        DataPoint { timestamp, value: value.into() }
    }

    /// Gets the data type of this datapoint's value.
    pub fn data_type(&self) -> DataType {
        self.value.data_type()
    }
}

/// Maps data types to their logical group.
pub trait TypeRegistry: Send + Sync {
    /// Gets the group of `data_type`, or `None` if the data type is not registered.
    fn group_type(&self, data_type: DataType) -> Option<GroupType>;
}

/// The built-in data types and their groups.
#[derive(Clone, Copy, Debug, Default)]
pub struct StandardTypeRegistry;

impl TypeRegistry for StandardTypeRegistry {
    fn group_type(&self, data_type: DataType) -> Option<GroupType> {
        Some(match data_type {
            DataType::Long | DataType::Double => GroupType::Numeric,
            DataType::Histogram => GroupType::Histogram,
        })
    }
}
