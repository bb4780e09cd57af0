use chrono::{DateTime, Utc};
use metrics_histogram::HistogramError;
use thiserror::Error;

use crate::value::{DataType, GroupType};

/// Errors that could occur while aggregating a window of datapoints.
///
/// Errors only ever concern the window being aggregated: callers are free to carry on with the
/// next window.
#[derive(Debug, Error)]
pub enum AggregationError {
    /// No algorithm for the operation handles the observed group type.
    #[error("{operation} cannot aggregate {group:?} series")]
    UnsupportedGroup {
        /// The requested operation.
        operation: String,
        /// The group type of the series.
        group: GroupType,
    },

    /// The observed data type is not known to the type registry.
    #[error("{operation} cannot aggregate {data_type:?} values")]
    UnsupportedDataType {
        /// The requested operation.
        operation: String,
        /// The data type of the first datapoint.
        data_type: DataType,
    },

    /// The input of an algorithm violated its contract.
    #[error("malformed input for {operation}: {reason}")]
    MalformedInput {
        /// The requested operation.
        operation: &'static str,
        /// Details about the violation.
        reason: String,
    },

    /// An algorithm parameter was missing or out of range.
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter {
        /// Name of the parameter.
        name: &'static str,
        /// Details about the rejection.
        reason: String,
    },

    /// A moving window ends outside of the range of representable timestamps.
    #[error("moving window {index} after {anchor} ends out of range")]
    WindowOutOfRange {
        /// Anchor of the moving window.
        anchor: DateTime<Utc>,
        /// Index of the window.
        index: u64,
    },

    /// The operation name is not known.
    #[error("unknown aggregation operation `{0}`")]
    UnknownOperation(String),

    /// Building an intermediate or output histogram failed.
    #[error(transparent)]
    Histogram(#[from] HistogramError),
}

impl AggregationError {
    pub(crate) fn invalid_parameter<R: Into<String>>(name: &'static str, reason: R) -> Self {
        AggregationError::InvalidParameter { name, reason: reason.into() }
    }

    pub(crate) fn malformed<R: Into<String>>(operation: &'static str, reason: R) -> Self {
        AggregationError::MalformedInput { operation, reason: reason.into() }
    }
}

/// Errors that could occur while building an [`AggregatorCatalog`](crate::AggregatorCatalog).
#[derive(Debug, Error)]
pub enum BuildError {
    /// The merge precision is out of range.
    #[error("invalid merge precision: {0}")]
    InvalidPrecision(#[source] HistogramError),
}
