use std::{
    iter::{FusedIterator, Peekable},
    sync::Arc,
};

use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use tracing::warn;

use crate::{
    aggregator::Aggregator,
    error::AggregationError,
    value::DataPoint,
};

fn window_start(timestamp: DateTime<Utc>, interval: TimeDelta) -> DateTime<Utc> {
    if interval.is_zero() {
        return timestamp;
    }
    timestamp.duration_trunc(interval).unwrap_or(timestamp)
}

/// Datapoints of the window starting at `start`.
struct Window<'a, I: Iterator<Item = DataPoint>> {
    upstream: &'a mut Peekable<I>,
    start: DateTime<Utc>,
    interval: TimeDelta,
}

impl<I: Iterator<Item = DataPoint>> Iterator for Window<'_, I> {
    type Item = DataPoint;

    fn next(&mut self) -> Option<Self::Item> {
        let (start, interval) = (self.start, self.interval);
        self.upstream.next_if(|point| window_start(point.timestamp, interval) == start)
    }
}

/// Aggregates an ordered datapoint stream into fixed-interval windows.
///
/// Windows are aligned to the Unix epoch and stamped with their start.  A zero interval groups
/// datapoints sharing the exact same timestamp, which is what [`MovingWindow`](crate::MovingWindow)
/// output needs.
///
/// Windows for which the aggregator produces nothing are skipped.  A window that fails to
/// aggregate yields its error, and iteration carries on with the next window.
pub struct Downsample<I: Iterator<Item = DataPoint>> {
    upstream: Peekable<I>,
    interval: TimeDelta,
    aggregator: Arc<dyn Aggregator>,
}

impl<I: Iterator<Item = DataPoint>> Downsample<I> {
    /// Creates a new `Downsample`.
    ///
    /// # Errors
    ///
    /// If `interval` is negative, an error is returned.
    pub fn new<U>(
        upstream: U,
        interval: TimeDelta,
        aggregator: Arc<dyn Aggregator>,
    ) -> Result<Self, AggregationError>
    where
        U: IntoIterator<IntoIter = I>,
    {
        if interval < TimeDelta::zero() {
            return Err(AggregationError::invalid_parameter("interval", "interval is negative"));
        }
        Ok(Downsample { upstream: upstream.into_iter().peekable(), interval, aggregator })
    }
}

impl<I: Iterator<Item = DataPoint>> Iterator for Downsample<I> {
    type Item = Result<DataPoint, AggregationError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let start = window_start(self.upstream.peek()?.timestamp, self.interval);
            let mut window = Window { upstream: &mut self.upstream, start, interval: self.interval };

            let result = self.aggregator.aggregate(&mut window);
            // Whatever the aggregator left unread still belongs to this window.
            window.for_each(drop);

            match result {
                Ok(Some(value)) => return Some(Ok(DataPoint { timestamp: start, value })),
                Ok(None) => continue,
                Err(error) => {
                    warn!(
                        %error,
                        operation = self.aggregator.name(),
                        window.start = %start,
                        "Failed to aggregate window."
                    );
                    return Some(Err(error));
                }
            }
        }
    }
}

impl<I: Iterator<Item = DataPoint>> FusedIterator for Downsample<I> {}
