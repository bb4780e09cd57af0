//! Calendar-aware moving windows.
//!
//! [`MovingWindow`] re-buckets an ordered datapoint stream into overlapping windows: every
//! datapoint is emitted once for each window it falls into, re-stamped with the end of that window.
//! Aggregating the output by exact timestamp then yields one value per window.
use std::{
    collections::BTreeMap,
    iter::{FusedIterator, Peekable},
    ops::Bound,
};

use chrono::{DateTime, Datelike, DurationRound, Months, NaiveDate, TimeDelta, Utc};
use serde::Deserialize;
use tracing::{error, trace};

use crate::{
    error::AggregationError,
    value::{DataPoint, Value},
};

/// A unit of time.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum CalendarUnit {
    /// Calendar years.
    Years,
    /// Calendar months.
    Months,
    /// Weeks, starting on Monday.
    Weeks,
    /// Days.
    Days,
    /// Hours.
    Hours,
    /// Minutes.
    Minutes,
    /// Seconds.
    Seconds,
    /// Milliseconds.
    Milliseconds,
}

impl CalendarUnit {
    /// Gets the fixed length of `amount` units, or `None` for calendar units of varying length.
    fn fixed(self, amount: u64) -> Option<TimeDelta> {
        let amount = i64::try_from(amount).ok()?;
        match self {
            CalendarUnit::Years | CalendarUnit::Months => None,
            CalendarUnit::Weeks => TimeDelta::try_weeks(amount),
            CalendarUnit::Days => TimeDelta::try_days(amount),
            CalendarUnit::Hours => TimeDelta::try_hours(amount),
            CalendarUnit::Minutes => TimeDelta::try_minutes(amount),
            CalendarUnit::Seconds => TimeDelta::try_seconds(amount),
            CalendarUnit::Milliseconds => TimeDelta::try_milliseconds(amount),
        }
    }

    fn months(self, amount: u64) -> Option<Months> {
        let months = match self {
            CalendarUnit::Years => amount.checked_mul(12)?,
            CalendarUnit::Months => amount,
            _ => return None,
        };
        u32::try_from(months).ok().map(Months::new)
    }

    fn is_calendar(self) -> bool {
        matches!(self, CalendarUnit::Years | CalendarUnit::Months)
    }

    fn shift(self, timestamp: DateTime<Utc>, amount: u64) -> Option<DateTime<Utc>> {
        if self.is_calendar() {
            timestamp.checked_add_months(self.months(amount)?)
        } else {
            timestamp.checked_add_signed(self.fixed(amount)?)
        }
    }

    /// Adds `amount` units to `timestamp`.
    ///
    /// Calendar units clamp to the end of shorter months: January 31st plus one month is the last
    /// day of February.
    pub fn add(self, timestamp: DateTime<Utc>, amount: u32) -> Option<DateTime<Utc>> {
        self.shift(timestamp, u64::from(amount))
    }

    /// Subtracts `amount` units from `timestamp`.
    pub fn sub(self, timestamp: DateTime<Utc>, amount: u32) -> Option<DateTime<Utc>> {
        let amount = u64::from(amount);
        if self.is_calendar() {
            timestamp.checked_sub_months(self.months(amount)?)
        } else {
            timestamp.checked_sub_signed(self.fixed(amount)?)
        }
    }

    /// Truncates `timestamp` to the start of the unit it falls in.
    pub fn align(self, timestamp: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let midnight = |date: NaiveDate| date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());

        match self {
            CalendarUnit::Years => midnight(NaiveDate::from_ymd_opt(timestamp.year(), 1, 1)?),
            CalendarUnit::Months => {
                midnight(NaiveDate::from_ymd_opt(timestamp.year(), timestamp.month(), 1)?)
            }
            CalendarUnit::Weeks => {
                let date = timestamp.date_naive();
                let offset = date.weekday().num_days_from_monday();
                midnight(date.checked_sub_days(chrono::Days::new(u64::from(offset)))?)
            }
            CalendarUnit::Days => midnight(timestamp.date_naive()),
            unit => timestamp.duration_trunc(unit.fixed(1)?).ok(),
        }
    }
}

/// An amount of time expressed in a calendar unit.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq)]
pub struct Sampling {
    /// Number of units.
    pub value: u32,
    /// The unit.
    pub unit: CalendarUnit,
}

impl Sampling {
    /// Creates a new `Sampling`.
    pub const fn new(value: u32, unit: CalendarUnit) -> Self {
        Sampling { value, unit }
    }

    fn add_to(self, timestamp: DateTime<Utc>, times: u64) -> Option<DateTime<Utc>> {
        self.unit.shift(timestamp, u64::from(self.value).checked_mul(times)?)
    }

    fn sub_from(self, timestamp: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.unit.sub(timestamp, self.value)
    }
}

/// Configuration of a [`MovingWindow`].
#[derive(Clone, Copy, Debug)]
pub struct MovingWindowConfig {
    span: Sampling,
    step: Sampling,
    start: DateTime<Utc>,
    align_start_time: bool,
}

impl MovingWindowConfig {
    /// Creates a new `MovingWindowConfig` with windows of length `span`, anchored at `start`.
    ///
    /// Windows advance by one `span` unit at a time.
    ///
    /// # Errors
    ///
    /// If `span` is zero units long, an error is returned.
    pub fn new(span: Sampling, start: DateTime<Utc>) -> Result<Self, AggregationError> {
        check_sampling("sampling", span)?;
        Ok(MovingWindowConfig {
            span,
            step: Sampling::new(1, span.unit),
            start,
            align_start_time: false,
        })
    }

    /// Sets the distance between the ends of consecutive windows.
    ///
    /// # Errors
    ///
    /// If `step` is zero units long, an error is returned.
    pub fn with_step(mut self, step: Sampling) -> Result<Self, AggregationError> {
        check_sampling("step", step)?;
        self.step = step;
        Ok(self)
    }

    /// Sets whether or not the anchor is truncated to the start of its span unit.
    ///
    /// Defaults to `false`.
    #[must_use]
    pub fn with_align_start_time(mut self, align: bool) -> Self {
        self.align_start_time = align;
        self
    }

    /// Gets the length of each window.
    pub fn span(&self) -> Sampling {
        self.span
    }

    /// Gets the distance between the ends of consecutive windows.
    pub fn step(&self) -> Sampling {
        self.step
    }

    /// Gets the timestamp windows are anchored at.
    ///
    /// # Errors
    ///
    /// If the start time cannot be aligned, an error is returned.
    pub fn anchor(&self) -> Result<DateTime<Utc>, AggregationError> {
        if !self.align_start_time {
            return Ok(self.start);
        }
        self.span.unit.align(self.start).ok_or_else(|| {
            AggregationError::invalid_parameter("start", format!("cannot align {}", self.start))
        })
    }
}

fn check_sampling(name: &'static str, sampling: Sampling) -> Result<(), AggregationError> {
    if sampling.value == 0 {
        return Err(AggregationError::invalid_parameter(name, "must be at least one unit long"));
    }
    Ok(())
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum State {
    Uninitialized,
    Filling,
    Draining,
    Terminal,
}

/// Bounds of a window: `(start, end]`.
#[derive(Clone, Copy, Debug)]
struct Bounds {
    index: u64,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

/// Re-buckets an ordered datapoint stream into moving windows.
///
/// Window `k` ends at `anchor + k * step` and spans `(max(anchor, end - span), end]`.  Each
/// datapoint is emitted once per window holding it, with its timestamp replaced by the end of the
/// window, in timestamp order.  Datapoints at or before the anchor are dropped, as are windows
/// holding nothing.  When the upstream holds more than one datapoint for a timestamp, the last
/// one wins.
///
/// Should a window end fall outside of the range of representable timestamps, iteration stops
/// and the error is kept for [`take_error`](MovingWindow::take_error).
pub struct MovingWindow<I: Iterator<Item = DataPoint>> {
    upstream: Peekable<I>,
    config: MovingWindowConfig,
    anchor: DateTime<Utc>,
    window: Option<Bounds>,
    buffer: BTreeMap<DateTime<Utc>, Value>,
    cursor: Option<DateTime<Utc>>,
    state: State,
    error: Option<AggregationError>,
}

impl<I: Iterator<Item = DataPoint>> MovingWindow<I> {
    /// Creates a new `MovingWindow` over `upstream`.
    ///
    /// # Errors
    ///
    /// If the window anchor cannot be computed, an error is returned.
    pub fn new<U>(upstream: U, config: MovingWindowConfig) -> Result<Self, AggregationError>
    where
        U: IntoIterator<IntoIter = I>,
    {
        Ok(MovingWindow {
            upstream: upstream.into_iter().peekable(),
            anchor: config.anchor()?,
            config,
            window: None,
            buffer: BTreeMap::new(),
            cursor: None,
            state: State::Uninitialized,
            error: None,
        })
    }

    /// Gets the timestamp windows are anchored at.
    pub fn anchor(&self) -> DateTime<Utc> {
        self.anchor
    }

    /// Takes the error that stopped iteration early, if any.
    pub fn take_error(&mut self) -> Option<AggregationError> {
        self.error.take()
    }

    fn out_of_range(&self, index: u64) -> AggregationError {
        AggregationError::WindowOutOfRange { anchor: self.anchor, index }
    }

    fn bounds(&self, index: u64) -> Result<Bounds, AggregationError> {
        let end = self
            .config
            .step
            .add_to(self.anchor, index)
            .ok_or_else(|| self.out_of_range(index))?;
        let start = match self.config.span.sub_from(end) {
            Some(start) if start > self.anchor => start,
            _ => self.anchor,
        };
        Ok(Bounds { index, start, end })
    }

    /// Finds the first window after `after` whose end is at or past `timestamp`.
    fn first_window_ending_after(
        &self,
        after: u64,
        timestamp: DateTime<Utc>,
    ) -> Result<Bounds, AggregationError> {
        let next = after.checked_add(1).ok_or_else(|| self.out_of_range(after))?;

        // Fixed-length steps can jump straight to the right window.
        let mut index = match self.config.step.unit.fixed(u64::from(self.config.step.value)) {
            Some(step) => {
                let elapsed = (timestamp - self.anchor).num_milliseconds();
                let step = step.num_milliseconds().max(1);
                u64::try_from(elapsed / step).unwrap_or(0).max(next)
            }
            None => next,
        };

        loop {
            let bounds = self.bounds(index)?;
            if bounds.end >= timestamp {
                return Ok(bounds);
            }
            index = index.checked_add(1).ok_or_else(|| self.out_of_range(index))?;
        }
    }

    /// Moves to the next non-empty window, filling the buffer.
    ///
    /// Returns `false` once every window has been emitted.
    fn advance(&mut self) -> Result<bool, AggregationError> {
        let mut bounds = match self.window {
            Some(current) => {
                let index =
                    current.index.checked_add(1).ok_or_else(|| self.out_of_range(current.index))?;
                self.bounds(index)?
            }
            None => self.bounds(1)?,
        };

        loop {
            self.buffer.retain(|timestamp, _| *timestamp > bounds.start);

            while let Some(point) = self.upstream.next_if(|point| point.timestamp <= bounds.end) {
                if point.timestamp > bounds.start {
                    self.buffer.insert(point.timestamp, point.value);
                }
            }

            trace!(
                window.start = %bounds.start,
                window.end = %bounds.end,
                buffered = self.buffer.len(),
                "Filled moving window."
            );

            self.window = Some(bounds);
            if !self.buffer.is_empty() {
                self.cursor = None;
                return Ok(true);
            }

            // Skip the windows in which nothing would be emitted.
            let Some(upcoming) = self.upstream.peek().map(|point| point.timestamp) else {
                return Ok(false);
            };
            bounds = self.first_window_ending_after(bounds.index, upcoming)?;
        }
    }

    fn drain_next(&mut self) -> Option<DataPoint> {
        let end = self.window?.end;
        let lower = match self.cursor {
            Some(cursor) => Bound::Excluded(cursor),
            None => Bound::Unbounded,
        };

        let (timestamp, value) = self.buffer.range((lower, Bound::Unbounded)).next()?;
        self.cursor = Some(*timestamp);
        Some(DataPoint { timestamp: end, value: value.clone() })
    }
}

impl<I: Iterator<Item = DataPoint>> Iterator for MovingWindow<I> {
    type Item = DataPoint;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.state {
                State::Uninitialized => {
                    // Nothing at or before the anchor can land in a window.
                    let anchor = self.anchor;
                    while self.upstream.next_if(|point| point.timestamp <= anchor).is_some() {}
                    self.state = State::Filling;
                }
                State::Filling => {
                    self.state = match self.advance() {
                        Ok(true) => State::Draining,
                        Ok(false) => State::Terminal,
                        Err(e) => {
                            error!(
                                error = %e,
                                anchor = %self.anchor,
                                "Failed to advance moving window."
                            );
                            self.error = Some(e);
                            State::Terminal
                        }
                    };
                }
                State::Draining => match self.drain_next() {
                    Some(point) => return Some(point),
                    None => self.state = State::Filling,
                },
                State::Terminal => return None,
            }
        }
    }
}

impl<I: Iterator<Item = DataPoint>> FusedIterator for MovingWindow<I> {}

#[cfg(test)]
mod tests {
    use super::{CalendarUnit, MovingWindow, MovingWindowConfig, Sampling};
    use crate::{AggregationError, DataPoint};
    use chrono::{DateTime, Datelike, NaiveDate, TimeDelta, TimeZone, Utc};

    fn ts(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn daily(from: u32, to: u32) -> Vec<DataPoint> {
        (from..=to).map(|d| DataPoint::new(ts(2018, 1, d), i64::from(d))).collect()
    }

    /// Groups the output by window end.
    fn windows<W>(window: W) -> Vec<(DateTime<Utc>, Vec<i64>)>
    where
        W: IntoIterator<Item = DataPoint>,
    {
        let mut out: Vec<(DateTime<Utc>, Vec<i64>)> = Vec::new();
        for point in window {
            let crate::Value::Long(v) = point.value else { panic!("unexpected value") };
            match out.last_mut() {
                Some((end, values)) if *end == point.timestamp => values.push(v),
                _ => out.push((point.timestamp, vec![v])),
            }
        }
        out
    }

    #[test]
    fn seven_day_window() {
        let config =
            MovingWindowConfig::new(Sampling::new(7, CalendarUnit::Days), ts(2018, 1, 1)).unwrap();
        let out = windows(MovingWindow::new(daily(1, 29), config).unwrap());

        // The anchor itself is never part of a window.
        assert_eq!(out[0], (ts(2018, 1, 2), vec![2]));
        assert_eq!(out[5], (ts(2018, 1, 7), vec![2, 3, 4, 5, 6, 7]));

        for (end, values) in &out[6..28] {
            let day = i64::from(end.day0()) + 1;
            assert_eq!(values, &((day - 6)..=day).collect::<Vec<_>>(), "window ending {end}");
        }
        assert_eq!(out[6].0, ts(2018, 1, 8));
        assert_eq!(out[27].0, ts(2018, 1, 29));

        // Trailing windows drain the buffer after the upstream ends.
        assert_eq!(out[28], (ts(2018, 1, 30), vec![24, 25, 26, 27, 28, 29]));
        assert_eq!(out.last().unwrap(), &(ts(2018, 2, 4), vec![29]));
        assert_eq!(out.len(), 34);
    }

    #[test]
    fn empty_windows_are_skipped() {
        let points = vec![
            DataPoint::new(ts(2018, 1, 2), 1i64),
            DataPoint::new(ts(2018, 3, 1), 2i64),
        ];
        let config =
            MovingWindowConfig::new(Sampling::new(2, CalendarUnit::Days), ts(2018, 1, 1)).unwrap();
        let out = windows(MovingWindow::new(points, config).unwrap());

        assert_eq!(
            out,
            vec![
                (ts(2018, 1, 2), vec![1]),
                (ts(2018, 1, 3), vec![1]),
                (ts(2018, 3, 1), vec![2]),
                (ts(2018, 3, 2), vec![2]),
            ]
        );
    }

    #[test]
    fn duplicate_timestamps_overwrite() {
        let points = vec![
            DataPoint::new(ts(2018, 1, 2), 1i64),
            DataPoint::new(ts(2018, 1, 2), 5i64),
        ];
        let config =
            MovingWindowConfig::new(Sampling::new(1, CalendarUnit::Days), ts(2018, 1, 1)).unwrap();
        let out = windows(MovingWindow::new(points, config).unwrap());
        assert_eq!(out, vec![(ts(2018, 1, 2), vec![5])]);
    }

    #[test]
    fn monthly_windows_use_calendar_arithmetic() {
        let points = vec![
            DataPoint::new(ts(2018, 2, 15), 1i64),
            DataPoint::new(ts(2018, 3, 31), 2i64),
        ];
        let config =
            MovingWindowConfig::new(Sampling::new(1, CalendarUnit::Months), ts(2018, 1, 31))
                .unwrap();
        let out = windows(MovingWindow::new(points, config).unwrap());

        assert_eq!(
            out,
            vec![
                (ts(2018, 2, 28), vec![1]),
                (ts(2018, 3, 31), vec![2]),
                (ts(2018, 4, 30), vec![2]),
            ]
        );
    }

    #[test]
    fn larger_step_than_unit() {
        let config = MovingWindowConfig::new(Sampling::new(2, CalendarUnit::Days), ts(2018, 1, 1))
            .unwrap()
            .with_step(Sampling::new(2, CalendarUnit::Days))
            .unwrap();
        let out = windows(MovingWindow::new(daily(2, 6), config).unwrap());

        assert_eq!(
            out,
            vec![
                (ts(2018, 1, 3), vec![2, 3]),
                (ts(2018, 1, 5), vec![4, 5]),
                (ts(2018, 1, 7), vec![6]),
            ]
        );
    }

    #[test]
    fn empty_upstream() {
        let config =
            MovingWindowConfig::new(Sampling::new(1, CalendarUnit::Hours), ts(2018, 1, 1)).unwrap();
        let mut window = MovingWindow::new(Vec::<DataPoint>::new(), config).unwrap();
        assert_eq!(window.next(), None);
        assert_eq!(window.next(), None);
    }

    #[test]
    fn long_gaps_between_millisecond_windows() {
        let anchor = ts(2018, 1, 1);
        let later = anchor + TimeDelta::days(60);
        let points = vec![
            DataPoint::new(anchor + TimeDelta::milliseconds(1), 1i64),
            DataPoint::new(later, 2i64),
        ];
        let config =
            MovingWindowConfig::new(Sampling::new(1, CalendarUnit::Milliseconds), anchor).unwrap();
        let mut window = MovingWindow::new(points, config).unwrap();

        let out = windows(window.by_ref());
        assert_eq!(out, vec![(anchor + TimeDelta::milliseconds(1), vec![1]), (later, vec![2])]);
        assert!(window.take_error().is_none());
    }

    #[test]
    fn unrepresentable_window_end() {
        let anchor = Utc.with_ymd_and_hms(262_000, 1, 1, 0, 0, 0).unwrap();
        let points = vec![DataPoint::new(anchor + TimeDelta::days(1), 1i64)];
        let config =
            MovingWindowConfig::new(Sampling::new(1000, CalendarUnit::Years), anchor).unwrap();
        let mut window = MovingWindow::new(points, config).unwrap();

        assert_eq!(window.next(), None);
        assert!(matches!(
            window.take_error(),
            Some(AggregationError::WindowOutOfRange { index: 1, .. })
        ));
    }

    #[test]
    fn zero_length_windows_are_rejected() {
        let zero = Sampling::new(0, CalendarUnit::Days);
        assert!(MovingWindowConfig::new(zero, ts(2018, 1, 1)).is_err());

        let config =
            MovingWindowConfig::new(Sampling::new(1, CalendarUnit::Days), ts(2018, 1, 1)).unwrap();
        assert!(config.with_step(zero).is_err());
    }

    #[test]
    fn alignment() {
        let start = Utc.with_ymd_and_hms(2018, 5, 17, 13, 45, 12).unwrap();
        let aligned = |unit: CalendarUnit| unit.align(start).unwrap();

        assert_eq!(aligned(CalendarUnit::Years), ts(2018, 1, 1));
        assert_eq!(aligned(CalendarUnit::Months), ts(2018, 5, 1));
        // 2018-05-17 is a Thursday.
        assert_eq!(aligned(CalendarUnit::Weeks), ts(2018, 5, 14));
        assert_eq!(aligned(CalendarUnit::Days), ts(2018, 5, 17));
        let hour = Utc.with_ymd_and_hms(2018, 5, 17, 13, 0, 0).unwrap();
        assert_eq!(aligned(CalendarUnit::Hours), hour);
        let minute = Utc.with_ymd_and_hms(2018, 5, 17, 13, 45, 0).unwrap();
        assert_eq!(aligned(CalendarUnit::Minutes), minute);
        assert_eq!(aligned(CalendarUnit::Seconds), start);

        let config = MovingWindowConfig::new(Sampling::new(1, CalendarUnit::Weeks), start)
            .unwrap()
            .with_align_start_time(true);
        assert_eq!(config.anchor().unwrap(), ts(2018, 5, 14));
    }

    #[test]
    fn calendar_arithmetic() {
        let leap = NaiveDate::from_ymd_opt(2020, 2, 29)
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .unwrap()
            .and_utc();
        assert_eq!(CalendarUnit::Years.add(leap, 1), Some(ts(2021, 2, 28)));
        assert_eq!(CalendarUnit::Months.sub(ts(2018, 3, 31), 1), Some(ts(2018, 2, 28)));
        assert_eq!(CalendarUnit::Weeks.add(ts(2018, 1, 1), 2), Some(ts(2018, 1, 15)));
    }
}
