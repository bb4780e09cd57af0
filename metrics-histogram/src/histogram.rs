//! The histogram value type.
use std::collections::{btree_map::Entry, BTreeMap};

use ordered_float::OrderedFloat;

use crate::bucket::truncate;
use crate::error::{check_precision, HistogramError};

/// Bucket map keyed by truncated sample value.
pub type Buckets = BTreeMap<OrderedFloat<f64>, u64>;

/// A mergeable histogram with precision-bounded buckets.
///
/// Samples are grouped into buckets by [`truncate`]-ing them to the histogram's precision, and the
/// histogram keeps the number of samples per bucket alongside the minimum, maximum, sum and mean
/// of the raw samples.  Two histograms can be merged losslessly by adding their bucket counts.
///
/// A `Histogram` is immutable: it is created through [`HistogramBuilder`], or by one of the
/// constructors that derive it from existing buckets, and every aggregation over histograms
/// creates a new one.
///
/// An empty histogram has a minimum of positive infinity, a maximum of negative infinity, a sum of
/// zero, and a mean of NaN.
#[derive(Clone, Debug, PartialEq)]
pub struct Histogram {
    buckets: Buckets,
    min: f64,
    max: f64,
    sum: f64,
    mean: f64,
    precision: u8,
    original_count: Option<u64>,
}

impl Histogram {
    /// Creates an empty histogram.
    ///
    /// # Errors
    ///
    /// If `precision` is greater than [`MAX_PRECISION`](crate::MAX_PRECISION), an error is returned.
    pub fn empty(precision: u8) -> Result<Histogram, HistogramError> {
        HistogramBuilder::new(precision).map(HistogramBuilder::build)
    }

    /// Creates a histogram from raw sample values.
    ///
    /// # Errors
    ///
    /// If `precision` is greater than [`MAX_PRECISION`](crate::MAX_PRECISION), an error is returned.
    pub fn from_samples<I>(samples: I, precision: u8) -> Result<Histogram, HistogramError>
    where
        I: IntoIterator<Item = f64>,
    {
        let mut builder = HistogramBuilder::new(precision)?;
        builder.record_many(samples);
        Ok(builder.build())
    }

    /// Creates a histogram from `(bucket, count)` pairs.
    ///
    /// Bucket values are truncated to `precision`, counts for the same bucket are added together,
    /// and empty buckets are dropped.  As the raw samples are not known, the minimum, maximum, sum
    /// and mean are derived from the bucket values themselves.
    ///
    /// # Errors
    ///
    /// If `precision` is greater than [`MAX_PRECISION`](crate::MAX_PRECISION), an error is returned.
    pub fn from_buckets<I>(buckets: I, precision: u8) -> Result<Histogram, HistogramError>
    where
        I: IntoIterator<Item = (f64, u64)>,
    {
        let precision = check_precision(u32::from(precision))?;

        let mut map = Buckets::new();
        for (bucket, count) in buckets {
            if count > 0 {
                *map.entry(OrderedFloat(truncate(bucket, precision))).or_insert(0) += count;
            }
        }

        let min = map.keys().next().map_or(f64::INFINITY, |k| k.0);
        let max = map.keys().next_back().map_or(f64::NEG_INFINITY, |k| k.0);
        #[allow(clippy::cast_precision_loss)]
        let sum = map.iter().map(|(k, count)| k.0 * *count as f64).sum::<f64>();
        let count = map.values().sum::<u64>();

        Ok(Histogram {
            buckets: map,
            min,
            max,
            sum,
            mean: mean(sum, count),
            precision,
            original_count: None,
        })
    }

    /// Creates a histogram from its raw parts.
    ///
    /// No consistency checks are performed: callers are responsible for the bucket keys being
    /// truncated to `precision`, and for `mean` being equal to `sum` divided by the sample count.
    /// This is how decoders reconstruct a histogram exactly as it was stored.
    ///
    /// # Errors
    ///
    /// If `precision` is greater than [`MAX_PRECISION`](crate::MAX_PRECISION), an error is returned.
    pub fn from_parts(
        buckets: Buckets,
        min: f64,
        max: f64,
        sum: f64,
        mean: f64,
        precision: u8,
    ) -> Result<Histogram, HistogramError> {
        let precision = check_precision(u32::from(precision))?;
        Ok(Histogram { buckets, min, max, sum, mean, precision, original_count: None })
    }

    /// Sets the sample count of the unfiltered histogram this histogram was derived from.
    #[must_use]
    pub fn with_original_count(mut self, original_count: u64) -> Histogram {
        self.original_count = Some(original_count);
        self
    }

    /// Gets the buckets, in ascending order, as `(bucket, count)` pairs.
    pub fn buckets(&self) -> impl DoubleEndedIterator<Item = (f64, u64)> + '_ {
        self.buckets.iter().map(|(k, v)| (k.0, *v))
    }

    /// Gets the underlying bucket map.
    pub fn bucket_map(&self) -> &Buckets {
        &self.buckets
    }

    /// Gets the number of non-empty buckets.
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Gets the number of samples in this histogram.
    ///
    /// This is always computed from the buckets.
    pub fn sample_count(&self) -> u64 {
        self.buckets.values().sum()
    }

    /// Returns `true` if this histogram holds no samples.
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Gets the smallest sample value.
    pub fn min(&self) -> f64 {
        self.min
    }

    /// Gets the largest sample value.
    pub fn max(&self) -> f64 {
        self.max
    }

    /// Gets the sum of all sample values.
    pub fn sum(&self) -> f64 {
        self.sum
    }

    /// Gets the mean of all sample values.
    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Gets the number of mantissa bits retained by the buckets.
    pub fn precision(&self) -> u8 {
        self.precision
    }

    /// Gets the sample count of the unfiltered histogram, if this histogram was derived from one.
    pub fn original_count(&self) -> Option<u64> {
        self.original_count
    }
}

#[allow(clippy::cast_precision_loss)]
fn mean(sum: f64, count: u64) -> f64 {
    // Zero samples divide to NaN on purpose.
    sum / count as f64
}

/// Builds a [`Histogram`] incrementally.
///
/// Tracks the running minimum, maximum and sum of every recorded sample, and either buckets raw
/// samples or folds in existing histograms.
#[derive(Clone, Debug)]
pub struct HistogramBuilder {
    buckets: Buckets,
    min: f64,
    max: f64,
    sum: f64,
    precision: u8,
    original_count: Option<u64>,
}

impl HistogramBuilder {
    /// Creates a new `HistogramBuilder`.
    ///
    /// # Errors
    ///
    /// If `precision` is greater than [`MAX_PRECISION`](crate::MAX_PRECISION), an error is returned.
    pub fn new(precision: u8) -> Result<HistogramBuilder, HistogramError> {
        let precision = check_precision(u32::from(precision))?;

        Ok(HistogramBuilder {
            buckets: Buckets::new(),
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            sum: 0.0,
            precision,
            original_count: None,
        })
    }

    /// Records a single sample.
    pub fn record(&mut self, value: f64) {
        if value < self.min {
            self.min = value;
        }
        if value > self.max {
            self.max = value;
        }
        self.sum += value;
        if let Some(original) = self.original_count.as_mut() {
            *original += 1;
        }

        self.add_bucket(value, 1);
    }

    /// Records multiple samples.
    pub fn record_many<I>(&mut self, samples: I)
    where
        I: IntoIterator<Item = f64>,
    {
        for sample in samples {
            self.record(sample);
        }
    }

    /// Merges an existing histogram into this one.
    ///
    /// Buckets are re-truncated to the precision of this builder, which is a no-op when the
    /// other histogram is at the same or a lower precision.  Original counts are added together;
    /// a histogram without one contributes its sample count.
    pub fn merge(&mut self, other: &Histogram) {
        if other.min < self.min {
            self.min = other.min;
        }
        if other.max > self.max {
            self.max = other.max;
        }
        self.sum += other.sum;

        if let Some(original) = other.original_count {
            let current = self.original_count.unwrap_or_else(|| self.buckets.values().sum());
            self.original_count = Some(current + original);
        } else if let Some(current) = self.original_count.as_mut() {
            *current += other.sample_count();
        }

        for (bucket, count) in other.buckets() {
            self.add_bucket(bucket, count);
        }
    }

    fn add_bucket(&mut self, value: f64, count: u64) {
        let key = OrderedFloat(truncate(value, self.precision));
        match self.buckets.entry(key) {
            Entry::Vacant(entry) => {
                entry.insert(count);
            }
            Entry::Occupied(mut entry) => {
                *entry.get_mut() += count;
            }
        }
    }

    /// Gets the number of samples recorded so far.
    pub fn sample_count(&self) -> u64 {
        self.buckets.values().sum()
    }

    /// Consumes the builder, returning the finished histogram.
    pub fn build(self) -> Histogram {
        let count = self.sample_count();
        Histogram {
            buckets: self.buckets,
            min: self.min,
            max: self.max,
            sum: self.sum,
            mean: mean(self.sum, count),
            precision: self.precision,
            original_count: self.original_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Histogram, HistogramBuilder};
    use crate::{HistogramError, DEFAULT_PRECISION};

    use proptest::prelude::*;

    #[test]
    fn from_samples_tracks_summary() {
        let samples = [1.0, 3.0, 5.0, 7.0, 9.0, 1.0, 9.0, 1.0, 9.0];
        let histogram = Histogram::from_samples(samples, DEFAULT_PRECISION).unwrap();

        assert_eq!(histogram.sample_count(), 9);
        assert_eq!(histogram.bucket_count(), 5);
        assert_eq!(histogram.min(), 1.0);
        assert_eq!(histogram.max(), 9.0);
        assert_eq!(histogram.sum(), 45.0);
        assert_eq!(histogram.mean(), 5.0);
        assert_eq!(histogram.original_count(), None);

        let buckets = histogram.buckets().collect::<Vec<_>>();
        assert_eq!(buckets, vec![(1.0, 3), (3.0, 1), (5.0, 1), (7.0, 1), (9.0, 3)]);
    }

    #[test]
    fn coarse_precision_shares_buckets() {
        // With a single mantissa bit, 5 lands in the bucket of 4 and 7 in the bucket of 6.
        let histogram = Histogram::from_samples([4.0, 5.0, 6.0, 7.0], 1).unwrap();
        let buckets = histogram.buckets().collect::<Vec<_>>();
        assert_eq!(buckets, vec![(4.0, 2), (6.0, 2)]);
        assert_eq!(histogram.sum(), 22.0);
    }

    #[test]
    fn empty_histogram() {
        let histogram = Histogram::from_samples(std::iter::empty(), DEFAULT_PRECISION).unwrap();
        assert!(histogram.is_empty());
        assert_eq!(histogram.sample_count(), 0);
        assert_eq!(histogram.min(), f64::INFINITY);
        assert_eq!(histogram.max(), f64::NEG_INFINITY);
        assert_eq!(histogram.sum(), 0.0);
        assert!(histogram.mean().is_nan());
    }

    #[test]
    fn invalid_precision() {
        let result = Histogram::from_samples([1.0], 53);
        assert!(matches!(result, Err(HistogramError::InvalidPrecision { precision: 53 })));
        assert!(HistogramBuilder::new(200).is_err());
    }

    #[test]
    fn from_buckets_recomputes_summary() {
        let histogram =
            Histogram::from_buckets([(2.0, 2), (1.0, 1), (2.0, 1), (8.0, 0)], DEFAULT_PRECISION)
                .unwrap();

        assert_eq!(histogram.buckets().collect::<Vec<_>>(), vec![(1.0, 1), (2.0, 3)]);
        assert_eq!(histogram.min(), 1.0);
        assert_eq!(histogram.max(), 2.0);
        assert_eq!(histogram.sum(), 7.0);
        assert_eq!(histogram.mean(), 7.0 / 4.0);
    }

    #[test]
    fn merge_matches_concatenation() {
        let a = [9.0, 1.0, 9.0, 1.0, 8.0, 12.0];
        let b = [18.0, 2.0, 18.0, 2.0, 20.0, 20.0];

        let mut builder = HistogramBuilder::new(DEFAULT_PRECISION).unwrap();
        builder.merge(&Histogram::from_samples(a, DEFAULT_PRECISION).unwrap());
        builder.merge(&Histogram::from_samples(b, DEFAULT_PRECISION).unwrap());
        let merged = builder.build();

        let direct = Histogram::from_samples(a.into_iter().chain(b), DEFAULT_PRECISION).unwrap();
        assert_eq!(merged, direct);
        assert_eq!(merged.mean(), 10.0);
    }

    #[test]
    fn merge_accumulates_original_counts() {
        let filtered = Histogram::from_samples([1.0, 2.0], DEFAULT_PRECISION)
            .unwrap()
            .with_original_count(4);
        let plain = Histogram::from_samples([3.0], DEFAULT_PRECISION).unwrap();

        let mut builder = HistogramBuilder::new(DEFAULT_PRECISION).unwrap();
        builder.merge(&plain);
        builder.merge(&filtered);
        let merged = builder.build();

        assert_eq!(merged.sample_count(), 3);
        assert_eq!(merged.original_count(), Some(5));
    }

    #[test]
    fn record_after_merge_counts_towards_original() {
        let filtered = Histogram::from_samples([1.0, 2.0], DEFAULT_PRECISION)
            .unwrap()
            .with_original_count(4);

        let mut builder = HistogramBuilder::new(DEFAULT_PRECISION).unwrap();
        builder.merge(&filtered);
        builder.record(5.0);
        let histogram = builder.build();

        assert_eq!(histogram.sample_count(), 3);
        assert_eq!(histogram.original_count(), Some(5));
    }

    proptest! {
        #[test]
        fn bucket_counts_sum_to_sample_count(
            samples in proptest::collection::vec(0.0f64..1e9, 0..256),
            precision in 0u8..=16,
        ) {
            let histogram = Histogram::from_samples(samples.iter().copied(), precision).unwrap();
            prop_assert_eq!(histogram.sample_count(), samples.len() as u64);

            let lowest = crate::truncate(histogram.min(), precision);
            for (bucket, _) in histogram.buckets() {
                prop_assert!(lowest <= bucket);
                prop_assert!(bucket <= histogram.max());
            }
        }

        #[test]
        fn merge_is_order_independent(
            a in proptest::collection::vec(0u32..1_000_000, 1..64),
            b in proptest::collection::vec(0u32..1_000_000, 1..64),
            c in proptest::collection::vec(0u32..1_000_000, 1..64),
        ) {
            let to_histogram = |samples: &[u32]| {
                Histogram::from_samples(samples.iter().map(|s| f64::from(*s)), DEFAULT_PRECISION)
                    .unwrap()
            };
            let parts = [to_histogram(&a), to_histogram(&b), to_histogram(&c)];

            let merge_in = |order: [usize; 3]| {
                let mut builder = HistogramBuilder::new(DEFAULT_PRECISION).unwrap();
                for i in order {
                    builder.merge(&parts[i]);
                }
                builder.build()
            };

            let forward = merge_in([0, 1, 2]);
            prop_assert_eq!(&forward, &merge_in([2, 0, 1]));
            prop_assert_eq!(&forward, &merge_in([1, 2, 0]));
        }
    }
}
