//! Step bucketing for trend summaries
//!
//! Reduces one step-ordered series to at most `limit` representative points.
//! The domain `[min_step, max_step]` (observed, or set by the caller) is cut
//! into `limit` equal-width `(lower, upper]` buckets; the first bucket is
//! open to `-inf`.
//!
//! - The first bucket is always represented by the series' first point.
//! - Every other bucket is represented by its last point.
//! - Empty buckets are omitted.
//!
//! Each (entity, metric) series is bucketed on its own domain. A caller
//! domain is widened to cover the series, and is replaced by the observed
//! span when the series would otherwise collapse into the first bucket.
//!
//! # Example
//!
//! ```rust
//! use trueno_fetch::buckets::BucketAggregator;
//! use trueno_fetch::series::SeriesPoint;
//!
//! # fn main() -> trueno_fetch::Result<()> {
//! let series: Vec<_> = [(0.0, 100.0), (250.0, 50.0), (450.0, 10.0), (999.0, 39.0)]
//!     .into_iter()
//!     .map(|(s, v)| SeriesPoint::new(s, v))
//!     .collect();
//!
//! let buckets = BucketAggregator::new(5)?
//!     .with_domain(0.0, 1000.0)?
//!     .aggregate(&series);
//! let indices: Vec<usize> = buckets.iter().map(|b| b.index).collect();
//! assert_eq!(indices, vec![0, 1, 2, 4]);
//! # Ok(())
//! # }
//! ```

use serde::Serialize;

use crate::series::SeriesPoint;
use crate::{Error, Result};

/// Default and maximum number of buckets.
pub const MAX_BUCKETS: usize = 1000;

/// One non-empty bucket.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bucket<V> {
    /// Bucket index in `0..limit`
    pub index: usize,
    /// Exclusive lower bound (`-inf` for the first bucket)
    pub from_step: f64,
    /// Inclusive upper bound
    pub to_step: f64,
    /// Representative point
    pub point: SeriesPoint<V>,
}

/// Buckets step series into at most `limit` points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketAggregator {
    limit: usize,
    domain: Option<(f64, f64)>,
}

impl Default for BucketAggregator {
    fn default() -> Self {
        Self {
            limit: MAX_BUCKETS,
            domain: None,
        }
    }
}

impl BucketAggregator {
    /// Aggregator with `limit` buckets.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` unless `1 <= limit <= 1000`.
    pub fn new(limit: usize) -> Result<Self> {
        if !(1..=MAX_BUCKETS).contains(&limit) {
            return Err(Error::InvalidArgument(format!(
                "bucket limit must be between 1 and {MAX_BUCKETS}, got {limit}"
            )));
        }
        Ok(Self {
            limit,
            domain: None,
        })
    }

    /// Use a fixed domain instead of each series' observed one.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for non-finite or reversed bounds.
    pub fn with_domain(mut self, min_step: f64, max_step: f64) -> Result<Self> {
        if !min_step.is_finite() || !max_step.is_finite() || min_step > max_step {
            return Err(Error::InvalidArgument(format!(
                "invalid bucket domain [{min_step}, {max_step}]"
            )));
        }
        self.domain = Some((min_step, max_step));
        Ok(self)
    }

    /// Number of buckets.
    #[must_use]
    pub const fn limit(&self) -> usize {
        self.limit
    }

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn bucket_index(&self, step: f64, min: f64, width: f64) -> usize {
        if step <= min || width <= 0.0 {
            return 0;
        }
        let raw = ((step - min) / width).ceil() - 1.0;
        (raw.max(0.0) as usize).min(self.limit - 1)
    }

    #[allow(clippy::cast_precision_loss)]
    fn bounds(&self, index: usize, min: f64, max: f64, width: f64) -> (f64, f64) {
        let lower = if index == 0 {
            f64::NEG_INFINITY
        } else {
            min + width * index as f64
        };
        let upper = if index + 1 == self.limit {
            max
        } else {
            min + width * (index + 1) as f64
        };
        (lower, upper)
    }

    /// Domain used for one series spanning `[first, last]`.
    ///
    /// A caller domain is widened to cover the data. When the last point
    /// would still share bucket 0 with the first, the observed span is used
    /// instead so the series end is never dropped.
    #[allow(clippy::cast_precision_loss)]
    fn effective_domain(&self, first: f64, last: f64) -> (f64, f64) {
        let Some((min_step, max_step)) = self.domain else {
            return (first, last);
        };
        let (min, max) = (min_step.min(first), max_step.max(last));
        let width = (max - min) / self.limit as f64;
        if self.limit > 1 && last > first && self.bucket_index(last, min, width) == 0 {
            return (first, last);
        }
        (min, max)
    }

    /// Bucket one series given in ascending step order.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn aggregate<V: Clone>(&self, points: &[SeriesPoint<V>]) -> Vec<Bucket<V>> {
        let (Some(first), Some(last)) = (points.first(), points.last()) else {
            return Vec::new();
        };
        let (min, max) = self.effective_domain(first.step, last.step);
        let width = (max - min) / self.limit as f64;

        let mut slots: Vec<Option<&SeriesPoint<V>>> = vec![None; self.limit];
        slots[0] = Some(first);
        for point in &points[1..] {
            let index = self.bucket_index(point.step, min, width);
            if index > 0 {
                slots[index] = Some(point);
            }
        }

        slots
            .into_iter()
            .enumerate()
            .filter_map(|(index, slot)| {
                slot.map(|point| {
                    let (from_step, to_step) = self.bounds(index, min, max, width);
                    Bucket {
                        index,
                        from_step,
                        to_step,
                        point: point.clone(),
                    }
                })
            })
            .collect()
    }

    /// Bucket many independent series, in parallel when the `rayon` feature is on.
    ///
    /// Output order follows input order.
    #[must_use]
    pub fn aggregate_many<K, V>(&self, series: Vec<(K, Vec<SeriesPoint<V>>)>) -> Vec<(K, Vec<Bucket<V>>)>
    where
        K: Send,
        V: Clone + Send + Sync,
    {
        #[cfg(feature = "rayon")]
        {
            use rayon::prelude::*;
            series
                .into_par_iter()
                .map(|(key, points)| {
                    let buckets = self.aggregate(&points);
                    (key, buckets)
                })
                .collect()
        }
        #[cfg(not(feature = "rayon"))]
        {
            series
                .into_iter()
                .map(|(key, points)| {
                    let buckets = self.aggregate(&points);
                    (key, buckets)
                })
                .collect()
        }
    }
}
