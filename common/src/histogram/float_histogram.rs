use std::collections::BTreeMap;

use thiserror::Error;

/// Schema used by histograms with explicitly configured (custom) bucket bounds.
pub const CUSTOM_BUCKETS_SCHEMA: i32 = -53;
pub const EXPONENTIAL_SCHEMA_MIN: i32 = -4;
pub const EXPONENTIAL_SCHEMA_MAX: i32 = 8;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum HistogramError {
    #[error("cannot apply this operation on histograms with a mix of exponential and custom bucket schemas")]
    MixedExponentialCustom,
    #[error("cannot apply this operation on custom buckets histograms with different custom bounds")]
    CustomBucketsMismatch,
    #[error("invalid histogram schema {0}")]
    InvalidSchema(i32),
}

/// A native histogram with float counts.
///
/// Buckets are kept sparse, keyed by bucket index. For exponential schemas the
/// upper bound of positive bucket `i` is `2^(i * 2^-schema)`; negative buckets
/// mirror them. For [`CUSTOM_BUCKETS_SCHEMA`] the index addresses
/// `custom_values`, and only positive buckets are used.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FloatHistogram {
    pub schema: i32,
    pub zero_threshold: f64,
    pub zero_count: f64,
    pub count: f64,
    pub sum: f64,
    pub positive_buckets: BTreeMap<i32, f64>,
    pub negative_buckets: BTreeMap<i32, f64>,
    pub custom_values: Vec<f64>,
}

impl FloatHistogram {
    pub fn new(schema: i32) -> Self {
        Self {
            schema,
            ..Default::default()
        }
    }

    pub fn with_custom_bounds(bounds: Vec<f64>) -> Self {
        Self {
            schema: CUSTOM_BUCKETS_SCHEMA,
            custom_values: bounds,
            ..Default::default()
        }
    }

    pub fn uses_custom_buckets(&self) -> bool {
        self.schema == CUSTOM_BUCKETS_SCHEMA
    }

    /// Records `count` observations summing to `sum` in the positive bucket `index`.
    pub fn observe_positive(&mut self, index: i32, count: f64, sum: f64) -> &mut Self {
        *self.positive_buckets.entry(index).or_default() += count;
        self.count += count;
        self.sum += sum;
        self
    }

    pub fn observe_negative(&mut self, index: i32, count: f64, sum: f64) -> &mut Self {
        *self.negative_buckets.entry(index).or_default() += count;
        self.count += count;
        self.sum += sum;
        self
    }

    pub fn observe_zero(&mut self, count: f64) -> &mut Self {
        self.zero_count += count;
        self.count += count;
        self
    }

    /// Adds `other` to this histogram. On failure this histogram is unchanged.
    ///
    /// Exponential histograms of different schemas are combined at the lower of
    /// the two resolutions.
    pub fn add(&mut self, other: &FloatHistogram) -> Result<(), HistogramError> {
        self.combine(other, 1.0)
    }

    /// Subtracts `other` from this histogram. On failure this histogram is unchanged.
    pub fn sub(&mut self, other: &FloatHistogram) -> Result<(), HistogramError> {
        self.combine(other, -1.0)
    }

    /// Scales every count and the sum by `factor`.
    pub fn mul(&mut self, factor: f64) -> &mut Self {
        self.scale(|v| v * factor);
        self
    }

    pub fn div(&mut self, divisor: f64) -> &mut Self {
        self.scale(|v| v / divisor);
        self
    }

    /// Removes empty buckets.
    pub fn compact(&mut self) -> &mut Self {
        self.positive_buckets.retain(|_, v| *v != 0.0);
        self.negative_buckets.retain(|_, v| *v != 0.0);
        self
    }

    fn scale(&mut self, op: impl Fn(f64) -> f64) {
        self.zero_count = op(self.zero_count);
        self.count = op(self.count);
        self.sum = op(self.sum);
        for v in self.positive_buckets.values_mut() {
            *v = op(*v);
        }
        for v in self.negative_buckets.values_mut() {
            *v = op(*v);
        }
    }

    fn check_compatible(&self, other: &FloatHistogram) -> Result<(), HistogramError> {
        validate_schema(self.schema)?;
        validate_schema(other.schema)?;
        match (self.uses_custom_buckets(), other.uses_custom_buckets()) {
            (true, true) if self.custom_values != other.custom_values => {
                Err(HistogramError::CustomBucketsMismatch)
            }
            (true, false) | (false, true) => Err(HistogramError::MixedExponentialCustom),
            _ => Ok(()),
        }
    }

    fn combine(&mut self, other: &FloatHistogram, sign: f64) -> Result<(), HistogramError> {
        self.check_compatible(other)?;

        if !self.uses_custom_buckets() && other.schema < self.schema {
            self.reduce_resolution(other.schema);
        }
        let origin = other.schema;
        let target = self.schema;
        let resolve = |idx: i32| {
            if origin > target {
                target_index(idx, origin, target)
            } else {
                idx
            }
        };

        for (idx, v) in other.positive_buckets.iter() {
            *self.positive_buckets.entry(resolve(*idx)).or_default() += sign * v;
        }
        for (idx, v) in other.negative_buckets.iter() {
            *self.negative_buckets.entry(resolve(*idx)).or_default() += sign * v;
        }

        self.zero_threshold = self.zero_threshold.max(other.zero_threshold);
        self.zero_count += sign * other.zero_count;
        self.count += sign * other.count;
        self.sum += sign * other.sum;
        self.fold_into_zero_bucket();
        Ok(())
    }

    /// Moves exponential buckets lying entirely within the zero threshold into
    /// the zero bucket.
    fn fold_into_zero_bucket(&mut self) {
        if self.uses_custom_buckets() || self.zero_threshold <= 0.0 {
            return;
        }
        let schema = self.schema;
        let threshold = self.zero_threshold;
        let mut folded = 0.0;
        for buckets in [&mut self.positive_buckets, &mut self.negative_buckets] {
            buckets.retain(|idx, count| {
                if bucket_upper_bound(*idx, schema) <= threshold {
                    folded += *count;
                    false
                } else {
                    true
                }
            });
        }
        self.zero_count += folded;
    }

    /// Lowers the resolution of an exponential histogram to `target_schema`,
    /// merging buckets that fall into the same wider bucket.
    pub fn reduce_resolution(&mut self, target_schema: i32) -> &mut Self {
        if self.uses_custom_buckets() || target_schema >= self.schema {
            return self;
        }
        let origin = self.schema;
        self.positive_buckets = merge_buckets(&self.positive_buckets, origin, target_schema);
        self.negative_buckets = merge_buckets(&self.negative_buckets, origin, target_schema);
        self.schema = target_schema;
        self
    }
}

fn validate_schema(schema: i32) -> Result<(), HistogramError> {
    if schema == CUSTOM_BUCKETS_SCHEMA
        || (EXPONENTIAL_SCHEMA_MIN..=EXPONENTIAL_SCHEMA_MAX).contains(&schema)
    {
        Ok(())
    } else {
        Err(HistogramError::InvalidSchema(schema))
    }
}

/// Absolute upper bound of exponential bucket `idx`.
#[inline]
fn bucket_upper_bound(idx: i32, schema: i32) -> f64 {
    2f64.powf(f64::from(idx) * 2f64.powi(-schema))
}

/// Index of the bucket in `target` schema that contains bucket `idx` of `origin`.
#[inline]
fn target_index(idx: i32, origin: i32, target: i32) -> i32 {
    ((idx - 1) >> (origin - target)) + 1
}

fn merge_buckets(buckets: &BTreeMap<i32, f64>, origin: i32, target: i32) -> BTreeMap<i32, f64> {
    let mut merged = BTreeMap::new();
    for (idx, v) in buckets {
        *merged.entry(target_index(*idx, origin, target)).or_default() += v;
    }
    merged
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    fn exponential(schema: i32, buckets: &[(i32, f64)]) -> FloatHistogram {
        let mut h = FloatHistogram::new(schema);
        for (idx, count) in buckets {
            h.observe_positive(*idx, *count, *count);
        }
        h
    }

    #[test]
    fn add_same_schema() {
        let mut a = exponential(0, &[(1, 2.0), (2, 1.0)]);
        let b = exponential(0, &[(2, 3.0), (3, 4.0)]);
        a.add(&b).unwrap();

        assert_eq!(a.count, 10.0);
        assert_eq!(a.sum, 10.0);
        assert_eq!(
            a.positive_buckets,
            BTreeMap::from([(1, 2.0), (2, 4.0), (3, 4.0)])
        );
    }

    #[test]
    fn add_reduces_to_lower_resolution() {
        let mut a = exponential(1, &[(1, 1.0), (2, 1.0), (3, 1.0), (4, 1.0)]);
        let b = exponential(0, &[(1, 10.0)]);
        a.add(&b).unwrap();

        assert_eq!(a.schema, 0);
        assert_eq!(a.positive_buckets, BTreeMap::from([(1, 12.0), (2, 2.0)]));
    }

    #[test]
    fn sub_then_compact_drops_empty_buckets() {
        let mut a = exponential(0, &[(1, 2.0), (2, 1.0)]);
        let b = exponential(0, &[(2, 1.0)]);
        a.sub(&b).unwrap();
        a.compact();
        assert_eq!(a.positive_buckets, BTreeMap::from([(1, 2.0)]));
        assert_eq!(a.count, 2.0);
    }

    #[test]
    fn mixed_schemas_fail_without_mutation() {
        let mut a = exponential(0, &[(1, 2.0)]);
        let before = a.clone();
        let b = FloatHistogram::with_custom_bounds(vec![1.0, 5.0]);
        assert_eq!(a.add(&b), Err(HistogramError::MixedExponentialCustom));
        assert_eq!(a, before);
    }

    #[test]
    fn custom_bounds_must_match() {
        let mut a = FloatHistogram::with_custom_bounds(vec![1.0, 5.0]);
        let b = FloatHistogram::with_custom_bounds(vec![1.0, 10.0]);
        assert_eq!(a.sub(&b), Err(HistogramError::CustomBucketsMismatch));
    }

    #[test]
    fn wider_zero_threshold_absorbs_small_buckets() {
        let mut a = exponential(0, &[(0, 1.0), (1, 2.0), (2, 4.0)]);
        let mut b = FloatHistogram::new(0);
        b.zero_threshold = 2.0;
        b.observe_zero(3.0);
        a.add(&b).unwrap();

        assert_eq!(a.zero_threshold, 2.0);
        assert_eq!(a.zero_count, 6.0);
        assert_eq!(a.positive_buckets, BTreeMap::from([(2, 4.0)]));
        assert_eq!(a.count, 10.0);
    }

    #[test_case(9)]
    #[test_case(-5)]
    fn invalid_schema(schema: i32) {
        let mut a = FloatHistogram::new(0);
        let b = FloatHistogram::new(schema);
        assert_eq!(a.add(&b), Err(HistogramError::InvalidSchema(schema)));
    }

    #[test]
    fn scaling() {
        let mut a = exponential(0, &[(1, 4.0)]);
        a.observe_zero(2.0);
        a.div(2.0);
        assert_eq!(a.count, 3.0);
        assert_eq!(a.zero_count, 1.0);
        assert_eq!(a.positive_buckets[&1], 2.0);
        a.mul(-1.0);
        assert_eq!(a.sum, -2.0);
    }

    #[test_case(1, 1, 0, 1)]
    #[test_case(2, 1, 0, 1)]
    #[test_case(3, 1, 0, 2)]
    #[test_case(0, 1, 0, 0)]
    #[test_case(-1, 1, 0, 0)]
    #[test_case(-2, 1, 0, -1)]
    #[test_case(5, 2, 0, 2)]
    fn test_target_index(idx: i32, origin: i32, target: i32, expected: i32) {
        assert_eq!(target_index(idx, origin, target), expected);
    }
}
