use tracing::debug;

use streamql_common::histogram::HistogramError;
use streamql_common::math::kahan_sum_inc;

use crate::annotations::{native_histogram_error_to_annotation, Annotations};
use crate::functions::aggregate::{collect_float_points, collect_histogram_points, AggregationGroup};
use crate::memory_pool::{MemoryPool, PooledVec};
use crate::runtime_error::RuntimeResult;
use crate::types::{step_index, FloatHistogram, HistogramSlot, InstantVectorSeriesData, Timestamp};

/// Average per step.
///
/// Floats are summed with Kahan compensation. Once a sum would overflow, the
/// step switches for good to an incremental mean. Histograms always use an
/// incremental mean.
#[derive(Debug, Default)]
pub struct AvgAggregationGroup {
    float_sums: PooledVec<f64>,
    float_means: PooledVec<f64>,
    /// Kahan compensation of either the sum or the mean, depending on
    /// `incremental_means`.
    float_compensations: PooledVec<f64>,
    float_present: PooledVec<bool>,
    incremental_means: PooledVec<bool>,
    histograms: PooledVec<HistogramSlot>,
    /// Number of samples folded in at each step. Series may have gaps, so this
    /// is tracked per step.
    series_counts: PooledVec<f64>,
}

impl AvgAggregationGroup {
    fn remove_conflicting_point(&mut self, idx: usize) {
        if let Some(present) = self.float_present.get_mut(idx) {
            *present = false;
        }
        if let Some(slot) = self.histograms.get_mut(idx) {
            *slot = HistogramSlot::Poisoned;
        }
        self.series_counts[idx] = 0.0;
    }

    fn has_histogram(&self, idx: usize) -> bool {
        self.histograms
            .get(idx)
            .map(|slot| !slot.is_absent())
            .unwrap_or(false)
    }

    fn accumulate_float(&mut self, idx: usize, f: f64, steps: usize, pool: &MemoryPool) -> RuntimeResult<()> {
        self.series_counts[idx] += 1.0;
        let count = self.series_counts[idx];
        if !self.float_present[idx] {
            self.float_sums[idx] = f;
            self.float_present[idx] = true;
            return Ok(());
        }

        if !self.incremental_means[idx] {
            let (sum, c) = kahan_sum_inc(f, self.float_sums[idx], self.float_compensations[idx]);
            if !sum.is_infinite() {
                self.float_sums[idx] = sum;
                self.float_compensations[idx] = c;
                return Ok(());
            }
            // the sum would overflow: continue with the mean instead
            if self.float_means.is_empty() {
                self.float_means = pool.floats().acquire_filled(steps)?;
            }
            self.incremental_means[idx] = true;
            self.float_means[idx] = self.float_sums[idx] / (count - 1.0);
            self.float_compensations[idx] /= count - 1.0;
        }

        let mean = self.float_means[idx];
        if mean.is_infinite() {
            if f.is_infinite() && (mean > 0.0) == (f > 0.0) {
                // same-signed infinities: the mean is already right
                return Ok(());
            }
            if f.is_finite() {
                // Inf - Inf below would turn the mean into NaN
                return Ok(());
            }
        }
        let current_mean = mean + self.float_compensations[idx];
        let (mean, c) = kahan_sum_inc(
            f / count - current_mean / count,
            mean,
            self.float_compensations[idx],
        );
        self.float_means[idx] = mean;
        self.float_compensations[idx] = c;
        Ok(())
    }

    /// Moves the running mean at a step towards `h`.
    fn update_histogram_mean(mean: &mut FloatHistogram, h: &FloatHistogram, count: f64) -> Result<(), HistogramError> {
        let mut left = h.clone();
        left.div(count);
        let mut right = mean.clone();
        right.div(count);
        left.sub(&right)?;
        mean.add(&left)
    }
}

impl AggregationGroup for AvgAggregationGroup {
    fn accumulate_series(
        &mut self,
        data: InstantVectorSeriesData,
        steps: usize,
        start: Timestamp,
        interval: i64,
        pool: &MemoryPool,
        annotations: &Annotations,
    ) -> RuntimeResult<bool> {
        if self.series_counts.is_empty() {
            self.series_counts = pool.floats().acquire_filled(steps)?;
        }
        if !data.floats.is_empty() && self.float_sums.is_empty() {
            self.float_sums = pool.floats().acquire_filled(steps)?;
            self.float_compensations = pool.floats().acquire_filled(steps)?;
            self.float_present = pool.bools().acquire_filled(steps)?;
            self.incremental_means = pool.bools().acquire_filled(steps)?;
        }
        if !data.histograms.is_empty() && self.histograms.is_empty() {
            self.histograms = pool.histogram_slots().acquire_filled(steps)?;
        }

        let mut mixed = false;

        for p in data.floats.iter() {
            let idx = step_index(p.t, start, interval, steps)?;
            if self.has_histogram(idx) {
                mixed = true;
                self.remove_conflicting_point(idx);
                continue;
            }
            self.accumulate_float(idx, p.f, steps, pool)?;
        }

        for p in data.histograms.iter() {
            let idx = step_index(p.t, start, interval, steps)?;
            if self.float_present.get(idx).copied().unwrap_or(false) {
                mixed = true;
                self.remove_conflicting_point(idx);
                continue;
            }

            let slot = &mut self.histograms[idx];
            match slot {
                HistogramSlot::Poisoned => continue,
                HistogramSlot::Absent => {
                    self.series_counts[idx] += 1.0;
                    *slot = HistogramSlot::Present(p.h.clone());
                }
                HistogramSlot::Present(mean) => {
                    self.series_counts[idx] += 1.0;
                    let count = self.series_counts[idx];
                    if let Err(err) = Self::update_histogram_mean(mean, &p.h, count) {
                        debug!(t = p.t, %err, "cannot average histograms");
                        *slot = HistogramSlot::Poisoned;
                        native_histogram_error_to_annotation(err, annotations)?;
                    }
                }
            }
        }

        Ok(mixed)
    }

    fn compute_output_series(
        mut self,
        start: Timestamp,
        interval: i64,
        pool: &MemoryPool,
    ) -> RuntimeResult<InstantVectorSeriesData> {
        let floats = collect_float_points(&self.float_present, start, interval, pool, |i| {
            if self.incremental_means[i] {
                self.float_means[i] + self.float_compensations[i]
            } else {
                (self.float_sums[i] + self.float_compensations[i]) / self.series_counts[i]
            }
        })?;
        let histograms = collect_histogram_points(&mut self.histograms, start, interval, pool)?;
        Ok(InstantVectorSeriesData::new(floats, histograms))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::functions::aggregate::test_utils::*;

    fn avg_of(values: &[f64]) -> f64 {
        let pool = MemoryPool::unlimited();
        let annotations = Annotations::new();
        let mut group = AvgAggregationGroup::default();
        for v in values {
            group
                .accumulate_series(series(&pool, &[(0, *v)], &[]), 1, START, INTERVAL, &pool, &annotations)
                .unwrap();
        }
        let output = group.compute_output_series(START, INTERVAL, &pool).unwrap();
        assert_eq!(output.floats.len(), 1);
        output.floats[0].f
    }

    #[test]
    fn simple_average() {
        assert_eq!(avg_of(&[1.0, 2.0, 3.0, 4.0]), 2.5);
    }

    #[test]
    fn compensated_sum_keeps_small_values() {
        assert_eq!(avg_of(&[1.0, 1e100, 1.0, -1e100]), 0.5);
    }

    #[test]
    fn overflow_falls_back_to_incremental_mean() {
        let got = avg_of(&[f64::MAX, f64::MAX, -f64::MAX / 2.0, 0.0]);
        let expected = f64::MAX / 2.0 * 1.5 / 2.0;
        assert!(got.is_finite(), "mean must stay finite, got {got}");
        assert!(
            ((got - expected) / expected).abs() < 1e-12,
            "unexpected mean; got {got}; want {expected}"
        );
    }

    #[test]
    fn infinite_means() {
        assert_eq!(avg_of(&[f64::INFINITY, 1.0, f64::INFINITY]), f64::INFINITY);
        assert!(avg_of(&[f64::INFINITY, f64::NEG_INFINITY]).is_nan());
        assert_eq!(
            avg_of(&[f64::MAX, f64::MAX, f64::INFINITY, 2.0]),
            f64::INFINITY
        );
    }

    #[test]
    fn gaps_are_counted_per_step() {
        let pool = MemoryPool::unlimited();
        let annotations = Annotations::new();
        let mut group = AvgAggregationGroup::default();
        group
            .accumulate_series(series(&pool, &[(0, 2.0), (1, 4.0)], &[]), 2, START, INTERVAL, &pool, &annotations)
            .unwrap();
        group
            .accumulate_series(series(&pool, &[(1, 8.0)], &[]), 2, START, INTERVAL, &pool, &annotations)
            .unwrap();
        let output = group.compute_output_series(START, INTERVAL, &pool).unwrap();
        assert_eq!(floats(&output), vec![(0, 2.0), (10, 6.0)]);
    }

    #[test]
    fn histogram_mean() {
        let pool = MemoryPool::unlimited();
        let annotations = Annotations::new();
        let mut group = AvgAggregationGroup::default();
        for h in [histogram(2.0, 4.0), histogram(4.0, 8.0)] {
            group
                .accumulate_series(series(&pool, &[], &[(0, h)]), 1, START, INTERVAL, &pool, &annotations)
                .unwrap();
        }
        let output = group.compute_output_series(START, INTERVAL, &pool).unwrap();
        assert_eq!(output.histograms.len(), 1);
        assert_eq!(output.histograms[0].h, histogram(3.0, 6.0));
    }

    #[test]
    fn conflict_clears_point_and_count() {
        let pool = MemoryPool::unlimited();
        let annotations = Annotations::new();
        let mut group = AvgAggregationGroup::default();
        let mixed = group
            .accumulate_series(series(&pool, &[(0, 1.0), (1, 3.0)], &[]), 2, START, INTERVAL, &pool, &annotations)
            .unwrap();
        assert!(!mixed);
        let mixed = group
            .accumulate_series(series(&pool, &[(1, 5.0)], &[(0, histogram(1.0, 1.0))]), 2, START, INTERVAL, &pool, &annotations)
            .unwrap();
        assert!(mixed);
        assert_eq!(group.series_counts[0], 0.0);
        assert!(!group.float_present[0]);
        assert!(group.histograms[0].is_poisoned());

        let output = group.compute_output_series(START, INTERVAL, &pool).unwrap();
        assert_eq!(floats(&output), vec![(10, 4.0)]);
        assert!(output.histograms.is_empty());
        drop(output);
        assert!(pool.tracker().is_balanced());
    }
}
