use tracing::debug;

use crate::annotations::{native_histogram_error_to_annotation, Annotations};
use crate::functions::aggregate::{collect_float_points, collect_histogram_points, AggregationGroup};
use crate::memory_pool::{MemoryPool, PooledVec};
use crate::runtime_error::RuntimeResult;
use crate::types::{step_index, HistogramSlot, InstantVectorSeriesData, Timestamp};

#[derive(Debug, Default)]
pub struct SumAggregationGroup {
    float_sums: PooledVec<f64>,
    float_present: PooledVec<bool>,
    histogram_sums: PooledVec<HistogramSlot>,
}

impl AggregationGroup for SumAggregationGroup {
    fn accumulate_series(
        &mut self,
        data: InstantVectorSeriesData,
        steps: usize,
        start: Timestamp,
        interval: i64,
        pool: &MemoryPool,
        annotations: &Annotations,
    ) -> RuntimeResult<bool> {
        if !data.floats.is_empty() && self.float_sums.is_empty() {
            self.float_sums = pool.floats().acquire_filled(steps)?;
            self.float_present = pool.bools().acquire_filled(steps)?;
        }
        if !data.histograms.is_empty() && self.histogram_sums.is_empty() {
            self.histogram_sums = pool.histogram_slots().acquire_filled(steps)?;
        }

        let mut mixed = false;

        for p in data.floats.iter() {
            let idx = step_index(p.t, start, interval, steps)?;
            if let Some(slot) = self.histogram_sums.get_mut(idx) {
                if !slot.is_absent() {
                    // a float and a histogram at the same step: drop the point
                    mixed = true;
                    *slot = HistogramSlot::Poisoned;
                    self.float_present[idx] = false;
                    continue;
                }
            }
            if self.float_present[idx] {
                self.float_sums[idx] += p.f;
            } else {
                self.float_sums[idx] = p.f;
                self.float_present[idx] = true;
            }
        }

        for p in data.histograms.iter() {
            let idx = step_index(p.t, start, interval, steps)?;
            let slot = &mut self.histogram_sums[idx];
            if self.float_present.get(idx).copied().unwrap_or(false) {
                mixed = true;
                *slot = HistogramSlot::Poisoned;
                self.float_present[idx] = false;
                continue;
            }
            match slot {
                HistogramSlot::Absent => *slot = HistogramSlot::Present(p.h.clone()),
                HistogramSlot::Poisoned => {}
                HistogramSlot::Present(sum) => {
                    if let Err(err) = sum.add(&p.h) {
                        debug!(t = p.t, %err, "cannot add histograms");
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
            self.float_sums[i]
        })?;
        let histograms = collect_histogram_points(&mut self.histogram_sums, start, interval, pool)?;
        Ok(InstantVectorSeriesData::new(floats, histograms))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::annotations::Annotation;
    use crate::functions::aggregate::test_utils::*;
    use crate::types::FloatHistogram;

    #[test]
    fn single_series_round_trips() {
        let pool = MemoryPool::unlimited();
        let annotations = Annotations::new();
        let mut group = SumAggregationGroup::default();
        let input = [(0, 1.5), (2, -3.0), (3, 0.25)];
        let mixed = group
            .accumulate_series(series(&pool, &input, &[]), 4, START, INTERVAL, &pool, &annotations)
            .unwrap();
        assert!(!mixed);

        let output = group.compute_output_series(START, INTERVAL, &pool).unwrap();
        assert_eq!(floats(&output), vec![(0, 1.5), (20, -3.0), (30, 0.25)]);
        drop(output);
        assert!(pool.tracker().is_balanced());
    }

    #[test]
    fn sums_floats_and_histograms() {
        let pool = MemoryPool::unlimited();
        let annotations = Annotations::new();
        let mut group = SumAggregationGroup::default();
        group
            .accumulate_series(
                series(&pool, &[(0, 1.0)], &[(1, histogram(2.0, 4.0))]),
                2,
                START,
                INTERVAL,
                &pool,
                &annotations,
            )
            .unwrap();
        group
            .accumulate_series(
                series(&pool, &[(0, 2.0)], &[(1, histogram(3.0, 5.0))]),
                2,
                START,
                INTERVAL,
                &pool,
                &annotations,
            )
            .unwrap();

        let output = group.compute_output_series(START, INTERVAL, &pool).unwrap();
        assert_eq!(floats(&output), vec![(0, 3.0)]);
        assert_eq!(output.histograms.len(), 1);
        assert_eq!(output.histograms[0].t, 10);
        assert_eq!(output.histograms[0].h, histogram(5.0, 9.0));
    }

    #[test]
    fn conflicting_point_is_dropped_for_good() {
        let pool = MemoryPool::unlimited();
        let annotations = Annotations::new();
        let mut group = SumAggregationGroup::default();
        let first = series(&pool, &[(0, 1.0), (1, 1.0)], &[]);
        let second = series(&pool, &[], &[(0, histogram(1.0, 1.0))]);
        let third = series(&pool, &[(0, 5.0)], &[]);

        assert!(!group
            .accumulate_series(first, 2, START, INTERVAL, &pool, &annotations)
            .unwrap());
        assert!(group
            .accumulate_series(second, 2, START, INTERVAL, &pool, &annotations)
            .unwrap());
        // a later float at the same step must not bring the point back
        assert!(group
            .accumulate_series(third, 2, START, INTERVAL, &pool, &annotations)
            .unwrap());

        let output = group.compute_output_series(START, INTERVAL, &pool).unwrap();
        assert_eq!(floats(&output), vec![(10, 1.0)]);
        assert!(output.histograms.is_empty());
    }

    #[test]
    fn incompatible_histograms_poison_the_step() {
        let pool = MemoryPool::unlimited();
        let annotations = Annotations::new();
        let mut group = SumAggregationGroup::default();
        let custom = FloatHistogram::with_custom_bounds(vec![1.0, 2.0]);
        for h in [histogram(1.0, 1.0), custom, histogram(1.0, 1.0)] {
            group
                .accumulate_series(
                    series(&pool, &[], &[(0, h)]),
                    1,
                    START,
                    INTERVAL,
                    &pool,
                    &annotations,
                )
                .unwrap();
        }
        let output = group.compute_output_series(START, INTERVAL, &pool).unwrap();
        assert!(output.is_empty());
        assert_eq!(
            annotations.to_vec(),
            vec![Annotation::MixedExponentialCustomHistograms]
        );
    }

    #[test]
    fn off_grid_sample_is_an_error() {
        let pool = MemoryPool::unlimited();
        let mut group = SumAggregationGroup::default();
        let mut f = pool.fpoints().acquire(1).unwrap();
        f.push(crate::types::FPoint::new(5, 1.0)).unwrap();
        let data = InstantVectorSeriesData::new(f, Default::default());
        let err = group
            .accumulate_series(data, 2, START, INTERVAL, &pool, &Annotations::new())
            .unwrap_err();
        assert!(matches!(err, crate::runtime_error::RuntimeError::Execution(_)));
    }
}
