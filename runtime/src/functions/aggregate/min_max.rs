use crate::annotations::Annotations;
use crate::functions::aggregate::{collect_float_points, AggregationGroup};
use crate::memory_pool::{MemoryPool, PooledVec};
use crate::runtime_error::RuntimeResult;
use crate::types::{step_index, InstantVectorSeriesData, Timestamp};

/// `max` or `min` per step. NaN inputs are ignored.
///
/// A histogram counts as the value 0, so a step holding only histograms still
/// produces a point. This mirrors Prometheus, see
/// https://github.com/prometheus/prometheus/issues/14711
#[derive(Debug, Default)]
pub struct MinMaxAggregationGroup {
    is_max: bool,
    float_values: PooledVec<f64>,
    float_present: PooledVec<bool>,
}

impl MinMaxAggregationGroup {
    pub fn max() -> Self {
        Self {
            is_max: true,
            ..Default::default()
        }
    }

    pub fn min() -> Self {
        Self::default()
    }

    #[inline]
    fn accumulate_point(&mut self, idx: usize, v: f64) {
        let replace = !self.float_present[idx]
            || if self.is_max {
                v > self.float_values[idx]
            } else {
                v < self.float_values[idx]
            };
        if replace {
            self.float_values[idx] = v;
            self.float_present[idx] = true;
        }
    }
}

impl AggregationGroup for MinMaxAggregationGroup {
    fn accumulate_series(
        &mut self,
        data: InstantVectorSeriesData,
        steps: usize,
        start: Timestamp,
        interval: i64,
        pool: &MemoryPool,
        _annotations: &Annotations,
    ) -> RuntimeResult<bool> {
        if !data.is_empty() && self.float_values.is_empty() {
            self.float_values = pool.floats().acquire_filled(steps)?;
            self.float_present = pool.bools().acquire_filled(steps)?;
        }

        for p in data.floats.iter() {
            if p.f.is_nan() {
                continue;
            }
            let idx = step_index(p.t, start, interval, steps)?;
            self.accumulate_point(idx, p.f);
        }

        for p in data.histograms.iter() {
            let idx = step_index(p.t, start, interval, steps)?;
            self.accumulate_point(idx, 0.0);
        }

        Ok(false)
    }

    fn compute_output_series(
        self,
        start: Timestamp,
        interval: i64,
        pool: &MemoryPool,
    ) -> RuntimeResult<InstantVectorSeriesData> {
        let floats = collect_float_points(&self.float_present, start, interval, pool, |i| {
            self.float_values[i]
        })?;
        Ok(InstantVectorSeriesData::new(floats, Default::default()))
    }
}
