use crate::annotations::Annotations;
use crate::functions::aggregate::{collect_float_points, AggregationGroup};
use crate::memory_pool::{MemoryPool, PooledVec};
use crate::runtime_error::RuntimeResult;
use crate::types::{step_index, InstantVectorSeriesData, Timestamp};

/// Number of samples, floats and histograms alike, per step.
#[derive(Debug, Default)]
pub struct CountAggregationGroup {
    counts: PooledVec<f64>,
    present: PooledVec<bool>,
}

impl AggregationGroup for CountAggregationGroup {
    fn accumulate_series(
        &mut self,
        data: InstantVectorSeriesData,
        steps: usize,
        start: Timestamp,
        interval: i64,
        pool: &MemoryPool,
        _annotations: &Annotations,
    ) -> RuntimeResult<bool> {
        if !data.is_empty() && self.counts.is_empty() {
            self.counts = pool.floats().acquire_filled(steps)?;
            self.present = pool.bools().acquire_filled(steps)?;
        }
        for (t, _, _) in data.iter() {
            let idx = step_index(t, start, interval, steps)?;
            self.counts[idx] += 1.0;
            self.present[idx] = true;
        }
        Ok(false)
    }

    fn compute_output_series(
        self,
        start: Timestamp,
        interval: i64,
        pool: &MemoryPool,
    ) -> RuntimeResult<InstantVectorSeriesData> {
        let floats = collect_float_points(&self.present, start, interval, pool, |i| self.counts[i])?;
        Ok(InstantVectorSeriesData::new(floats, Default::default()))
    }
}
