use crate::execution::context::QueryContext;
use crate::execution::operator::ScalarOperator;
use crate::execution::operators::SeriesDataFunction;
use crate::memory_pool::MemoryPool;
use crate::runtime_error::{RuntimeError, RuntimeResult};
use crate::types::{InstantVectorSeriesData, QueryTimeRange, ScalarData};

/// A scalar bound: the operator until `prepare` runs, its values afterwards.
enum Bound {
    Pending(Box<dyn ScalarOperator>),
    Ready(ScalarData),
    Closed,
}

impl Bound {
    fn prepare(&mut self, ctx: &QueryContext) -> RuntimeResult<()> {
        if let Bound::Pending(op) = self {
            let values = op.values(ctx)?;
            op.close();
            *self = Bound::Ready(values);
        }
        Ok(())
    }

    fn value_at(&self, step: usize) -> RuntimeResult<f64> {
        match self {
            Bound::Ready(values) => values.value_at(step).ok_or_else(|| {
                RuntimeError::execution(format!("scalar argument has no value at step {step}"))
            }),
            _ => Err(RuntimeError::execution("scalar argument evaluated before use")),
        }
    }

    fn close(&mut self) {
        if let Bound::Pending(op) = self {
            op.close();
        }
        *self = Bound::Closed;
    }
}

/// `clamp`, `clamp_min` and `clamp_max`. Histograms are dropped. Any NaN
/// among the value and its bounds yields NaN.
pub struct ClampFunction {
    min: Option<Bound>,
    max: Option<Bound>,
    time_range: QueryTimeRange,
}

impl ClampFunction {
    pub fn clamp(
        min: Box<dyn ScalarOperator>,
        max: Box<dyn ScalarOperator>,
        time_range: QueryTimeRange,
    ) -> Self {
        Self {
            min: Some(Bound::Pending(min)),
            max: Some(Bound::Pending(max)),
            time_range,
        }
    }

    pub fn clamp_min(min: Box<dyn ScalarOperator>, time_range: QueryTimeRange) -> Self {
        Self {
            min: Some(Bound::Pending(min)),
            max: None,
            time_range,
        }
    }

    pub fn clamp_max(max: Box<dyn ScalarOperator>, time_range: QueryTimeRange) -> Self {
        Self {
            min: None,
            max: Some(Bound::Pending(max)),
            time_range,
        }
    }
}

fn bound_value(bound: &Option<Bound>, step: usize) -> RuntimeResult<Option<f64>> {
    bound.as_ref().map(|b| b.value_at(step)).transpose()
}

/// Returns `None` when the bounds are inverted, which drops the point.
fn clamp_value(v: f64, min: Option<f64>, max: Option<f64>) -> Option<f64> {
    if let (Some(lo), Some(hi)) = (min, max) {
        if lo > hi {
            return None;
        }
    }
    let any_nan = v.is_nan() || min.is_some_and(f64::is_nan) || max.is_some_and(f64::is_nan);
    if any_nan {
        return Some(f64::NAN);
    }
    let mut v = v;
    if let Some(hi) = max {
        v = v.min(hi);
    }
    if let Some(lo) = min {
        v = v.max(lo);
    }
    Some(v)
}

impl SeriesDataFunction for ClampFunction {
    fn prepare(&mut self, ctx: &QueryContext) -> RuntimeResult<()> {
        for bound in [&mut self.min, &mut self.max].into_iter().flatten() {
            bound.prepare(ctx)?;
        }
        Ok(())
    }

    fn apply(
        &mut self,
        data: InstantVectorSeriesData,
        _pool: &MemoryPool,
    ) -> RuntimeResult<InstantVectorSeriesData> {
        let InstantVectorSeriesData { mut floats, histograms } = data;
        histograms.release();

        let mut kept = 0;
        for idx in 0..floats.len() {
            let p = floats[idx];
            let step = self.time_range.point_index(p.t)?;
            let min = bound_value(&self.min, step)?;
            let max = bound_value(&self.max, step)?;
            if let Some(v) = clamp_value(p.f, min, max) {
                floats[kept].t = p.t;
                floats[kept].f = v;
                kept += 1;
            }
        }
        floats.truncate(kept);
        Ok(InstantVectorSeriesData::new(floats, Default::default()))
    }

    fn close(&mut self) {
        for bound in [&mut self.min, &mut self.max].into_iter().flatten() {
            bound.close();
        }
    }
}
