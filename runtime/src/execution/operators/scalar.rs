use crate::execution::context::QueryContext;
use crate::execution::operator::{Operator, ScalarOperator};
use crate::memory_pool::MemoryPool;
use crate::runtime_error::RuntimeResult;
use crate::types::{FPoint, QueryTimeRange, ScalarData};

/// A number literal, repeated at every step.
pub struct ScalarConstant {
    value: f64,
    time_range: QueryTimeRange,
    pool: MemoryPool,
}

impl ScalarConstant {
    pub fn new(value: f64, time_range: QueryTimeRange, pool: MemoryPool) -> Self {
        Self {
            value,
            time_range,
            pool,
        }
    }
}

impl Operator for ScalarConstant {
    fn close(&mut self) {}
}

impl ScalarOperator for ScalarConstant {
    fn values(&mut self, ctx: &QueryContext) -> RuntimeResult<ScalarData> {
        ctx.check_cancelled()?;
        let mut samples = self.pool.fpoints().acquire(self.time_range.step_count)?;
        for t in self.time_range.timestamps() {
            samples.push(FPoint::new(t, self.value))?;
        }
        Ok(ScalarData::new(samples))
    }
}
