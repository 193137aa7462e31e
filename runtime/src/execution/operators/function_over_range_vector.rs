use tracing::{field, trace_span, Span};

use crate::execution::context::QueryContext;
use crate::execution::operator::{
    InstantVectorOperator, NextSeries, Operator, RangeVectorOperator,
};
use crate::memory_pool::MemoryPool;
use crate::runtime_error::RuntimeResult;
use crate::types::{
    FPoint, HPoint, InstantVectorSeriesData, QueryTimeRange, SeriesMetadata, Timestamp,
};

use super::function_over_instant_vector::MetadataFunc;

/// Computes the value at step `t` from the samples of one window. `None` means
/// no point at this step.
pub type RangeStepFunction = fn(floats: &[FPoint], histograms: &[HPoint], t: Timestamp, range_ms: i64) -> Option<f64>;

/// Evaluates a window function at every step of each range vector series.
pub struct FunctionOverRangeVector {
    name: &'static str,
    inner: Box<dyn RangeVectorOperator>,
    pool: MemoryPool,
    time_range: QueryTimeRange,
    metadata_func: Option<MetadataFunc>,
    step_func: RangeStepFunction,
}

impl FunctionOverRangeVector {
    pub fn new(
        name: &'static str,
        inner: Box<dyn RangeVectorOperator>,
        pool: MemoryPool,
        time_range: QueryTimeRange,
        metadata_func: Option<MetadataFunc>,
        step_func: RangeStepFunction,
    ) -> Self {
        Self {
            name,
            inner,
            pool,
            time_range,
            metadata_func,
            step_func,
        }
    }
}

impl Operator for FunctionOverRangeVector {
    fn close(&mut self) {
        self.inner.close();
    }
}

impl InstantVectorOperator for FunctionOverRangeVector {
    fn series_metadata(&mut self, ctx: &QueryContext) -> RuntimeResult<Vec<SeriesMetadata>> {
        let span = if ctx.trace_enabled() {
            trace_span!("rollup", function = self.name, series = field::Empty)
        } else {
            Span::none()
        }
        .entered();

        ctx.check_cancelled()?;
        let metadata = self.inner.series_metadata(ctx)?;
        let metadata = match self.metadata_func {
            Some(f) => f(metadata)?,
            None => metadata,
        };
        span.record("series", metadata.len());
        Ok(metadata)
    }

    fn next_series(
        &mut self,
        ctx: &QueryContext,
    ) -> RuntimeResult<NextSeries<InstantVectorSeriesData>> {
        ctx.check_cancelled()?;
        let data = match self.inner.next_series(ctx)? {
            NextSeries::Series(data) => data,
            NextSeries::EndOfStream => return Ok(NextSeries::EndOfStream),
        };

        let range_ms = self.inner.range_ms();
        let mut floats = self.pool.fpoints().acquire(self.time_range.step_count)?;
        for t in self.time_range.timestamps() {
            let window = data.float_window(t);
            let hist_window = data.histogram_window(t);
            if let Some(value) = (self.step_func)(window, hist_window, t, range_ms) {
                floats.push(FPoint::new(t, value))?;
            }
        }
        Ok(NextSeries::Series(InstantVectorSeriesData::new(
            floats,
            Default::default(),
        )))
    }
}
