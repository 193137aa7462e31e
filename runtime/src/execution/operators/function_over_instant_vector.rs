use tracing::{field, trace_span, Span};

use crate::execution::context::QueryContext;
use crate::execution::operator::{InstantVectorOperator, NextSeries, Operator};
use crate::memory_pool::MemoryPool;
use crate::runtime_error::RuntimeResult;
use crate::types::{InstantVectorSeriesData, SeriesMetadata};

/// Rewrites the metadata of the inner operator.
pub type MetadataFunc = fn(Vec<SeriesMetadata>) -> RuntimeResult<Vec<SeriesMetadata>>;

/// Transforms one series at a time.
pub trait SeriesDataFunction: Send {
    /// Runs once, before the first series, e.g. to evaluate scalar arguments.
    fn prepare(&mut self, _ctx: &QueryContext) -> RuntimeResult<()> {
        Ok(())
    }

    fn apply(
        &mut self,
        data: InstantVectorSeriesData,
        pool: &MemoryPool,
    ) -> RuntimeResult<InstantVectorSeriesData>;

    /// Closes any operators the function holds.
    fn close(&mut self) {}
}

impl<F> SeriesDataFunction for F
where
    F: FnMut(InstantVectorSeriesData, &MemoryPool) -> RuntimeResult<InstantVectorSeriesData>
        + Send,
{
    fn apply(
        &mut self,
        data: InstantVectorSeriesData,
        pool: &MemoryPool,
    ) -> RuntimeResult<InstantVectorSeriesData> {
        self(data, pool)
    }
}

pub fn drop_series_name(mut metadata: Vec<SeriesMetadata>) -> RuntimeResult<Vec<SeriesMetadata>> {
    for series in metadata.iter_mut() {
        series.labels = series.labels.drop_metric_name();
    }
    Ok(metadata)
}

/// Applies a function to each series of an instant vector.
pub struct FunctionOverInstantVector<F> {
    name: &'static str,
    inner: Box<dyn InstantVectorOperator>,
    pool: MemoryPool,
    metadata_func: Option<MetadataFunc>,
    series_func: F,
}

impl<F: SeriesDataFunction> FunctionOverInstantVector<F> {
    pub fn new(
        name: &'static str,
        inner: Box<dyn InstantVectorOperator>,
        pool: MemoryPool,
        metadata_func: Option<MetadataFunc>,
        series_func: F,
    ) -> Self {
        Self {
            name,
            inner,
            pool,
            metadata_func,
            series_func,
        }
    }
}

impl<F: SeriesDataFunction> Operator for FunctionOverInstantVector<F> {
    fn close(&mut self) {
        self.inner.close();
        self.series_func.close();
    }
}

impl<F: SeriesDataFunction> InstantVectorOperator for FunctionOverInstantVector<F> {
    fn series_metadata(&mut self, ctx: &QueryContext) -> RuntimeResult<Vec<SeriesMetadata>> {
        let span = if ctx.trace_enabled() {
            trace_span!("transform", function = self.name, series = field::Empty)
        } else {
            Span::none()
        }
        .entered();

        ctx.check_cancelled()?;
        let metadata = self.inner.series_metadata(ctx)?;
        self.series_func.prepare(ctx)?;
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
        match self.inner.next_series(ctx)? {
            NextSeries::Series(data) => {
                let data = self.series_func.apply(data, &self.pool)?;
                Ok(NextSeries::Series(data))
            }
            NextSeries::EndOfStream => Ok(NextSeries::EndOfStream),
        }
    }
}
