use crate::annotations::Annotations;
use crate::functions::aggregate::{
    AggregationFunction, AggregationGroup, AvgAggregationGroup, CountAggregationGroup,
    MinMaxAggregationGroup, SumAggregationGroup,
};
use crate::memory_pool::MemoryPool;
use crate::runtime_error::RuntimeResult;
use crate::types::{InstantVectorSeriesData, Timestamp};

/// The accumulator of one aggregation group.
/// Using an enum because this needs to be Send
#[derive(Debug)]
pub enum AggregationGroupHandler {
    Sum(SumAggregationGroup),
    Avg(AvgAggregationGroup),
    MinMax(MinMaxAggregationGroup),
    Count(CountAggregationGroup),
}

impl AggregationGroupHandler {
    pub fn new(func: AggregationFunction) -> Self {
        use AggregationGroupHandler::*;
        match func {
            AggregationFunction::Sum => Sum(SumAggregationGroup::default()),
            AggregationFunction::Avg => Avg(AvgAggregationGroup::default()),
            AggregationFunction::Max => MinMax(MinMaxAggregationGroup::max()),
            AggregationFunction::Min => MinMax(MinMaxAggregationGroup::min()),
            AggregationFunction::Count => Count(CountAggregationGroup::default()),
        }
    }

    pub fn accumulate_series(
        &mut self,
        data: InstantVectorSeriesData,
        steps: usize,
        start: Timestamp,
        interval: i64,
        pool: &MemoryPool,
        annotations: &Annotations,
    ) -> RuntimeResult<bool> {
        use AggregationGroupHandler::*;
        match self {
            Sum(g) => g.accumulate_series(data, steps, start, interval, pool, annotations),
            Avg(g) => g.accumulate_series(data, steps, start, interval, pool, annotations),
            MinMax(g) => g.accumulate_series(data, steps, start, interval, pool, annotations),
            Count(g) => g.accumulate_series(data, steps, start, interval, pool, annotations),
        }
    }

    pub fn compute_output_series(
        self,
        start: Timestamp,
        interval: i64,
        pool: &MemoryPool,
    ) -> RuntimeResult<InstantVectorSeriesData> {
        use AggregationGroupHandler::*;
        match self {
            Sum(g) => g.compute_output_series(start, interval, pool),
            Avg(g) => g.compute_output_series(start, interval, pool),
            MinMax(g) => g.compute_output_series(start, interval, pool),
            Count(g) => g.compute_output_series(start, interval, pool),
        }
    }
}
