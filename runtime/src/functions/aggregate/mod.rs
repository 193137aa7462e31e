use std::str::FromStr;

use strum::{Display, EnumIter, EnumString, IntoStaticStr};

pub use avg::AvgAggregationGroup;
pub use count::CountAggregationGroup;
pub use handler::AggregationGroupHandler;
pub use min_max::MinMaxAggregationGroup;
pub use sum::SumAggregationGroup;

use crate::annotations::Annotations;
use crate::memory_pool::{MemoryPool, PooledVec};
use crate::runtime_error::{RuntimeError, RuntimeResult};
use crate::types::{FPoint, HPoint, HistogramSlot, InstantVectorSeriesData, Timestamp};

mod avg;
mod count;
mod handler;
mod min_max;
mod sum;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum AggregationFunction {
    Sum,
    Avg,
    Max,
    Min,
    Count,
}

impl AggregationFunction {
    pub fn name(&self) -> &'static str {
        self.into()
    }

    pub fn parse(name: &str) -> RuntimeResult<Self> {
        Self::from_str(name).map_err(|_| RuntimeError::UnknownFunction(name.to_string()))
    }
}

/// Folds the series of one group into per-step state.
pub trait AggregationGroup {
    /// Adds one series to the group. Returns true if a float and a histogram
    /// met at the same step, in which case the point was dropped.
    fn accumulate_series(
        &mut self,
        data: InstantVectorSeriesData,
        steps: usize,
        start: Timestamp,
        interval: i64,
        pool: &MemoryPool,
        annotations: &Annotations,
    ) -> RuntimeResult<bool>;

    /// Builds the output series. Consumes the group, returning its buffers.
    fn compute_output_series(
        self,
        start: Timestamp,
        interval: i64,
        pool: &MemoryPool,
    ) -> RuntimeResult<InstantVectorSeriesData>;
}

/// Converts dense per-step floats into points for the present steps.
pub(crate) fn collect_float_points(
    present: &[bool],
    start: Timestamp,
    interval: i64,
    pool: &MemoryPool,
    value_at: impl Fn(usize) -> f64,
) -> RuntimeResult<PooledVec<FPoint>> {
    let count = present.iter().filter(|p| **p).count();
    let mut points = pool.fpoints().acquire(count)?;
    for (i, _) in present.iter().enumerate().filter(|(_, p)| **p) {
        points.push(FPoint::new(start + i as i64 * interval, value_at(i)))?;
    }
    Ok(points)
}

/// Moves the histograms of present slots into points. Absent and poisoned
/// slots produce nothing.
pub(crate) fn collect_histogram_points(
    slots: &mut [HistogramSlot],
    start: Timestamp,
    interval: i64,
    pool: &MemoryPool,
) -> RuntimeResult<PooledVec<HPoint>> {
    let count = slots
        .iter()
        .filter(|s| matches!(s, HistogramSlot::Present(_)))
        .count();
    let mut points = pool.hpoints().acquire(count)?;
    for (i, slot) in slots.iter_mut().enumerate() {
        if let Some(mut h) = slot.take() {
            h.compact();
            points.push(HPoint::new(start + i as i64 * interval, h))?;
        }
    }
    Ok(points)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_function_names() {
        assert_eq!(
            AggregationFunction::parse("avg").unwrap(),
            AggregationFunction::Avg
        );
        assert_eq!(AggregationFunction::Count.name(), "count");
        assert!(matches!(
            AggregationFunction::parse("quantile"),
            Err(RuntimeError::UnknownFunction(_))
        ));
    }
}
