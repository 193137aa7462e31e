use std::collections::VecDeque;
use std::sync::Arc;

use tracing::debug;

use crate::execution::context::QueryContext;
use crate::execution::operator::{
    InstantVectorOperator, NextSeries, Operator, RangeVectorOperator,
};
use crate::memory_pool::MemoryPool;
use crate::provider::{LabelMatcher, RawSeries, SeriesSource};
use crate::runtime_error::{RuntimeError, RuntimeResult};
use crate::types::{
    FPoint, HPoint, InstantVectorSeriesData, QueryTimeRange, RangeVectorSeriesData,
    SeriesMetadata, Timestamp,
};

/// Series fetched from the source, waiting to be handed out in order.
#[derive(Default)]
struct SelectedSeries {
    loaded: bool,
    pending: VecDeque<RawSeries>,
}

impl SelectedSeries {
    fn load(
        &mut self,
        source: &dyn SeriesSource,
        matchers: &[LabelMatcher],
        mint: Timestamp,
        maxt: Timestamp,
    ) -> RuntimeResult<Vec<SeriesMetadata>> {
        if self.loaded {
            return Err(RuntimeError::execution("series_metadata called more than once"));
        }
        let series = source.select(matchers, mint, maxt)?;
        debug!(series = series.len(), mint, maxt, "selected series");
        let metadata = series
            .iter()
            .map(|s| SeriesMetadata::new(s.labels.clone()))
            .collect();
        self.pending = series.into();
        self.loaded = true;
        Ok(metadata)
    }

    fn next(&mut self) -> RuntimeResult<Option<RawSeries>> {
        if !self.loaded {
            return Err(RuntimeError::execution(
                "next_series called before series_metadata",
            ));
        }
        Ok(self.pending.pop_front())
    }

    fn clear(&mut self) {
        self.pending.clear();
    }
}

/// Latest sample at or before `t` and after `t - lookback`.
fn latest_in_lookback<P>(points: &[P], t: Timestamp, lookback: i64, ts: impl Fn(&P) -> Timestamp) -> Option<&P> {
    let idx = points.partition_point(|p| ts(p) <= t);
    let candidate = points[..idx].last()?;
    (ts(candidate) > t - lookback).then_some(candidate)
}

/// Leaf operator aligning stored samples to the step grid.
///
/// The value at a step is the latest sample in `(t - lookback, t]`. When both a
/// float and a histogram fall in the window, the later one wins.
pub struct InstantVectorSelector {
    source: Arc<dyn SeriesSource>,
    matchers: Vec<LabelMatcher>,
    time_range: QueryTimeRange,
    lookback_delta_ms: i64,
    pool: MemoryPool,
    selected: SelectedSeries,
}

impl InstantVectorSelector {
    pub fn new(
        source: Arc<dyn SeriesSource>,
        matchers: Vec<LabelMatcher>,
        time_range: QueryTimeRange,
        lookback_delta_ms: i64,
        pool: MemoryPool,
    ) -> Self {
        Self {
            source,
            matchers,
            time_range,
            lookback_delta_ms,
            pool,
            selected: SelectedSeries::default(),
        }
    }

    fn align(&self, raw: &RawSeries) -> RuntimeResult<InstantVectorSeriesData> {
        let steps = self.time_range.step_count;
        let mut floats = if raw.floats.is_empty() {
            Default::default()
        } else {
            self.pool.fpoints().acquire(steps)?
        };
        let mut histograms = if raw.histograms.is_empty() {
            Default::default()
        } else {
            self.pool.hpoints().acquire(steps)?
        };

        for t in self.time_range.timestamps() {
            let float = latest_in_lookback(&raw.floats, t, self.lookback_delta_ms, |p| p.t);
            let hist = latest_in_lookback(&raw.histograms, t, self.lookback_delta_ms, |p| p.t);
            match (float, hist) {
                (Some(f), Some(h)) if h.t > f.t => histograms.push(HPoint::new(t, h.h.clone()))?,
                (Some(f), _) => floats.push(FPoint::new(t, f.f))?,
                (None, Some(h)) => histograms.push(HPoint::new(t, h.h.clone()))?,
                (None, None) => {}
            }
        }
        Ok(InstantVectorSeriesData::new(floats, histograms))
    }
}

impl Operator for InstantVectorSelector {
    fn close(&mut self) {
        self.selected.clear();
    }
}

impl InstantVectorOperator for InstantVectorSelector {
    fn series_metadata(&mut self, ctx: &QueryContext) -> RuntimeResult<Vec<SeriesMetadata>> {
        ctx.check_cancelled()?;
        let mint = self.time_range.start - self.lookback_delta_ms + 1;
        self.selected
            .load(self.source.as_ref(), &self.matchers, mint, self.time_range.end)
    }

    fn next_series(
        &mut self,
        ctx: &QueryContext,
    ) -> RuntimeResult<NextSeries<InstantVectorSeriesData>> {
        ctx.check_cancelled()?;
        match self.selected.next()? {
            Some(raw) => Ok(NextSeries::Series(self.align(&raw)?)),
            None => Ok(NextSeries::EndOfStream),
        }
    }
}

/// Leaf operator yielding the raw samples of each series in
/// `(start - range, end]`.
pub struct RangeVectorSelector {
    source: Arc<dyn SeriesSource>,
    matchers: Vec<LabelMatcher>,
    time_range: QueryTimeRange,
    range_ms: i64,
    pool: MemoryPool,
    selected: SelectedSeries,
}

impl RangeVectorSelector {
    pub fn new(
        source: Arc<dyn SeriesSource>,
        matchers: Vec<LabelMatcher>,
        time_range: QueryTimeRange,
        range_ms: i64,
        pool: MemoryPool,
    ) -> RuntimeResult<Self> {
        if range_ms <= 0 {
            return Err(RuntimeError::ArgumentError(format!(
                "range must be positive, got {range_ms}ms"
            )));
        }
        Ok(Self {
            source,
            matchers,
            time_range,
            range_ms,
            pool,
            selected: SelectedSeries::default(),
        })
    }
}

impl Operator for RangeVectorSelector {
    fn close(&mut self) {
        self.selected.clear();
    }
}

impl RangeVectorOperator for RangeVectorSelector {
    fn series_metadata(&mut self, ctx: &QueryContext) -> RuntimeResult<Vec<SeriesMetadata>> {
        ctx.check_cancelled()?;
        let mint = self.time_range.start - self.range_ms + 1;
        self.selected
            .load(self.source.as_ref(), &self.matchers, mint, self.time_range.end)
    }

    fn next_series(
        &mut self,
        ctx: &QueryContext,
    ) -> RuntimeResult<NextSeries<RangeVectorSeriesData>> {
        ctx.check_cancelled()?;
        let Some(raw) = self.selected.next()? else {
            return Ok(NextSeries::EndOfStream);
        };
        let mut floats = self.pool.fpoints().acquire(raw.floats.len())?;
        for p in raw.floats {
            floats.push(p)?;
        }
        let mut histograms = self.pool.hpoints().acquire(raw.histograms.len())?;
        for p in raw.histograms {
            histograms.push(p)?;
        }
        Ok(NextSeries::Series(RangeVectorSeriesData {
            floats,
            histograms,
            range_ms: self.range_ms,
        }))
    }

    fn range_ms(&self) -> i64 {
        self.range_ms
    }
}
