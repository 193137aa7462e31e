use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::execution::context::QueryContext;
use crate::execution::operator::{InstantVectorOperator, NextSeries, Operator};
use crate::memory_pool::MemoryPool;
use crate::runtime_error::RuntimeResult;
use crate::types::{
    FPoint, FloatHistogram, HPoint, InstantVectorSeriesData, Labels, QueryTimeRange,
    SeriesMetadata,
};
use crate::QuerySeries;

pub const EPSILON: f64 = 1e-12;

/// A series given by step index rather than by timestamp.
#[derive(Debug, Clone, Default)]
pub struct TestSeries {
    pub labels: Labels,
    pub floats: Vec<(usize, f64)>,
    pub histograms: Vec<(usize, FloatHistogram)>,
}

impl TestSeries {
    pub fn floats(labels: Labels, floats: &[(usize, f64)]) -> Self {
        Self {
            labels,
            floats: floats.to_vec(),
            histograms: vec![],
        }
    }

    pub fn histograms(labels: Labels, histograms: Vec<(usize, FloatHistogram)>) -> Self {
        Self {
            labels,
            floats: vec![],
            histograms,
        }
    }
}

/// An instant vector operator replaying a fixed list of series. Pooled buffers
/// are only acquired when a series is pulled.
pub struct SeriesListOperator {
    metadata: Vec<SeriesMetadata>,
    remaining: VecDeque<TestSeries>,
    time_range: QueryTimeRange,
    pool: MemoryPool,
    closed: Arc<AtomicBool>,
}

impl SeriesListOperator {
    pub fn new(series: Vec<TestSeries>, time_range: QueryTimeRange, pool: MemoryPool) -> Self {
        Self {
            metadata: series
                .iter()
                .map(|s| SeriesMetadata::new(s.labels.clone()))
                .collect(),
            remaining: series.into(),
            time_range,
            pool,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Declares a series in the metadata that is never produced.
    pub fn with_undelivered_series(mut self, labels: Labels) -> Self {
        self.metadata.push(SeriesMetadata::new(labels));
        self
    }

    pub fn closed_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.closed)
    }

    fn to_data(&self, series: TestSeries) -> RuntimeResult<InstantVectorSeriesData> {
        let mut floats = self.pool.fpoints().acquire(series.floats.len())?;
        for (step, v) in series.floats {
            floats.push(FPoint::new(self.time_range.step_timestamp(step), v))?;
        }
        let mut histograms = self.pool.hpoints().acquire(series.histograms.len())?;
        for (step, h) in series.histograms {
            histograms.push(HPoint::new(self.time_range.step_timestamp(step), h))?;
        }
        Ok(InstantVectorSeriesData::new(floats, histograms))
    }
}

impl Operator for SeriesListOperator {
    fn close(&mut self) {
        self.remaining.clear();
        self.closed.store(true, Ordering::Release);
    }
}

impl InstantVectorOperator for SeriesListOperator {
    fn series_metadata(&mut self, ctx: &QueryContext) -> RuntimeResult<Vec<SeriesMetadata>> {
        ctx.check_cancelled()?;
        Ok(self.metadata.clone())
    }

    fn next_series(
        &mut self,
        ctx: &QueryContext,
    ) -> RuntimeResult<NextSeries<InstantVectorSeriesData>> {
        ctx.check_cancelled()?;
        match self.remaining.pop_front() {
            Some(series) => Ok(NextSeries::Series(self.to_data(series)?)),
            None => Ok(NextSeries::EndOfStream),
        }
    }
}

pub fn labels(pairs: &[(&str, &str)]) -> Labels {
    Labels::from_pairs(pairs.iter().copied())
}

/// A histogram with every observation in one positive bucket.
pub fn histogram(count: f64, sum: f64) -> FloatHistogram {
    let mut h = FloatHistogram::new(0);
    h.observe_positive(1, count, sum);
    h
}

pub fn series_floats(series: &QuerySeries) -> Vec<(i64, f64)> {
    series.floats.iter().map(|p| (p.t, p.f)).collect()
}

pub fn compare_floats(expected: f64, actual: f64) -> bool {
    match (expected.is_finite(), actual.is_finite()) {
        (true, true) => (actual - expected).abs() <= EPSILON,
        (false, false) => {
            if expected.is_nan() {
                return actual.is_nan();
            }
            expected == actual
        }
        _ => false,
    }
}

pub fn assert_points_equal(actual: &[(i64, f64)], expected: &[(i64, f64)]) {
    assert_eq!(
        actual.len(),
        expected.len(),
        "unexpected number of points; got {actual:?}; want {expected:?}"
    );
    for ((t, v), (t_expected, v_expected)) in actual.iter().zip(expected.iter()) {
        assert_eq!(t, t_expected, "unexpected timestamp; got {actual:?}; want {expected:?}");
        assert!(
            compare_floats(*v_expected, *v),
            "unexpected value at {t}; got {v}; want {v_expected}"
        );
    }
}
