use std::fmt;
use std::iter::FusedIterator;

use serde::{Deserialize, Serialize};

use streamql_common::histogram::FloatHistogram;
use streamql_common::label::Labels;

use crate::memory_pool::PooledVec;
use crate::types::Timestamp;

#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FPoint {
    pub t: Timestamp,
    pub f: f64,
}

impl FPoint {
    pub fn new(t: Timestamp, f: f64) -> Self {
        Self { t, f }
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct HPoint {
    pub t: Timestamp,
    pub h: FloatHistogram,
}

impl HPoint {
    pub fn new(t: Timestamp, h: FloatHistogram) -> Self {
        Self { t, h }
    }
}

/// The histogram accumulated for one step of an aggregation group.
#[derive(Debug, Default, Clone, PartialEq)]
pub enum HistogramSlot {
    #[default]
    Absent,
    Present(FloatHistogram),
    /// The inputs at this step could not be combined. Nothing is output for the
    /// step and later inputs are ignored.
    Poisoned,
}

impl HistogramSlot {
    pub fn is_absent(&self) -> bool {
        matches!(self, HistogramSlot::Absent)
    }

    pub fn is_poisoned(&self) -> bool {
        matches!(self, HistogramSlot::Poisoned)
    }

    pub fn as_present_mut(&mut self) -> Option<&mut FloatHistogram> {
        match self {
            HistogramSlot::Present(h) => Some(h),
            _ => None,
        }
    }

    /// Takes the histogram out, leaving the slot absent. Poisoned slots stay
    /// poisoned.
    pub fn take(&mut self) -> Option<FloatHistogram> {
        match std::mem::take(self) {
            HistogramSlot::Present(h) => Some(h),
            HistogramSlot::Poisoned => {
                *self = HistogramSlot::Poisoned;
                None
            }
            HistogramSlot::Absent => None,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SeriesMetadata {
    pub labels: Labels,
}

impl SeriesMetadata {
    pub fn new(labels: Labels) -> Self {
        Self { labels }
    }
}

impl fmt::Display for SeriesMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.labels)
    }
}

/// The samples of one series of an instant vector. Both lists are sorted by
/// timestamp and lie on the step grid.
#[derive(Debug, Default, PartialEq)]
pub struct InstantVectorSeriesData {
    pub floats: PooledVec<FPoint>,
    pub histograms: PooledVec<HPoint>,
}

impl InstantVectorSeriesData {
    pub fn new(floats: PooledVec<FPoint>, histograms: PooledVec<HPoint>) -> Self {
        Self { floats, histograms }
    }

    pub fn len(&self) -> usize {
        self.floats.len() + self.histograms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.floats.is_empty() && self.histograms.is_empty()
    }

    /// Iterates over all samples in timestamp order. At equal timestamps the
    /// float comes first.
    pub fn iter(&self) -> SeriesDataIter<'_> {
        SeriesDataIter {
            floats: &self.floats,
            histograms: &self.histograms,
            float_idx: 0,
            hist_idx: 0,
        }
    }

    pub fn release(self) {
        drop(self)
    }
}

/// One sample yielded by [`SeriesDataIter`]: the timestamp, the float value
/// (zero for histogram samples) and the histogram, if any.
pub type SamplePoint<'a> = (Timestamp, f64, Option<&'a FloatHistogram>);

pub struct SeriesDataIter<'a> {
    floats: &'a [FPoint],
    histograms: &'a [HPoint],
    float_idx: usize,
    hist_idx: usize,
}

impl<'a> Iterator for SeriesDataIter<'a> {
    type Item = SamplePoint<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let float = self.floats.get(self.float_idx);
        let hist = self.histograms.get(self.hist_idx);
        match (float, hist) {
            (Some(f), Some(h)) if f.t <= h.t => {
                self.float_idx += 1;
                Some((f.t, f.f, None))
            }
            (_, Some(h)) => {
                self.hist_idx += 1;
                Some((h.t, 0.0, Some(&h.h)))
            }
            (Some(f), None) => {
                self.float_idx += 1;
                Some((f.t, f.f, None))
            }
            (None, None) => None,
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining =
            (self.floats.len() - self.float_idx) + (self.histograms.len() - self.hist_idx);
        (remaining, Some(remaining))
    }
}

impl FusedIterator for SeriesDataIter<'_> {}

impl ExactSizeIterator for SeriesDataIter<'_> {}

/// A scalar: exactly one sample per step.
#[derive(Debug, Default, PartialEq)]
pub struct ScalarData {
    pub samples: PooledVec<FPoint>,
}

impl ScalarData {
    pub fn new(samples: PooledVec<FPoint>) -> Self {
        Self { samples }
    }

    #[inline]
    pub fn value_at(&self, step: usize) -> Option<f64> {
        self.samples.get(step).map(|p| p.f)
    }
}

/// The raw samples of one series covering the query window widened by the
/// range. Windows are half open: `(t - range_ms, t]`.
#[derive(Debug, Default, PartialEq)]
pub struct RangeVectorSeriesData {
    pub floats: PooledVec<FPoint>,
    pub histograms: PooledVec<HPoint>,
    pub range_ms: i64,
}

impl RangeVectorSeriesData {
    pub fn float_window(&self, t: Timestamp) -> &[FPoint] {
        let lo = self.floats.partition_point(|p| p.t <= t - self.range_ms);
        let hi = self.floats.partition_point(|p| p.t <= t);
        &self.floats[lo..hi]
    }

    pub fn histogram_window(&self, t: Timestamp) -> &[HPoint] {
        let lo = self.histograms.partition_point(|p| p.t <= t - self.range_ms);
        let hi = self.histograms.partition_point(|p| p.t <= t);
        &self.histograms[lo..hi]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_pool::MemoryPool;

    fn series(pool: &MemoryPool, floats: &[(i64, f64)], hist_ts: &[i64]) -> InstantVectorSeriesData {
        let mut f = pool.fpoints().acquire(floats.len()).unwrap();
        for (t, v) in floats {
            f.push(FPoint::new(*t, *v)).unwrap();
        }
        let mut h = pool.hpoints().acquire(hist_ts.len()).unwrap();
        for t in hist_ts {
            h.push(HPoint::new(*t, FloatHistogram::new(0))).unwrap();
        }
        InstantVectorSeriesData::new(f, h)
    }

    #[test]
    fn iter_merges_by_timestamp() {
        let pool = MemoryPool::unlimited();
        let data = series(&pool, &[(0, 1.0), (20, 3.0), (30, 4.0)], &[10, 30, 40]);
        let got: Vec<(i64, bool)> = data.iter().map(|(t, _, h)| (t, h.is_some())).collect();
        assert_eq!(
            got,
            vec![
                (0, false),
                (10, true),
                (20, false),
                (30, false),
                (30, true),
                (40, true)
            ]
        );
    }

    #[test]
    fn iter_stays_exhausted() {
        let pool = MemoryPool::unlimited();
        let data = series(&pool, &[(0, 1.0)], &[]);
        let mut iter = data.iter();
        assert_eq!(iter.len(), 1);
        assert!(iter.next().is_some());
        assert!(iter.next().is_none());
        assert!(iter.next().is_none());
    }

    #[test]
    fn releasing_series_data_returns_buffers() {
        let pool = MemoryPool::unlimited();
        let data = series(&pool, &[(0, 1.0), (10, 2.0)], &[20]);
        assert!(pool.tracker().current_bytes() > 0);
        data.release();
        assert!(pool.tracker().is_balanced());
    }

    #[test]
    fn poisoned_slot_survives_take() {
        let mut slot = HistogramSlot::Poisoned;
        assert_eq!(slot.take(), None);
        assert!(slot.is_poisoned());

        let mut slot = HistogramSlot::Present(FloatHistogram::new(1));
        assert_eq!(slot.take(), Some(FloatHistogram::new(1)));
        assert!(slot.is_absent());
    }

    #[test]
    fn range_windows_are_left_open() {
        let pool = MemoryPool::unlimited();
        let mut floats = pool.fpoints().acquire(4).unwrap();
        for t in [0, 10, 20, 30] {
            floats.push(FPoint::new(t, t as f64)).unwrap();
        }
        let data = RangeVectorSeriesData {
            floats,
            histograms: PooledVec::default(),
            range_ms: 20,
        };
        let window: Vec<i64> = data.float_window(30).iter().map(|p| p.t).collect();
        assert_eq!(window, vec![20, 30]);
        assert!(data.histogram_window(30).is_empty());
    }
}
