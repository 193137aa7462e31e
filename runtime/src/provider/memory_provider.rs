use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use crate::provider::{LabelMatcher, RawSeries, SeriesSource};
use crate::runtime_error::RuntimeResult;
use crate::types::{FPoint, FloatHistogram, HPoint, Labels, Timestamp};

/// In-memory implementation of SeriesSource, primarily for testing
#[derive(Default, Debug)]
pub struct MemorySeriesSource {
    inner: RwLock<Storage>,
}

#[derive(Default, Debug)]
struct Storage {
    series: BTreeMap<Labels, StoredSeries>,
}

#[derive(Default, Debug)]
struct StoredSeries {
    floats: Vec<FPoint>,
    histograms: Vec<HPoint>,
}

/// Inserts keeping `points` sorted by timestamp. A sample at an existing
/// timestamp replaces the old one.
fn insert_sorted<P>(points: &mut Vec<P>, point: P, ts: impl Fn(&P) -> Timestamp) {
    let t = ts(&point);
    match points.last() {
        Some(last) if ts(last) < t => points.push(point),
        None => points.push(point),
        _ => match points.binary_search_by_key(&t, |p| ts(p)) {
            Ok(idx) => points[idx] = point,
            Err(idx) => points.insert(idx, point),
        },
    }
}

fn in_range<P>(points: &[P], mint: Timestamp, maxt: Timestamp, ts: impl Fn(&P) -> Timestamp) -> &[P] {
    let lo = points.partition_point(|p| ts(p) < mint);
    let hi = points.partition_point(|p| ts(p) <= maxt);
    &points[lo..hi.max(lo)]
}

impl MemorySeriesSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append_float(&self, labels: &Labels, t: Timestamp, v: f64) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let series = inner.series.entry(labels.clone()).or_default();
        insert_sorted(&mut series.floats, FPoint::new(t, v), |p| p.t);
    }

    pub fn append_histogram(&self, labels: &Labels, t: Timestamp, h: FloatHistogram) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let series = inner.series.entry(labels.clone()).or_default();
        insert_sorted(&mut series.histograms, HPoint::new(t, h), |p| p.t);
    }

    /// Adds float samples given as `(timestamp, value)` pairs.
    pub fn add_series(&self, labels: &Labels, samples: impl IntoIterator<Item = (Timestamp, f64)>) {
        for (t, v) in samples {
            self.append_float(labels, t, v);
        }
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .series
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .series
            .clear();
    }
}

impl SeriesSource for MemorySeriesSource {
    fn select(
        &self,
        matchers: &[LabelMatcher],
        mint: Timestamp,
        maxt: Timestamp,
    ) -> RuntimeResult<Vec<RawSeries>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let result = inner
            .series
            .iter()
            .filter(|(labels, _)| matchers.iter().all(|m| m.matches_labels(labels)))
            .map(|(labels, stored)| RawSeries {
                labels: labels.clone(),
                floats: in_range(&stored.floats, mint, maxt, |p| p.t).to_vec(),
                histograms: in_range(&stored.histograms, mint, maxt, |p| p.t).to_vec(),
            })
            .filter(|series| !series.is_empty())
            .collect();
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::provider::MatchOp;

    fn labels(job: &str) -> Labels {
        Labels::from_pairs([("__name__", "up"), ("job", job)])
    }

    #[test]
    fn select_applies_matchers_and_range() {
        let source = MemorySeriesSource::new();
        source.add_series(&labels("api"), [(30, 3.0), (10, 1.0), (20, 2.0)]);
        source.add_series(&labels("db"), [(10, 5.0)]);

        let matchers = vec![
            LabelMatcher::equal("__name__", "up"),
            LabelMatcher::new(MatchOp::RegexEqual, "job", "a.*").unwrap(),
        ];
        let got = source.select(&matchers, 15, 30).unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].labels, labels("api"));
        assert_eq!(got[0].floats, vec![FPoint::new(20, 2.0), FPoint::new(30, 3.0)]);
    }

    #[test]
    fn series_without_samples_in_range_are_skipped() {
        let source = MemorySeriesSource::new();
        source.add_series(&labels("api"), [(10, 1.0)]);
        assert!(source.select(&[], 20, 30).unwrap().is_empty());
    }

    #[test]
    fn duplicate_timestamp_replaces_sample() {
        let source = MemorySeriesSource::new();
        source.add_series(&labels("api"), [(10, 1.0), (10, 2.0)]);
        let got = source.select(&[], 0, 100).unwrap();
        assert_eq!(got[0].floats, vec![FPoint::new(10, 2.0)]);
    }
}
