pub use matcher::*;
pub use memory_provider::MemorySeriesSource;

mod matcher;
mod memory_provider;

use crate::runtime_error::RuntimeResult;
use crate::types::{FPoint, HPoint, Labels, Timestamp};

/// The raw samples of one stored series, sorted by timestamp.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawSeries {
    pub labels: Labels,
    pub floats: Vec<FPoint>,
    pub histograms: Vec<HPoint>,
}

impl RawSeries {
    pub fn is_empty(&self) -> bool {
        self.floats.is_empty() && self.histograms.is_empty()
    }
}

/// The storage layer as seen by the leaf operators.
pub trait SeriesSource: Send + Sync {
    /// Returns every series matching all `matchers`, restricted to samples with
    /// timestamps in `[mint, maxt]`. Series without samples in that range are
    /// left out. The result order must be stable between calls.
    fn select(
        &self,
        matchers: &[LabelMatcher],
        mint: Timestamp,
        maxt: Timestamp,
    ) -> RuntimeResult<Vec<RawSeries>>;
}
