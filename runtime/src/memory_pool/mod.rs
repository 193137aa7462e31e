use std::fmt;
use std::sync::Arc;

pub use pool::*;
pub use tracker::*;

use crate::types::{FPoint, HPoint, HistogramSlot};

mod pool;
mod tracker;

/// Per-query handle onto the typed buffer pools.
///
/// Cloning is cheap; all clones charge the same tracker.
#[derive(Clone)]
pub struct MemoryPool {
    tracker: Arc<MemoryConsumptionTracker>,
    floats: LimitedPool<f64>,
    bools: LimitedPool<bool>,
    histogram_slots: LimitedPool<HistogramSlot>,
    fpoints: LimitedPool<FPoint>,
    hpoints: LimitedPool<HPoint>,
}

impl MemoryPool {
    /// A pool refusing allocations past `max_bytes`. Zero means unlimited.
    pub fn new(max_bytes: u64) -> Self {
        let tracker = Arc::new(MemoryConsumptionTracker::new(max_bytes));
        Self {
            floats: LimitedPool::new(BufferKind::Float, Arc::clone(&tracker)),
            bools: LimitedPool::new(BufferKind::Bool, Arc::clone(&tracker)),
            histogram_slots: LimitedPool::new(BufferKind::HistogramSlot, Arc::clone(&tracker)),
            fpoints: LimitedPool::new(BufferKind::FPoint, Arc::clone(&tracker)),
            hpoints: LimitedPool::new(BufferKind::HPoint, Arc::clone(&tracker)),
            tracker,
        }
    }

    pub fn unlimited() -> Self {
        Self::new(0)
    }

    pub fn tracker(&self) -> &MemoryConsumptionTracker {
        &self.tracker
    }

    pub fn floats(&self) -> &LimitedPool<f64> {
        &self.floats
    }

    pub fn bools(&self) -> &LimitedPool<bool> {
        &self.bools
    }

    pub fn histogram_slots(&self) -> &LimitedPool<HistogramSlot> {
        &self.histogram_slots
    }

    pub fn fpoints(&self) -> &LimitedPool<FPoint> {
        &self.fpoints
    }

    pub fn hpoints(&self) -> &LimitedPool<HPoint> {
        &self.hpoints
    }
}

impl Default for MemoryPool {
    fn default() -> Self {
        Self::unlimited()
    }
}

impl fmt::Debug for MemoryPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryPool")
            .field("max_bytes", &self.tracker.max_bytes())
            .field("current_bytes", &self.tracker.current_bytes())
            .field("peak_bytes", &self.tracker.peak_bytes())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pools_share_one_tracker() {
        let pool = MemoryPool::new(0);
        let floats = pool.floats().acquire(4).unwrap();
        let bools = pool.bools().acquire(4).unwrap();
        assert_eq!(pool.tracker().current_bytes(), 4 * 8 + 4);
        assert_eq!(pool.tracker().acquired_bytes(BufferKind::Bool), 4);

        let clone = pool.clone();
        drop(floats);
        drop(bools);
        assert_eq!(clone.tracker().current_bytes(), 0);
        assert!(clone.tracker().is_balanced());
    }
}
