use crate::runtime_error::{RuntimeError, RuntimeResult};
use crate::types::Timestamp;

/// The evenly spaced evaluation timestamps of a query: `start + i * interval`
/// for `i` in `0..step_count`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryTimeRange {
    pub start: Timestamp,
    /// Timestamp of the last step. Always on the grid.
    pub end: Timestamp,
    pub interval: i64,
    pub step_count: usize,
}

impl QueryTimeRange {
    pub fn new(start: Timestamp, end: Timestamp, interval: i64) -> RuntimeResult<Self> {
        if interval <= 0 {
            return Err(RuntimeError::ArgumentError(format!(
                "query interval must be positive, got {interval}"
            )));
        }
        if end < start {
            return Err(RuntimeError::ArgumentError(format!(
                "query end {end} is before start {start}"
            )));
        }
        let span = end.checked_sub(start).ok_or_else(|| {
            RuntimeError::ArgumentError(format!(
                "query range from {start} to {end} is too large"
            ))
        })?;
        let step_count = usize::try_from(span / interval)
            .ok()
            .and_then(|n| n.checked_add(1))
            .ok_or_else(|| {
                RuntimeError::ArgumentError(format!(
                    "query range from {start} to {end} has too many steps"
                ))
            })?;
        Ok(Self {
            start,
            end: start + (step_count as i64 - 1) * interval,
            interval,
            step_count,
        })
    }

    /// A single evaluation at `t`.
    pub fn instant(t: Timestamp) -> Self {
        Self {
            start: t,
            end: t,
            interval: 1,
            step_count: 1,
        }
    }

    #[inline]
    pub fn step_timestamp(&self, idx: usize) -> Timestamp {
        self.start + idx as i64 * self.interval
    }

    pub fn point_index(&self, t: Timestamp) -> RuntimeResult<usize> {
        step_index(t, self.start, self.interval, self.step_count)
    }

    pub fn timestamps(&self) -> impl Iterator<Item = Timestamp> + '_ {
        (0..self.step_count).map(|i| self.step_timestamp(i))
    }
}

/// Position of `t` on the step grid. Fails for timestamps off the grid or
/// outside it.
#[inline]
pub fn step_index(t: Timestamp, start: Timestamp, interval: i64, steps: usize) -> RuntimeResult<usize> {
    let off_grid = || {
        RuntimeError::execution(format!(
            "sample timestamp {t} is not on the step grid starting at {start} with interval {interval}"
        ))
    };
    let offset = t.checked_sub(start).ok_or_else(off_grid)?;
    if offset < 0 || offset % interval != 0 || (offset / interval) as usize >= steps {
        return Err(off_grid());
    }
    Ok((offset / interval) as usize)
}
