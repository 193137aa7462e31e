use std::sync::atomic::{AtomicU64, Ordering};

use strum::{Display, IntoStaticStr};
use tracing::warn;

use crate::runtime_error::{RuntimeError, RuntimeResult};

pub(crate) const BUFFER_KIND_COUNT: usize = 5;

/// The element type of a pooled buffer. Used to break consumption down per pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum BufferKind {
    Float,
    Bool,
    HistogramSlot,
    FPoint,
    HPoint,
}

impl BufferKind {
    pub const ALL: [BufferKind; BUFFER_KIND_COUNT] = [
        BufferKind::Float,
        BufferKind::Bool,
        BufferKind::HistogramSlot,
        BufferKind::FPoint,
        BufferKind::HPoint,
    ];

    #[inline]
    fn index(self) -> usize {
        self as usize
    }
}

/// Tracks the bytes held in pooled buffers by one query and enforces its ceiling.
///
/// Shared by every operator of a query tree. All counters are atomics, so the
/// tracker can be read from anywhere while operators update it.
#[derive(Debug, Default)]
pub struct MemoryConsumptionTracker {
    /// Zero means unlimited.
    max_bytes: u64,
    current: AtomicU64,
    peak: AtomicU64,
    acquired: [AtomicU64; BUFFER_KIND_COUNT],
    released: [AtomicU64; BUFFER_KIND_COUNT],
}

impl MemoryConsumptionTracker {
    pub fn new(max_bytes: u64) -> Self {
        Self {
            max_bytes,
            ..Default::default()
        }
    }

    /// Records `bytes` of new consumption. Fails, leaving every counter untouched,
    /// when the ceiling would be exceeded.
    pub fn try_increase(&self, bytes: u64, kind: BufferKind) -> RuntimeResult<()> {
        let mut current = self.current.load(Ordering::Relaxed);
        let next = loop {
            let next = current.saturating_add(bytes);
            if self.max_bytes > 0 && next > self.max_bytes {
                return Err(self.reject(bytes, current, kind));
            }
            match self.current.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => break next,
                Err(observed) => current = observed,
            }
        };
        self.peak.fetch_max(next, Ordering::Relaxed);
        self.acquired[kind.index()].fetch_add(bytes, Ordering::Relaxed);
        Ok(())
    }

    /// The error returned when `requested` bytes do not fit next to `current`.
    pub(crate) fn reject(&self, requested: u64, current: u64, kind: BufferKind) -> RuntimeError {
        warn!(
            requested,
            limit = self.max_bytes,
            current,
            kind = %kind,
            "query memory limit reached"
        );
        RuntimeError::ResourceExhausted {
            requested,
            limit: self.max_bytes,
            current,
        }
    }

    pub fn decrease(&self, bytes: u64, kind: BufferKind) {
        let prev = self.current.fetch_sub(bytes, Ordering::AcqRel);
        debug_assert!(
            prev >= bytes,
            "released {bytes} bytes of {kind} but only {prev} bytes are tracked"
        );
        self.released[kind.index()].fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    pub fn current_bytes(&self) -> u64 {
        self.current.load(Ordering::Relaxed)
    }

    pub fn peak_bytes(&self) -> u64 {
        self.peak.load(Ordering::Relaxed)
    }

    /// Total bytes ever acquired from the pool of `kind`.
    pub fn acquired_bytes(&self, kind: BufferKind) -> u64 {
        self.acquired[kind.index()].load(Ordering::Relaxed)
    }

    /// Total bytes ever returned to the pool of `kind`.
    pub fn released_bytes(&self, kind: BufferKind) -> u64 {
        self.released[kind.index()].load(Ordering::Relaxed)
    }

    /// True when every pool has been given back everything taken from it.
    pub fn is_balanced(&self) -> bool {
        self.current_bytes() == 0
            && BufferKind::ALL
                .iter()
                .all(|kind| self.acquired_bytes(*kind) == self.released_bytes(*kind))
    }
}
