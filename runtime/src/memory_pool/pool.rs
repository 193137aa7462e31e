use std::fmt;
use std::marker::PhantomData;
use std::mem::size_of;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, OnceLock};

use byte_pool::{Block, BytePool};

use crate::memory_pool::tracker::{BufferKind, MemoryConsumptionTracker};
use crate::runtime_error::{RuntimeError, RuntimeResult};
use crate::types::{FPoint, HPoint, HistogramSlot};

/// An element type with a process-wide free list of `Vec<Self>` blocks.
///
/// The free lists are shared by every query. What a query holds is charged to
/// its own [`MemoryConsumptionTracker`] by [`LimitedPool`].
pub trait PoolElement: Default + Clone + Send + 'static {
    fn byte_pool() -> &'static BytePool<Vec<Self>>;
}

macro_rules! pool_element {
    ($t:ty, $pool:ident) => {
        static $pool: OnceLock<BytePool<Vec<$t>>> = OnceLock::new();

        impl PoolElement for $t {
            fn byte_pool() -> &'static BytePool<Vec<$t>> {
                $pool.get_or_init(BytePool::new)
            }
        }
    };
}

pool_element!(f64, F64_POOL);
pool_element!(bool, BOOL_POOL);
pool_element!(HistogramSlot, HISTOGRAM_SLOT_POOL);
pool_element!(FPoint, FPOINT_POOL);
pool_element!(HPoint, HPOINT_POOL);

/// Bytes charged for a buffer of `capacity` elements, or None on overflow.
#[inline]
fn footprint<T>(capacity: usize) -> Option<u64> {
    capacity
        .checked_mul(size_of::<T>().max(1))
        .and_then(|bytes| u64::try_from(bytes).ok())
}

/// Takes an empty block able to hold `capacity` elements.
fn take<T: PoolElement>(capacity: usize) -> Block<'static, Vec<T>> {
    let mut block = T::byte_pool().alloc(capacity);
    block.clear();
    block.reserve(capacity);
    block
}

/// A per-query view onto the free list of `T`, charging every buffer it hands
/// out to a shared [`MemoryConsumptionTracker`].
pub struct LimitedPool<T> {
    kind: BufferKind,
    tracker: Arc<MemoryConsumptionTracker>,
    _element: PhantomData<fn() -> T>,
}

impl<T> Clone for LimitedPool<T> {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            tracker: Arc::clone(&self.tracker),
            _element: PhantomData,
        }
    }
}

impl<T: PoolElement> LimitedPool<T> {
    pub fn new(kind: BufferKind, tracker: Arc<MemoryConsumptionTracker>) -> Self {
        Self {
            kind,
            tracker,
            _element: PhantomData,
        }
    }

    pub fn kind(&self) -> BufferKind {
        self.kind
    }

    /// Returns an empty buffer able to hold at least `size` elements. The
    /// capacity is rounded up to a power of two and charged in full.
    pub fn acquire(&self, size: usize) -> RuntimeResult<PooledVec<T>> {
        if size == 0 {
            return Ok(PooledVec::default());
        }
        let Some((capacity, bytes)) = size
            .checked_next_power_of_two()
            .and_then(|capacity| Some((capacity, footprint::<T>(capacity)?)))
        else {
            return Err(self
                .tracker
                .reject(u64::MAX, self.tracker.current_bytes(), self.kind));
        };
        self.tracker.try_increase(bytes, self.kind)?;
        Ok(PooledVec {
            block: Some(take::<T>(capacity)),
            capacity,
            charge: Some(Charge {
                tracker: Arc::clone(&self.tracker),
                kind: self.kind,
                bytes,
            }),
        })
    }

    /// Returns a buffer of exactly `size` elements, each set to `T::default()`.
    pub fn acquire_filled(&self, size: usize) -> RuntimeResult<PooledVec<T>> {
        let mut result = self.acquire(size)?;
        if let Some(block) = result.block.as_mut() {
            block.resize_with(size, T::default);
        }
        Ok(result)
    }
}

struct Charge {
    tracker: Arc<MemoryConsumptionTracker>,
    kind: BufferKind,
    bytes: u64,
}

impl Charge {
    fn settle(self) {
        self.tracker.decrease(self.bytes, self.kind);
    }
}

/// A buffer on loan from a [`LimitedPool`].
///
/// Dropping it (or calling [`PooledVec::release`]) returns the block to the
/// free list and its footprint to the tracker. Both happen exactly once.
/// The length never exceeds the acquired capacity.
pub struct PooledVec<T: PoolElement> {
    block: Option<Block<'static, Vec<T>>>,
    capacity: usize,
    charge: Option<Charge>,
}

impl<T: PoolElement> Default for PooledVec<T> {
    fn default() -> Self {
        Self {
            block: None,
            capacity: 0,
            charge: None,
        }
    }
}

impl<T: PoolElement> PooledVec<T> {
    /// The number of elements the buffer was acquired for.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Appends `value`. Fails instead of growing past the accounted capacity.
    pub fn push(&mut self, value: T) -> RuntimeResult<()> {
        match self.block.as_mut() {
            Some(block) if block.len() < self.capacity => {
                block.push(value);
                Ok(())
            }
            _ => Err(RuntimeError::execution(format!(
                "pooled buffer is full at its accounted capacity of {}",
                self.capacity
            ))),
        }
    }

    pub fn clear(&mut self) {
        if let Some(block) = self.block.as_mut() {
            block.clear();
        }
    }

    pub fn truncate(&mut self, len: usize) {
        if let Some(block) = self.block.as_mut() {
            block.truncate(len);
        }
    }

    pub fn retain<F: FnMut(&T) -> bool>(&mut self, f: F) {
        if let Some(block) = self.block.as_mut() {
            block.retain(f);
        }
    }

    pub fn release(self) {
        drop(self)
    }

    /// Moves the contents out of the pool. The footprint is returned to the
    /// tracker now and the emptied block goes back on the free list.
    pub fn into_vec(mut self) -> Vec<T> {
        self.block
            .as_mut()
            .map(|block| block.drain(..).collect())
            .unwrap_or_default()
    }
}

impl<T: PoolElement> Drop for PooledVec<T> {
    fn drop(&mut self) {
        if let Some(mut block) = self.block.take() {
            // blocks are handed out again by length
            block.clear();
            block.resize_with(self.capacity, T::default);
        }
        if let Some(charge) = self.charge.take() {
            charge.settle();
        }
    }
}

impl<T: PoolElement> Deref for PooledVec<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        match self.block.as_deref() {
            Some(block) => block.as_slice(),
            None => &[],
        }
    }
}

impl<T: PoolElement> DerefMut for PooledVec<T> {
    fn deref_mut(&mut self) -> &mut [T] {
        match self.block.as_deref_mut() {
            Some(block) => block.as_mut_slice(),
            None => &mut [],
        }
    }
}

impl<T: PoolElement + fmt::Debug> fmt::Debug for PooledVec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<T: PoolElement + PartialEq> PartialEq for PooledVec<T> {
    fn eq(&self, other: &Self) -> bool {
        self[..] == other[..]
    }
}
