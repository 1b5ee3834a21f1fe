// Copyright © 2024 Andrea Corbellini and contributors
// SPDX-License-Identifier: BSD-3-Clause

use crate::error::AllocError;
use crate::error::SetupError;
use crate::granularity::Granularity;
use crate::snapshot::Snapshot;
use crate::strategy::Strategy;
use crate::usage::Usage;
use crate::SegmentAllocator;
use spin::Mutex;

/// A [`SegmentAllocator`] behind a spin lock.
///
/// Splits and merges rewrite neighbour links, so every operation holds the lock over the whole
/// ledger for its entire duration. Methods take `&self`, which allows sharing the allocator
/// between threads (for example through an `Arc` or a `static`).
///
/// # Examples
///
/// ```
/// use segalloc::Bytes;
/// use segalloc::LockedAllocator;
/// use segalloc::Strategy;
///
/// let allocator = LockedAllocator::<Bytes>::new(256, Strategy::FirstFit).unwrap();
///
/// std::thread::scope(|scope| {
///     for _ in 0..4 {
///         scope.spawn(|| allocator.allocate(64).unwrap());
///     }
/// });
///
/// assert_eq!(allocator.usage().free, 0);
/// ```
#[derive(Debug)]
pub struct LockedAllocator<G: Granularity> {
    inner: Mutex<SegmentAllocator<G>>,
}

impl<G: Granularity> LockedAllocator<G> {
    /// See [`SegmentAllocator::new`].
    ///
    /// # Errors
    ///
    /// Same as [`SegmentAllocator::new`].
    pub fn new(capacity: usize, strategy: Strategy) -> Result<Self, SetupError> {
        SegmentAllocator::new(capacity, strategy).map(Self::from)
    }

    /// See [`SegmentAllocator::allocate`].
    ///
    /// # Errors
    ///
    /// Same as [`SegmentAllocator::allocate`].
    #[inline]
    pub fn allocate(&self, size: usize) -> Result<usize, AllocError> {
        self.inner.lock().allocate(size)
    }

    /// See [`SegmentAllocator::allocate_with`].
    ///
    /// # Errors
    ///
    /// Same as [`SegmentAllocator::allocate_with`].
    #[inline]
    pub fn allocate_with(&self, strategy: Strategy, size: usize) -> Result<usize, AllocError> {
        self.inner.lock().allocate_with(strategy, size)
    }

    /// See [`SegmentAllocator::free`].
    ///
    /// # Errors
    ///
    /// Same as [`SegmentAllocator::free`].
    #[inline]
    pub fn free(&self, address: usize) -> Result<usize, AllocError> {
        self.inner.lock().free(address)
    }

    /// See [`SegmentAllocator::fragmentation`].
    #[inline]
    #[must_use]
    pub fn fragmentation(&self) -> f64 {
        self.inner.lock().fragmentation()
    }

    /// See [`SegmentAllocator::usage`].
    #[inline]
    #[must_use]
    pub fn usage(&self) -> Usage {
        self.inner.lock().usage()
    }

    /// See [`SegmentAllocator::snapshot`].
    #[inline]
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        self.inner.lock().snapshot()
    }

    /// Runs `f` with exclusive access to the allocator, for sequences of operations that must
    /// not interleave with other threads.
    pub fn with<T>(&self, f: impl FnOnce(&mut SegmentAllocator<G>) -> T) -> T {
        f(&mut self.inner.lock())
    }

    /// Consumes the lock and returns the allocator.
    #[must_use]
    pub fn into_inner(self) -> SegmentAllocator<G> {
        self.inner.into_inner()
    }
}

impl<G: Granularity> From<SegmentAllocator<G>> for LockedAllocator<G> {
    #[inline]
    fn from(allocator: SegmentAllocator<G>) -> Self {
        Self {
            inner: Mutex::new(allocator),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::granularity::Blocks;
    use crate::granularity::Bytes;

    #[test]
    fn threads_share_the_ledger() {
        let allocator = LockedAllocator::<Blocks<16>>::new(16 * 64, Strategy::NextFit).unwrap();

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for _ in 0..50 {
                        if let Ok(address) = allocator.allocate(16) {
                            allocator.free(address).unwrap();
                        }
                    }
                });
            }
        });

        let allocator = allocator.into_inner();
        allocator.ledger.assert_integrity();
        allocator.ledger.assert_coalesced();
        assert_eq!(allocator.usage().used, 0);
    }

    #[test]
    fn with_runs_exclusively() {
        let allocator = LockedAllocator::<Bytes>::new(100, Strategy::FirstFit).unwrap();
        let (a, b) = allocator.with(|inner| (inner.allocate(10), inner.allocate(10)));
        assert_eq!((a, b), (Ok(0), Ok(10)));
        assert_eq!(allocator.free(10), Ok(10));
        assert_eq!(allocator.free(10), Err(AllocError::InvalidFree { address: 10 }));
        assert_eq!(allocator.snapshot().segments().len(), 2);
    }
}
