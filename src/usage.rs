// Copyright © 2024 Andrea Corbellini and contributors
// SPDX-License-Identifier: BSD-3-Clause

use crate::granularity::Granularity;
use crate::ledger::Ledger;

/// Memory usage information.
///
/// This structure is returned by [`SegmentAllocator::usage`](crate::SegmentAllocator::usage).
/// All sizes are in bytes.
#[derive(Default, Clone, PartialEq, Eq, Debug)]
pub struct Usage {
    /// Bytes managed by the allocator.
    ///
    /// For block granularities this is the capacity rounded down to a whole number of blocks.
    /// Segment bookkeeping is kept outside of the backing store, so `total == used + free`.
    pub total: usize,
    /// Bytes held by used segments, including the rounding of requests up to whole blocks.
    pub used: usize,
    /// Bytes held by free segments.
    pub free: usize,
    /// Size of the largest free segment, in bytes. This is the largest request that can
    /// currently succeed with any strategy.
    pub largest_free: usize,
    /// Number of used segments.
    pub objects: usize,
    /// Number of segments, used and free.
    pub segments: usize,
}

impl Usage {
    pub(crate) fn get<G: Granularity>(ledger: &Ledger<G>) -> Self {
        let quantum = G::quantum();
        let mut usage = Self {
            total: ledger.units() * quantum,
            segments: ledger.len(),
            ..Self::default()
        };

        for segment in ledger.iter() {
            let bytes = segment.size() * quantum;
            if segment.is_used() {
                usage.used += bytes;
                usage.objects += 1;
            } else {
                usage.free += bytes;
                usage.largest_free = usage.largest_free.max(bytes);
            }
        }

        usage
    }

    /// External fragmentation, as a percentage in `0.0..=100.0`.
    ///
    /// This is the share of free memory that lies outside of the largest free segment:
    /// `(free - largest_free) / free * 100`. It is `0.0` both when there is no free memory and
    /// when all the free memory is one contiguous segment.
    ///
    /// # Examples
    ///
    /// ```
    /// use segalloc::ByteAllocator;
    /// use segalloc::Strategy;
    ///
    /// let mut allocator = ByteAllocator::with_chunks(&[40, 40], Strategy::FirstFit).unwrap();
    /// assert_eq!(allocator.usage().fragmentation(), 50.0);
    ///
    /// allocator.allocate(40).unwrap();
    /// assert_eq!(allocator.usage().fragmentation(), 0.0);
    /// ```
    #[must_use]
    pub fn fragmentation(&self) -> f64 {
        fragmentation(self.free, self.largest_free)
    }
}

/// Computes `(total_free - max_free) / total_free * 100`, defined as `0.0` when there is no free
/// space or when all of it is in one piece.
#[must_use]
pub(crate) fn fragmentation(total_free: usize, max_free: usize) -> f64 {
    debug_assert!(max_free <= total_free, "largest free segment exceeds total");
    if total_free == 0 || total_free == max_free {
        return 0.0;
    }
    (total_free - max_free) as f64 / total_free as f64 * 100.0
}
