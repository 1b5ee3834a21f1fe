// Copyright © 2024 Andrea Corbellini and contributors
// SPDX-License-Identifier: BSD-3-Clause

//! Segalloc: a segment-based memory allocator simulator.
//!
//! Segalloc manages a fixed-size backing buffer as an ordered, doubly-linked chain of segments.
//! Every segment is either free or used, and together the segments always cover the whole buffer
//! with no gaps and no overlaps. Allocation requests are served by one of several placement
//! strategies, which pick a free segment and split it; frees merge the released segment with its
//! free neighbours.
//!
//! The allocator only tracks byte extents: it hands out offsets into its own buffer, and the bytes
//! behind an allocation can be read and written through [`SegmentAllocator::data`] and
//! [`SegmentAllocator::data_mut`]. It does not obtain memory from the operating system and is not
//! meant to back real Rust objects.
//!
//! # Quick start & examples
//!
//! ```
//! use segalloc::ByteAllocator;
//! use segalloc::Strategy;
//!
//! let mut allocator = ByteAllocator::new(1024, Strategy::FirstFit).unwrap();
//!
//! let a = allocator.allocate(128).unwrap();
//! let b = allocator.allocate(256).unwrap();
//! assert_eq!((a, b), (0, 128));
//!
//! allocator.data_mut(b).unwrap()[..5].copy_from_slice(b"hello");
//!
//! allocator.free(a).unwrap();
//! assert!(allocator.free(a).is_err());
//!
//! // 128 free bytes before `b`, 640 after it
//! assert_eq!(allocator.fragmentation(), 128.0 / 768.0 * 100.0);
//! ```
//!
//! ## Granularity
//!
//! There are 2 variants of the allocator to choose from:
//!
//! * [`ByteAllocator`] counts in bytes: a request for `n` bytes consumes exactly `n` bytes.
//! * [`BlockAllocator16`] counts in blocks of 16 bytes: a request for `n` bytes is rounded up to
//!   `ceil(n / 16)` blocks. Any other block size is available as
//!   [`SegmentAllocator<Blocks<N>>`](Blocks).
//!
//! Byte segments record their own start address. Block segments do not: their addresses are
//! derived from the running block count while the ledger is scanned.
//!
//! ## Placement strategies
//!
//! | [`Strategy`]           | Picks                                                          |
//! |------------------------|----------------------------------------------------------------|
//! | [`Strategy::FirstFit`] | the first free segment large enough, scanning from the start   |
//! | [`Strategy::NextFit`]  | the first free segment large enough, scanning from the segment of the last next-fit allocation and wrapping around |
//! | [`Strategy::BestFit`]  | the smallest free segment large enough                         |
//! | [`Strategy::WorstFit`] | the largest free segment                                       |
//!
//! Ties always go to the segment found first. The strategy is chosen at construction time and may
//! be changed with [`SegmentAllocator::set_strategy`] or overridden for a single request with
//! [`SegmentAllocator::allocate_with`].
//!
//! ## Pre-sized chunks
//!
//! Instead of one free segment spanning the whole buffer, the ledger can be initialized with a
//! list of free chunks laid out back to back:
//!
//! ```
//! use segalloc::ByteAllocator;
//! use segalloc::Strategy;
//!
//! let mut allocator = ByteAllocator::with_chunks(&[50, 120, 30], Strategy::BestFit).unwrap();
//! assert_eq!(allocator.allocate(25), Ok(170));
//! assert_eq!(allocator.allocate(40), Ok(0));
//! ```
//!
//! Chunks stay separate until a free next to them merges them.
//!
//! # Errors
//!
//! Failed requests return an [`AllocError`] and leave the allocator untouched:
//!
//! * [`AllocError::NoSpace`]: no free segment is large enough;
//! * [`AllocError::InvalidFree`]: the address is not the start of a used segment (this includes
//!   double frees);
//! * [`AllocError::ZeroSizeRequest`]: zero-sized requests are always rejected.
//!
//! # Internal details
//!
//! Segment nodes are stored in a vector of slots and linked by slot index. Slots freed by merges
//! are reused by later splits. The next-fit cursor is a slot index plus the offset of that slot,
//! and is moved to the surviving segment whenever a merge destroys the node it points to.
//!
//! The allocator is single-threaded and mutated through `&mut self`. [`LockedAllocator`] wraps it
//! in a spin lock for callers that need to share it.
//!
//! Allocation decisions, splits and merges are reported through the [`log`] facade at the `debug`
//! and `trace` levels.
//!
//! # Cargo feature flags
//!
//! * `cli` (default): builds the `segalloc` command-line driver.

#![warn(clippy::dbg_macro)]
#![warn(clippy::print_stderr)]
#![warn(clippy::print_stdout)]
#![warn(missing_debug_implementations)]
#![warn(missing_docs)]
#![warn(unreachable_pub)]
#![warn(unused_macro_rules)]
#![warn(unused_qualifications)]
#![doc(test(attr(deny(warnings))))]

mod arena;
mod error;
mod granularity;
mod index;
mod iter;
mod ledger;
mod locked;
mod segment;
mod snapshot;
mod strategy;
mod usage;

pub mod meter;

#[cfg(test)]
mod tests;

use crate::arena::Arena;
use crate::index::SegmentIndex;
use crate::ledger::Ledger;
use crate::segment::Segment;

pub use crate::error::AllocError;
pub use crate::error::ParseStrategyError;
pub use crate::error::SetupError;
pub use crate::granularity::Blocks;
pub use crate::granularity::Bytes;
pub use crate::granularity::Granularity;
pub use crate::locked::LockedAllocator;
pub use crate::snapshot::Listing;
pub use crate::snapshot::SegmentInfo;
pub use crate::snapshot::Snapshot;
pub use crate::strategy::Strategy;
pub use crate::usage::Usage;

/// Allocator that counts in bytes.
///
/// See the [module-level documentation](crate#granularity) for the available variants.
pub type ByteAllocator = SegmentAllocator<Bytes>;

/// Allocator that rounds every request up to a multiple of 16 bytes.
///
/// See the [module-level documentation](crate#granularity) for the available variants.
pub type BlockAllocator16 = SegmentAllocator<Blocks<16>>;

/// Resume point of the next-fit scan.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
struct Cursor {
    index: SegmentIndex,
    offset: usize,
}

impl Cursor {
    #[inline]
    const fn at(segment: &Segment) -> Self {
        Self {
            index: segment.index(),
            offset: segment.offset(),
        }
    }
}

/// The segment allocator.
///
/// The `G` parameter sets the unit the allocator counts in, and may be:
///
/// * [`Bytes`]: exact byte extents
/// * [`Blocks<N>`]: extents rounded up to multiples of `N` bytes
///
/// All addresses and sizes accepted and returned by this type are in bytes, regardless of `G`.
#[derive(Clone, Debug)]
pub struct SegmentAllocator<G: Granularity> {
    arena: Arena,
    ledger: Ledger<G>,
    strategy: Strategy,
    cursor: Cursor,
}

impl<G: Granularity> SegmentAllocator<G> {
    /// Constructs an allocator managing `capacity` bytes as one free segment.
    ///
    /// For block granularities, the capacity is rounded down to a whole number of blocks.
    ///
    /// # Errors
    ///
    /// * [`SetupError::ZeroCapacity`] if `capacity` does not hold a single unit;
    /// * [`SetupError::Overflow`] if the buffer cannot be allocated.
    ///
    /// # Examples
    ///
    /// ```
    /// use segalloc::BlockAllocator16;
    /// use segalloc::Strategy;
    ///
    /// let allocator = BlockAllocator16::new(1000, Strategy::NextFit).unwrap();
    /// assert_eq!(allocator.capacity(), 992);
    /// assert!(BlockAllocator16::new(15, Strategy::NextFit).is_err());
    /// ```
    pub fn new(capacity: usize, strategy: Strategy) -> Result<Self, SetupError> {
        let quantum = G::quantum();
        let units = capacity / quantum;
        if units == 0 {
            return Err(SetupError::ZeroCapacity { capacity, quantum });
        }
        Self::from_units(&[units], strategy)
    }

    /// Constructs an allocator whose ledger starts as the given free chunks, laid out back to
    /// back from address 0.
    ///
    /// Chunk sizes are in bytes; for block granularities each chunk is rounded up to whole blocks.
    /// The capacity is the sum of the (rounded) chunks.
    ///
    /// # Errors
    ///
    /// * [`SetupError::ZeroCapacity`] if `chunks` is empty;
    /// * [`SetupError::ZeroSizedChunk`] if a chunk has size zero;
    /// * [`SetupError::Overflow`] if the chunks add up to more than the buffer can hold.
    pub fn with_chunks(chunks: &[usize], strategy: Strategy) -> Result<Self, SetupError> {
        let quantum = G::quantum();
        if chunks.is_empty() {
            return Err(SetupError::ZeroCapacity {
                capacity: 0,
                quantum,
            });
        }

        let sizes = chunks
            .iter()
            .enumerate()
            .map(|(index, &chunk)| match chunk {
                0 => Err(SetupError::ZeroSizedChunk { index }),
                chunk => Ok(chunk.div_ceil(quantum)),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Self::from_units(&sizes, strategy)
    }

    /// Lays out free segments of the given sizes, in units, and allocates the buffer behind them.
    fn from_units(sizes: &[usize], strategy: Strategy) -> Result<Self, SetupError> {
        let capacity = sizes
            .iter()
            .try_fold(0usize, |total, &size| total.checked_add(size))
            .and_then(|units| units.checked_mul(G::quantum()))
            .ok_or(SetupError::Overflow)?;
        let arena = Arena::new(capacity)?;
        let ledger = Ledger::from_sizes(sizes);
        let cursor = Cursor::at(&ledger.head());
        log::debug!(
            "SegmentAllocator::new: {} bytes in {} segments, quantum {}, {strategy}-fit",
            arena.size(),
            ledger.len(),
            G::quantum()
        );
        Ok(Self {
            arena,
            ledger,
            strategy,
            cursor,
        })
    }

    /// Bytes managed by the allocator.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.arena.size()
    }

    /// Bytes per unit: 1 for [`Bytes`], `N` for [`Blocks<N>`].
    #[inline]
    #[must_use]
    pub fn quantum(&self) -> usize {
        G::quantum()
    }

    /// The strategy used by [`allocate`](Self::allocate).
    #[inline]
    #[must_use]
    pub const fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Changes the strategy used by [`allocate`](Self::allocate).
    ///
    /// The next-fit cursor is kept, so switching back to [`Strategy::NextFit`] resumes where the
    /// last next-fit allocation left off.
    pub fn set_strategy(&mut self, strategy: Strategy) {
        self.strategy = strategy;
    }

    /// Address of the segment the next next-fit scan starts from.
    #[inline]
    #[must_use]
    pub fn cursor(&self) -> usize {
        self.cursor.offset * G::quantum()
    }

    /// Allocates `size` bytes with the allocator's strategy and returns the address of the
    /// allocation.
    ///
    /// # Errors
    ///
    /// * [`AllocError::ZeroSizeRequest`] if `size` is zero;
    /// * [`AllocError::NoSpace`] if the strategy finds no free segment large enough.
    pub fn allocate(&mut self, size: usize) -> Result<usize, AllocError> {
        self.allocate_with(self.strategy, size)
    }

    /// Allocates `size` bytes with the given strategy, ignoring the allocator's own.
    ///
    /// # Errors
    ///
    /// Same as [`allocate`](Self::allocate).
    ///
    /// # Examples
    ///
    /// ```
    /// use segalloc::ByteAllocator;
    /// use segalloc::Strategy;
    ///
    /// let mut allocator = ByteAllocator::with_chunks(&[50, 120, 30], Strategy::FirstFit).unwrap();
    /// assert_eq!(allocator.allocate_with(Strategy::WorstFit, 40), Ok(50));
    /// assert_eq!(allocator.allocate_with(Strategy::BestFit, 30), Ok(170));
    /// assert_eq!(allocator.allocate(40), Ok(0));
    /// ```
    pub fn allocate_with(&mut self, strategy: Strategy, size: usize) -> Result<usize, AllocError> {
        if size == 0 {
            log::debug!("allocate(0): rejected");
            return Err(AllocError::ZeroSizeRequest);
        }

        let quantum = G::quantum();
        let units = size.div_ceil(quantum);

        let chosen = if strategy.resumes() {
            let start = Segment::read(&self.ledger, self.cursor.index, self.cursor.offset);
            strategy.select(self.ledger.lap_from(start), units)
        } else {
            strategy.select(self.ledger.iter(), units)
        };

        let Some(chosen) = chosen else {
            log::debug!("allocate({size}): no free segment for {units} units with {strategy}-fit");
            return Err(AllocError::NoSpace { size });
        };

        let segment = self
            .ledger
            .allocate_from(chosen, units)
            .map_err(|_| AllocError::NoSpace { size })?;

        if strategy.resumes() {
            self.cursor = Cursor::at(&segment);
        }

        let address = segment.offset() * quantum;
        log::trace!(
            "allocate({size}): {} bytes at {address:#x} with {strategy}-fit",
            segment.size() * quantum
        );
        Ok(address)
    }

    /// Frees the allocation starting at `address` and merges it with its free neighbours.
    ///
    /// Returns the number of bytes released, which is the requested size rounded up to whole
    /// units. The released bytes are zeroed.
    ///
    /// # Errors
    ///
    /// [`AllocError::InvalidFree`] if `address` is not the start of a used segment. Interior
    /// addresses and already-freed addresses are rejected.
    pub fn free(&mut self, address: usize) -> Result<usize, AllocError> {
        let quantum = G::quantum();
        let segment = (address % quantum == 0)
            .then(|| self.ledger.find(address / quantum))
            .flatten()
            .filter(Segment::is_used)
            .ok_or_else(|| {
                log::debug!("free({address:#x}): not the start of a used segment");
                AllocError::InvalidFree { address }
            })?;

        let release = self.ledger.release(segment);
        let survivor = release.survivor;
        if self.cursor.index == survivor.index()
            || release.absorbed.contains(&Some(self.cursor.index))
        {
            self.cursor = Cursor::at(&survivor);
        }

        let freed = release.freed * quantum;
        self.arena.clear(address..address + freed);
        log::trace!(
            "free({address:#x}): {freed} bytes, now part of a free segment of {} bytes at {:#x}",
            survivor.size() * quantum,
            survivor.offset() * quantum
        );
        Ok(freed)
    }

    /// The bytes of the allocation starting at `address`, or `None` if `address` is not the start
    /// of a used segment.
    #[must_use]
    pub fn data(&self, address: usize) -> Option<&[u8]> {
        let range = self.used_range(address)?;
        Some(self.arena.get(range))
    }

    /// Mutable access to the bytes of the allocation starting at `address`.
    #[must_use]
    pub fn data_mut(&mut self, address: usize) -> Option<&mut [u8]> {
        let range = self.used_range(address)?;
        Some(self.arena.get_mut(range))
    }

    fn used_range(&self, address: usize) -> Option<core::ops::Range<usize>> {
        let quantum = G::quantum();
        if address % quantum != 0 {
            return None;
        }
        let segment = self.ledger.find(address / quantum).filter(Segment::is_used)?;
        Some(address..address + segment.size() * quantum)
    }

    /// Current external fragmentation, as a percentage in `0.0..=100.0`.
    ///
    /// See [`Usage::fragmentation`].
    #[must_use]
    pub fn fragmentation(&self) -> f64 {
        self.usage().fragmentation()
    }

    /// Returns memory usage information for this allocator.
    ///
    /// The usage is computed by visiting every segment, so this is a linear-time operation.
    #[must_use]
    pub fn usage(&self) -> Usage {
        Usage::get(&self.ledger)
    }

    /// Returns a copy of the ledger, in address order.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::get(&self.ledger)
    }

    /// Iterates over the segments, in address order.
    pub fn segments(&self) -> impl Iterator<Item = SegmentInfo> + '_ {
        let quantum = G::quantum();
        self.ledger.iter().map(move |segment| SegmentInfo {
            offset: segment.offset() * quantum,
            size: segment.size() * quantum,
            used: segment.is_used(),
        })
    }
}
