// Copyright © 2024 Andrea Corbellini and contributors
// SPDX-License-Identifier: BSD-3-Clause

use thiserror::Error;

/// Error returned by [`SegmentAllocator::allocate`](crate::SegmentAllocator::allocate) and
/// [`SegmentAllocator::free`](crate::SegmentAllocator::free).
///
/// Every variant is a local, recoverable outcome: the allocator state is unchanged and the caller
/// may carry on with further requests.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Error)]
pub enum AllocError {
    /// No free segment satisfies the placement strategy for the requested size.
    #[error("no free segment can hold {size} bytes")]
    NoSpace {
        /// Requested size, in bytes.
        size: usize,
    },
    /// The address is not the start of a used segment: it was never returned by an allocation,
    /// points inside a segment, or was already freed.
    #[error("invalid free of address {address:#x}")]
    InvalidFree {
        /// Address passed to `free`.
        address: usize,
    },
    /// Zero-sized requests are rejected without touching the ledger.
    #[error("requested size must be greater than zero")]
    ZeroSizeRequest,
}

/// Error returned when constructing a [`SegmentAllocator`](crate::SegmentAllocator).
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Error)]
pub enum SetupError {
    /// The backing store would not contain a single whole unit.
    #[error("capacity of {capacity} bytes holds no unit of {quantum} bytes")]
    ZeroCapacity {
        /// Requested capacity, in bytes.
        capacity: usize,
        /// Bytes per unit of the allocator granularity.
        quantum: usize,
    },
    /// One of the initial chunks has size zero.
    #[error("chunk #{index} has size zero")]
    ZeroSizedChunk {
        /// Position of the chunk in the input list.
        index: usize,
    },
    /// The buffer is too large to be allocated: its size overflows `usize`, exceeds
    /// `isize::MAX` bytes, or the memory is not available.
    #[error("buffer size overflows the address space or cannot be allocated")]
    Overflow,
}

/// Error returned when parsing a [`Strategy`](crate::Strategy) from a string fails.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Error)]
#[error("unknown placement strategy `{name}` (expected first, next, best or worst)")]
pub struct ParseStrategyError {
    pub(crate) name: String,
}
