// Copyright © 2024 Andrea Corbellini and contributors
// SPDX-License-Identifier: BSD-3-Clause

#![allow(private_interfaces)]

use crate::index::SegmentIndex;
use crate::segment::SegmentHeader;
use core::fmt;

/// Trait to define the unit that a [`SegmentAllocator`](crate::SegmentAllocator) counts in.
///
/// This trait is implemented by 2 marker types:
///
/// * [`Bytes`]: every segment is measured in bytes and stores its own start address.
/// * [`Blocks<N>`]: every segment is measured in blocks of `N` bytes; requests are rounded up to
///   whole blocks, and addresses are derived from the running block count while scanning.
///
/// This is a sealed trait and you cannot implement your own.
pub trait Granularity: Copy + Clone + PartialEq + Eq + fmt::Debug + private::Sealed {}

pub(crate) mod private {
    use crate::segment::SegmentHeader;
    use core::fmt;

    #[doc(hidden)]
    pub trait Sealed: GranularityInternals {}

    #[doc(hidden)]
    pub trait GranularityInternals {
        type SegmentRepr: Copy + Clone + fmt::Debug;

        /// Number of bytes in one unit.
        fn quantum() -> usize;

        fn read_segment_header(src: &Self::SegmentRepr) -> SegmentHeader;
        fn write_segment_header(value: &SegmentHeader) -> Self::SegmentRepr;
    }
}

/// Marker for byte-addressed allocators: a request of `n` bytes consumes exactly `n` bytes.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct Bytes;

impl Granularity for Bytes {}

impl private::Sealed for Bytes {}

#[doc(hidden)]
#[derive(Copy, Clone, Debug)]
pub struct ByteSegmentRepr {
    prev: Option<SegmentIndex>,
    next: Option<SegmentIndex>,
    offset: usize,
    size: usize,
    used: bool,
}

impl private::GranularityInternals for Bytes {
    type SegmentRepr = ByteSegmentRepr;

    #[inline]
    fn quantum() -> usize {
        1
    }

    fn read_segment_header(src: &Self::SegmentRepr) -> SegmentHeader {
        SegmentHeader {
            prev: src.prev,
            next: src.next,
            offset: Some(src.offset),
            size: src.size,
            used: src.used,
        }
    }

    fn write_segment_header(value: &SegmentHeader) -> Self::SegmentRepr {
        debug_assert!(
            value.offset.is_some(),
            "byte segments must be written with their offset"
        );
        debug_assert!(value.size > 0, "`size` must be greater than zero");
        ByteSegmentRepr {
            prev: value.prev,
            next: value.next,
            offset: value.offset.unwrap_or_default(),
            size: value.size,
            used: value.used,
        }
    }
}

/// Marker for block-quantized allocators: requests are rounded up to a multiple of `N` bytes.
///
/// `N` must be greater than zero; using `Blocks<0>` fails at compile time.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct Blocks<const N: usize>;

impl<const N: usize> Granularity for Blocks<N> {}

impl<const N: usize> private::Sealed for Blocks<N> {}

impl<const N: usize> Blocks<N> {
    const QUANTUM: usize = {
        assert!(N > 0, "block size must be greater than zero");
        N
    };

    const USED_BIT: usize = 1;
    const COUNT_SHIFT: u32 = 1;
}

/// Block segments do not record their position. The block count and the `used` flag share one
/// word: the lowest bit is the flag, the rest is the count.
#[doc(hidden)]
#[derive(Copy, Clone, Debug)]
pub struct BlockSegmentRepr {
    prev: Option<SegmentIndex>,
    next: Option<SegmentIndex>,
    tagged_count: usize,
}

impl<const N: usize> private::GranularityInternals for Blocks<N> {
    type SegmentRepr = BlockSegmentRepr;

    #[inline]
    fn quantum() -> usize {
        Self::QUANTUM
    }

    fn read_segment_header(src: &Self::SegmentRepr) -> SegmentHeader {
        SegmentHeader {
            prev: src.prev,
            next: src.next,
            offset: None,
            size: src.tagged_count >> Self::COUNT_SHIFT,
            used: src.tagged_count & Self::USED_BIT != 0,
        }
    }

    fn write_segment_header(value: &SegmentHeader) -> Self::SegmentRepr {
        debug_assert!(value.size > 0, "`size` must be greater than zero");
        debug_assert!(
            value.size <= usize::MAX >> Self::COUNT_SHIFT,
            "`size` out of bounds"
        );
        let mut tagged_count = value.size << Self::COUNT_SHIFT;
        if value.used {
            tagged_count |= Self::USED_BIT;
        }
        BlockSegmentRepr {
            prev: value.prev,
            next: value.next,
            tagged_count,
        }
    }
}
