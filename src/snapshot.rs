// Copyright © 2024 Andrea Corbellini and contributors
// SPDX-License-Identifier: BSD-3-Clause

use crate::granularity::Granularity;
use crate::ledger::Ledger;
use core::fmt;
use core::fmt::Write;

/// One segment of a [`Snapshot`]. Offsets and sizes are in bytes.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct SegmentInfo {
    /// Start of the segment in the backing store.
    pub offset: usize,
    /// Length of the segment.
    pub size: usize,
    /// Whether the segment is allocated.
    pub used: bool,
}

impl SegmentInfo {
    /// First byte past the segment.
    #[inline]
    #[must_use]
    pub const fn end(&self) -> usize {
        self.offset + self.size
    }
}

/// Point-in-time copy of the ledger, in address order.
///
/// The [`Display`](fmt::Display) implementation draws a memory map with one character per unit
/// of the allocator: every segment starts with `|`, used space is drawn with `_` and free space
/// with `.`. Use [`render`](Self::render) to pick a different scale.
///
/// ```
/// use segalloc::BlockAllocator16;
/// use segalloc::Strategy;
///
/// let mut allocator = BlockAllocator16::new(128, Strategy::FirstFit).unwrap();
/// allocator.allocate(40).unwrap();
/// assert_eq!(allocator.snapshot().to_string(), "|__|....|");
/// ```
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Snapshot {
    segments: Vec<SegmentInfo>,
    quantum: usize,
}

impl Snapshot {
    pub(crate) fn get<G: Granularity>(ledger: &Ledger<G>) -> Self {
        let quantum = G::quantum();
        let segments = ledger
            .iter()
            .map(|segment| SegmentInfo {
                offset: segment.offset() * quantum,
                size: segment.size() * quantum,
                used: segment.is_used(),
            })
            .collect();
        Self { segments, quantum }
    }

    /// The segments, in address order.
    #[inline]
    #[must_use]
    pub fn segments(&self) -> &[SegmentInfo] {
        &self.segments
    }

    /// Draws the memory map with one character for every `cell` bytes.
    ///
    /// Each segment takes `ceil(size / cell)` characters, and at least one, so that segments
    /// smaller than a cell still show up as a boundary.
    #[must_use]
    pub fn render(&self, cell: usize) -> String {
        let cell = cell.max(1);
        let mut out = String::new();
        for segment in &self.segments {
            let width = segment.size.div_ceil(cell).max(1);
            let fill = if segment.used { '_' } else { '.' };
            out.push('|');
            out.extend(core::iter::repeat(fill).take(width - 1));
        }
        out.push('|');
        out
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(self.quantum))
    }
}

/// Formats the snapshot as a list of `offset+size:state` entries, e.g. `0+32:used 32+96:free`.
#[derive(Copy, Clone, Debug)]
pub struct Listing<'a>(pub &'a Snapshot);

impl<'a> fmt::Display for Listing<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.segments.iter().enumerate() {
            if i > 0 {
                f.write_char(' ')?;
            }
            let state = if segment.used { "used" } else { "free" };
            write!(f, "{}+{}:{state}", segment.offset, segment.size)?;
        }
        Ok(())
    }
}
