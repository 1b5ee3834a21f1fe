// Copyright © 2024 Andrea Corbellini and contributors
// SPDX-License-Identifier: BSD-3-Clause

use crate::granularity::Granularity;
use crate::index::SegmentIndex;
use crate::ledger::Ledger;

/// Decoded segment node, independent of the [`Granularity`] representation it was read from.
///
/// `offset` is `None` when the representation does not record positions (block granularity).
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub(crate) struct SegmentHeader {
    pub(crate) prev: Option<SegmentIndex>,
    pub(crate) next: Option<SegmentIndex>,
    pub(crate) offset: Option<usize>,
    pub(crate) size: usize,
    pub(crate) used: bool,
}

/// A segment of the ledger, together with its position.
///
/// All quantities are in units of the ledger's [`Granularity`]. A `Segment` is a copy of the
/// node it was read from: changes are only visible to the ledger after [`write()`](Self::write).
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub(crate) struct Segment {
    index: SegmentIndex,
    offset: usize,
    size: usize,
    used: bool,
    prev_index: Option<SegmentIndex>,
    next_index: Option<SegmentIndex>,
}

impl Segment {
    /// Reads the segment stored at `index`.
    ///
    /// `offset` is where the caller's walk places the segment. Granularities that store offsets
    /// must agree with it.
    #[must_use]
    pub(crate) fn read<G: Granularity>(
        ledger: &Ledger<G>,
        index: SegmentIndex,
        offset: usize,
    ) -> Self {
        let header = ledger.header(index);
        debug_assert!(
            header.offset.map_or(true, |stored| stored == offset),
            "stored offset {:?} of {index:?} disagrees with walked offset {offset}",
            header.offset
        );
        Self {
            index,
            offset,
            size: header.size,
            used: header.used,
            prev_index: header.prev,
            next_index: header.next,
        }
    }

    pub(crate) fn write<G: Granularity>(&self, ledger: &mut Ledger<G>) {
        debug_assert!(self.size > 0, "segment {:?} has zero size", self.index);
        debug_assert!(
            self.end() <= ledger.units(),
            "segment {:?} ends past the arena",
            self.index
        );
        ledger.set_header(
            self.index,
            SegmentHeader {
                prev: self.prev_index,
                next: self.next_index,
                offset: Some(self.offset),
                size: self.size,
                used: self.used,
            },
        );
    }

    #[inline]
    pub(crate) const fn index(&self) -> SegmentIndex {
        self.index
    }

    #[inline]
    pub(crate) const fn offset(&self) -> usize {
        self.offset
    }

    #[inline]
    pub(crate) const fn size(&self) -> usize {
        self.size
    }

    /// First unit past the segment.
    #[inline]
    pub(crate) const fn end(&self) -> usize {
        self.offset + self.size
    }

    #[inline]
    pub(crate) const fn is_used(&self) -> bool {
        self.used
    }

    #[inline]
    pub(crate) const fn is_free(&self) -> bool {
        !self.used
    }

    pub(crate) fn set_used(&mut self, used: bool) {
        self.used = used;
    }

    pub(crate) fn set_size(&mut self, size: usize) {
        self.size = size;
    }

    pub(crate) fn set_offset(&mut self, offset: usize) {
        self.offset = offset;
    }

    pub(crate) const fn prev_index(&self) -> Option<SegmentIndex> {
        self.prev_index
    }

    pub(crate) fn set_prev_index(&mut self, prev_index: Option<SegmentIndex>) {
        self.prev_index = prev_index;
    }

    pub(crate) fn set_next_index(&mut self, next_index: Option<SegmentIndex>) {
        self.next_index = next_index;
    }

    pub(crate) const fn next_index(&self) -> Option<SegmentIndex> {
        self.next_index
    }

    pub(crate) fn prev<G: Granularity>(&self, ledger: &Ledger<G>) -> Option<Self> {
        self.prev_index.map(|prev_index| {
            let size = ledger.header(prev_index).size;
            debug_assert!(size <= self.offset, "previous segment starts before the arena");
            Self::read(ledger, prev_index, self.offset - size)
        })
    }

    pub(crate) fn next<G: Granularity>(&self, ledger: &Ledger<G>) -> Option<Self> {
        self.next_index
            .map(|next_index| Self::read(ledger, next_index, self.end()))
    }

    /// Links `left` and `right` as neighbours and writes both.
    pub(crate) fn connect<G: Granularity>(
        ledger: &mut Ledger<G>,
        left: &mut Self,
        right: &mut Self,
    ) {
        debug_assert_eq!(
            left.end(),
            right.offset,
            "connected segments must be contiguous"
        );
        left.next_index = Some(right.index);
        right.prev_index = Some(left.index);
        left.write(ledger);
        right.write(ledger);
    }

    /// Unlinks the segment from its neighbours, linking them to each other instead.
    ///
    /// The segment node itself is left untouched; the caller is expected to release it.
    pub(crate) fn disconnect<G: Granularity>(self, ledger: &mut Ledger<G>) {
        if let Some(mut prev) = self.prev(ledger) {
            prev.next_index = self.next_index;
            prev.write(ledger);
        }
        if let Some(mut next) = self.next(ledger) {
            next.prev_index = self.prev_index;
            next.write(ledger);
        }
    }

    /// Creates a detached free segment covering `offset..offset + size`.
    #[must_use]
    pub(crate) fn new_in<G: Granularity>(
        ledger: &mut Ledger<G>,
        offset: usize,
        size: usize,
    ) -> Self {
        let index = ledger.insert(SegmentHeader {
            prev: None,
            next: None,
            offset: Some(offset),
            size,
            used: false,
        });
        Self {
            index,
            offset,
            size,
            used: false,
            prev_index: None,
            next_index: None,
        }
    }
}
