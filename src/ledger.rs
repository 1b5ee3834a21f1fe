// Copyright © 2024 Andrea Corbellini and contributors
// SPDX-License-Identifier: BSD-3-Clause

use crate::error::AllocError;
use crate::granularity::Granularity;
use crate::index::SegmentIndex;
use crate::iter::Lap;
use crate::iter::Segments;
use crate::segment::Segment;
use crate::segment::SegmentHeader;

#[derive(Copy, Clone, Debug)]
enum Slot<R> {
    Occupied(R),
    Vacant { next_vacant: Option<SegmentIndex> },
}

/// The ordered chain of segments partitioning `0..units`.
///
/// Segment nodes live in a slot vector; slots released by coalescing are kept on a vacant list
/// and reused by later splits. The ledger always holds at least one segment.
#[derive(Clone, Debug)]
pub(crate) struct Ledger<G: Granularity> {
    slots: Vec<Slot<G::SegmentRepr>>,
    vacant: Option<SegmentIndex>,
    head: SegmentIndex,
    units: usize,
    live: usize,
}

/// Outcome of [`Ledger::release`].
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub(crate) struct Release {
    /// The freed segment after merging with its free neighbours.
    pub(crate) survivor: Segment,
    /// Units released by the call, excluding the neighbours that were already free.
    pub(crate) freed: usize,
    /// Nodes destroyed by the merge.
    pub(crate) absorbed: [Option<SegmentIndex>; 2],
}

impl<G: Granularity> Ledger<G> {
    /// Builds a ledger made of free segments of the given sizes, laid out from offset 0.
    ///
    /// `sizes` must not be empty and must not contain zeros.
    #[must_use]
    pub(crate) fn from_sizes(sizes: &[usize]) -> Self {
        debug_assert!(!sizes.is_empty(), "a ledger needs at least one segment");
        debug_assert!(
            sizes.iter().all(|&size| size > 0),
            "segment sizes must be greater than zero"
        );

        let mut ledger = Self {
            slots: Vec::with_capacity(sizes.len()),
            vacant: None,
            head: SegmentIndex::from_slot(0),
            units: sizes.iter().sum(),
            live: 0,
        };

        let mut offset = 0;
        let mut prev: Option<Segment> = None;
        for &size in sizes {
            let mut segment = Segment::new_in(&mut ledger, offset, size);
            match prev {
                None => ledger.head = segment.index(),
                Some(mut prev) => Segment::connect(&mut ledger, &mut prev, &mut segment),
            }
            offset += size;
            prev = Some(segment);
        }

        ledger
    }

    /// Total number of units covered by the ledger.
    #[inline]
    pub(crate) const fn units(&self) -> usize {
        self.units
    }

    /// Number of live segments.
    #[inline]
    pub(crate) const fn len(&self) -> usize {
        self.live
    }

    #[inline]
    pub(crate) const fn head_index(&self) -> SegmentIndex {
        self.head
    }

    #[inline]
    pub(crate) fn head(&self) -> Segment {
        Segment::read(self, self.head, 0)
    }

    pub(crate) fn iter(&self) -> Segments<'_, G> {
        Segments::new(self)
    }

    /// Walks the whole ledger once, starting at `start` and wrapping around to the head.
    pub(crate) fn lap_from(&self, start: Segment) -> Lap<'_, G> {
        Lap::new(self, start)
    }

    /// Finds the segment starting exactly at `offset`.
    pub(crate) fn find(&self, offset: usize) -> Option<Segment> {
        self.iter()
            .take_while(|segment| segment.offset() <= offset)
            .find(|segment| segment.offset() == offset)
    }

    pub(crate) fn header(&self, index: SegmentIndex) -> SegmentHeader {
        match &self.slots[index.slot()] {
            Slot::Occupied(repr) => G::read_segment_header(repr),
            Slot::Vacant { .. } => panic!("{index:?} does not hold a live segment"),
        }
    }

    pub(crate) fn set_header(&mut self, index: SegmentIndex, header: SegmentHeader) {
        let slot = &mut self.slots[index.slot()];
        debug_assert!(
            matches!(slot, Slot::Occupied(_)),
            "{index:?} does not hold a live segment"
        );
        *slot = Slot::Occupied(G::write_segment_header(&header));
    }

    pub(crate) fn insert(&mut self, header: SegmentHeader) -> SegmentIndex {
        let repr = G::write_segment_header(&header);
        self.live += 1;
        match self.vacant {
            Some(index) => {
                let slot = &mut self.slots[index.slot()];
                self.vacant = match *slot {
                    Slot::Vacant { next_vacant } => next_vacant,
                    Slot::Occupied(_) => panic!("vacant list points at live {index:?}"),
                };
                *slot = Slot::Occupied(repr);
                index
            }
            None => {
                self.slots.push(Slot::Occupied(repr));
                SegmentIndex::from_slot(self.slots.len() - 1)
            }
        }
    }

    fn remove(&mut self, index: SegmentIndex) {
        debug_assert_ne!(index, self.head, "cannot remove the head segment");
        let slot = &mut self.slots[index.slot()];
        debug_assert!(
            matches!(slot, Slot::Occupied(_)),
            "{index:?} does not hold a live segment"
        );
        *slot = Slot::Vacant {
            next_vacant: self.vacant,
        };
        self.vacant = Some(index);
        self.live -= 1;
    }

    /// Marks `segment` as used, shrinking it to `units` and turning the remainder into a new free
    /// segment right after it.
    ///
    /// Returns the allocated segment. Fails if `segment` is not free or is smaller than `units`.
    pub(crate) fn allocate_from(
        &mut self,
        mut segment: Segment,
        units: usize,
    ) -> Result<Segment, AllocError> {
        debug_assert!(units > 0, "`units` must be greater than zero");
        if segment.is_used() || segment.size() < units {
            return Err(AllocError::NoSpace {
                size: units * G::quantum(),
            });
        }

        if units < segment.size() {
            let remainder = segment.size() - units;
            let next = segment.next(self);

            segment.set_size(units);
            let mut split = Segment::new_in(self, segment.end(), remainder);
            log::trace!(
                "split {:?} at {}: {} + {} units",
                segment.index(),
                segment.offset(),
                units,
                remainder
            );

            Segment::connect(self, &mut segment, &mut split);
            if let Some(mut next) = next {
                Segment::connect(self, &mut split, &mut next);
            }
        }

        segment.set_used(true);
        segment.write(self);

        Ok(segment)
    }

    /// Marks the used `segment` as free and merges it with its free neighbours.
    ///
    /// The previous neighbour is folded into `segment` (which therefore moves back to the
    /// neighbour's offset), then the next neighbour is folded in. Absorbed nodes are destroyed; if
    /// the head was absorbed, `segment` becomes the head.
    pub(crate) fn release(&mut self, mut segment: Segment) -> Release {
        debug_assert!(segment.is_used(), "releasing a free segment");
        let freed = segment.size();
        let mut absorbed = [None, None];

        segment.set_used(false);

        if let Some(prev) = segment.prev(self).filter(Segment::is_free) {
            prev.disconnect(self);
            segment.set_prev_index(prev.prev_index());
            segment.set_offset(prev.offset());
            segment.set_size(segment.size() + prev.size());
            if self.head == prev.index() {
                self.head = segment.index();
            }
            log::trace!("merged {:?} into {:?}", prev.index(), segment.index());
            // The head may only be removed after it was retargeted.
            self.remove(prev.index());
            absorbed[0] = Some(prev.index());
        }

        if let Some(next) = segment.next(self).filter(Segment::is_free) {
            next.disconnect(self);
            segment.set_next_index(next.next_index());
            segment.set_size(segment.size() + next.size());
            log::trace!("merged {:?} into {:?}", next.index(), segment.index());
            self.remove(next.index());
            absorbed[1] = Some(next.index());
        }

        segment.write(self);

        Release {
            survivor: segment,
            freed,
            absorbed,
        }
    }

    /// Asserts that the segments partition `0..units` and that the links are consistent.
    #[cfg(test)]
    pub(crate) fn assert_integrity(&self) {
        let head = self.header(self.head);
        assert_eq!(head.prev, None, "head has a previous segment");

        let mut expected_offset = 0;
        let mut expected_prev = None;
        let mut count = 0;
        for segment in self.iter() {
            assert!(segment.size() > 0, "{:?} is empty", segment.index());
            assert_eq!(segment.offset(), expected_offset, "gap or overlap");
            assert_eq!(segment.prev_index(), expected_prev, "broken back link");
            if let Some(stored) = self.header(segment.index()).offset {
                assert_eq!(stored, segment.offset(), "stale stored offset");
            }
            expected_offset = segment.end();
            expected_prev = Some(segment.index());
            count += 1;
        }
        assert_eq!(expected_offset, self.units, "segments do not cover the arena");
        assert_eq!(count, self.live, "live count out of sync");
    }

    /// Asserts that no two neighbouring segments are both free.
    #[cfg(test)]
    pub(crate) fn assert_coalesced(&self) {
        let mut prev_free = false;
        for segment in self.iter() {
            assert!(
                !(prev_free && segment.is_free()),
                "adjacent free segments at offset {}",
                segment.offset()
            );
            prev_free = segment.is_free();
        }
    }
}
