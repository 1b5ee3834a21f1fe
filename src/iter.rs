// Copyright © 2024 Andrea Corbellini and contributors
// SPDX-License-Identifier: BSD-3-Clause

use crate::granularity::Granularity;
use crate::index::SegmentIndex;
use crate::ledger::Ledger;
use crate::segment::Segment;
use core::iter::FusedIterator;

/// Walks the ledger from the head to the tail.
///
/// Offsets are accumulated while walking, so this works the same for granularities that do not
/// store them.
#[derive(Clone, Debug)]
pub(crate) struct Segments<'a, G: Granularity> {
    ledger: &'a Ledger<G>,
    next: Option<(SegmentIndex, usize)>,
}

impl<'a, G: Granularity> Segments<'a, G> {
    pub(crate) fn new(ledger: &'a Ledger<G>) -> Self {
        Self {
            ledger,
            next: Some((ledger.head_index(), 0)),
        }
    }
}

impl<'a, G: Granularity> Iterator for Segments<'a, G> {
    type Item = Segment;

    fn next(&mut self) -> Option<Self::Item> {
        let (index, offset) = self.next?;
        let segment = Segment::read(self.ledger, index, offset);
        self.next = segment
            .next_index()
            .map(|next_index| (next_index, segment.end()));
        Some(segment)
    }
}

impl<'a, G: Granularity> FusedIterator for Segments<'a, G> {}

#[derive(Copy, Clone, Debug)]
enum State {
    At(SegmentIndex, usize),
    Final,
}

/// Walks every segment of the ledger exactly once, starting at a given segment and wrapping
/// around from the tail to the head.
#[derive(Clone, Debug)]
pub(crate) struct Lap<'a, G: Granularity> {
    ledger: &'a Ledger<G>,
    start: SegmentIndex,
    state: State,
}

impl<'a, G: Granularity> Lap<'a, G> {
    pub(crate) fn new(ledger: &'a Ledger<G>, start: Segment) -> Self {
        Self {
            ledger,
            start: start.index(),
            state: State::At(start.index(), start.offset()),
        }
    }
}

impl<'a, G: Granularity> Iterator for Lap<'a, G> {
    type Item = Segment;

    fn next(&mut self) -> Option<Self::Item> {
        let State::At(index, offset) = self.state else {
            return None;
        };

        let segment = Segment::read(self.ledger, index, offset);
        let (next_index, next_offset) = match segment.next_index() {
            Some(next_index) => (next_index, segment.end()),
            // Past the tail: wrap around
            None => (self.ledger.head_index(), 0),
        };

        self.state = if next_index == self.start {
            State::Final
        } else {
            State::At(next_index, next_offset)
        };

        Some(segment)
    }
}

impl<'a, G: Granularity> FusedIterator for Lap<'a, G> {}
