// Copyright © 2024 Andrea Corbellini and contributors
// SPDX-License-Identifier: BSD-3-Clause

use core::fmt;
use core::num::NonZero;

/// Handle to a segment node stored in the [`Ledger`](crate::ledger::Ledger) slot vector.
///
/// The handle stores `slot + 1` so that `Option<SegmentIndex>` is the same size as
/// `SegmentIndex`; links between segments are always expressed as `Option<SegmentIndex>`.
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct SegmentIndex {
    encoded: NonZero<usize>,
}

impl SegmentIndex {
    #[inline]
    #[must_use]
    pub(crate) const fn from_slot(slot: usize) -> Self {
        Self {
            encoded: NonZero::<usize>::MIN.saturating_add(slot),
        }
    }

    #[inline]
    #[must_use]
    pub(crate) const fn slot(self) -> usize {
        self.encoded.get() - 1
    }
}

impl fmt::Debug for SegmentIndex {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SegmentIndex({})", self.slot())
    }
}
