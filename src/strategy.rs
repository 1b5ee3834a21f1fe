// Copyright © 2024 Andrea Corbellini and contributors
// SPDX-License-Identifier: BSD-3-Clause

use crate::error::ParseStrategyError;
use crate::segment::Segment;
use core::fmt;
use core::str::FromStr;

/// Placement strategy used to pick the free segment that will hold a request.
///
/// All strategies share the same split and coalesce logic; they only differ in which free segment
/// they choose.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Default, Debug)]
pub enum Strategy {
    /// Scans from the start of the buffer and picks the first free segment large enough.
    #[default]
    FirstFit,
    /// Like [`FirstFit`](Self::FirstFit), but resumes scanning from the segment of the last
    /// successful allocation, wrapping around at the end of the buffer.
    NextFit,
    /// Picks the free segment that leaves the least space unused. Ties go to the earliest.
    BestFit,
    /// Picks the largest free segment. Ties go to the earliest.
    WorstFit,
}

impl Strategy {
    /// Every strategy, in declaration order.
    pub const ALL: [Self; 4] = [Self::FirstFit, Self::NextFit, Self::BestFit, Self::WorstFit];

    /// Short lowercase name, as accepted by [`FromStr`].
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::FirstFit => "first",
            Self::NextFit => "next",
            Self::BestFit => "best",
            Self::WorstFit => "worst",
        }
    }

    /// Whether the candidates must be walked starting from the next-fit cursor rather than from
    /// the head of the ledger.
    #[inline]
    pub(crate) const fn resumes(self) -> bool {
        matches!(self, Self::NextFit)
    }

    /// Chooses a segment for a request of `units` among `candidates`, in scan order.
    ///
    /// `candidates` may contain used segments; they are skipped.
    pub(crate) fn select<I>(self, candidates: I, units: usize) -> Option<Segment>
    where
        I: IntoIterator<Item = Segment>,
    {
        let mut fits = candidates
            .into_iter()
            .filter(|segment| segment.is_free() && segment.size() >= units);

        match self {
            Self::FirstFit | Self::NextFit => fits.next(),
            Self::BestFit => {
                let mut best: Option<Segment> = None;
                for segment in fits {
                    if best.map_or(true, |best| segment.size() < best.size()) {
                        best = Some(segment);
                        if segment.size() == units {
                            break;
                        }
                    }
                }
                best
            }
            Self::WorstFit => fits.fold(None, |worst: Option<Segment>, segment| match worst {
                Some(worst) if worst.size() >= segment.size() => Some(worst),
                _ => Some(segment),
            }),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

impl FromStr for Strategy {
    type Err = ParseStrategyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowercase = s.trim().to_ascii_lowercase();
        let name = lowercase
            .strip_suffix("-fit")
            .or_else(|| lowercase.strip_suffix("fit"))
            .unwrap_or(lowercase.as_str());
        Self::ALL
            .into_iter()
            .find(|strategy| strategy.name() == name)
            .ok_or_else(|| ParseStrategyError { name: s.to_owned() })
    }
}
