// Copyright © 2024 Andrea Corbellini and contributors
// SPDX-License-Identifier: BSD-3-Clause

//! Batch runs and timing.
//!
//! [`run_batch`] feeds a list of request sizes to an allocator, records the outcome of every
//! request together with the fragmentation measured right after it, and times the allocation
//! calls with a [`Stopwatch`]. Measurements never influence allocation decisions.

use crate::error::AllocError;
use crate::granularity::Granularity;
use crate::SegmentAllocator;
use std::time::Duration;
use std::time::Instant;

/// Accumulates wall-clock time over one or more bracketed sections.
#[derive(Clone, Debug, Default)]
pub struct Stopwatch {
    elapsed: Duration,
}

impl Stopwatch {
    /// Creates a stopwatch with no recorded time.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            elapsed: Duration::ZERO,
        }
    }

    /// Runs `f`, adding the time it takes to the stopwatch.
    pub fn time<T>(&mut self, f: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let result = f();
        self.elapsed += start.elapsed();
        result
    }

    /// Total time recorded so far.
    #[must_use]
    pub const fn elapsed(&self) -> Duration {
        self.elapsed
    }
}

/// One request of a batch, after it was processed.
#[derive(Clone, PartialEq, Debug)]
pub struct Request {
    /// Requested size, in bytes.
    pub size: usize,
    /// Address of the allocation, or the reason it failed.
    pub outcome: Result<usize, AllocError>,
    /// Fragmentation percentage measured immediately after the request.
    pub fragmentation: f64,
}

impl Request {
    /// Whether the request was satisfied.
    #[inline]
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Result of [`run_batch`].
#[derive(Clone, PartialEq, Debug, Default)]
pub struct BatchReport {
    /// Processed requests, in submission order.
    pub requests: Vec<Request>,
    /// Time spent inside allocation calls.
    pub elapsed: Duration,
}

impl BatchReport {
    /// Number of requests that were satisfied.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.requests.iter().filter(|r| r.succeeded()).count()
    }

    /// Number of requests that failed.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.requests.len() - self.succeeded()
    }

    /// Bytes requested by the satisfied requests.
    #[must_use]
    pub fn bytes_allocated(&self) -> usize {
        self.requests
            .iter()
            .filter(|r| r.succeeded())
            .map(|r| r.size)
            .sum()
    }

    /// Fragmentation after the last request, or `0.0` for an empty batch.
    #[must_use]
    pub fn final_fragmentation(&self) -> f64 {
        self.requests.last().map_or(0.0, |r| r.fragmentation)
    }
}

/// Allocates every size in `sizes`, in order, with the allocator's current strategy.
///
/// Failed requests are recorded and the batch carries on with the next one.
pub fn run_batch<G: Granularity>(
    allocator: &mut SegmentAllocator<G>,
    sizes: impl IntoIterator<Item = usize>,
) -> BatchReport {
    let mut stopwatch = Stopwatch::new();
    let requests = sizes
        .into_iter()
        .map(|size| {
            let outcome = stopwatch.time(|| allocator.allocate(size));
            Request {
                size,
                outcome,
                fragmentation: allocator.fragmentation(),
            }
        })
        .collect();

    BatchReport {
        requests,
        elapsed: stopwatch.elapsed(),
    }
}
