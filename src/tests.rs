// Copyright © 2024 Andrea Corbellini and contributors
// SPDX-License-Identifier: BSD-3-Clause

use crate::AllocError;
use crate::Granularity;
use crate::SegmentAllocator;
use crate::SegmentInfo;
use crate::SetupError;
use crate::Strategy;
use rand::rngs::SmallRng;
use rand::Rng;
use rand::SeedableRng;

fn check<G: Granularity>(allocator: &SegmentAllocator<G>) {
    allocator.ledger.assert_integrity();
    let total: usize = allocator.segments().map(|s| s.size).sum();
    assert_eq!(total, allocator.capacity(), "segment sizes do not add up");
    let fragmentation = allocator.fragmentation();
    assert!(
        (0.0..=100.0).contains(&fragmentation),
        "fragmentation out of bounds: {fragmentation}"
    );
}

fn check_coalesced<G: Granularity>(allocator: &SegmentAllocator<G>) {
    check(allocator);
    allocator.ledger.assert_coalesced();
}

fn fresh<G: Granularity>(strategy: Strategy) {
    let q = G::quantum();
    let allocator = SegmentAllocator::<G>::new(64 * q, strategy).unwrap();
    check_coalesced(&allocator);
    assert_eq!(allocator.capacity(), 64 * q);
    assert_eq!(allocator.cursor(), 0);
    assert_eq!(
        allocator.snapshot().segments(),
        [SegmentInfo {
            offset: 0,
            size: 64 * q,
            used: false,
        }]
    );
    assert_eq!(allocator.fragmentation(), 0.0);
}

fn sequential<G: Granularity>(strategy: Strategy) {
    let q = G::quantum();
    let mut allocator = SegmentAllocator::<G>::new(64 * q, strategy).unwrap();

    assert_eq!(allocator.allocate(8 * q), Ok(0));
    assert_eq!(allocator.allocate(16 * q), Ok(8 * q));
    assert_eq!(allocator.allocate(32 * q), Ok(24 * q));
    check_coalesced(&allocator);

    let usage = allocator.usage();
    assert_eq!(usage.used, 56 * q);
    assert_eq!(usage.free, 8 * q);
    assert_eq!(usage.objects, 3);
    assert_eq!(usage.segments, 4);
}

fn rounding<G: Granularity>(strategy: Strategy) {
    let q = G::quantum();
    let mut allocator = SegmentAllocator::<G>::new(64 * q, strategy).unwrap();

    let a = allocator.allocate(1).unwrap();
    let b = allocator.allocate(q + 1).unwrap();
    assert_eq!(a, 0);
    assert_eq!(b, q);
    assert_eq!(allocator.data(a).unwrap().len(), q);
    assert_eq!(allocator.data(b).unwrap().len(), (q + 1).div_ceil(q) * q);
    assert_eq!(allocator.free(b), Ok((q + 1).div_ceil(q) * q));
    check_coalesced(&allocator);
}

fn zero_size<G: Granularity>(strategy: Strategy) {
    let q = G::quantum();
    let mut allocator = SegmentAllocator::<G>::new(16 * q, strategy).unwrap();
    let before = allocator.snapshot();
    assert_eq!(allocator.allocate(0), Err(AllocError::ZeroSizeRequest));
    assert_eq!(allocator.snapshot(), before);
}

fn round_trip<G: Granularity>(strategy: Strategy) {
    let q = G::quantum();
    let mut allocator = SegmentAllocator::<G>::new(64 * q, strategy).unwrap();
    let keep = allocator.allocate(10 * q).unwrap();
    let before = allocator.snapshot();

    let address = allocator.allocate(7 * q).unwrap();
    assert_ne!(allocator.snapshot(), before);
    assert_eq!(allocator.free(address), Ok(7 * q));
    assert_eq!(allocator.snapshot(), before);
    check_coalesced(&allocator);

    allocator.free(keep).unwrap();
    assert_eq!(allocator.usage().segments, 1);
}

fn exhaustion<G: Granularity>(strategy: Strategy) {
    let q = G::quantum();
    let mut allocator = SegmentAllocator::<G>::new(64 * q, strategy).unwrap();
    let addresses: Vec<_> = (0..8).map(|_| allocator.allocate(8 * q).unwrap()).collect();
    for &address in addresses.iter().step_by(2) {
        allocator.free(address).unwrap();
    }
    check_coalesced(&allocator);

    // 32 units free in total, but no free segment is larger than 8 units
    let before = allocator.snapshot();
    assert_eq!(
        allocator.allocate(9 * q),
        Err(AllocError::NoSpace { size: 9 * q })
    );
    assert_eq!(allocator.snapshot(), before);
    assert_eq!(allocator.fragmentation(), 75.0);
}

fn too_large<G: Granularity>(strategy: Strategy) {
    let q = G::quantum();
    let mut allocator = SegmentAllocator::<G>::new(64 * q, strategy).unwrap();
    assert!(allocator.allocate(64 * q + 1).is_err());
    assert_eq!(allocator.allocate(64 * q), Ok(0));
    assert_eq!(
        allocator.allocate(1),
        Err(AllocError::NoSpace { size: 1 })
    );
    assert_eq!(allocator.fragmentation(), 0.0);
}

fn double_free<G: Granularity>(strategy: Strategy) {
    let q = G::quantum();
    let mut allocator = SegmentAllocator::<G>::new(64 * q, strategy).unwrap();
    let a = allocator.allocate(4 * q).unwrap();
    let _b = allocator.allocate(4 * q).unwrap();

    assert_eq!(allocator.free(a), Ok(4 * q));
    let before = allocator.snapshot();
    assert_eq!(allocator.free(a), Err(AllocError::InvalidFree { address: a }));
    assert_eq!(allocator.snapshot(), before);
}

fn invalid_free<G: Granularity>(strategy: Strategy) {
    let q = G::quantum();
    let mut allocator = SegmentAllocator::<G>::new(64 * q, strategy).unwrap();
    let a = allocator.allocate(4 * q).unwrap();
    let before = allocator.snapshot();

    // Interior address, start of the free remainder, past the end
    for address in [a + 1, a + 4 * q, 64 * q, usize::MAX] {
        assert_eq!(
            allocator.free(address),
            Err(AllocError::InvalidFree { address })
        );
    }
    assert_eq!(allocator.snapshot(), before);
}

fn data<G: Granularity>(strategy: Strategy) {
    let q = G::quantum();
    let mut allocator = SegmentAllocator::<G>::new(64 * q, strategy).unwrap();
    let a = allocator.allocate(5).unwrap();
    let b = allocator.allocate(5).unwrap();

    allocator.data_mut(a).unwrap()[..5].copy_from_slice(b"hello");
    allocator.data_mut(b).unwrap()[..5].copy_from_slice(b"world");
    assert_eq!(&allocator.data(a).unwrap()[..5], b"hello");
    assert_eq!(&allocator.data(b).unwrap()[..5], b"world");

    allocator.free(a).unwrap();
    assert!(allocator.data(a).is_none());
    let c = allocator.allocate_with(Strategy::FirstFit, 5).unwrap();
    assert_eq!(c, a);
    assert!(allocator.data(c).unwrap().iter().all(|&byte| byte == 0));
    assert_eq!(&allocator.data(b).unwrap()[..5], b"world");
}

fn chunks<G: Granularity>(strategy: Strategy) {
    let q = G::quantum();
    let mut allocator =
        SegmentAllocator::<G>::with_chunks(&[50 * q, 120 * q, 30 * q], strategy).unwrap();
    check(&allocator);
    assert_eq!(allocator.capacity(), 200 * q);
    assert_eq!(allocator.usage().segments, 3);

    // Only direct neighbours are merged: the worst-fit allocation sits between the first two
    // chunks and joins them, the others leave the chunks as they were
    let (expected, segments) = match strategy {
        Strategy::FirstFit | Strategy::NextFit | Strategy::BestFit => (0, 3),
        Strategy::WorstFit => (50 * q, 2),
    };
    let address = allocator.allocate(40 * q).unwrap();
    assert_eq!(address, expected);
    assert_eq!(allocator.usage().segments, 4);

    allocator.free(address).unwrap();
    check(&allocator);
    let usage = allocator.usage();
    assert_eq!(usage.free, 200 * q);
    assert_eq!(usage.segments, segments);
}

fn fill_and_drain<G: Granularity>(strategy: Strategy) {
    let q = G::quantum();
    let mut allocator = SegmentAllocator::<G>::new(100 * q, strategy).unwrap();
    let mut addresses = Vec::new();
    while let Ok(address) = allocator.allocate(3 * q) {
        addresses.push(address);
    }
    assert_eq!(addresses.len(), 33);
    assert_eq!(allocator.allocate(q), Ok(99 * q));
    assert!(allocator.allocate(1).is_err());

    let mut rng = SmallRng::seed_from_u64(54321);
    while !addresses.is_empty() {
        let address = addresses.swap_remove(rng.gen_range(0..addresses.len()));
        allocator.free(address).unwrap();
        check_coalesced(&allocator);
    }
    allocator.free(99 * q).unwrap();
    assert_eq!(allocator.usage().segments, 1);
    assert_eq!(allocator.usage().free, 100 * q);
}

#[cfg(not(miri))]
fn random<G: Granularity>(strategy: Strategy) {
    let q = G::quantum();
    let mut allocator = SegmentAllocator::<G>::new(4096 * q, strategy).unwrap();
    let mut rng = SmallRng::seed_from_u64(12345);
    let mut live = Vec::<usize>::new();

    for _ in 0..2000 {
        match rng.gen_range(0..5) {
            0 | 1 if !live.is_empty() => {
                let address = live.swap_remove(rng.gen_range(0..live.len()));
                allocator.free(address).unwrap();
            }
            _ => {
                let size = rng.gen_range(1..=256 * q);
                match allocator.allocate(size) {
                    Ok(address) => {
                        assert!(!live.contains(&address), "address {address} handed out twice");
                        live.push(address);
                    }
                    Err(err) => {
                        assert_eq!(err, AllocError::NoSpace { size });
                        assert!(allocator.usage().largest_free < size);
                    }
                }
            }
        }
        check_coalesced(&allocator);
    }

    for address in live {
        allocator.free(address).unwrap();
    }
    check_coalesced(&allocator);
    assert_eq!(allocator.usage().segments, 1);
}

fn setup_errors<G: Granularity>() {
    let q = G::quantum();
    let new = |capacity| SegmentAllocator::<G>::new(capacity, Strategy::FirstFit).err();
    let with_chunks = |chunks: &[usize]| {
        SegmentAllocator::<G>::with_chunks(chunks, Strategy::FirstFit).err()
    };

    assert_eq!(
        new(q - 1),
        Some(SetupError::ZeroCapacity {
            capacity: q - 1,
            quantum: q,
        })
    );
    assert_eq!(
        with_chunks(&[]),
        Some(SetupError::ZeroCapacity {
            capacity: 0,
            quantum: q,
        })
    );
    assert_eq!(
        with_chunks(&[10, 0, 5]),
        Some(SetupError::ZeroSizedChunk { index: 1 })
    );
    assert_eq!(
        with_chunks(&[0, 0]),
        Some(SetupError::ZeroSizedChunk { index: 0 })
    );

    // Sums past `usize::MAX`, and buffers past `isize::MAX` bytes
    assert_eq!(new(usize::MAX), Some(SetupError::Overflow));
    assert_eq!(with_chunks(&[usize::MAX, 1]), Some(SetupError::Overflow));
    assert_eq!(
        with_chunks(&[usize::MAX / 2 + 1]),
        Some(SetupError::Overflow)
    );
    assert_eq!(
        with_chunks(&[isize::MAX as usize / 2, isize::MAX as usize / 2, 2 * q]),
        Some(SetupError::Overflow)
    );

    // A failed setup does not prevent later ones
    assert!(with_chunks(&[q, 2 * q]).is_none());
}

fn next_fit_wraps<G: Granularity>() {
    let q = G::quantum();
    let mut allocator = SegmentAllocator::<G>::new(10 * q, Strategy::NextFit).unwrap();
    let a = allocator.allocate(4 * q).unwrap();
    let b = allocator.allocate(4 * q).unwrap();
    assert_eq!(allocator.cursor(), b);

    allocator.free(a).unwrap();
    // The scan starts at `b`, finds the tail too small and wraps around to `a`
    assert_eq!(allocator.allocate(3 * q), Ok(0));
    assert_eq!(allocator.cursor(), 0);
    // The scan resumes at the segment just allocated, not at the start of the buffer
    assert_eq!(allocator.allocate(q), Ok(3 * q));
    assert_eq!(allocator.allocate(2 * q), Ok(8 * q));
    assert!(allocator.allocate(q).is_err());
    check_coalesced(&allocator);
}

fn next_fit_locality<G: Granularity>() {
    let q = G::quantum();
    let mut allocator =
        SegmentAllocator::<G>::with_chunks(&[50 * q, 8 * q, 120 * q, 30 * q], Strategy::NextFit)
            .unwrap();
    assert_eq!(allocator.allocate(50 * q), Ok(0));
    assert_eq!(allocator.allocate(8 * q), Ok(50 * q));
    allocator.free(0).unwrap();

    // The segment at 0 fits, but the scan starts at the cursor
    assert_eq!(allocator.allocate(40 * q), Ok(58 * q));
    assert_eq!(allocator.allocate_with(Strategy::FirstFit, 40 * q), Ok(0));
    check(&allocator);
}

fn cursor_follows_merges<G: Granularity>() {
    let q = G::quantum();
    let mut allocator = SegmentAllocator::<G>::new(32 * q, Strategy::NextFit).unwrap();
    let a = allocator.allocate(4 * q).unwrap();
    let b = allocator.allocate(4 * q).unwrap();
    assert_eq!(allocator.cursor(), b);

    // Freeing `b` after `a` folds `a` into `b`'s node, moving it back to address 0
    allocator.free(a).unwrap();
    allocator.free(b).unwrap();
    assert_eq!(allocator.cursor(), 0);
    check_coalesced(&allocator);
    assert_eq!(allocator.allocate(q), Ok(0));

    // Freeing in the other order destroys the cursor's node
    let c = allocator.allocate(4 * q).unwrap();
    assert_eq!(allocator.cursor(), c);
    allocator.free(c).unwrap();
    allocator.free(0).unwrap();
    assert_eq!(allocator.cursor(), 0);
    check_coalesced(&allocator);
    assert_eq!(allocator.allocate(32 * q), Ok(0));
}

fn strategy_selection<G: Granularity>() {
    let q = G::quantum();
    let setup = || {
        let mut allocator = SegmentAllocator::<G>::with_chunks(
            &[50 * q, q, 120 * q, q, 30 * q],
            Strategy::FirstFit,
        )
        .unwrap();
        for address in [50 * q, 171 * q] {
            let chosen = allocator.ledger.find(address / q).unwrap();
            allocator.ledger.allocate_from(chosen, 1).unwrap();
        }
        allocator
    };

    let expectations = [
        (Strategy::FirstFit, 0),
        (Strategy::NextFit, 0),
        (Strategy::BestFit, 0),
        (Strategy::WorstFit, 51 * q),
    ];
    for (strategy, expected) in expectations {
        let mut allocator = setup();
        assert_eq!(
            allocator.allocate_with(strategy, 40 * q),
            Ok(expected),
            "{strategy}"
        );
    }

    let mut allocator = setup();
    assert_eq!(allocator.allocate_with(Strategy::BestFit, 25 * q), Ok(172 * q));
    assert_eq!(allocator.allocate_with(Strategy::WorstFit, 25 * q), Ok(51 * q));
}

macro_rules! strategy_tests {
    ( G = $granularity:ty , strategy = $strategy:expr $(,)? ) => {
        #[test]
        fn fresh() {
            $crate::tests::fresh::<$granularity>($strategy)
        }

        #[test]
        fn sequential() {
            $crate::tests::sequential::<$granularity>($strategy)
        }

        #[test]
        fn rounding() {
            $crate::tests::rounding::<$granularity>($strategy)
        }

        #[test]
        fn zero_size() {
            $crate::tests::zero_size::<$granularity>($strategy)
        }

        #[test]
        fn round_trip() {
            $crate::tests::round_trip::<$granularity>($strategy)
        }

        #[test]
        fn exhaustion() {
            $crate::tests::exhaustion::<$granularity>($strategy)
        }

        #[test]
        fn too_large() {
            $crate::tests::too_large::<$granularity>($strategy)
        }

        #[test]
        fn double_free() {
            $crate::tests::double_free::<$granularity>($strategy)
        }

        #[test]
        fn invalid_free() {
            $crate::tests::invalid_free::<$granularity>($strategy)
        }

        #[test]
        fn data() {
            $crate::tests::data::<$granularity>($strategy)
        }

        #[test]
        fn chunks() {
            $crate::tests::chunks::<$granularity>($strategy)
        }

        #[test]
        fn fill_and_drain() {
            $crate::tests::fill_and_drain::<$granularity>($strategy)
        }

        #[test]
        #[cfg(not(miri))]
        fn random() {
            $crate::tests::random::<$granularity>($strategy)
        }
    };
}

macro_rules! common_tests {
    ( G = $granularity:ty $(,)? ) => {
        #[test]
        fn setup_errors() {
            $crate::tests::setup_errors::<$granularity>()
        }

        #[test]
        fn next_fit_wraps() {
            $crate::tests::next_fit_wraps::<$granularity>()
        }

        #[test]
        fn next_fit_locality() {
            $crate::tests::next_fit_locality::<$granularity>()
        }

        #[test]
        fn cursor_follows_merges() {
            $crate::tests::cursor_follows_merges::<$granularity>()
        }

        #[test]
        fn strategy_selection() {
            $crate::tests::strategy_selection::<$granularity>()
        }

        mod first_fit {
            $crate::tests::strategy_tests!(G = $granularity, strategy = $crate::Strategy::FirstFit);
        }

        mod next_fit {
            $crate::tests::strategy_tests!(G = $granularity, strategy = $crate::Strategy::NextFit);
        }

        mod best_fit {
            $crate::tests::strategy_tests!(G = $granularity, strategy = $crate::Strategy::BestFit);
        }

        mod worst_fit {
            $crate::tests::strategy_tests!(G = $granularity, strategy = $crate::Strategy::WorstFit);
        }
    };
}

use common_tests;
use strategy_tests;

#[allow(non_snake_case)]
mod Bytes {
    super::common_tests!(G = crate::Bytes);
}

#[allow(non_snake_case)]
mod Blocks16 {
    super::common_tests!(G = crate::Blocks<16>);
}

#[allow(non_snake_case)]
mod Blocks7 {
    super::common_tests!(G = crate::Blocks<7>);
}

mod properties {
    use crate::AllocError;
    use crate::Blocks;
    use crate::Bytes;
    use crate::Granularity;
    use crate::SegmentAllocator;
    use crate::Strategy;
    use proptest::prelude::*;
    use proptest::strategy::Strategy as _;

    #[derive(Clone, Debug)]
    enum Op {
        Alloc(usize),
        Free(usize),
    }

    fn strategies() -> impl proptest::strategy::Strategy<Value = Strategy> {
        prop::sample::select(Strategy::ALL.to_vec())
    }

    fn ops() -> impl proptest::strategy::Strategy<Value = Vec<Op>> {
        prop::collection::vec(
            prop_oneof![
                3 => (1usize..=300).prop_map(Op::Alloc),
                2 => (0usize..1000).prop_map(Op::Free),
            ],
            0..200,
        )
    }

    fn run<G: Granularity>(strategy: Strategy, ops: Vec<Op>) {
        let mut allocator = SegmentAllocator::<G>::new(2048, strategy).unwrap();
        let mut live = Vec::new();

        for op in ops {
            match op {
                Op::Alloc(size) => match allocator.allocate(size) {
                    Ok(address) => live.push(address),
                    Err(err) => assert_eq!(err, AllocError::NoSpace { size }),
                },
                Op::Free(_) if live.is_empty() => {
                    assert!(allocator.free(0).is_err());
                }
                Op::Free(i) => {
                    let address = live.swap_remove(i % live.len());
                    assert!(allocator.free(address).is_ok());
                    assert!(allocator.free(address).is_err());
                }
            }
            super::check_coalesced(&allocator);
        }

        for address in live {
            allocator.free(address).unwrap();
        }
        assert_eq!(allocator.usage().segments, 1);
        assert_eq!(allocator.fragmentation(), 0.0);
    }

    proptest! {
        #[test]
        #[cfg_attr(miri, ignore)]
        fn bytes_keep_invariants(strategy in strategies(), ops in ops()) {
            run::<Bytes>(strategy, ops);
        }

        #[test]
        #[cfg_attr(miri, ignore)]
        fn blocks_keep_invariants(strategy in strategies(), ops in ops()) {
            run::<Blocks<16>>(strategy, ops);
        }
    }
}
