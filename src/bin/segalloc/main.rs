// Copyright © 2024 Andrea Corbellini and contributors
// SPDX-License-Identifier: BSD-3-Clause

//! Command-line driver: runs a batch of allocation requests against a simulated buffer and
//! reports outcomes, fragmentation and timing.

mod input;

use anyhow::bail;
use anyhow::Context;
use clap::Parser;
use segalloc::meter;
use segalloc::meter::BatchReport;
use segalloc::Blocks;
use segalloc::Bytes;
use segalloc::Granularity;
use segalloc::Listing;
use segalloc::SegmentAllocator;
use segalloc::Strategy;
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "segalloc")]
#[command(about = "Segment-based memory allocator simulator")]
struct Args {
    /// File with the request sizes, in bytes (`-` for standard input)
    sizes: Option<PathBuf>,

    /// Size of the simulated buffer, in bytes
    #[arg(short, long, default_value_t = 1024)]
    capacity: usize,

    /// File with the sizes of the initial free chunks; overrides --capacity
    #[arg(long)]
    chunks: Option<PathBuf>,

    /// Placement strategy: first, next, best or worst
    #[arg(short, long, default_value_t = Strategy::FirstFit)]
    strategy: Strategy,

    /// Allocation unit in bytes: 1 counts exact bytes, 8, 16, 32 or 64 round requests up to
    /// whole blocks
    #[arg(short, long, default_value_t = 1, value_parser = parse_block_size)]
    block_size: usize,

    /// Print the memory map after the run
    #[arg(long)]
    show: bool,

    /// Bytes per character in the memory map (defaults to the block size)
    #[arg(long)]
    cell: Option<usize>,

    /// Run the same requests with every strategy and print one summary line each
    #[arg(long, conflicts_with = "strategy")]
    compare: bool,

    /// Run the built-in allocate/free scenario instead of reading sizes
    #[arg(long, conflicts_with_all = ["sizes", "chunks", "compare"])]
    demo: bool,
}

const BLOCK_SIZES: [usize; 5] = [1, 8, 16, 32, 64];

fn parse_block_size(value: &str) -> Result<usize, String> {
    let size = value.parse::<usize>().map_err(|err| format!("{err}"))?;
    if BLOCK_SIZES.contains(&size) {
        Ok(size)
    } else {
        Err(format!("unsupported block size {size}: expected 1, 8, 16, 32 or 64"))
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();
    log::debug!("{args:?}");

    match args.block_size {
        1 => run::<Bytes>(&args),
        8 => run::<Blocks<8>>(&args),
        16 => run::<Blocks<16>>(&args),
        32 => run::<Blocks<32>>(&args),
        64 => run::<Blocks<64>>(&args),
        other => bail!("unsupported block size {other}: expected 1, 8, 16, 32 or 64"),
    }
}

fn run<G: Granularity>(args: &Args) -> anyhow::Result<()> {
    if args.demo {
        return demo::<G>(args);
    }

    let Some(path) = &args.sizes else {
        bail!("no sizes file given (use --demo to run the built-in scenario)");
    };
    let sizes = input::read_sizes(path)?;

    if args.compare {
        for strategy in Strategy::ALL {
            let mut allocator = setup::<G>(args, strategy)?;
            let report = meter::run_batch(&mut allocator, sizes.iter().copied());
            print_summary(&allocator, &report);
        }
        return Ok(());
    }

    let mut allocator = setup::<G>(args, args.strategy)?;
    let report = meter::run_batch(&mut allocator, sizes.iter().copied());
    for (number, request) in report.requests.iter().enumerate() {
        match request.outcome {
            Ok(address) => println!(
                "{:>5}  {:>8} bytes  at {address:<8}  fragmentation {:6.2}%",
                number + 1,
                request.size,
                request.fragmentation
            ),
            Err(err) => println!(
                "{:>5}  {:>8} bytes  failed: {err}  fragmentation {:6.2}%",
                number + 1,
                request.size,
                request.fragmentation
            ),
        }
    }
    print_summary(&allocator, &report);

    if args.show {
        print_map(&allocator, args);
    }
    Ok(())
}

fn setup<G: Granularity>(args: &Args, strategy: Strategy) -> anyhow::Result<SegmentAllocator<G>> {
    match &args.chunks {
        Some(path) => {
            let chunks = input::read_sizes(path)?;
            SegmentAllocator::with_chunks(&chunks, strategy)
                .with_context(|| format!("cannot set up chunks from {}", path.display()))
        }
        None => SegmentAllocator::new(args.capacity, strategy)
            .with_context(|| format!("cannot set up a buffer of {} bytes", args.capacity)),
    }
}

fn print_summary<G: Granularity>(allocator: &SegmentAllocator<G>, report: &BatchReport) {
    let usage = allocator.usage();
    println!(
        "{:>5}-fit: {}/{} requests, {} bytes requested, {}/{} bytes used, \
         {} free segments, largest {} bytes, fragmentation {:.2}%, {:?}",
        allocator.strategy(),
        report.succeeded(),
        report.requests.len(),
        report.bytes_allocated(),
        usage.used,
        usage.total,
        usage.segments - usage.objects,
        usage.largest_free,
        report.final_fragmentation(),
        report.elapsed,
    );
}

fn print_map<G: Granularity>(allocator: &SegmentAllocator<G>, args: &Args) {
    let snapshot = allocator.snapshot();
    println!("{}", snapshot.render(args.cell.unwrap_or(allocator.quantum())));
    log::info!("{}", Listing(&snapshot));
}

#[derive(Copy, Clone, Debug)]
enum Step {
    Allocate(&'static str, usize),
    Free(&'static str),
    Show,
}

const DEMO: &[Step] = &[
    Step::Allocate("a", 128),
    Step::Allocate("b", 256),
    Step::Allocate("c", 512),
    Step::Show,
    Step::Free("a"),
    Step::Free("c"),
    Step::Show,
    Step::Allocate("d", 64),
    Step::Show,
    Step::Free("b"),
    Step::Show,
    Step::Allocate("e", 128),
    Step::Show,
];

fn demo<G: Granularity>(args: &Args) -> anyhow::Result<()> {
    let mut allocator = SegmentAllocator::<G>::new(args.capacity, args.strategy)
        .with_context(|| format!("cannot set up a buffer of {} bytes", args.capacity))?;
    let mut names = BTreeMap::new();

    for step in DEMO {
        match *step {
            Step::Allocate(name, size) => match allocator.allocate(size) {
                Ok(address) => {
                    println!("{name} = allocate({size}) -> {address}");
                    names.insert(name, address);
                }
                Err(err) => println!("{name} = allocate({size}) failed: {err}"),
            },
            Step::Free(name) => match names.remove(name) {
                Some(address) => {
                    let freed = allocator.free(address)?;
                    println!("free({name}) -> {freed} bytes");
                }
                None => println!("free({name}) skipped: not allocated"),
            },
            Step::Show => {
                print_map(&allocator, args);
                println!("fragmentation {:.2}%", allocator.fragmentation());
            }
        }
    }
    Ok(())
}
