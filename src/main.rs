//! Acquires two backing regions, builds one allocator of each kind over
//! them, runs an identical random workload against both, and prints a
//! side-by-side comparison.

use allocbench::{
    benchmark::{format_comparison, run_benchmark, BenchmarkConfig},
    BackingMemory, BuddyAllocator, McKusickKarelsAllocator,
};
use rand::SeedableRng;

const MEMORY_SIZE: usize = 64 * 1024 * 1024;
const PAGE_ALIGN: usize = 4096;

fn main() {
    env_logger::init();

    log::info!(
        "allocator benchmark: {} MB pool per allocator",
        MEMORY_SIZE / 1024 / 1024
    );

    let region1 = match BackingMemory::acquire(MEMORY_SIZE, PAGE_ALIGN) {
        Ok(region) => region,
        Err(err) => {
            log::error!("failed to acquire backing memory for buddy allocator: {err}");
            std::process::exit(1);
        }
    };
    let region2 = match BackingMemory::acquire(MEMORY_SIZE, PAGE_ALIGN) {
        Ok(region) => region,
        Err(err) => {
            log::error!("failed to acquire backing memory for McKusick-Karels allocator: {err}");
            std::process::exit(1);
        }
    };

    // SAFETY: `region1`/`region2` each own `MEMORY_SIZE` writable bytes
    // that outlive the allocators built over them below.
    let mut buddy = unsafe { BuddyAllocator::new(region1.base(), region1.len()) };
    let mut mck = unsafe { McKusickKarelsAllocator::new(region2.base(), region2.len()) };

    let config = BenchmarkConfig::default();
    log::debug!(
        "workload: {} operations, sizes {}..={}",
        config.num_operations,
        config.min_size,
        config.max_size
    );

    // Both allocators see the same sequence of sizes and the same free
    // order: each run gets its own rng re-seeded from the same value,
    // rather than sharing one stream (which would let the buddy run's
    // consumption shift what the McKusick-Karels run draws).
    const SEED: u64 = 0xA110_C0DE;

    let mut buddy_rng = rand::rngs::StdRng::seed_from_u64(SEED);
    let buddy_result = run_benchmark(&mut buddy, &config, &mut buddy_rng);

    let mut mck_rng = rand::rngs::StdRng::seed_from_u64(SEED);
    let mck_result = run_benchmark(&mut mck, &config, &mut mck_rng);

    let report = format_comparison(&buddy_result, &mck_result);
    println!("{report}");
    log::info!("benchmark complete");
}
