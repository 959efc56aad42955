//! Microbenchmarks for raw alloc/free throughput of both allocators,
//! independent of the crate's own timing in [`allocbench::benchmark`].

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use allocbench::{Allocator, BackingMemory, BuddyAllocator, McKusickKarelsAllocator};

const REGION_SIZE: usize = 16 * 1024 * 1024;

fn bench_alloc_free(c: &mut Criterion) {
    let mut group = c.benchmark_group("alloc_free");

    for &size in &[32usize, 256, 2048, 8192] {
        group.bench_with_input(BenchmarkId::new("buddy", size), &size, |b, &size| {
            let region = BackingMemory::acquire(REGION_SIZE, 4096).unwrap();
            let mut allocator = unsafe { BuddyAllocator::new(region.base(), region.len()) };
            b.iter(|| {
                let ptr = allocator.alloc(black_box(size));
                allocator.free(ptr);
            });
        });

        group.bench_with_input(BenchmarkId::new("mckusick_karels", size), &size, |b, &size| {
            let region = BackingMemory::acquire(REGION_SIZE, 4096).unwrap();
            let mut allocator = unsafe { McKusickKarelsAllocator::new(region.base(), region.len()) };
            b.iter(|| {
                let ptr = allocator.alloc(black_box(size));
                allocator.free(ptr);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_alloc_free);
criterion_main!(benches);
