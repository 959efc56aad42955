//! Property-based tests for the bucket-and-page allocator's accounting,
//! non-overlap, and size-class dispatch invariants.

use std::collections::HashSet;

use allocbench::{Allocator, BackingMemory, McKusickKarelsAllocator};
use proptest::prelude::*;

const REGION_SIZE: usize = 4 * 1024 * 1024;

fn new_mck() -> (BackingMemory, McKusickKarelsAllocator) {
    let region = BackingMemory::acquire(REGION_SIZE, 4096).expect("backing memory");
    let allocator = unsafe { McKusickKarelsAllocator::new(region.base(), region.len()) };
    (region, allocator)
}

proptest! {
    /// MK-P1: used_bytes never exceeds total_bytes.
    #[test]
    fn accounting_stays_in_bounds(sizes in prop::collection::vec(1usize..=16384, 1..200)) {
        let (_region, mut mck) = new_mck();
        for size in sizes {
            mck.alloc(size);
            prop_assert!(mck.used_bytes() <= mck.total_bytes());
        }
    }

    /// MK-P2: live allocations never alias.
    #[test]
    fn live_allocations_do_not_overlap(sizes in prop::collection::vec(1usize..=4096, 1..100)) {
        let (_region, mut mck) = new_mck();
        let mut ranges: Vec<(usize, usize)> = Vec::new();

        for size in sizes {
            if let Some(ptr) = mck.alloc(size) {
                let start = ptr.as_ptr() as usize;
                let end = start + size;
                for &(s, e) in &ranges {
                    prop_assert!(end <= s || start >= e);
                }
                ranges.push((start, end));
            }
        }
    }

    /// MK-P3: draining every live allocation returns used_bytes to zero.
    #[test]
    fn full_drain_returns_to_zero(sizes in prop::collection::vec(1usize..=4096, 1..150)) {
        let (_region, mut mck) = new_mck();
        let mut ptrs = Vec::new();
        for size in sizes {
            if let Some(ptr) = mck.alloc(size) {
                ptrs.push(ptr);
            }
        }
        for ptr in ptrs {
            mck.free(Some(ptr));
        }
        prop_assert_eq!(mck.used_bytes(), 0);
    }

    /// MK-P4: requests at or below the dispatch boundary cost no more
    /// than one page; requests above it are served by whole pages.
    #[test]
    fn dispatch_boundary_behaves(size in 1usize..=8192usize) {
        let (_region, mut mck) = new_mck();
        let before = mck.used_bytes();
        if mck.alloc(size).is_some() {
            let served = mck.used_bytes() - before;
            if size <= 2048 {
                prop_assert!(served <= 4096);
            } else {
                prop_assert!(served % 4096 == 0);
            }
        }
    }

    /// Addresses returned across a batch of allocations are distinct.
    #[test]
    fn addresses_are_distinct(sizes in prop::collection::vec(1usize..=2048, 1..100)) {
        let (_region, mut mck) = new_mck();
        let mut seen = HashSet::new();
        for size in sizes {
            if let Some(ptr) = mck.alloc(size) {
                prop_assert!(seen.insert(ptr.as_ptr() as usize));
            }
        }
    }

    /// A single alloc immediately followed by its free returns used_bytes
    /// to zero, and a leading null free is a no-op.
    #[test]
    fn null_free_is_safe(size in 1usize..=2048) {
        let (_region, mut mck) = new_mck();
        mck.free(None);
        if let Some(ptr) = mck.alloc(size) {
            mck.free(Some(ptr));
            prop_assert_eq!(mck.used_bytes(), 0);
        }
    }

    /// P7: a repeated free on an already-freed bucket block must not
    /// re-link it into the free list or double-subtract used_bytes.
    #[test]
    fn double_free_is_safe(size in 1usize..=2048) {
        let (_region, mut mck) = new_mck();
        if let Some(ptr) = mck.alloc(size) {
            mck.free(Some(ptr));
            mck.free(Some(ptr));
            prop_assert_eq!(mck.used_bytes(), 0);
        }
    }
}
