//! The allocator contract shared by every allocator in this crate.
//!
//! Any type implementing [`Allocator`] can be dropped into the benchmark
//! driver in place of another; the driver never looks past this trait.

use core::ptr::NonNull;

/// A capability set common to all allocators managed over a fixed-size,
/// caller-supplied backing region.
///
/// Implementations are single-threaded: no method takes `&self` where
/// interior mutability across threads would be implied, and none of them
/// block or yield.
pub trait Allocator {
    /// Reserve at least `size` bytes and return the address of the first
    /// payload byte, or `None` if the request cannot be satisfied.
    ///
    /// A `size` of zero always returns `None`.
    fn alloc(&mut self, size: usize) -> Option<NonNull<u8>>;

    /// Release an address previously returned by [`Allocator::alloc`] on
    /// this same allocator.
    ///
    /// `None`, an address this allocator did not hand out, or an address
    /// that has already been freed are all silently ignored.
    fn free(&mut self, ptr: Option<NonNull<u8>>);

    /// A short, human-readable name for reports.
    fn name(&self) -> &'static str;

    /// Bytes currently reserved by live allocations.
    fn used_bytes(&self) -> usize;

    /// Total bytes this allocator manages (constant for its lifetime).
    fn total_bytes(&self) -> usize;
}
