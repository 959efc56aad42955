//! Ownership wrapper around the raw byte region handed to an allocator.

use std::alloc::{self, Layout};
use core::ptr::NonNull;

use crate::error::BackingMemoryError;

/// A page-aligned heap allocation owned for the lifetime of one allocator
/// under test.
///
/// `BackingMemory` is the only thing in this crate that talks to the
/// system allocator; everything downstream of construction treats it as
/// a plain `(base, len)` pair. Dropping it deallocates the region, so it
/// must outlive whichever [`crate::allocator::Allocator`] was built over it.
pub struct BackingMemory {
    ptr: NonNull<u8>,
    layout: Layout,
}

impl BackingMemory {
    /// Acquire `size` bytes aligned to `align` from the system allocator.
    pub fn acquire(size: usize, align: usize) -> Result<Self, BackingMemoryError> {
        if size == 0 {
            return Err(BackingMemoryError::LayoutError { size, align });
        }
        let layout = Layout::from_size_align(size, align).map_err(|_| {
            BackingMemoryError::LayoutError { size, align }
        })?;

        // SAFETY: `layout` has non-zero size, checked above, and was
        // validated by `Layout::from_size_align`.
        let raw = unsafe { alloc::alloc(layout) };
        let ptr = NonNull::new(raw).ok_or(BackingMemoryError::AllocationFailed { size, align })?;

        Ok(Self { ptr, layout })
    }

    /// Base address of the region.
    pub fn base(&self) -> NonNull<u8> {
        self.ptr
    }

    /// Size in bytes of the region.
    pub fn len(&self) -> usize {
        self.layout.size()
    }
}

impl Drop for BackingMemory {
    fn drop(&mut self) {
        // SAFETY: `self.ptr`/`self.layout` are exactly what `alloc::alloc`
        // returned and accepted in `acquire`, and this runs at most once.
        unsafe { alloc::dealloc(self.ptr.as_ptr(), self.layout) };
    }
}
