//! Binary buddy allocator.
//!
//! The region is a binary tree of power-of-two blocks. Every block, free
//! or allocated, starts with a [`BlockHeader`]; free blocks of the same
//! size are threaded into one doubly-linked list per level.

use core::mem::size_of;
use core::ptr::NonNull;

use crate::allocator::Allocator;

/// Smallest block the allocator will ever hand out, header included.
pub const MIN_BLOCK: usize = 32;
/// Upper bound on the number of levels; also the size of the free-list array.
pub const MAX_LEVELS: usize = 32;

/// In-band header at the start of every block, whether free or allocated.
#[repr(C)]
struct BlockHeader {
    prev: Option<NonNull<BlockHeader>>,
    next: Option<NonNull<BlockHeader>>,
    level: usize,
    is_free: bool,
}

/// A binary buddy allocator over a caller-supplied region.
///
/// The region is treated as a binary tree of power-of-two blocks: every
/// allocation is rounded up to the smallest block that fits, splitting
/// a larger free block as needed; every free coalesces with its buddy
/// whenever possible.
pub struct BuddyAllocator {
    base: NonNull<u8>,
    total_bytes: usize,
    used_bytes: usize,
    max_level: usize,
    free_lists: [Option<NonNull<BlockHeader>>; MAX_LEVELS],
}

impl BuddyAllocator {
    /// Build a buddy allocator managing `region_size` bytes starting at
    /// `base`.
    ///
    /// # Safety
    ///
    /// `base` must point to at least `region_size` writable, otherwise
    /// unaliased bytes that live at least as long as the returned
    /// allocator. The allocator takes over that memory as in-band
    /// metadata storage immediately.
    pub unsafe fn new(base: NonNull<u8>, region_size: usize) -> Self {
        let header_size = size_of::<BlockHeader>();
        let mut max_level = 0usize;
        let mut block_size = MIN_BLOCK;
        while block_size < region_size && max_level < MAX_LEVELS - 1 {
            block_size <<= 1;
            max_level += 1;
        }
        let total_bytes = MIN_BLOCK << max_level;

        let mut allocator = Self {
            base,
            total_bytes,
            used_bytes: 0,
            max_level,
            free_lists: [None; MAX_LEVELS],
        };

        if total_bytes >= header_size {
            let root = base.cast::<BlockHeader>();
            root.as_ptr().write(BlockHeader {
                prev: None,
                next: None,
                level: max_level,
                is_free: true,
            });
            allocator.free_lists[max_level] = Some(root);
        } else {
            // Region too small to hold even one header: construct a
            // permanently-empty allocator (§6).
            allocator.total_bytes = 0;
        }

        allocator
    }

    fn header_size() -> usize {
        size_of::<BlockHeader>()
    }

    fn level_to_size(level: usize) -> usize {
        MIN_BLOCK << level
    }

    /// Smallest level whose block can hold `size` payload bytes plus a
    /// header, or `None` if even the largest managed block is too small.
    fn size_to_level(&self, size: usize) -> Option<usize> {
        let needed = size + Self::header_size();
        let mut level = 0usize;
        let mut block_size = MIN_BLOCK;
        while block_size < needed {
            if level >= self.max_level {
                return None;
            }
            block_size <<= 1;
            level += 1;
        }
        Some(level)
    }

    fn offset_of(&self, block: NonNull<BlockHeader>) -> usize {
        block.as_ptr() as usize - self.base.as_ptr() as usize
    }

    /// Buddy of `block`, if it lies fully within the managed region.
    fn buddy_of(&self, block: NonNull<BlockHeader>, level: usize) -> Option<NonNull<BlockHeader>> {
        let size = Self::level_to_size(level);
        let offset = self.offset_of(block);
        let buddy_offset = offset ^ size;
        if buddy_offset + size > self.total_bytes {
            return None;
        }
        let addr = self.base.as_ptr() as usize + buddy_offset;
        NonNull::new(addr as *mut BlockHeader)
    }

    /// # Safety
    /// `block` must point at a live `BlockHeader` inside this allocator's
    /// region whose `level` field is accurate.
    unsafe fn remove_from_free_list(&mut self, mut block: NonNull<BlockHeader>) {
        let level = block.as_ref().level;
        if level >= MAX_LEVELS {
            return;
        }
        let (prev, next) = (block.as_ref().prev, block.as_ref().next);
        match prev {
            Some(mut p) => p.as_mut().next = next,
            None => self.free_lists[level] = next,
        }
        if let Some(mut n) = next {
            n.as_mut().prev = prev;
        }
        block.as_mut().prev = None;
        block.as_mut().next = None;
    }

    /// # Safety
    /// `block` must point at a live `BlockHeader` inside this allocator's
    /// region whose `level` field is accurate and not already linked.
    unsafe fn add_to_free_list(&mut self, mut block: NonNull<BlockHeader>) {
        let level = block.as_ref().level;
        if level >= MAX_LEVELS {
            return;
        }
        let head = self.free_lists[level];
        block.as_mut().next = head;
        block.as_mut().prev = None;
        block.as_mut().is_free = true;
        if let Some(mut h) = head {
            h.as_mut().prev = Some(block);
        }
        self.free_lists[level] = Some(block);
    }

    /// Halve `block` down to `target_level`, threading each newly formed
    /// buddy into its own free list.
    ///
    /// Every block reachable from a free list occupies a range fully
    /// inside the managed region (true of the root block, and preserved
    /// by induction: a split's buddy occupies the upper half of a range
    /// that was already fully inside). So the new buddy's header always
    /// fits; there is no abort path to a partially-split block.
    ///
    /// # Safety
    /// `block` must currently be off every free list (just popped) and
    /// `block.level >= target_level`.
    unsafe fn split_block(&mut self, mut block: NonNull<BlockHeader>, target_level: usize) {
        while block.as_ref().level > target_level {
            let level = block.as_ref().level - 1;
            let new_size = Self::level_to_size(level);
            let buddy_addr = block.as_ptr() as usize + new_size;
            debug_assert!(
                buddy_addr + Self::header_size() <= self.base.as_ptr() as usize + self.total_bytes
            );

            block.as_mut().level = level;
            let mut buddy = NonNull::new_unchecked(buddy_addr as *mut BlockHeader);
            buddy.as_ptr().write(BlockHeader {
                prev: None,
                next: None,
                level,
                is_free: true,
            });
            self.add_to_free_list(buddy);
        }
    }

    /// Repeatedly merge `block` with its buddy while both are free and
    /// the same size.
    ///
    /// # Safety
    /// `block` must point at a live, free `BlockHeader` already linked
    /// into its free list.
    unsafe fn merge_block(&mut self, mut block: NonNull<BlockHeader>) {
        while block.as_ref().level < self.max_level {
            let level = block.as_ref().level;
            let Some(buddy) = self.buddy_of(block, level) else {
                break;
            };
            if !buddy.as_ref().is_free || buddy.as_ref().level != level {
                break;
            }

            self.remove_from_free_list(buddy);
            self.remove_from_free_list(block);

            let merged = if buddy.as_ptr() < block.as_ptr() { buddy } else { block };
            let mut merged = merged;
            merged.as_mut().level = level + 1;
            self.add_to_free_list(merged);
            block = merged;
        }
    }
}

impl Allocator for BuddyAllocator {
    fn alloc(&mut self, size: usize) -> Option<NonNull<u8>> {
        if size == 0 || self.total_bytes == 0 {
            return None;
        }

        let Some(level) = self.size_to_level(size) else {
            return None;
        };

        let mut search_level = level;
        while search_level <= self.max_level && self.free_lists[search_level].is_none() {
            search_level += 1;
        }
        if search_level > self.max_level {
            return None;
        }

        let block = self.free_lists[search_level]?;
        // SAFETY: `block` is the head of `free_lists[search_level]`, a
        // live free block owned by this allocator.
        unsafe {
            self.remove_from_free_list(block);
            if search_level > level {
                self.split_block(block, level);
            }
        }

        // SAFETY: `block` is off every free list and, after the split
        // above, sits exactly at `level`.
        unsafe {
            let mut b = block;
            b.as_mut().is_free = false;
        }
        self.used_bytes += Self::level_to_size(level);

        let payload = unsafe { (block.as_ptr() as *mut u8).add(Self::header_size()) };
        NonNull::new(payload)
    }

    fn free(&mut self, ptr: Option<NonNull<u8>>) {
        let Some(ptr) = ptr else { return };
        if self.total_bytes == 0 {
            return;
        }

        let base_addr = self.base.as_ptr() as usize;
        let ptr_addr = ptr.as_ptr() as usize;
        if ptr_addr <= base_addr || ptr_addr >= base_addr + self.total_bytes {
            return;
        }

        let header_size = Self::header_size();
        if ptr_addr < base_addr + header_size {
            return;
        }
        let block_addr = ptr_addr - header_size;
        let Some(block) = NonNull::new(block_addr as *mut BlockHeader) else {
            return;
        };

        // SAFETY: `block_addr` is inside the managed region and aligned
        // to `BlockHeader` because every block boundary is.
        unsafe {
            let header = block.as_ref();
            if header.level > self.max_level || header.is_free {
                return;
            }

            self.used_bytes -= Self::level_to_size(header.level);
            self.add_to_free_list(block);
            self.merge_block(block);
        }
    }

    fn name(&self) -> &'static str {
        "Buddy Allocator"
    }

    fn used_bytes(&self) -> usize {
        self.used_bytes
    }

    fn total_bytes(&self) -> usize {
        self.total_bytes
    }
}
