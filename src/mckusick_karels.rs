//! McKusick-Karels style bucket-and-page allocator.
//!
//! The region splits into a page descriptor table (out-of-band metadata,
//! one [`PageDescriptor`] per data page) followed by a data area of fixed
//! [`PAGE_SIZE`] pages. Small requests are served from per-bucket free
//! lists carved out of whole pages; large requests are served by runs of
//! contiguous pages with an in-band [`LargeBlock`] header.

use core::mem::size_of;
use core::ptr::NonNull;

use crate::allocator::Allocator;

/// Size of one data page.
pub const PAGE_SIZE: usize = 4096;
/// Smallest bucket size class.
pub const MIN_BUCKET_SIZE: usize = 16;
/// Number of power-of-two bucket size classes.
pub const NUM_BUCKETS: usize = 12;
/// Requests above this go through the large-block path.
pub const LARGE_ALLOC_THRESHOLD: usize = PAGE_SIZE;

/// `bucket_index` sentinel: page is on the free-page list.
const FREE_PAGE: usize = usize::MAX;
/// `bucket_index` sentinel: page is part of a large-block run.
const LARGE_PAGE: usize = usize::MAX - 1;

/// Node of a per-bucket free list, written in-band at the start of every
/// unused block.
#[repr(C)]
struct FreeBlock {
    next: Option<NonNull<FreeBlock>>,
}

/// Out-of-band metadata for one data page.
#[repr(C)]
struct PageDescriptor {
    bucket_index: usize,
    alloc_count: usize,
    next: Option<NonNull<PageDescriptor>>,
    prev: Option<NonNull<PageDescriptor>>,
}

/// In-band header at the start of a large-block run.
#[repr(C)]
struct LargeBlock {
    size: usize,
    next: Option<NonNull<LargeBlock>>,
    prev: Option<NonNull<LargeBlock>>,
}

/// A bucket-and-page allocator over a caller-supplied region.
///
/// Small requests are rounded up to a power-of-two bucket size class and
/// served from whole pages carved into equal blocks; requests above
/// `LARGE_ALLOC_THRESHOLD / 2` are served by a run of contiguous pages
/// instead.
pub struct McKusickKarelsAllocator {
    total_bytes: usize,
    used_bytes: usize,

    buckets: [Option<NonNull<FreeBlock>>; NUM_BUCKETS],
    partial_pages: [Option<NonNull<PageDescriptor>>; NUM_BUCKETS],
    free_pages: Option<NonNull<PageDescriptor>>,
    large_blocks: Option<NonNull<LargeBlock>>,

    page_count: usize,
    page_descriptors: NonNull<PageDescriptor>,
    data_start: NonNull<u8>,
}

impl McKusickKarelsAllocator {
    /// Build an allocator managing `region_size` bytes starting at `base`.
    ///
    /// A prefix of the region (rounded up to a whole number of pages) is
    /// reserved for the page descriptor table; the rest is carved into
    /// [`PAGE_SIZE`] data pages.
    ///
    /// # Safety
    ///
    /// `base` must point to at least `region_size` writable, otherwise
    /// unaliased bytes that live at least as long as the returned
    /// allocator. The allocator takes over that memory as in-band and
    /// out-of-band metadata storage immediately.
    pub unsafe fn new(base: NonNull<u8>, region_size: usize) -> Self {
        let max_pages = region_size / PAGE_SIZE;
        let descriptor_space_raw = size_of::<PageDescriptor>() * max_pages;
        let descriptor_space = (descriptor_space_raw + PAGE_SIZE - 1) / PAGE_SIZE * PAGE_SIZE;

        let page_descriptors = base.cast::<PageDescriptor>();
        let data_start = NonNull::new_unchecked(base.as_ptr().add(descriptor_space));
        let page_count = region_size.saturating_sub(descriptor_space) / PAGE_SIZE;

        let mut allocator = Self {
            total_bytes: region_size,
            used_bytes: 0,
            buckets: [None; NUM_BUCKETS],
            partial_pages: [None; NUM_BUCKETS],
            free_pages: None,
            large_blocks: None,
            page_count,
            page_descriptors,
            data_start,
        };

        if page_count == 0 {
            return allocator;
        }

        for i in 0..page_count {
            let mut desc = NonNull::new_unchecked(page_descriptors.as_ptr().add(i));
            let next = if i + 1 < page_count {
                Some(NonNull::new_unchecked(page_descriptors.as_ptr().add(i + 1)))
            } else {
                None
            };
            let prev = if i > 0 {
                Some(NonNull::new_unchecked(page_descriptors.as_ptr().add(i - 1)))
            } else {
                None
            };
            desc.as_ptr().write(PageDescriptor {
                bucket_index: FREE_PAGE,
                alloc_count: 0,
                next,
                prev,
            });
        }
        allocator.free_pages = Some(NonNull::new_unchecked(page_descriptors.as_ptr()));

        allocator
    }

    fn size_to_bucket(&self, size: usize) -> usize {
        let size = size.max(MIN_BUCKET_SIZE);
        let mut bucket = 0usize;
        let mut bucket_size = MIN_BUCKET_SIZE;
        while bucket_size < size && bucket < NUM_BUCKETS - 1 {
            bucket_size <<= 1;
            bucket += 1;
        }
        bucket
    }

    fn bucket_to_size(bucket: usize) -> usize {
        MIN_BUCKET_SIZE << bucket
    }

    /// Descriptor index of the page, if any, that `ptr` falls inside.
    fn page_index_of(&self, ptr: NonNull<u8>) -> Option<usize> {
        let ptr_addr = ptr.as_ptr() as usize;
        let data_addr = self.data_start.as_ptr() as usize;
        if ptr_addr < data_addr {
            return None;
        }
        let index = (ptr_addr - data_addr) / PAGE_SIZE;
        if index >= self.page_count {
            return None;
        }
        Some(index)
    }

    /// # Safety
    /// `index` must be `< self.page_count`.
    unsafe fn descriptor_at(&self, index: usize) -> NonNull<PageDescriptor> {
        NonNull::new_unchecked(self.page_descriptors.as_ptr().add(index))
    }

    /// # Safety
    /// `page` must be a live descriptor owned by this allocator.
    unsafe fn descriptor_index(&self, page: NonNull<PageDescriptor>) -> usize {
        page.as_ptr().offset_from(self.page_descriptors.as_ptr()) as usize
    }

    /// Pop the head of the global free-page list, carve it into
    /// `bucket`-sized blocks, and thread it onto `partial_pages[bucket]`.
    ///
    /// # Safety
    /// No block in the region aliases another; standard for a fresh
    /// allocator construction plus exclusive `&mut self` access.
    unsafe fn allocate_page(&mut self, bucket: usize) -> Option<NonNull<PageDescriptor>> {
        let mut page = self.free_pages?;
        self.free_pages = page.as_ref().next;
        if let Some(mut next) = self.free_pages {
            next.as_mut().prev = None;
        }

        page.as_mut().bucket_index = bucket;
        page.as_mut().alloc_count = 0;

        let block_size = Self::bucket_to_size(bucket);
        let blocks_per_page = PAGE_SIZE / block_size;
        let page_index = self.descriptor_index(page);
        if page_index >= self.page_count {
            return None;
        }

        let page_start = self.data_start.as_ptr().add(page_index * PAGE_SIZE);
        for i in 0..blocks_per_page {
            let mut block = NonNull::new_unchecked(page_start.add(i * block_size) as *mut FreeBlock);
            block.as_mut().next = self.buckets[bucket];
            self.buckets[bucket] = Some(block);
        }

        page.as_mut().next = self.partial_pages[bucket];
        page.as_mut().prev = None;
        if let Some(mut head) = self.partial_pages[bucket] {
            head.as_mut().prev = Some(page);
        }
        self.partial_pages[bucket] = Some(page);

        Some(page)
    }

    fn allocate_from_bucket(&mut self, bucket: usize) -> Option<NonNull<u8>> {
        if bucket >= NUM_BUCKETS {
            return None;
        }

        if self.buckets[bucket].is_none() {
            // SAFETY: exclusive access via `&mut self`.
            unsafe { self.allocate_page(bucket)? };
        }

        let block = self.buckets[bucket]?;
        // SAFETY: `block` is the head of a live per-bucket free list.
        unsafe {
            self.buckets[bucket] = block.as_ref().next;

            let ptr = NonNull::new_unchecked(block.as_ptr() as *mut u8);
            if let Some(index) = self.page_index_of(ptr) {
                let mut page = self.descriptor_at(index);
                page.as_mut().alloc_count += 1;
            }
        }

        self.used_bytes += Self::bucket_to_size(bucket);
        Some(unsafe { NonNull::new_unchecked(block.as_ptr() as *mut u8) })
    }

    /// Find `pages_needed` contiguous pages by walking the free-page list
    /// in list order (not index order), matching a single forward pass
    /// over the list's current head-insertion order.
    fn allocate_large(&mut self, size: usize) -> Option<NonNull<u8>> {
        let total_size = size + size_of::<LargeBlock>();
        let pages_needed = (total_size + PAGE_SIZE - 1) / PAGE_SIZE;

        if pages_needed > self.page_count {
            return None;
        }

        let mut consecutive = 0usize;
        let mut first_page: Option<NonNull<PageDescriptor>> = None;

        // SAFETY: walks descriptors reachable from `self.free_pages`, all
        // owned by this allocator.
        unsafe {
            let mut cursor = self.free_pages;
            while let Some(page) = cursor {
                let page_index = self.descriptor_index(page);
                if page_index < self.page_count {
                    match first_page {
                        Some(first) => {
                            let first_index = self.descriptor_index(first);
                            if page_index == first_index + consecutive {
                                consecutive += 1;
                            } else {
                                first_page = Some(page);
                                consecutive = 1;
                            }
                        }
                        None => {
                            first_page = Some(page);
                            consecutive = 1;
                        }
                    }
                }
                if consecutive >= pages_needed {
                    break;
                }
                cursor = page.as_ref().next;
            }
        }

        if consecutive < pages_needed {
            return None;
        }
        let first_page = first_page?;

        // SAFETY: every page in `[first_page, first_page + pages_needed)`
        // was just confirmed to be on the free-page list.
        unsafe {
            let first_index = self.descriptor_index(first_page);
            for i in 0..pages_needed {
                let mut page = self.descriptor_at(first_index + i);
                let (prev, next) = (page.as_ref().prev, page.as_ref().next);
                match prev {
                    Some(mut p) => p.as_mut().next = next,
                    None => self.free_pages = next,
                }
                if let Some(mut n) = next {
                    n.as_mut().prev = prev;
                }
                page.as_mut().bucket_index = LARGE_PAGE;
                page.as_mut().next = None;
                page.as_mut().prev = None;
            }

            let page_index = self.descriptor_index(first_page);
            let mut block = NonNull::new_unchecked(
                self.data_start.as_ptr().add(page_index * PAGE_SIZE) as *mut LargeBlock,
            );
            let block_size = pages_needed * PAGE_SIZE;
            block.as_ptr().write(LargeBlock {
                size: block_size,
                next: self.large_blocks,
                prev: None,
            });
            if let Some(mut head) = self.large_blocks {
                head.as_mut().prev = Some(block);
            }
            self.large_blocks = Some(block);

            self.used_bytes += block_size;
            NonNull::new((block.as_ptr() as *mut u8).add(size_of::<LargeBlock>()))
        }
    }

    /// # Safety
    /// `page` must be a live descriptor whose `bucket_index` names a valid
    /// bucket and `ptr` must be a block previously handed out of it.
    unsafe fn free_to_bucket(&mut self, ptr: NonNull<u8>, mut page: NonNull<PageDescriptor>) {
        let bucket = page.as_ref().bucket_index;
        if bucket >= NUM_BUCKETS {
            return;
        }
        // No block currently handed out of this page: either `ptr` was
        // already freed or the page never served it. Treat as a no-op
        // rather than re-link the block and underflow `used_bytes`.
        if page.as_ref().alloc_count == 0 {
            return;
        }

        let mut block = ptr.cast::<FreeBlock>();
        block.as_mut().next = self.buckets[bucket];
        self.buckets[bucket] = Some(block);

        page.as_mut().alloc_count -= 1;
        self.used_bytes -= Self::bucket_to_size(bucket);
    }

    /// # Safety
    /// `block` must be a live [`LargeBlock`] header owned by this allocator.
    unsafe fn free_large(&mut self, mut block: NonNull<LargeBlock>) {
        if block.as_ref().size == 0 {
            return;
        }

        self.used_bytes -= block.as_ref().size;

        let (prev, next) = (block.as_ref().prev, block.as_ref().next);
        match prev {
            Some(mut p) => p.as_mut().next = next,
            None => self.large_blocks = next,
        }
        if let Some(mut n) = next {
            n.as_mut().prev = prev;
        }

        let block_addr = block.as_ptr() as usize;
        let data_addr = self.data_start.as_ptr() as usize;
        if block_addr < data_addr {
            return;
        }

        let page_index = (block_addr - data_addr) / PAGE_SIZE;
        let num_pages = block.as_ref().size / PAGE_SIZE;
        if page_index + num_pages > self.page_count {
            return;
        }

        for i in 0..num_pages {
            let mut page = self.descriptor_at(page_index + i);
            page.as_mut().bucket_index = FREE_PAGE;
            page.as_mut().alloc_count = 0;
            page.as_mut().next = self.free_pages;
            page.as_mut().prev = None;
            if let Some(mut head) = self.free_pages {
                head.as_mut().prev = Some(page);
            }
            self.free_pages = Some(page);
        }
    }
}

impl Allocator for McKusickKarelsAllocator {
    fn alloc(&mut self, size: usize) -> Option<NonNull<u8>> {
        if size == 0 {
            return None;
        }

        if size <= LARGE_ALLOC_THRESHOLD / 2 {
            let bucket = self.size_to_bucket(size);
            self.allocate_from_bucket(bucket)
        } else {
            self.allocate_large(size)
        }
    }

    fn free(&mut self, ptr: Option<NonNull<u8>>) {
        let Some(ptr) = ptr else { return };

        let ptr_addr = ptr.as_ptr() as usize;
        let data_addr = self.data_start.as_ptr() as usize;
        let end_addr = data_addr + self.page_count * PAGE_SIZE;
        if ptr_addr < data_addr || ptr_addr >= end_addr {
            return;
        }

        let Some(page_index) = self.page_index_of(ptr) else {
            return;
        };
        // SAFETY: `page_index` was just validated against `page_count`.
        let page = unsafe { self.descriptor_at(page_index) };
        let bucket_index = unsafe { page.as_ref().bucket_index };

        if bucket_index == LARGE_PAGE {
            // SAFETY: the large-block header sits immediately before the
            // payload address this allocator returned for it.
            unsafe {
                let block =
                    NonNull::new_unchecked(ptr.as_ptr().sub(size_of::<LargeBlock>()) as *mut LargeBlock);
                self.free_large(block);
            }
        } else if bucket_index < NUM_BUCKETS {
            // SAFETY: `page` is a live descriptor naming a valid bucket.
            unsafe { self.free_to_bucket(ptr, page) };
        }
    }

    fn name(&self) -> &'static str {
        "McKusick-Karels Allocator"
    }

    fn used_bytes(&self) -> usize {
        self.used_bytes
    }

    fn total_bytes(&self) -> usize {
        self.total_bytes
    }
}
