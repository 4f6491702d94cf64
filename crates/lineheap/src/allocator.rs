//! Per-thread allocation front end.
//!
//! Each thread owns one [`BumpAllocator`] and one [`BumpRangeCache`] per
//! size class. The fast path peels the next object off the current bump
//! range without touching any shared state. When both the range and the
//! cache run dry, one heap-lock acquisition harvests several ranges at
//! once, amortizing the lock over many allocations.

use std::ptr::NonNull;

use crate::deallocator::Deallocator;
use crate::heap::{self, Heap};
use crate::sizes::{
    object_size, round_up_to_multiple_of, size_class, ALIGNMENT, BUMP_RANGE_CACHE_CAPACITY,
    CHUNK_SIZE, LARGE_ALIGNMENT, LARGE_MAX, LARGE_MIN, SIZE_CLASS_COUNT, SMALL_LINE_SIZE,
    SMALL_MAX,
};

/// A contiguous run of `object_count` objects starting at `begin`.
#[derive(Clone, Copy, Debug)]
pub(crate) struct BumpRange {
    pub begin: usize,
    pub object_count: usize,
}

impl BumpRange {
    const EMPTY: Self = Self {
        begin: 0,
        object_count: 0,
    };
}

/// Peels objects off one bump range by advancing a pointer.
pub(crate) struct BumpAllocator {
    object_size: usize,
    ptr: usize,
    remaining: usize,
}

impl BumpAllocator {
    pub fn new(size_class: usize) -> Self {
        Self {
            object_size: object_size(size_class),
            ptr: 0,
            remaining: 0,
        }
    }

    #[inline]
    pub const fn can_allocate(&self) -> bool {
        self.remaining != 0
    }

    #[inline]
    pub fn allocate(&mut self) -> usize {
        debug_assert!(self.can_allocate());
        let result = self.ptr;
        self.ptr += self.object_size;
        self.remaining -= 1;
        result
    }

    pub fn refill(&mut self, range: BumpRange) {
        debug_assert!(!self.can_allocate());
        debug_assert!(range.object_count > 0);
        self.ptr = range.begin;
        self.remaining = range.object_count;
    }
}

/// A fixed handful of spare bump ranges, refilled together with the bump
/// allocator so one lock acquisition covers several refills.
pub(crate) struct BumpRangeCache {
    ranges: [BumpRange; BUMP_RANGE_CACHE_CAPACITY],
    len: usize,
}

impl BumpRangeCache {
    pub const fn new() -> Self {
        Self {
            ranges: [BumpRange::EMPTY; BUMP_RANGE_CACHE_CAPACITY],
            len: 0,
        }
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub const fn is_full(&self) -> bool {
        self.len == BUMP_RANGE_CACHE_CAPACITY
    }

    pub fn push(&mut self, range: BumpRange) {
        debug_assert!(!self.is_full());
        self.ranges[self.len] = range;
        self.len += 1;
    }

    pub fn pop(&mut self) -> Option<BumpRange> {
        if self.len == 0 {
            return None;
        }
        self.len -= 1;
        Some(self.ranges[self.len])
    }
}

/// The per-thread allocator.
pub(crate) struct Allocator {
    bump_allocators: [BumpAllocator; SIZE_CLASS_COUNT],
    range_caches: [BumpRangeCache; SIZE_CLASS_COUNT],
    is_enabled: bool,
}

impl Allocator {
    pub fn new(is_enabled: bool) -> Self {
        Self {
            bump_allocators: std::array::from_fn(BumpAllocator::new),
            range_caches: std::array::from_fn(|_| BumpRangeCache::new()),
            is_enabled,
        }
    }

    #[inline]
    pub const fn is_enabled(&self) -> bool {
        self.is_enabled
    }

    pub fn allocate(&mut self, deallocator: &mut Deallocator, size: usize) -> NonNull<u8> {
        if !self.is_enabled {
            return Self::system_allocate(size);
        }
        if size <= SMALL_MAX {
            return self.allocate_small(size_class(size));
        }
        self.allocate_beyond_small(deallocator, size)
    }

    pub fn try_allocate(
        &mut self,
        deallocator: &mut Deallocator,
        size: usize,
    ) -> Option<NonNull<u8>> {
        if !self.is_enabled {
            // SAFETY: plain C allocation.
            return NonNull::new(unsafe { libc::malloc(size.max(1)) }.cast::<u8>());
        }
        if size <= LARGE_MAX {
            // Only extra-large reservations have a recoverable failure
            // mode; the small and large paths treat exhaustion as fatal.
            return Some(self.allocate(deallocator, size));
        }
        let mut lock = heap::lock();
        deallocator.process_object_log_with(&mut lock);
        let begin = Heap::try_allocate_xlarge(&mut lock, ALIGNMENT, size)?;
        // SAFETY: a successful reservation is never null.
        Some(unsafe { NonNull::new_unchecked(begin as *mut u8) })
    }

    pub fn allocate_aligned(
        &mut self,
        deallocator: &mut Deallocator,
        alignment: usize,
        size: usize,
    ) -> NonNull<u8> {
        assert!(alignment.is_power_of_two());
        if !self.is_enabled {
            return Self::system_allocate_aligned(alignment, size);
        }
        let size = if size == 0 { alignment } else { size };

        // Every object is at least word aligned.
        if alignment <= ALIGNMENT {
            return self.allocate(deallocator, size);
        }

        if size <= SMALL_MAX && alignment <= SMALL_LINE_SIZE {
            // Object layouts repeat line by line, so an aligned candidate
            // always comes around; rejected candidates recycle through the
            // log in order.
            let mask = alignment - 1;
            loop {
                let candidate = self.allocate_small(size_class(size));
                if (candidate.as_ptr() as usize & mask) == 0 {
                    return candidate;
                }
                deallocator.deallocate(candidate.as_ptr());
            }
        }

        let size = round_up_to_multiple_of(LARGE_ALIGNMENT, size).max(LARGE_MIN);
        let alignment = alignment.max(LARGE_ALIGNMENT);
        let unaligned_size = size + LARGE_MIN + alignment - LARGE_ALIGNMENT;
        if size <= LARGE_MAX && unaligned_size <= LARGE_MAX && alignment <= CHUNK_SIZE / 2 {
            let mut lock = heap::lock();
            deallocator.process_object_log_with(&mut lock);
            let begin = Heap::allocate_large_aligned(&mut lock, alignment, size, unaligned_size);
            // SAFETY: the large path never returns a null span.
            return unsafe { NonNull::new_unchecked(begin as *mut u8) };
        }

        let mut lock = heap::lock();
        deallocator.process_object_log_with(&mut lock);
        let begin = Heap::allocate_xlarge(&mut lock, alignment, size);
        // SAFETY: as above.
        unsafe { NonNull::new_unchecked(begin as *mut u8) }
    }

    #[inline]
    fn allocate_small(&mut self, size_class: usize) -> NonNull<u8> {
        if !self.bump_allocators[size_class].can_allocate() {
            self.refill_bump_allocator(size_class);
        }
        let ptr = self.bump_allocators[size_class].allocate();
        // SAFETY: bump ranges address committed heap pages, never null.
        unsafe { NonNull::new_unchecked(ptr as *mut u8) }
    }

    fn refill_bump_allocator(&mut self, size_class: usize) {
        if let Some(range) = self.range_caches[size_class].pop() {
            self.bump_allocators[size_class].refill(range);
            return;
        }
        let mut lock = heap::lock();
        Heap::allocate_small_bump_ranges(
            &mut lock,
            size_class,
            &mut self.bump_allocators[size_class],
            &mut self.range_caches[size_class],
        );
    }

    /// Large and extra-large allocation. The thread's pending frees drain
    /// under the same lock acquisition first, so a span freed moments ago
    /// by this thread can coalesce and be reused immediately.
    fn allocate_beyond_small(&mut self, deallocator: &mut Deallocator, size: usize) -> NonNull<u8> {
        let mut lock = heap::lock();
        deallocator.process_object_log_with(&mut lock);
        let begin = if size <= LARGE_MAX {
            let size = round_up_to_multiple_of(LARGE_ALIGNMENT, size).max(LARGE_MIN);
            Heap::allocate_large(&mut lock, size)
        } else {
            Heap::allocate_xlarge(&mut lock, ALIGNMENT, size)
        };
        // SAFETY: both paths abort rather than return null.
        unsafe { NonNull::new_unchecked(begin as *mut u8) }
    }

    /// Releases every object still parked in bump ranges and caches
    /// through the deallocator, so line refcounts drop and the pages can
    /// be reclaimed after the thread exits.
    pub fn scavenge(&mut self, deallocator: &mut Deallocator) {
        if !self.is_enabled {
            return;
        }
        for size_class in 0..SIZE_CLASS_COUNT {
            loop {
                while self.bump_allocators[size_class].can_allocate() {
                    let ptr = self.bump_allocators[size_class].allocate();
                    deallocator.deallocate(ptr as *mut u8);
                }
                match self.range_caches[size_class].pop() {
                    Some(range) => self.bump_allocators[size_class].refill(range),
                    None => break,
                }
            }
        }
    }

    fn system_allocate(size: usize) -> NonNull<u8> {
        // SAFETY: plain C allocation.
        let ptr = unsafe { libc::malloc(size.max(1)) };
        NonNull::new(ptr.cast::<u8>())
            .unwrap_or_else(|| panic!("system allocator failed for {size} bytes"))
    }

    #[cfg(unix)]
    fn system_allocate_aligned(alignment: usize, size: usize) -> NonNull<u8> {
        let alignment = alignment.max(std::mem::size_of::<*mut u8>());
        let mut ptr = std::ptr::null_mut();
        // SAFETY: out-pointer and rounded alignment satisfy the contract.
        let status = unsafe { libc::posix_memalign(&mut ptr, alignment, size.max(1)) };
        assert!(status == 0, "system aligned allocation failed: {status}");
        NonNull::new(ptr.cast::<u8>()).expect("posix_memalign returned null")
    }

    #[cfg(windows)]
    fn system_allocate_aligned(_alignment: usize, _size: usize) -> NonNull<u8> {
        // The environment probe never disables the allocator on Windows.
        unreachable!("allocator is never disabled on this platform")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bump_allocator_peels_objects_with_constant_stride() {
        let mut bump = BumpAllocator::new(size_class(32));
        assert!(!bump.can_allocate());
        bump.refill(BumpRange {
            begin: 0x1000,
            object_count: 3,
        });
        assert_eq!(bump.allocate(), 0x1000);
        assert_eq!(bump.allocate(), 0x1020);
        assert_eq!(bump.allocate(), 0x1040);
        assert!(!bump.can_allocate());
    }

    #[test]
    fn range_cache_is_bounded_lifo() {
        let mut cache = BumpRangeCache::new();
        assert!(cache.is_empty());
        for i in 0..BUMP_RANGE_CACHE_CAPACITY {
            cache.push(BumpRange {
                begin: 0x1000 * (i + 1),
                object_count: 1,
            });
        }
        assert!(cache.is_full());
        let top = cache.pop().unwrap();
        assert_eq!(top.begin, 0x1000 * BUMP_RANGE_CACHE_CAPACITY);
        assert!(!cache.is_full());
        while cache.pop().is_some() {}
        assert!(cache.is_empty());
    }
}
