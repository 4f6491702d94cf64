//! The per-thread cache: one allocator and one deallocator, installed in
//! thread-local storage. Dropping the cache (thread exit) releases parked
//! bump ranges and drains the object log so the heap can reclaim pages.

use std::cell::RefCell;
use std::ptr::NonNull;

use crate::allocator::Allocator;
use crate::deallocator::Deallocator;
use crate::heap::{self, Heap, ObjectKind};
use crate::sizes::{object_size, round_up_to_multiple_of, size_class, LARGE_ALIGNMENT, LARGE_MIN, SMALL_MAX};

pub(crate) struct Cache {
    allocator: Allocator,
    deallocator: Deallocator,
}

impl Cache {
    fn new() -> Self {
        let is_enabled = heap::lock().is_enabled();
        Self {
            allocator: Allocator::new(is_enabled),
            deallocator: Deallocator::new(is_enabled),
        }
    }

    #[inline]
    pub fn allocate(&mut self, size: usize) -> NonNull<u8> {
        self.allocator.allocate(&mut self.deallocator, size)
    }

    #[inline]
    pub fn try_allocate(&mut self, size: usize) -> Option<NonNull<u8>> {
        self.allocator.try_allocate(&mut self.deallocator, size)
    }

    #[inline]
    pub fn allocate_aligned(&mut self, alignment: usize, size: usize) -> NonNull<u8> {
        self.allocator
            .allocate_aligned(&mut self.deallocator, alignment, size)
    }

    #[inline]
    pub fn deallocate(&mut self, ptr: *mut u8) {
        self.deallocator.deallocate(ptr);
    }

    /// Resizes an allocation, reusing it in place where the tier allows:
    /// a small object stays put while the new size maps to its class, and
    /// large or extra-large objects shrink by splitting off their tail.
    pub fn reallocate(&mut self, ptr: *mut u8, new_size: usize) -> NonNull<u8> {
        if !self.allocator.is_enabled() {
            // SAFETY: disabled mode pairs with libc allocations.
            let grown = unsafe { libc::realloc(ptr.cast::<libc::c_void>(), new_size.max(1)) };
            return NonNull::new(grown.cast::<u8>())
                .unwrap_or_else(|| panic!("system realloc failed for {new_size} bytes"));
        }

        let object = ptr as usize;
        let (kind, old_size) = {
            let lock = heap::lock();
            lock.classify(object)
        };

        match kind {
            ObjectKind::Small => {
                if new_size <= SMALL_MAX && object_size(size_class(new_size)) == old_size {
                    // SAFETY: ptr is a live allocation.
                    return unsafe { NonNull::new_unchecked(ptr) };
                }
            }
            ObjectKind::Large => {
                let rounded = round_up_to_multiple_of(LARGE_ALIGNMENT, new_size.max(1))
                    .max(LARGE_MIN);
                if rounded <= old_size {
                    if old_size - rounded >= LARGE_MIN {
                        heap::lock().shrink_large(object, rounded);
                    }
                    // SAFETY: as above.
                    return unsafe { NonNull::new_unchecked(ptr) };
                }
            }
            ObjectKind::XLarge => {
                if new_size > 0 && new_size <= old_size {
                    if new_size < old_size {
                        let mut lock = heap::lock();
                        Heap::shrink_xlarge(&mut lock, object, new_size);
                    }
                    // SAFETY: as above.
                    return unsafe { NonNull::new_unchecked(ptr) };
                }
            }
        }

        // Grow (or cross tiers): allocate, copy, free.
        let fresh = self.allocator.allocate(&mut self.deallocator, new_size);
        // SAFETY: both regions are live and distinct; the copy stays
        // within the smaller of the two allocations.
        unsafe {
            std::ptr::copy_nonoverlapping(ptr, fresh.as_ptr(), old_size.min(new_size));
        }
        self.deallocator.deallocate(ptr);
        fresh
    }

    /// Drains both halves of the cache and wakes the scavenger.
    pub fn scavenge(&mut self) {
        self.allocator.scavenge(&mut self.deallocator);
        self.deallocator.scavenge();
    }
}

impl Drop for Cache {
    fn drop(&mut self) {
        self.scavenge();
    }
}

thread_local! {
    static CACHE: RefCell<Option<Cache>> = const { RefCell::new(None) };
}

/// Runs `f` against this thread's cache, creating it on first use.
pub(crate) fn with_cache<R>(f: impl FnOnce(&mut Cache) -> R) -> R {
    CACHE.with(|slot| {
        let mut slot = slot.borrow_mut();
        f(slot.get_or_insert_with(Cache::new))
    })
}

/// Like [`with_cache`], returning `None` when thread-local storage is
/// already gone (frees during thread teardown).
pub(crate) fn try_with_cache<R>(f: impl FnOnce(&mut Cache) -> R) -> Option<R> {
    CACHE
        .try_with(|slot| {
            let mut slot = slot.borrow_mut();
            f(slot.get_or_insert_with(Cache::new))
        })
        .ok()
}
