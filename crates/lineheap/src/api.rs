//! Public allocation interface.
//!
//! All operations route through the calling thread's cache; the global
//! heap is touched only on refills, log drains, and the large tiers.

use std::ptr::NonNull;

use crate::cache::{self, Cache};
use crate::heap;
use crate::metrics::HeapMetrics;
use crate::sizes::{is_aligned, X_LARGE_ALIGNMENT};

/// Allocates `size` bytes aligned to at least 8.
///
/// A zero-size request returns a distinct minimal allocation. Exhaustion
/// of the small or large tier aborts the process; only extra-large
/// reservations have a recoverable failure mode, via [`try_allocate`].
#[must_use]
pub fn allocate(size: usize) -> NonNull<u8> {
    cache::with_cache(|cache| cache.allocate(size))
}

/// Allocates `size` bytes, returning `None` when the OS refuses the
/// reservation.
#[must_use]
pub fn try_allocate(size: usize) -> Option<NonNull<u8>> {
    cache::with_cache(|cache| cache.try_allocate(size))
}

/// Allocates `size` bytes aligned to `alignment`, which must be a power
/// of two.
#[must_use]
pub fn allocate_aligned(alignment: usize, size: usize) -> NonNull<u8> {
    cache::with_cache(|cache| cache.allocate_aligned(alignment, size))
}

/// Resizes an allocation, preserving the first `min(old, new)` bytes.
///
/// # Safety
///
/// `ptr` must have come from one of the allocate variants and not have
/// been freed. A null `ptr` behaves like [`allocate`].
#[must_use]
pub unsafe fn reallocate(ptr: *mut u8, new_size: usize) -> NonNull<u8> {
    if ptr.is_null() {
        return allocate(new_size);
    }
    cache::with_cache(|cache| cache.reallocate(ptr, new_size))
}

/// Frees an allocation. Null is a no-op.
///
/// # Safety
///
/// `ptr` must have come from one of the allocate variants and not have
/// been freed already.
pub unsafe fn deallocate(ptr: *mut u8) {
    let delivered = cache::try_with_cache(|cache| cache.deallocate(ptr));
    if delivered.is_none() {
        // Thread-local storage is already gone; free against the heap
        // directly.
        deallocate_direct(ptr);
    }
}

fn deallocate_direct(ptr: *mut u8) {
    if ptr.is_null() {
        return;
    }
    let object = ptr as usize;
    let mut lock = heap::lock();
    if !lock.is_enabled() {
        // SAFETY: disabled mode pairs with libc allocations.
        unsafe { libc::free(ptr.cast::<libc::c_void>()) };
        return;
    }
    if is_aligned(object, X_LARGE_ALIGNMENT) {
        lock.deallocate_xlarge(object);
        return;
    }
    lock.deref_small_line(object);
}

/// Returns the usable size of an allocation: the size-class object size
/// for small objects, the span size for large ones, and the paired
/// allocated size for extra-large ones. Null yields zero.
///
/// # Safety
///
/// `ptr` must be null or a live allocation from this allocator.
#[must_use]
pub unsafe fn size_of(ptr: *mut u8) -> usize {
    if ptr.is_null() {
        return 0;
    }
    let lock = heap::lock();
    if !lock.is_enabled() {
        return system_allocation_size(ptr);
    }
    let (_, size) = lock.classify(ptr as usize);
    size
}

#[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
fn system_allocation_size(ptr: *mut u8) -> usize {
    // SAFETY: ptr is a live libc allocation in disabled mode.
    unsafe { libc::malloc_usable_size(ptr.cast::<libc::c_void>()) }
}

#[cfg(target_vendor = "apple")]
fn system_allocation_size(ptr: *mut u8) -> usize {
    // SAFETY: ptr is a live libc allocation in disabled mode.
    unsafe { libc::malloc_size(ptr.cast::<libc::c_void>()) }
}

#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    target_os = "freebsd",
    target_vendor = "apple"
)))]
fn system_allocation_size(_ptr: *mut u8) -> usize {
    0
}

/// Drains the calling thread's bump ranges and object log, then wakes the
/// scavenger so freed memory can return to the OS promptly.
pub fn scavenge() {
    cache::with_cache(Cache::scavenge);
    heap::scavenger().run();
}

/// Stops the scavenger thread and joins it. Allocation keeps working
/// afterwards; freed memory just stops flowing back to the OS.
pub fn shutdown() {
    heap::scavenger().stop();
}

/// Snapshot of the heap's counters, taken under the heap lock.
#[must_use]
pub fn metrics() -> HeapMetrics {
    heap::lock().metrics_snapshot()
}
