//! Per-thread deallocation front end.
//!
//! Frees are batched in a fixed-capacity log and drained in one heap-lock
//! acquisition when the log fills, amortizing synchronization the same way
//! the allocator amortizes refills. Extra-large pointers bypass the log:
//! they sit exactly on the reservation alignment boundary, an address no
//! small or large object can have, so one mask test routes them (and null)
//! to the slow path without taking any lock.

use crate::heap::{self, HeapGuard};
use crate::sizes::{OBJECT_LOG_CAPACITY, X_LARGE_ALIGNMENT};

pub(crate) struct Deallocator {
    object_log: Vec<usize>,
    is_enabled: bool,
}

impl Deallocator {
    pub fn new(is_enabled: bool) -> Self {
        let mut object_log = Vec::with_capacity(OBJECT_LOG_CAPACITY);
        if !is_enabled {
            // Saturate the log so the fast path never accepts a pointer
            // and every free reaches the system allocator.
            object_log.resize(OBJECT_LOG_CAPACITY, 0);
        }
        Self {
            object_log,
            is_enabled,
        }
    }

    #[inline]
    pub fn deallocate(&mut self, ptr: *mut u8) {
        let object = ptr as usize;
        if (object & (X_LARGE_ALIGNMENT - 1)) == 0 {
            // Null or extra-large.
            return self.deallocate_slow(object);
        }
        if self.object_log.len() == OBJECT_LOG_CAPACITY {
            return self.deallocate_slow(object);
        }
        self.object_log.push(object);
    }

    fn deallocate_slow(&mut self, object: usize) {
        if !self.is_enabled {
            // SAFETY: disabled mode allocated through libc; freeing null
            // is a no-op there.
            unsafe { libc::free(object as *mut libc::c_void) };
            return;
        }

        if object == 0 {
            return;
        }

        if (object & (X_LARGE_ALIGNMENT - 1)) == 0 {
            let mut lock = heap::lock();
            lock.deallocate_xlarge(object);
            return;
        }

        debug_assert!(self.object_log.len() == OBJECT_LOG_CAPACITY);
        self.process_object_log();
        self.object_log.push(object);
    }

    /// Drains the log under the heap lock. Deferred line dereferences are
    /// observed by the rest of the system strictly in log order.
    pub fn process_object_log(&mut self) {
        let mut lock = heap::lock();
        self.process_object_log_with(&mut lock);
    }

    pub(crate) fn process_object_log_with(&mut self, lock: &mut HeapGuard) {
        if self.object_log.is_empty() {
            return;
        }
        for &object in &self.object_log {
            lock.deref_small_line(object);
        }
        self.object_log.clear();
        lock.note_object_log_drain();
    }

    /// Final drain, run when the owning thread retires its cache.
    pub fn scavenge(&mut self) {
        if self.is_enabled {
            self.process_object_log();
        }
    }

    #[cfg(test)]
    pub(crate) fn log_len(&self) -> usize {
        self.object_log.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_log_is_born_saturated() {
        let deallocator = Deallocator::new(false);
        assert_eq!(deallocator.log_len(), OBJECT_LOG_CAPACITY);
    }

    #[test]
    fn disabled_mode_routes_every_free_to_the_system_allocator() {
        let mut deallocator = Deallocator::new(true);
        assert_eq!(deallocator.log_len(), 0);
        drop(deallocator);

        // A disabled deallocator must pair with libc allocations.
        let mut deallocator = Deallocator::new(false);
        // SAFETY: plain C allocation, freed through the disabled slow path.
        let ptr = unsafe { libc::malloc(64) }.cast::<u8>();
        assert!(!ptr.is_null());
        deallocator.deallocate(ptr);
        // The log stays saturated; nothing was queued.
        assert_eq!(deallocator.log_len(), OBJECT_LOG_CAPACITY);
        // Null is a no-op as well.
        deallocator.deallocate(std::ptr::null_mut());
        assert_eq!(deallocator.log_len(), OBJECT_LOG_CAPACITY);
    }
}
