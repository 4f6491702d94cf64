//! Virtual-memory primitives for the lineheap allocator.
//!
//! This crate is the only place that talks to the operating system. It
//! exposes four operations:
//!
//! - [`reserve_aligned`]: reserve a range of virtual address space whose
//!   begin address is aligned to a caller-chosen power-of-two boundary.
//! - [`commit_sloppy`]: ask the OS to back a sub-range with physical pages.
//! - [`decommit_sloppy`]: return the physical pages of a sub-range to the
//!   OS while keeping the virtual reservation intact.
//! - [`page_size`] / [`physical_page_size`]: the reservation granularity
//!   and the physical page size.
//!
//! "Sloppy" means the range ends are rounded to physical page boundaries in
//! whichever direction is safe: commit rounds outward (a superset is
//! committed), decommit rounds inward (up to one page at each end may stay
//! committed). Callers that need exact accounting should align the range
//! themselves before calling.

#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

use std::io;
use std::ptr::NonNull;

#[cfg(unix)]
mod unix;
#[cfg(unix)]
use unix as os;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
use windows as os;

pub use os::{page_size, physical_page_size};

/// An owned reservation of virtual address space.
///
/// The range is released when the handle is dropped. Long-lived consumers
/// call [`Reservation::into_raw`] and keep the range for the life of the
/// process.
pub struct Reservation {
    ptr: NonNull<u8>,
    len: usize,
}

impl Reservation {
    /// Returns the begin address of the reserved range.
    #[must_use]
    pub const fn ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Returns the length of the reserved range in bytes.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the reservation is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Consumes the handle without releasing the range.
    #[must_use]
    pub fn into_raw(self) -> (*mut u8, usize) {
        let raw = (self.ptr.as_ptr(), self.len);
        std::mem::forget(self);
        raw
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        // SAFETY: the range was obtained from os::reserve_aligned and has not
        // been released (into_raw forgets the handle).
        unsafe { os::release(self.ptr.as_ptr(), self.len) };
    }
}

// SAFETY: a reservation is a plain address range; nothing about it is tied
// to the creating thread.
unsafe impl Send for Reservation {}
unsafe impl Sync for Reservation {}

/// Reserves `size` bytes of virtual address space aligned to `alignment`.
///
/// `alignment` must be a power of two that is at least [`page_size`], and
/// `size` must be a non-zero multiple of [`page_size`]. The returned range
/// is readable and writable; physical pages are provided by the OS on first
/// touch and can be released again with [`decommit_sloppy`].
///
/// # Errors
///
/// Returns the OS error when the address space cannot be reserved.
pub fn reserve_aligned(alignment: usize, size: usize) -> io::Result<Reservation> {
    assert!(alignment.is_power_of_two());
    assert!(alignment >= page_size());
    assert!(size > 0 && size % page_size() == 0);

    let ptr = os::reserve_aligned(alignment, size)?;
    let ptr = NonNull::new(ptr).ok_or_else(|| {
        io::Error::new(io::ErrorKind::OutOfMemory, "reservation returned null")
    })?;
    Ok(Reservation { ptr, len: size })
}

/// Commits physical pages across `[ptr, ptr + size)`, rounded outward to
/// physical page boundaries.
///
/// # Errors
///
/// Returns the OS error when the advisory call fails.
///
/// # Safety
///
/// The range must lie inside a live reservation obtained from
/// [`reserve_aligned`].
pub unsafe fn commit_sloppy(ptr: *mut u8, size: usize) -> io::Result<()> {
    let page = physical_page_size();
    let begin = ptr as usize & !(page - 1);
    let end = (ptr as usize + size + page - 1) & !(page - 1);
    // SAFETY: forwarded from the caller.
    unsafe { os::commit(begin as *mut u8, end - begin) }
}

/// Decommits physical pages inside `[ptr, ptr + size)`, rounded inward to
/// physical page boundaries. Sub-page tails at either end stay committed.
///
/// # Errors
///
/// Returns the OS error when the advisory call fails.
///
/// # Safety
///
/// The range must lie inside a live reservation obtained from
/// [`reserve_aligned`], and no live data may remain in it.
pub unsafe fn decommit_sloppy(ptr: *mut u8, size: usize) -> io::Result<()> {
    let page = physical_page_size();
    let begin = (ptr as usize + page - 1) & !(page - 1);
    let end = (ptr as usize + size) & !(page - 1);
    if begin >= end {
        return Ok(());
    }
    // SAFETY: forwarded from the caller.
    unsafe { os::decommit(begin as *mut u8, end - begin) }
}
