use std::io::{self, Error};
use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};

#[cfg(any(
    target_os = "linux",
    target_os = "android",
    target_vendor = "apple",
    target_os = "netbsd",
    target_os = "solaris",
    target_os = "illumos",
))]
const MAP_NORESERVE: libc::c_int = libc::MAP_NORESERVE;

#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    target_vendor = "apple",
    target_os = "netbsd",
    target_os = "solaris",
    target_os = "illumos",
)))]
const MAP_NORESERVE: libc::c_int = 0;

/// Returns the system page size, cached atomically.
pub fn page_size() -> usize {
    static PAGE_SIZE: AtomicUsize = AtomicUsize::new(0);

    match PAGE_SIZE.load(Ordering::Relaxed) {
        0 => {
            let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize };
            PAGE_SIZE.store(page_size, Ordering::Relaxed);
            page_size
        }
        page_size => page_size,
    }
}

/// Returns the physical page size. On Unix this matches [`page_size`].
pub fn physical_page_size() -> usize {
    page_size()
}

unsafe fn map(len: usize) -> io::Result<*mut u8> {
    let ptr = unsafe {
        libc::mmap(
            ptr::null_mut(),
            len,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_PRIVATE | libc::MAP_ANON | MAP_NORESERVE,
            -1,
            0,
        )
    };
    if ptr == libc::MAP_FAILED {
        return Err(Error::last_os_error());
    }
    Ok(ptr.cast::<u8>())
}

/// Reserves `size` bytes aligned to `alignment` by over-mapping and trimming
/// the misaligned head and tail with `munmap`.
pub(crate) fn reserve_aligned(alignment: usize, size: usize) -> io::Result<*mut u8> {
    let mapped_size = alignment + size - page_size();
    let mapped = unsafe { map(mapped_size)? };

    let mapped_begin = mapped as usize;
    let mapped_end = mapped_begin + mapped_size;
    let aligned_begin = (mapped_begin + alignment - 1) & !(alignment - 1);
    let aligned_end = aligned_begin + size;

    unsafe {
        if aligned_begin != mapped_begin {
            release(mapped, aligned_begin - mapped_begin);
        }
        if aligned_end != mapped_end {
            release(aligned_end as *mut u8, mapped_end - aligned_end);
        }
    }

    Ok(aligned_begin as *mut u8)
}

pub(crate) unsafe fn release(ptr: *mut u8, len: usize) {
    if len > 0 {
        unsafe {
            libc::munmap(ptr.cast::<libc::c_void>(), len);
        }
    }
}

pub(crate) unsafe fn commit(ptr: *mut u8, len: usize) -> io::Result<()> {
    #[cfg(target_vendor = "apple")]
    let advice = libc::MADV_FREE_REUSE;
    #[cfg(not(target_vendor = "apple"))]
    let advice = libc::MADV_WILLNEED;

    let result = unsafe { libc::madvise(ptr.cast::<libc::c_void>(), len, advice) };
    if result != 0 {
        return Err(Error::last_os_error());
    }
    Ok(())
}

pub(crate) unsafe fn decommit(ptr: *mut u8, len: usize) -> io::Result<()> {
    #[cfg(target_vendor = "apple")]
    let advice = libc::MADV_FREE_REUSABLE;
    #[cfg(not(target_vendor = "apple"))]
    let advice = libc::MADV_DONTNEED;

    let result = unsafe { libc::madvise(ptr.cast::<libc::c_void>(), len, advice) };
    if result != 0 {
        return Err(Error::last_os_error());
    }
    Ok(())
}
