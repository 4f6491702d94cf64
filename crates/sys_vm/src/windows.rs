use std::io::{self, Error};
use std::mem;
use std::ptr;

use windows_sys::Win32::System::Memory::{
    VirtualAlloc, VirtualFree, MEM_COMMIT, MEM_DECOMMIT, MEM_RELEASE, MEM_RESERVE, PAGE_READWRITE,
};
use windows_sys::Win32::System::SystemInformation::{GetSystemInfo, SYSTEM_INFO};

/// Returns the allocation granularity (typically 64KB). Reservation begin
/// addresses are aligned to this value.
pub fn page_size() -> usize {
    unsafe {
        let mut info: SYSTEM_INFO = mem::zeroed();
        GetSystemInfo(&mut info);
        let gran = info.dwAllocationGranularity as usize;
        if gran == 0 {
            65536
        } else {
            gran
        }
    }
}

/// Returns the physical page size (typically 4KB).
pub fn physical_page_size() -> usize {
    unsafe {
        let mut info: SYSTEM_INFO = mem::zeroed();
        GetSystemInfo(&mut info);
        let size = info.dwPageSize as usize;
        if size == 0 {
            4096
        } else {
            size
        }
    }
}

/// Reserves an aligned range by over-reserving, releasing, and re-reserving
/// the aligned sub-range. The release/re-reserve pair can race with other
/// mappers, so the sequence retries.
pub(crate) fn reserve_aligned(alignment: usize, size: usize) -> io::Result<*mut u8> {
    for _ in 0..16 {
        let probe = unsafe {
            VirtualAlloc(ptr::null(), size + alignment, MEM_RESERVE, PAGE_READWRITE)
        };
        if probe.is_null() {
            return Err(Error::last_os_error());
        }
        let aligned = (probe as usize + alignment - 1) & !(alignment - 1);
        unsafe { VirtualFree(probe, 0, MEM_RELEASE) };

        let ptr = unsafe {
            VirtualAlloc(
                aligned as *const std::ffi::c_void,
                size,
                MEM_RESERVE | MEM_COMMIT,
                PAGE_READWRITE,
            )
        };
        if !ptr.is_null() {
            return Ok(ptr.cast::<u8>());
        }
    }
    Err(Error::last_os_error())
}

pub(crate) unsafe fn release(ptr: *mut u8, _len: usize) {
    unsafe {
        // MEM_RELEASE requires dwSize to be 0.
        VirtualFree(ptr.cast::<std::ffi::c_void>(), 0, MEM_RELEASE);
    }
}

pub(crate) unsafe fn commit(ptr: *mut u8, len: usize) -> io::Result<()> {
    let result = unsafe {
        VirtualAlloc(
            ptr.cast::<std::ffi::c_void>(),
            len,
            MEM_COMMIT,
            PAGE_READWRITE,
        )
    };
    if result.is_null() {
        return Err(Error::last_os_error());
    }
    Ok(())
}

pub(crate) unsafe fn decommit(ptr: *mut u8, len: usize) -> io::Result<()> {
    let result = unsafe { VirtualFree(ptr.cast::<std::ffi::c_void>(), len, MEM_DECOMMIT) };
    if result == 0 {
        return Err(Error::last_os_error());
    }
    Ok(())
}
