use std::io::{self, Error};
use std::mem;
use std::ptr;

use windows_sys::Win32::System::Memory::{
    VirtualAlloc, VirtualFree, MEM_COMMIT, MEM_DECOMMIT, MEM_RELEASE, MEM_RESERVE, PAGE_NOACCESS,
    PAGE_READWRITE,
};
use windows_sys::Win32::System::SystemInformation::{GetSystemInfo, SYSTEM_INFO};

pub fn page_size() -> usize {
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

/// Reserves inaccessible address space via `MEM_RESERVE`.
pub fn reserve(len: usize) -> io::Result<*mut u8> {
    let ptr = unsafe { VirtualAlloc(ptr::null(), len, MEM_RESERVE, PAGE_NOACCESS) };
    if ptr.is_null() {
        return Err(Error::last_os_error());
    }
    Ok(ptr.cast::<u8>())
}

/// Commits a reserved range as read/write.
///
/// # Safety
///
/// `addr`/`len` must describe page-aligned memory inside a live reservation.
pub unsafe fn commit(addr: *mut u8, len: usize) -> io::Result<()> {
    let ptr = unsafe { VirtualAlloc(addr.cast(), len, MEM_COMMIT, PAGE_READWRITE) };
    if ptr.is_null() {
        return Err(Error::last_os_error());
    }
    Ok(())
}

/// Decommits a committed range; the address space stays reserved.
///
/// # Safety
///
/// `addr`/`len` must describe page-aligned committed memory inside a live
/// reservation with no outstanding references.
pub unsafe fn decommit(addr: *mut u8, len: usize) -> io::Result<()> {
    let ok = unsafe { VirtualFree(addr.cast(), len, MEM_DECOMMIT) };
    if ok == 0 {
        return Err(Error::last_os_error());
    }
    Ok(())
}

/// Releases a whole reservation. `MEM_RELEASE` requires a zero size.
///
/// # Safety
///
/// `addr` must be the exact base returned by [`reserve`].
pub unsafe fn release(addr: *mut u8, _len: usize) -> io::Result<()> {
    let ok = unsafe { VirtualFree(addr.cast(), 0, MEM_RELEASE) };
    if ok == 0 {
        return Err(Error::last_os_error());
    }
    Ok(())
}
