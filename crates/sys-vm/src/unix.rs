use std::io::{self, Error};
use std::ptr;
use std::sync::OnceLock;

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

/// Returns the system page size, queried once.
pub fn page_size() -> usize {
    static PAGE_SIZE: OnceLock<usize> = OnceLock::new();
    *PAGE_SIZE.get_or_init(|| {
        // SAFETY: sysconf has no memory-safety preconditions.
        let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if size > 0 {
            size as usize
        } else {
            4096
        }
    })
}

/// Reserves inaccessible anonymous address space.
///
/// `PROT_NONE` keeps the range unbacked; `MAP_NORESERVE` opts out of swap
/// accounting so over-sized reservations do not count against commit limits.
pub fn reserve(len: usize) -> io::Result<*mut u8> {
    let flags = libc::MAP_PRIVATE | libc::MAP_ANON | MAP_NORESERVE;

    let ptr = unsafe { libc::mmap(ptr::null_mut(), len, libc::PROT_NONE, flags, -1, 0) };
    if ptr == libc::MAP_FAILED {
        return Err(Error::last_os_error());
    }
    Ok(ptr.cast::<u8>())
}

/// Makes a reserved range readable and writable.
///
/// # Safety
///
/// `addr`/`len` must describe page-aligned memory inside a live mapping.
pub unsafe fn commit(addr: *mut u8, len: usize) -> io::Result<()> {
    let ret = unsafe {
        libc::mprotect(
            addr.cast::<libc::c_void>(),
            len,
            libc::PROT_READ | libc::PROT_WRITE,
        )
    };
    if ret == -1 {
        return Err(Error::last_os_error());
    }
    Ok(())
}

/// Revokes access and drops the physical backing of a committed range.
///
/// `mprotect(PROT_NONE)` makes later touches fault; `madvise(MADV_DONTNEED)`
/// hands the pages back so a later commit observes zero-fill.
///
/// # Safety
///
/// `addr`/`len` must describe page-aligned committed memory inside a live
/// mapping with no outstanding references.
pub unsafe fn decommit(addr: *mut u8, len: usize) -> io::Result<()> {
    let ret = unsafe { libc::mprotect(addr.cast::<libc::c_void>(), len, libc::PROT_NONE) };
    if ret == -1 {
        return Err(Error::last_os_error());
    }
    let ret = unsafe { libc::madvise(addr.cast::<libc::c_void>(), len, libc::MADV_DONTNEED) };
    if ret == -1 {
        return Err(Error::last_os_error());
    }
    Ok(())
}

/// Unmaps a whole reservation.
///
/// # Safety
///
/// `addr`/`len` must describe exactly one mapping returned by [`reserve`].
pub unsafe fn release(addr: *mut u8, len: usize) -> io::Result<()> {
    let ret = unsafe { libc::munmap(addr.cast::<libc::c_void>(), len) };
    if ret == -1 {
        return Err(Error::last_os_error());
    }
    Ok(())
}
