//! Reserve/commit/decommit virtual-memory primitives.
//!
//! Unlike a general-purpose mapping crate, this one is built around the
//! three-state lifecycle a reserving allocator needs:
//!
//! - **reserved**: address space is claimed but inaccessible; touching it
//!   faults and it consumes no physical memory.
//! - **committed**: a sub-range has been made readable and writable; the OS
//!   backs it with physical pages on first touch.
//! - **decommitted**: a committed sub-range is made inaccessible again and
//!   its physical backing is returned to the OS.
//!
//! Reservations are plain addresses, not RAII handles; callers that keep a
//! reservation for the life of the process simply never call [`release`].

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

pub use os::page_size;

/// Reserves `len` bytes of inaccessible address space.
///
/// The returned range is aligned to the system page size. No physical
/// memory is consumed until sub-ranges are passed to [`commit`].
///
/// # Errors
///
/// Returns the OS error when the kernel refuses the reservation.
pub fn reserve(len: usize) -> io::Result<NonNull<u8>> {
    assert!(len > 0, "cannot reserve an empty range");
    let ptr = os::reserve(len)?;
    NonNull::new(ptr).ok_or_else(|| io::Error::other("reservation returned a null base"))
}

/// Makes `[addr, addr + len)` readable and writable.
///
/// Freshly committed pages read as zero. Both `addr` and `len` must be
/// page-aligned and lie within a range obtained from [`reserve`].
///
/// # Errors
///
/// Returns the OS error when the protection change fails.
///
/// # Safety
///
/// `addr` must point into a live reservation and the range must not extend
/// past its end.
pub unsafe fn commit(addr: *mut u8, len: usize) -> io::Result<()> {
    debug_assert_eq!(addr as usize % page_size(), 0);
    debug_assert_eq!(len % page_size(), 0);
    unsafe { os::commit(addr, len) }
}

/// Makes `[addr, addr + len)` inaccessible and releases its physical
/// backing.
///
/// The address range stays reserved; a later [`commit`] of the same range
/// yields zeroed pages. Both `addr` and `len` must be page-aligned.
///
/// # Errors
///
/// Returns the OS error when the protection change or the release advice
/// fails.
///
/// # Safety
///
/// `addr` must point into a live reservation, the range must be committed,
/// and no live reference may point into it.
pub unsafe fn decommit(addr: *mut u8, len: usize) -> io::Result<()> {
    debug_assert_eq!(addr as usize % page_size(), 0);
    debug_assert_eq!(len % page_size(), 0);
    unsafe { os::decommit(addr, len) }
}

/// Returns a whole reservation to the OS.
///
/// # Errors
///
/// Returns the OS error when the unmap fails.
///
/// # Safety
///
/// `addr` and `len` must describe exactly one range obtained from
/// [`reserve`], and no live reference may point into it.
pub unsafe fn release(addr: *mut u8, len: usize) -> io::Result<()> {
    unsafe { os::release(addr, len) }
}
