//! Root-region discovery: global data bounds and the current thread stack.
//!
//! Three regions seed every cycle: the initialised-data interval
//! `[data_start, edata)`, the zero-initialised interval `[edata, end)`, and
//! the slice of the current thread's stack above the application's anchor
//! frame. `edata` and `end` come from linker-defined symbols; `data_start`
//! comes from parsing the running executable's own section table, falling
//! back to `etext` (a conservative superset including read-only data) when
//! the image cannot be parsed.

#[cfg(target_os = "linux")]
use std::sync::OnceLock;

/// Sentinel the application plants via [`with_stack_anchor`].
pub const STACK_ANCHOR_MAGIC: u32 = 0x12ab_cdef;

/// Half-open root region `[start, end)`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Region {
    pub start: usize,
    pub end: usize,
}

#[cfg(target_os = "linux")]
extern "C" {
    static etext: libc::c_char;
    static edata: libc::c_char;
    static end: libc::c_char;
}

/// The initialised-data and zero-initialised-data root regions.
#[cfg(target_os = "linux")]
pub(crate) fn global_data_regions() -> (Region, Region) {
    // SAFETY: the linker-provided symbols are zero-sized markers; only
    // their addresses are used.
    let (text_end, data_end, bss_end) = unsafe {
        (
            (&raw const etext) as usize,
            (&raw const edata) as usize,
            (&raw const end) as usize,
        )
    };
    let data_start = data_section_size()
        .and_then(|size| data_end.checked_sub(size))
        .unwrap_or(text_end);
    (
        Region {
            start: data_start,
            end: data_end,
        },
        Region {
            start: data_end,
            end: bss_end,
        },
    )
}

/// Size of the running executable's `.data` section, parsed once.
#[cfg(target_os = "linux")]
fn data_section_size() -> Option<usize> {
    static SIZE: OnceLock<Option<usize>> = OnceLock::new();
    *SIZE.get_or_init(|| {
        let image = std::fs::read("/proc/self/exe").ok()?;
        parse_data_section_size(&image)
    })
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn global_data_regions() -> (Region, Region) {
    unimplemented!("global root discovery is only implemented for Linux")
}

/// Minimal ELF64 section-table walk; returns the size of the section named
/// exactly `.data`.
fn parse_data_section_size(image: &[u8]) -> Option<usize> {
    if image.get(..4)? != b"\x7fELF" || *image.get(4)? != 2 {
        return None;
    }
    let sh_off = usize::try_from(read_u64(image, 0x28)?).ok()?;
    let sh_entsize = read_u16(image, 0x3a)? as usize;
    let sh_num = read_u16(image, 0x3c)? as usize;
    let sh_strndx = read_u16(image, 0x3e)? as usize;

    let strtab_off = usize::try_from(read_u64(image, sh_off + sh_strndx * sh_entsize + 0x18)?).ok()?;
    for index in 0..sh_num {
        let section = sh_off + index * sh_entsize;
        let name_off = strtab_off + read_u32(image, section)? as usize;
        let name = image.get(name_off..)?;
        if name.starts_with(b".data") && name.get(5) == Some(&0) {
            return usize::try_from(read_u64(image, section + 0x20)?).ok();
        }
    }
    None
}

fn read_u16(image: &[u8], offset: usize) -> Option<u16> {
    Some(u16::from_le_bytes(
        image.get(offset..offset + 2)?.try_into().ok()?,
    ))
}

fn read_u32(image: &[u8], offset: usize) -> Option<u32> {
    Some(u32::from_le_bytes(
        image.get(offset..offset + 4)?.try_into().ok()?,
    ))
}

fn read_u64(image: &[u8], offset: usize) -> Option<u64> {
    Some(u64::from_le_bytes(
        image.get(offset..offset + 8)?.try_into().ok()?,
    ))
}

/// Address one past the last byte of the current thread's stack.
///
/// Failure to introspect the thread is fatal: without the stack bounds no
/// cycle can run safely.
#[cfg(target_os = "linux")]
pub(crate) fn stack_bottom() -> usize {
    current_stack_extent()
        .map(|(base, len)| base + len)
        .unwrap_or_else(|e| panic!("cannot determine the current thread's stack extent: {e}"))
}

/// Queries the current thread's stack base and length from pthreads.
///
/// The pthread attribute calls report failure through their return value,
/// not `errno`, so errors are rebuilt from the returned code.
#[cfg(target_os = "linux")]
fn current_stack_extent() -> std::io::Result<(usize, usize)> {
    let mut attributes = std::mem::MaybeUninit::<libc::pthread_attr_t>::uninit();
    let mut base: *mut libc::c_void = std::ptr::null_mut();
    let mut len: libc::size_t = 0;

    // SAFETY: pthread_getattr_np initialises the attribute block for the
    // calling thread, which lives at least as long as this call.
    unsafe {
        let rc = libc::pthread_getattr_np(libc::pthread_self(), attributes.as_mut_ptr());
        if rc != 0 {
            return Err(std::io::Error::from_raw_os_error(rc));
        }
        let rc = libc::pthread_attr_getstack(attributes.as_ptr(), &raw mut base, &raw mut len);
        libc::pthread_attr_destroy(attributes.as_mut_ptr());
        if rc != 0 {
            return Err(std::io::Error::from_raw_os_error(rc));
        }
    }
    Ok((base as usize, len))
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn stack_bottom() -> usize {
    unimplemented!("stack root discovery is only implemented for Linux")
}

/// Finds the application's stack anchor by walking byte-wise upward from
/// `probe`, then returns the region between the anchor and the stack
/// bottom.
///
/// Everything below the anchor belongs to the collector's own frames and
/// is deliberately excluded from scanning.
///
/// # Panics
///
/// Panics when the search reaches the stack bottom without finding the
/// sentinel, i.e. the caller forgot [`with_stack_anchor`].
pub(crate) fn stack_region_above(probe: usize) -> Region {
    let bottom = stack_bottom();
    let mut cursor = probe;
    loop {
        assert!(
            cursor + 4 <= bottom,
            "stack anchor not found; wrap GC-triggering code in with_stack_anchor"
        );
        // SAFETY: [cursor, bottom) is live stack memory of this thread.
        let value = unsafe { (cursor as *const u32).read_unaligned() };
        if value == STACK_ANCHOR_MAGIC {
            break;
        }
        cursor += 1;
    }
    Region {
        start: cursor,
        end: bottom,
    }
}

/// Runs `f` with the collector's stack sentinel planted in the current
/// frame.
///
/// A collection cycle scans the current thread's stack between the
/// nearest enclosing sentinel and the stack bottom. Everything deeper
/// than the sentinel is skipped: the collector's own frames, but also any
/// mutator frames below the anchor, so long-lived roots belong in global
/// data or in frames above it. Any code that can trigger a cycle (every
/// [`Heap::allocate`](crate::Heap::allocate) call and every explicit
/// [`Heap::collect`](crate::Heap::collect)) must therefore run inside
/// this combinator, typically wrapped once around the program's main body:
///
/// ```ignore
/// use karst_gc::{with_stack_anchor, Heap};
///
/// with_stack_anchor(|| {
///     let mut heap = Heap::new();
///     let node = heap.allocate(64);
///     // ...
///     heap.collect();
/// });
/// ```
#[inline(never)]
pub fn with_stack_anchor<R>(f: impl FnOnce() -> R) -> R {
    let mut anchor: u32 = 0;
    // Volatile, so the sentinel lands in the stack slot instead of a
    // register.
    // SAFETY: `anchor` is a live local.
    unsafe { std::ptr::write_volatile(&raw mut anchor, STACK_ANCHOR_MAGIC) };
    let result = f();
    std::hint::black_box(&anchor);
    result
}
