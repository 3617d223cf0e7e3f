//! Segmented heap layout.
//!
//! Memory is carved into 4 GiB segments aligned to their own size, so the
//! segment owning any interior address is a single mask away. The front of
//! every segment is a metadata area holding one `u16` counter per page,
//! overlaid with a handful of segment-level fields; the remainder is the
//! data area served by a bump pointer.
//!
//! The counter table is what makes conservative pointer classification
//! cheap: for a small-object page it accumulates the free bytes on that
//! page, for a large-object page it flags the first page of an allocation,
//! and the sentinel [`PAGE_FREE`] marks pages whose physical backing has
//! been returned to the OS.

use std::ptr::NonNull;

/// Unit of OS-level memory management.
pub const PAGE_SIZE: usize = 4096;

/// Virtual-address span of one segment.
pub const SEGMENT_SIZE: usize = 4 << 30;

/// Mask extracting the page base from an address.
pub const PAGE_MASK: usize = !(PAGE_SIZE - 1);

/// Mask extracting the segment base from an address.
pub const SEGMENT_MASK: usize = !(SEGMENT_SIZE - 1);

/// Bytes of per-page metadata at the front of every segment (two per page).
pub const METADATA_SIZE: usize = (SEGMENT_SIZE / PAGE_SIZE) * 2;

/// Granularity by which the small-object commit window grows.
pub const COMMIT_SIZE: usize = PAGE_SIZE;

/// Counter-table bytes shadowing the metadata area's own pages. Data pages
/// never use these entries, so the segment-level header lives here.
const HEADER_SPARE: usize = (METADATA_SIZE / PAGE_SIZE) * 2;

/// Counter sentinel: the page is entirely free and its physical backing has
/// been released.
pub const PAGE_FREE: u16 = PAGE_SIZE as u16;

/// Counter value marking the first page of a large allocation.
pub const LARGE_FIRST_PAGE: u16 = 1;

/// Object status values stored in headers.
pub mod status {
    /// Not reached this cycle; outside a cycle, simply "live".
    pub const UNMARKED: u32 = 0;
    /// Reclaimed, or a hole that was never handed to the mutator.
    pub const FREE: u32 = 1;
    /// Reached during the current cycle's mark phase.
    pub const MARKED: u32 = 2;
}

/// Header preceding every allocation, holes included.
///
/// `size` covers the header itself and is rounded to 8 bytes on the small
/// path or to whole pages on the large path. `type_id` is reserved for
/// precise scanning and stays zero.
#[repr(C)]
#[derive(Debug)]
pub struct ObjHeader {
    /// Total size in bytes, header included.
    pub size: u32,
    /// One of the [`status`] constants.
    pub status: u32,
    /// Reserved; always zero.
    pub type_id: u64,
}

/// Size of [`ObjHeader`], the fixed per-allocation overhead.
pub const HEADER_SIZE: usize = std::mem::size_of::<ObjHeader>();

impl ObjHeader {
    /// Header location for a payload pointer handed to the mutator.
    #[must_use]
    pub fn from_payload(payload: NonNull<u8>) -> NonNull<Self> {
        // SAFETY: every mutator pointer is preceded by its header.
        unsafe { NonNull::new_unchecked(payload.as_ptr().sub(HEADER_SIZE).cast()) }
    }

    /// Payload location for a header.
    #[must_use]
    pub fn payload(header: NonNull<Self>) -> NonNull<u8> {
        // SAFETY: the payload directly follows the header.
        unsafe { NonNull::new_unchecked(header.as_ptr().cast::<u8>().add(HEADER_SIZE)) }
    }
}

/// Which allocator a segment serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    /// Bump-allocated objects of at most one page.
    Small,
    /// Page-rounded objects spanning one or more pages.
    Large,
}

/// Segment-level fields overlaid on the front of the counter table.
///
/// Pointer values are stored as `usize`; all address arithmetic in the
/// crate is integer arithmetic against the segment base.
#[repr(C)]
struct SegmentHeader {
    alloc_ptr: usize,
    commit_ptr: usize,
    reserve_ptr: usize,
    data_ptr: usize,
    kind: u32,
}

// The overlaid header must fit inside the counter entries that shadow the
// metadata area's own pages.
const _: () = assert!(std::mem::size_of::<SegmentHeader>() <= HEADER_SPARE);
const _: () = assert!(HEADER_SIZE == 16);
const _: () = assert!(METADATA_SIZE % PAGE_SIZE == 0);

/// Handle to one reserved 4 GiB region.
///
/// Copyable; the region itself is permanent once created and is never
/// unmapped. All accessors go through the overlaid [`SegmentHeader`].
#[derive(Clone, Copy)]
pub struct Segment {
    base: NonNull<u8>,
}

impl Segment {
    /// Reserves and initialises a fresh segment.
    ///
    /// Twice the segment size is reserved so the segment proper can be
    /// aligned up to its own size; the metadata area is committed eagerly
    /// and comes back zeroed, which doubles as counter initialisation.
    ///
    /// # Panics
    ///
    /// Kernel failure to reserve or commit is fatal.
    pub(crate) fn create(kind: SegmentKind) -> Self {
        let raw = sys_vm::reserve(2 * SEGMENT_SIZE)
            .unwrap_or_else(|e| panic!("failed to reserve segment address space: {e}"));
        let base = align_up(raw.as_ptr() as usize, SEGMENT_SIZE);

        // SAFETY: [base, base + METADATA_SIZE) lies inside the fresh
        // double-size reservation.
        unsafe {
            sys_vm::commit(base as *mut u8, METADATA_SIZE)
                .unwrap_or_else(|e| panic!("failed to commit segment metadata: {e}"));
        }

        // SAFETY: base was aligned up within a non-null mapping.
        let segment = Self {
            base: unsafe { NonNull::new_unchecked(base as *mut u8) },
        };
        let data = base + METADATA_SIZE;
        // SAFETY: the metadata area was just committed.
        unsafe {
            let header = segment.header();
            (*header).alloc_ptr = data;
            (*header).commit_ptr = data;
            (*header).reserve_ptr = base + SEGMENT_SIZE;
            (*header).data_ptr = data;
            (*header).kind = match kind {
                SegmentKind::Small => 0,
                SegmentKind::Large => 1,
            };
        }
        segment
    }

    /// Recovers the owning segment of a data-area address.
    ///
    /// # Safety
    ///
    /// `addr` must lie inside a live segment.
    pub(crate) unsafe fn from_addr(addr: usize) -> Self {
        // SAFETY: a live segment base is never zero.
        Self {
            base: unsafe { NonNull::new_unchecked(segment_base(addr) as *mut u8) },
        }
    }

    fn header(self) -> *mut SegmentHeader {
        self.base.as_ptr().cast()
    }

    /// Base address of the segment.
    #[must_use]
    pub fn base(self) -> usize {
        self.base.as_ptr() as usize
    }

    /// Which allocator this segment serves.
    #[must_use]
    pub fn kind(self) -> SegmentKind {
        // SAFETY: the metadata area is committed for the segment's lifetime.
        if unsafe { (*self.header()).kind } == 0 {
            SegmentKind::Small
        } else {
            SegmentKind::Large
        }
    }

    /// Next free byte for bump allocation.
    #[must_use]
    pub fn alloc_ptr(self) -> usize {
        // SAFETY: see `kind`.
        unsafe { (*self.header()).alloc_ptr }
    }

    /// First byte that is not yet readable/writable.
    #[must_use]
    pub fn commit_ptr(self) -> usize {
        // SAFETY: see `kind`.
        unsafe { (*self.header()).commit_ptr }
    }

    /// One past the last byte of the segment.
    #[must_use]
    pub fn reserve_ptr(self) -> usize {
        // SAFETY: see `kind`.
        unsafe { (*self.header()).reserve_ptr }
    }

    /// First data byte after the metadata area.
    #[must_use]
    pub fn data_ptr(self) -> usize {
        // SAFETY: see `kind`.
        unsafe { (*self.header()).data_ptr }
    }

    pub(crate) fn set_alloc_ptr(self, value: usize) {
        // SAFETY: see `kind`.
        unsafe { (*self.header()).alloc_ptr = value }
    }

    pub(crate) fn set_commit_ptr(self, value: usize) {
        // SAFETY: see `kind`.
        unsafe { (*self.header()).commit_ptr = value }
    }

    /// Counter for the page containing `addr`.
    ///
    /// `addr` must lie inside this segment.
    #[must_use]
    pub fn page_counter(self, addr: usize) -> u16 {
        // SAFETY: the counter table is committed for the segment's lifetime.
        unsafe { *self.counter_slot(addr) }
    }

    pub(crate) fn set_page_counter(self, addr: usize, value: u16) {
        // SAFETY: see `page_counter`.
        unsafe { *self.counter_slot(addr) = value }
    }

    fn counter_slot(self, addr: usize) -> *mut u16 {
        debug_assert_eq!(segment_base(addr), self.base());
        let index = (page_base(addr) - self.base()) / PAGE_SIZE;
        // SAFETY: `index` is within the per-page table; entries are
        // 2-aligned because the base is segment-aligned.
        unsafe { self.base.as_ptr().add(index * 2).cast() }
    }

    /// Grows the committed window by one commit unit.
    ///
    /// Returns `false` when the segment is exhausted. Only legal when the
    /// bump pointer has consumed the window entirely.
    pub(crate) fn extend_commit(self) -> bool {
        let commit = self.commit_ptr();
        assert_eq!(self.alloc_ptr(), commit);
        let next = commit + COMMIT_SIZE;
        if next > self.reserve_ptr() {
            assert_eq!(commit, self.reserve_ptr());
            return false;
        }
        // SAFETY: [commit, commit + COMMIT_SIZE) is inside this segment's
        // reservation and not yet committed.
        unsafe {
            sys_vm::commit(commit as *mut u8, COMMIT_SIZE)
                .unwrap_or_else(|e| panic!("failed to commit heap page: {e}"));
        }
        self.set_commit_ptr(next);
        true
    }
}

/// Rounds `value` up to a multiple of a power-of-two `align`.
#[must_use]
pub const fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

/// Base of the segment containing `addr`.
#[must_use]
pub const fn segment_base(addr: usize) -> usize {
    addr & SEGMENT_MASK
}

/// Base of the page containing `addr`.
#[must_use]
pub const fn page_base(addr: usize) -> usize {
    addr & PAGE_MASK
}
