//! Retention through conservative roots: globals, interior pointers, and
//! one-past-the-end pointers.

use std::sync::atomic::{AtomicUsize, Ordering};

use karst_gc::segment::{status, ObjHeader};
use karst_gc::{with_stack_anchor, Heap};

/// XOR cookie hiding addresses from the conservative scan.
const COOKIE: usize = 0x5a5a_5a5a_5a5a_5a5a;

static GLOBAL_ROOT: AtomicUsize = AtomicUsize::new(0);
static INTERIOR_ROOT: AtomicUsize = AtomicUsize::new(0);
static EDGE_ROOT: AtomicUsize = AtomicUsize::new(0);

#[inline(never)]
fn scrub_stack() {
    let mut noise = [0u8; 8192];
    std::hint::black_box(&mut noise);
}

/// Allocates `size` bytes filled with `byte`, publishes `payload + offset`
/// in `root`, and returns the cookied payload address. The raw pointer
/// dies with this frame.
#[inline(never)]
fn allocate_rooted(
    heap: &mut Heap,
    size: usize,
    byte: u8,
    root: &AtomicUsize,
    offset: usize,
) -> usize {
    let p = heap.allocate(size);
    // SAFETY: the payload is `size` writable bytes.
    unsafe { p.as_ptr().write_bytes(byte, size) };
    root.store(p.as_ptr() as usize + offset, Ordering::SeqCst);
    p.as_ptr() as usize ^ COOKIE
}

#[inline(never)]
fn assert_payload(cookie: usize, len: usize, byte: u8) {
    let ptr = (cookie ^ COOKIE) as *const u8;
    for i in 0..len {
        // SAFETY: the object was verified live by the caller.
        unsafe { assert_eq!(*ptr.add(i), byte, "payload corrupted at offset {i}") };
    }
}

#[test]
fn object_referenced_from_a_global_survives() {
    with_stack_anchor(|| {
        let mut heap = Heap::new();
        let cookie = allocate_rooted(&mut heap, 64, 0xAB, &GLOBAL_ROOT, 0);
        scrub_stack();
        heap.collect();

        assert_eq!(heap.stats().bytes_freed, 0);
        assert_payload(cookie, 64, 0xAB);

        // The mark was reset at the end of sweep.
        let payload = std::ptr::NonNull::new((cookie ^ COOKIE) as *mut u8).unwrap();
        let header = ObjHeader::from_payload(payload);
        // SAFETY: the object is live.
        unsafe { assert_eq!((*header.as_ptr()).status, status::UNMARKED) };

        GLOBAL_ROOT.store(0, Ordering::SeqCst);
    });
}

#[test]
fn interior_pointer_keeps_the_object_alive() {
    with_stack_anchor(|| {
        let mut heap = Heap::new();
        // Only `payload + 40` is published anywhere the scanner looks.
        let cookie = allocate_rooted(&mut heap, 256, 0x5C, &INTERIOR_ROOT, 40);
        scrub_stack();
        heap.collect();

        assert_eq!(heap.stats().bytes_freed, 0);
        assert_payload(cookie, 256, 0x5C);

        INTERIOR_ROOT.store(0, Ordering::SeqCst);
    });
}

#[test]
fn one_past_the_end_pointer_keeps_the_object_alive() {
    with_stack_anchor(|| {
        let mut heap = Heap::new();
        // `payload + 256` is the first byte after the object, the shape a
        // compiler-generated end pointer takes.
        let cookie = allocate_rooted(&mut heap, 256, 0x11, &EDGE_ROOT, 256);
        scrub_stack();
        heap.collect();

        assert_eq!(heap.stats().bytes_freed, 0);
        assert_payload(cookie, 256, 0x11);

        EDGE_ROOT.store(0, Ordering::SeqCst);
    });
}

#[test]
fn local_above_the_anchor_roots_an_object() {
    // The scanned stack interval runs from the sentinel to the stack
    // bottom, so a local of the frame that calls `with_stack_anchor` is a
    // root.
    let mut holder: usize = 0;
    let holder_ref = &mut holder;
    with_stack_anchor(|| {
        let mut heap = Heap::new();
        let p = heap.allocate(64);
        // SAFETY: the payload is 64 writable bytes.
        unsafe { p.as_ptr().write_bytes(0x33, 64) };
        *holder_ref = p.as_ptr() as usize;

        heap.collect();
        assert_eq!(heap.stats().bytes_freed, 0);
        // SAFETY: the object was kept alive by the stack root.
        unsafe { assert_eq!(*p.as_ptr(), 0x33) };
        *holder_ref = 0;
    });
    std::hint::black_box(&holder);
}

#[test]
fn an_immediate_second_cycle_frees_nothing_more() {
    with_stack_anchor(|| {
        let mut heap = Heap::new();
        churn(&mut heap, 1000);
        scrub_stack();
        heap.collect();
        let first = heap.stats();
        heap.collect();
        let second = heap.stats();

        assert_eq!(second.bytes_freed, first.bytes_freed);
        assert_eq!(second.gc_cycles, first.gc_cycles + 1);
    });
}

#[inline(never)]
fn churn(heap: &mut Heap, count: usize) {
    for _ in 0..count {
        let _ = heap.allocate(64);
    }
}
