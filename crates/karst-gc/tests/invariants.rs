//! Structural invariants across mixed workloads.
//!
//! `Heap::check_invariants` asserts pointer ordering per segment, that
//! every committed page tiles into headered objects, that page counters
//! match the free bytes on their page, that no mark survives a sweep, and
//! that the lifetime counters agree with the live object sizes.

use karst_gc::segment::SEGMENT_SIZE;
use karst_gc::{with_stack_anchor, Heap};

#[inline(never)]
fn scrub_stack() {
    let mut noise = [0u8; 8192];
    std::hint::black_box(&mut noise);
}

#[inline(never)]
fn churn_mixed(heap: &mut Heap) {
    for i in 0..2000 {
        let size = match i % 5 {
            0 => 24,
            1 => 64,
            2 => 700,
            3 => 3500,
            _ => 2 * 4096, // large path
        };
        let _ = heap.allocate(size);
    }
}

#[test]
fn invariants_hold_through_allocation_and_collection() {
    with_stack_anchor(|| {
        let mut heap = Heap::new();
        heap.check_invariants();

        churn_mixed(&mut heap);
        heap.check_invariants();

        scrub_stack();
        heap.collect();
        heap.check_invariants();

        churn_mixed(&mut heap);
        heap.collect();
        heap.check_invariants();
    });
}

#[test]
fn segments_span_exactly_four_gib() {
    let mut heap = Heap::new();
    let _ = heap.allocate(64);
    let _ = heap.allocate(2 * 4096);

    for seg in heap.segments() {
        assert_eq!(seg.base() % SEGMENT_SIZE, 0);
        assert_eq!(seg.reserve_ptr() - seg.base(), SEGMENT_SIZE);
        assert!(seg.data_ptr() <= seg.alloc_ptr());
        assert!(seg.alloc_ptr() <= seg.commit_ptr());
        assert!(seg.commit_ptr() <= seg.reserve_ptr());
    }
}

#[test]
fn repeated_cycles_converge() {
    with_stack_anchor(|| {
        let mut heap = Heap::new();
        churn_mixed(&mut heap);
        scrub_stack();

        heap.collect();
        let baseline = heap.stats().bytes_freed;
        for _ in 0..5 {
            heap.collect();
            assert_eq!(heap.stats().bytes_freed, baseline);
            heap.check_invariants();
        }
    });
}
