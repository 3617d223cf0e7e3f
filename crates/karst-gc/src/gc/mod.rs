//! The collection cycle: root enumeration, conservative marking, sweep.
//!
//! Phase ordering is fixed: global data roots, then zero-initialised data,
//! then the current thread's stack; the unscanned worklist then drains to
//! empty before sweep touches any page. Sweep walks every segment in
//! creation order, resets surviving marks, and returns entirely free pages
//! to the OS.

pub(crate) mod worklist;

use std::ptr::NonNull;
use std::time::Instant;

use crate::heap::Heap;
use crate::metrics::CycleMetrics;
use crate::roots;
use crate::scan::scan_region;
use crate::segment::{
    status, ObjHeader, Segment, SegmentKind, HEADER_SIZE, LARGE_FIRST_PAGE, PAGE_FREE, PAGE_SIZE,
};

use worklist::UnscannedList;

#[cfg(feature = "tracing")]
use crate::tracing::internal::{
    log_roots_scanned, log_sweep_done, next_cycle_id, trace_cycle, trace_phase, GcPhase,
};

/// Totals accumulated by one sweep.
#[derive(Default)]
struct SweepOutcome {
    bytes_reclaimed: usize,
    objects_reclaimed: usize,
    objects_surviving: usize,
}

/// Runs one full stop-the-world collection cycle.
pub(crate) fn run(heap: &mut Heap) {
    let started = Instant::now();
    heap.stats.gc_cycles += 1;

    #[cfg(feature = "tracing")]
    let _cycle_span = trace_cycle(next_cycle_id());

    let mut unscanned = UnscannedList::new();

    {
        #[cfg(feature = "tracing")]
        let _phase = trace_phase(GcPhase::Roots);

        let (data, bss) = roots::global_data_regions();
        // SAFETY: the initialised-data and bss intervals of the running
        // image are readable.
        unsafe {
            scan_region(heap, &mut unscanned, data.start, data.end);
            scan_region(heap, &mut unscanned, bss.start, bss.end);
        }

        // This local anchors the upward sentinel search, so everything
        // between here and the application's anchor frame is skipped.
        let probe: u32 = 0;
        let stack = roots::stack_region_above(std::ptr::addr_of!(probe) as usize);
        // SAFETY: the found region is inside the current thread's stack.
        unsafe { scan_region(heap, &mut unscanned, stack.start, stack.end) };

        #[cfg(feature = "tracing")]
        log_roots_scanned(unscanned.len());
    }

    {
        #[cfg(feature = "tracing")]
        let _phase = trace_phase(GcPhase::Mark);
        mark(heap, &mut unscanned);
    }
    debug_assert!(unscanned.is_empty());

    let outcome = {
        #[cfg(feature = "tracing")]
        let _phase = trace_phase(GcPhase::Sweep);
        sweep(heap)
    };

    #[cfg(feature = "tracing")]
    log_sweep_done(outcome.bytes_reclaimed, outcome.objects_reclaimed);

    heap.last_cycle = CycleMetrics {
        duration: started.elapsed(),
        bytes_reclaimed: outcome.bytes_reclaimed,
        objects_reclaimed: outcome.objects_reclaimed,
        objects_surviving: outcome.objects_surviving,
        total_cycles: heap.stats.gc_cycles,
    };
}

/// Drains the unscanned list to empty.
///
/// Each popped object has its payload scanned conservatively; hits append
/// to the same queue, so the loop ends only once no marked object has an
/// unscanned interior left.
fn mark(heap: &Heap, unscanned: &mut UnscannedList) {
    while let Some(object) = unscanned.pop() {
        let start = object.as_ptr() as usize;
        // SAFETY: marked objects sit on committed pages.
        let size = unsafe { (*object.as_ptr()).size as usize };
        // SAFETY: the payload extent is committed object memory.
        unsafe { scan_region(heap, unscanned, start + HEADER_SIZE, start + size) };
    }
}

/// Frees every unmarked object and resets surviving marks.
fn sweep(heap: &mut Heap) -> SweepOutcome {
    let mut outcome = SweepOutcome::default();
    for index in 0..heap.segments().len() {
        let seg = heap.segments()[index];
        match seg.kind() {
            SegmentKind::Small => sweep_small_segment(heap, seg, &mut outcome),
            SegmentKind::Large => sweep_large_segment(heap, seg, &mut outcome),
        }
    }
    outcome
}

fn sweep_small_segment(heap: &mut Heap, seg: Segment, outcome: &mut SweepOutcome) {
    let mut page = seg.data_ptr();
    while page < seg.alloc_ptr() {
        if seg.page_counter(page) != PAGE_FREE {
            sweep_small_page(heap, seg, page, outcome);
        }
        page += PAGE_SIZE;
    }
}

/// Walks one small-object page as a run of headered objects.
///
/// The counter is rechecked on every step: freeing the last live bytes of
/// the page decommits it mid-walk, and nothing may be read from it after
/// that.
fn sweep_small_page(heap: &mut Heap, seg: Segment, page: usize, outcome: &mut SweepOutcome) {
    let limit = (page + PAGE_SIZE).min(seg.alloc_ptr());
    let mut obj = page;
    while seg.page_counter(page) != PAGE_FREE && obj < limit {
        let header = obj as *mut ObjHeader;
        // SAFETY: the page is committed while its counter stays below
        // PAGE_FREE.
        let (size, obj_status) = unsafe { ((*header).size as usize, (*header).status) };
        // Advance before a free can release the page under the walk.
        obj += size;
        match obj_status {
            status::MARKED => {
                // SAFETY: a page holding a marked object cannot be
                // released before this reset.
                unsafe { (*header).status = status::UNMARKED };
                outcome.objects_surviving += 1;
            }
            status::UNMARKED => {
                outcome.objects_reclaimed += 1;
                outcome.bytes_reclaimed += size;
                // SAFETY: unmarked objects are unreachable once marking
                // has drained.
                unsafe { heap.release_object(NonNull::new_unchecked(header), true) };
            }
            _ => {} // already free: a hole, or freed in an earlier cycle
        }
    }
}

/// Sweeps a large segment by jumping from first page to first page.
fn sweep_large_segment(heap: &mut Heap, seg: Segment, outcome: &mut SweepOutcome) {
    let mut page = seg.data_ptr();
    while page < seg.alloc_ptr() {
        if seg.page_counter(page) == LARGE_FIRST_PAGE {
            let header = page as *mut ObjHeader;
            // SAFETY: a first-page counter means a committed header.
            let (size, obj_status) = unsafe { ((*header).size as usize, (*header).status) };
            debug_assert_ne!(obj_status, status::FREE);
            if obj_status == status::MARKED {
                // SAFETY: the object's pages stay committed.
                unsafe { (*header).status = status::UNMARKED };
                outcome.objects_surviving += 1;
            } else {
                outcome.objects_reclaimed += 1;
                outcome.bytes_reclaimed += size;
                // SAFETY: unmarked objects are unreachable once marking
                // has drained.
                unsafe { heap.release_object(NonNull::new_unchecked(header), true) };
            }
            page += size;
        } else {
            page += PAGE_SIZE;
        }
    }
}
