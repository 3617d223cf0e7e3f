//! Structured tracing for collection cycles.
//!
//! Compiled only with the `tracing` cargo feature; every cycle then emits
//! a `gc_cycle` span with per-phase child spans and summary events.

pub(crate) mod internal {
    use std::sync::atomic::{AtomicU64, Ordering};
    use tracing::{span, Level};

    /// Phases of a collection cycle.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum GcPhase {
        /// Conservative scan of global data and the thread stack.
        Roots,
        /// Worklist drain over object interiors.
        Mark,
        /// Page walks reclaiming unmarked objects.
        Sweep,
    }

    static NEXT_CYCLE_ID: AtomicU64 = AtomicU64::new(1);

    /// Monotonic id correlating all events within one cycle.
    pub fn next_cycle_id() -> u64 {
        NEXT_CYCLE_ID.fetch_add(1, Ordering::Relaxed)
    }

    /// Span covering a whole collection cycle.
    pub fn trace_cycle(cycle_id: u64) -> span::EnteredSpan {
        span!(Level::DEBUG, "gc_cycle", cycle_id).entered()
    }

    /// Span covering one phase.
    pub fn trace_phase(phase: GcPhase) -> span::EnteredSpan {
        span!(Level::DEBUG, "gc_phase", phase = ?phase).entered()
    }

    /// Worklist length once every root region has been scanned.
    pub fn log_roots_scanned(unscanned: usize) {
        tracing::debug!(unscanned, "roots_scanned");
    }

    /// Reclamation totals at the end of sweep.
    pub fn log_sweep_done(bytes_reclaimed: usize, objects_reclaimed: usize) {
        tracing::debug!(bytes_reclaimed, objects_reclaimed, "sweep_done");
    }
}
