//! A conservative, stop-the-world, mark-and-sweep garbage collector over a
//! segmented bump-allocating heap.
//!
//! `karst-gc` discovers live objects without any cooperation from the
//! mutator's types: a collection cycle reads every machine word in the
//! program's global data and in the current thread's stack, and any value
//! that happens to point into the managed heap keeps its object alive.
//! What makes that lookup cheap is the allocator layout: 4 GiB segments
//! aligned to their own size with a `u16` metadata counter per page let a
//! candidate pointer be classified in O(1) regardless of heap size.
//!
//! # Design
//!
//! - **Segmented bump allocation**: small objects (up to one page) bump
//!   through lazily committed pages of a small-object segment; larger
//!   requests get page-rounded spans of a large-object segment.
//! - **Conservative roots**: the initialised-data and BSS intervals of the
//!   running image plus the current thread's stack, scanned at byte
//!   granularity.
//! - **Mark and sweep**: marked objects are queued on a FIFO worklist and
//!   their interiors scanned the same way until the list drains; sweep
//!   then walks every committed page, frees unmarked objects, and returns
//!   entirely free pages to the OS.
//! - **Stop the world**: cycles run synchronously inside
//!   [`Heap::allocate`] once 32 MiB have been allocated since the last
//!   cycle, or on demand via [`Heap::collect`].
//!
//! # Quick start
//!
//! ```ignore
//! use karst_gc::{with_stack_anchor, Heap};
//!
//! with_stack_anchor(|| {
//!     let mut heap = Heap::new();
//!     let node = heap.allocate(64);
//!     unsafe { node.as_ptr().write_bytes(0, 64) };
//!
//!     heap.collect();
//!     println!("{:?}", heap.stats());
//! });
//! ```
//!
//! The [`with_stack_anchor`] wrapper is part of the contract: it plants a
//! sentinel that tells the collector where its own stack frames end and
//! the application's begin.
//!
//! # Limitations
//!
//! Single-threaded mutators only; no compaction, no generations, no
//! precise scanning. Values that merely look like heap pointers retain
//! objects; that is the price of conservatism, not a bug.

#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_panics_doc)]

mod gc;
mod metrics;
mod roots;
mod scan;

/// Heap internals: the segment layout and per-page metadata.
///
/// Public for tests and advanced inspection; most users only need
/// [`Heap`].
pub mod segment;

/// The heap manager and allocator entry points.
pub mod heap;

#[cfg(feature = "tracing")]
mod tracing;

pub use heap::{Heap, HeapStats, GC_THRESHOLD};
pub use metrics::CycleMetrics;
pub use roots::{with_stack_anchor, STACK_ANCHOR_MAGIC};
