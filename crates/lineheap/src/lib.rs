//! A scalable, low-fragmentation process memory allocator.
//!
//! `lineheap` services arbitrary-size allocation and deallocation with
//! three size tiers:
//!
//! - **Small** (≤ 1KiB): rounded to one of ~28 size classes and bump
//!   allocated from 256-byte *lines* within a physical page. Lines carry
//!   refcounts; whole runs of free lines are harvested into per-thread
//!   bump ranges, so the fast path never takes a lock.
//! - **Large** (≤ 256KiB): carved from address-ordered free spans inside
//!   2MiB chunks, with eager coalescing on free.
//! - **Extra-large**: page-aligned ranges reserved directly from the OS at
//!   a 2MiB boundary.
//!
//! Deallocations are batched in a per-thread log and drained in one lock
//! acquisition when it fills. A background scavenger returns physical
//! pages to the OS once the live footprint shrinks, keeping the virtual
//! reservations for cheap reuse.
//!
//! # Quick start
//!
//! ```
//! let p = lineheap::allocate(48);
//! unsafe {
//!     assert!(lineheap::size_of(p.as_ptr()) >= 48);
//!     lineheap::deallocate(p.as_ptr());
//! }
//! ```
//!
//! Setting `LINEHEAP_DISABLE=1` (or any `Malloc*` debugging variable)
//! makes every operation defer to the system allocator.

#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod allocator;
mod api;
mod cache;
mod chunk;
mod deallocator;
mod environment;
mod heap;
mod large;
mod line;
mod metrics;
mod scavenger;
mod vm_heap;
mod vm_state;
mod xlarge;

/// Tier constants and size-class arithmetic.
///
/// Public so callers and tests can reason about tier boundaries; the
/// values are part of the allocator's behavioral contract.
pub mod sizes;

pub use api::{
    allocate, allocate_aligned, deallocate, metrics, reallocate, scavenge, shutdown, size_of,
    try_allocate,
};
pub use metrics::HeapMetrics;
