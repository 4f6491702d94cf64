//! Allocator-wide counters.
//!
//! All counters are maintained under the heap lock, so the stored value is
//! a plain struct; [`crate::metrics`] returns a copy taken under the lock.

/// Snapshot of heap counters.
///
/// `committed_bytes` is exact for chunk memory (small and large tiers),
/// tracked per physical page. `xlarge_committed_bytes` is an upper bound:
/// ranges merged from committed and uncommitted parts are recommitted as a
/// whole, which can count a page more than once between scavenges.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeapMetrics {
    /// Bytes of virtual address space reserved from the OS.
    pub reserved_bytes: usize,
    /// Bytes of chunk memory currently backed by physical pages.
    pub committed_bytes: usize,
    /// Bytes of extra-large memory currently backed by physical pages.
    pub xlarge_committed_bytes: usize,
    /// Number of chunks reserved.
    pub chunk_count: usize,
    /// Number of free small pages waiting for reuse or scavenging.
    pub free_small_page_count: usize,
    /// Bytes of committed chunk memory sitting in free spans.
    pub large_free_bytes: usize,
    /// Bytes of reserved chunk memory waiting decommitted in the pool.
    pub vm_free_bytes: usize,
    /// Times a thread's object log was drained under the heap lock.
    pub object_log_drains: u64,
    /// Completed scavenger passes.
    pub scavenger_passes: u64,
}
