//! Pool of reserved-but-uncommitted large spans.
//!
//! Spans live here in the virtual state: their address space belongs to the
//! process but their physical pages have been returned to the OS (or were
//! never requested). The heap pulls spans out when its own free spans run
//! dry, and the scavenger pushes decommitted spans back in. Chunk growth
//! itself happens at the heap layer because the reservation syscall runs
//! with the heap lock released.

use crate::large::{LargeMap, LargeSpan};
use crate::sizes::is_aligned;
use crate::vm_state::VmState;

pub(crate) struct VmHeap {
    spans: LargeMap,
}

impl VmHeap {
    pub const fn new() -> Self {
        Self {
            spans: LargeMap::new(),
        }
    }

    /// Takes exactly `size` bytes, trimming the source span so the
    /// remainder stays virtual in the pool. Only the bytes leaving the pool
    /// get committed by the caller.
    pub fn take_span(&mut self, size: usize) -> Option<LargeSpan> {
        let span = self.spans.take(size)?;
        Some(self.trim(span, size))
    }

    /// Aligned variant of [`Self::take_span`].
    pub fn take_span_aligned(
        &mut self,
        alignment: usize,
        size: usize,
        unaligned_size: usize,
    ) -> Option<LargeSpan> {
        let span = self.spans.take_aligned(alignment, size, unaligned_size)?;
        let want = if is_aligned(span.begin, alignment) && span.size >= size {
            size
        } else {
            unaligned_size.min(span.size)
        };
        Some(self.trim(span, want))
    }

    fn trim(&mut self, span: LargeSpan, want: usize) -> LargeSpan {
        if span.size > want {
            let (first, rest) = span.split(want);
            // The remainder's low boundary is the span being taken, so it
            // cannot merge.
            self.spans.insert_free(rest);
            return first;
        }
        span
    }

    /// Adds the usable part of a freshly reserved chunk.
    pub fn insert_fresh(&mut self, span: LargeSpan) {
        debug_assert!(span.vm_state == VmState::VIRTUAL);
        self.spans.insert_free(span);
    }

    /// Returns a decommitted span to the pool, merging with neighbors.
    pub fn insert_virtual(&mut self, span: LargeSpan) {
        debug_assert!(span.vm_state == VmState::VIRTUAL);
        self.spans.insert_free_merged(span);
    }

    /// Total bytes of reserved address space waiting in the pool.
    pub fn free_bytes(&self) -> usize {
        self.spans.free_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn virtual_span(begin: usize, size: usize) -> LargeSpan {
        LargeSpan {
            begin,
            size,
            vm_state: VmState::VIRTUAL,
        }
    }

    #[test]
    fn take_trims_to_the_requested_size() {
        let mut pool = VmHeap::new();
        pool.insert_fresh(virtual_span(0x20_0000, 0x10_0000));
        let span = pool.take_span(0x1000).unwrap();
        assert_eq!(span.begin, 0x20_0000);
        assert_eq!(span.size, 0x1000);
        assert_eq!(pool.free_bytes(), 0x10_0000 - 0x1000);
    }

    #[test]
    fn aligned_take_trims_to_the_carving_size() {
        let mut pool = VmHeap::new();
        pool.insert_fresh(virtual_span(0x20_1000, 0x10_0000));
        // Misaligned begin: the pool hands out the unaligned carving size.
        let span = pool
            .take_span_aligned(0x10000, 0x2000, 0x2000 + 0x10000)
            .unwrap();
        assert_eq!(span.begin, 0x20_1000);
        assert_eq!(span.size, 0x2000 + 0x10000);
    }

    #[test]
    fn returned_spans_merge_back() {
        let mut pool = VmHeap::new();
        pool.insert_fresh(virtual_span(0x20_0000, 0x10_0000));
        let first = pool.take_span(0x1000).unwrap();
        let second = pool.take_span(0x1000).unwrap();
        assert_eq!(second.begin, 0x20_1000);
        pool.insert_virtual(first);
        pool.insert_virtual(second);
        // Everything coalesced into the original range again.
        let whole = pool.take_span(0x10_0000).unwrap();
        assert_eq!(whole.begin, 0x20_0000);
        assert_eq!(whole.size, 0x10_0000);
    }
}
