//! Address-ordered large-span bookkeeping.
//!
//! A [`LargeMap`] records every span carved out of the chunks it governs,
//! free and allocated alike, keyed by begin address. Keeping both kinds in
//! one ordered map gives coalescing (neighbor lookup by address), size
//! lookup for deallocation, and first-fit takes in address order. Adjacent
//! free spans are always merged on insertion through
//! [`LargeMap::insert_free_merged`]; the map never holds two free spans
//! that share a boundary.

use std::collections::BTreeMap;

use crate::sizes::is_aligned;
use crate::vm_state::VmState;

/// A contiguous large-tier range.
#[derive(Clone, Copy, Debug)]
pub(crate) struct LargeSpan {
    pub begin: usize,
    pub size: usize,
    pub vm_state: VmState,
}

impl LargeSpan {
    #[inline]
    pub const fn end(&self) -> usize {
        self.begin + self.size
    }

    /// Splits the span at `size` bytes. Both halves inherit the VM state.
    #[inline]
    #[must_use]
    pub fn split(self, size: usize) -> (Self, Self) {
        debug_assert!(size > 0 && size < self.size);
        (
            Self {
                begin: self.begin,
                size,
                vm_state: self.vm_state,
            },
            Self {
                begin: self.begin + size,
                size: self.size - size,
                vm_state: self.vm_state,
            },
        )
    }
}

#[derive(Clone, Copy, Debug)]
struct SpanRecord {
    size: usize,
    free: bool,
    vm_state: VmState,
}

/// Span map of one world of chunk memory (the committed spans owned by the
/// heap, or the virtual spans owned by the VM heap).
pub(crate) struct LargeMap {
    spans: BTreeMap<usize, SpanRecord>,
}

impl LargeMap {
    pub const fn new() -> Self {
        Self {
            spans: BTreeMap::new(),
        }
    }

    fn remove(&mut self, begin: usize) -> LargeSpan {
        let record = self.spans.remove(&begin).expect("span record missing");
        LargeSpan {
            begin,
            size: record.size,
            vm_state: record.vm_state,
        }
    }

    /// Takes the lowest-addressed free span of at least `size` bytes.
    pub fn take(&mut self, size: usize) -> Option<LargeSpan> {
        let begin = self
            .spans
            .iter()
            .find(|(_, record)| record.free && record.size >= size)
            .map(|(begin, _)| *begin)?;
        Some(self.remove(begin))
    }

    /// Takes the lowest-addressed free span usable for an aligned request:
    /// either its begin is aligned and it holds `size` bytes, or it holds
    /// `unaligned_size` bytes, enough to carve an aligned `size` from the
    /// middle with a head remnant of at least the minimum span size.
    pub fn take_aligned(
        &mut self,
        alignment: usize,
        size: usize,
        unaligned_size: usize,
    ) -> Option<LargeSpan> {
        let begin = self
            .spans
            .iter()
            .find(|(begin, record)| {
                record.free
                    && ((is_aligned(**begin, alignment) && record.size >= size)
                        || record.size >= unaligned_size)
            })
            .map(|(begin, _)| *begin)?;
        Some(self.remove(begin))
    }

    /// Takes any free span; used by the scavenger to drain the map.
    pub fn take_greedy(&mut self) -> Option<LargeSpan> {
        let begin = self
            .spans
            .iter()
            .find(|(_, record)| record.free)
            .map(|(begin, _)| *begin)?;
        Some(self.remove(begin))
    }

    /// Records an allocated span.
    pub fn insert_allocated(&mut self, span: LargeSpan) {
        let previous = self.spans.insert(
            span.begin,
            SpanRecord {
                size: span.size,
                free: false,
                vm_state: span.vm_state,
            },
        );
        debug_assert!(previous.is_none());
    }

    /// Inserts a free span without attempting to merge. Only valid when the
    /// caller knows both neighbors cannot merge (fresh split boundaries).
    pub fn insert_free(&mut self, span: LargeSpan) {
        debug_assert!(span.size > 0);
        let previous = self.spans.insert(
            span.begin,
            SpanRecord {
                size: span.size,
                free: true,
                vm_state: span.vm_state,
            },
        );
        debug_assert!(previous.is_none());
    }

    /// Inserts a free span, merging with free neighbors on both sides.
    /// Returns the merged span.
    pub fn insert_free_merged(&mut self, span: LargeSpan) -> LargeSpan {
        let mut span = span;

        if let Some((&prev_begin, prev)) = self.spans.range(..span.begin).next_back() {
            if prev.free && prev_begin + prev.size == span.begin {
                let prev_state = prev.vm_state;
                let prev_size = prev.size;
                self.spans.remove(&prev_begin);
                span = LargeSpan {
                    begin: prev_begin,
                    size: prev_size + span.size,
                    vm_state: prev_state.merge(span.vm_state),
                };
            }
        }

        if let Some(next) = self.spans.get(&span.end()).copied() {
            if next.free {
                self.spans.remove(&span.end());
                span = LargeSpan {
                    begin: span.begin,
                    size: span.size + next.size,
                    vm_state: span.vm_state.merge(next.vm_state),
                };
            }
        }

        self.insert_free(span);
        span
    }

    /// Looks up the allocated span beginning at `begin`.
    pub fn get_allocated(&self, begin: usize) -> Option<LargeSpan> {
        let record = self.spans.get(&begin)?;
        if record.free {
            return None;
        }
        Some(LargeSpan {
            begin,
            size: record.size,
            vm_state: record.vm_state,
        })
    }

    /// Removes and returns the allocated span beginning at `begin`.
    pub fn take_allocated(&mut self, begin: usize) -> LargeSpan {
        debug_assert!(
            self.spans.get(&begin).is_some_and(|record| !record.free),
            "not an allocated span"
        );
        self.remove(begin)
    }

    /// Total bytes held in free spans.
    pub fn free_bytes(&self) -> usize {
        self.spans
            .values()
            .filter(|record| record.free)
            .map(|record| record.size)
            .sum()
    }

    #[cfg(test)]
    fn assert_no_adjacent_free_spans(&self) {
        let mut previous_free_end = None;
        for (begin, record) in &self.spans {
            if record.free {
                assert_ne!(previous_free_end, Some(*begin), "unmerged neighbors");
                previous_free_end = Some(begin + record.size);
            }
        }
    }
}
