//! Extra-large range bookkeeping.
//!
//! Ranges above the large tier are reserved straight from the OS, aligned
//! to the extra-large boundary. The map tracks a free side and an allocated
//! side separately because a range's physical backing can change while it
//! is free (the scavenger decommits it and retags it virtual).
//!
//! An allocation is stored together with its sub-alignment tail fragment.
//! The fragment can never be handed out on its own, and keeping it off the
//! free side keeps that list short, which speeds up both allocation scans
//! and merging. The fragment rejoins its range when the allocation is
//! freed.

use crate::sizes::round_up_to_multiple_of;
use crate::vm_state::VmState;

/// A contiguous extra-large range.
#[derive(Clone, Copy, Debug)]
pub(crate) struct XLargeRange {
    pub begin: usize,
    pub size: usize,
    pub vm_state: VmState,
}

impl XLargeRange {
    pub const EMPTY: Self = Self {
        begin: 0,
        size: 0,
        vm_state: VmState::VIRTUAL,
    };

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.size == 0
    }

    #[inline]
    pub const fn end(&self) -> usize {
        self.begin + self.size
    }

    /// Splits the range at `size` bytes. Both halves inherit the VM state.
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

struct Allocation {
    object: XLargeRange,
    /// Trailing fragment below the alignment granule, paired with the
    /// allocation. Empty when the range split evenly.
    unused: XLargeRange,
}

/// Free and allocated extra-large ranges.
pub(crate) struct XLargeMap {
    free: Vec<XLargeRange>,
    allocated: Vec<Allocation>,
}

impl XLargeMap {
    pub const fn new() -> Self {
        Self {
            free: Vec::new(),
            allocated: Vec::new(),
        }
    }

    /// Adds a range to the free side, merging with any adjacent free
    /// ranges. Empty ranges are ignored.
    pub fn add_free(&mut self, range: XLargeRange) {
        if range.is_empty() {
            return;
        }
        let mut merged = range;
        loop {
            let Some(position) = self
                .free
                .iter()
                .position(|other| other.end() == merged.begin || merged.end() == other.begin)
            else {
                break;
            };
            let other = self.free.swap_remove(position);
            merged = XLargeRange {
                begin: merged.begin.min(other.begin),
                size: merged.size + other.size,
                vm_state: merged.vm_state.merge(other.vm_state),
            };
        }
        self.free.push(merged);
    }

    /// Takes the first free range from which an `alignment`-aligned `size`
    /// can be carved.
    pub fn take_free(&mut self, alignment: usize, size: usize) -> Option<XLargeRange> {
        let position = self.free.iter().position(|range| {
            let aligned = round_up_to_multiple_of(alignment, range.begin);
            aligned + size <= range.end()
        })?;
        Some(self.free.swap_remove(position))
    }

    /// Registers an allocation with its paired tail fragment, returning the
    /// head and tail remnants of the split to the free side.
    pub fn add_allocated(
        &mut self,
        prev: XLargeRange,
        pair: (XLargeRange, XLargeRange),
        next: XLargeRange,
    ) {
        self.add_free(prev);
        self.add_free(next);
        self.allocated.push(Allocation {
            object: pair.0,
            unused: pair.1,
        });
    }

    /// Looks up the allocation beginning at `begin`.
    pub fn get_allocated(&self, begin: usize) -> Option<XLargeRange> {
        self.allocated
            .iter()
            .find(|allocation| allocation.object.begin == begin)
            .map(|allocation| allocation.object)
    }

    /// Removes the allocation beginning at `begin` and returns it rejoined
    /// with its paired tail fragment.
    pub fn take_allocated(&mut self, begin: usize) -> Option<XLargeRange> {
        let position = self
            .allocated
            .iter()
            .position(|allocation| allocation.object.begin == begin)?;
        let Allocation { object, unused } = self.allocated.swap_remove(position);
        if unused.is_empty() {
            return Some(object);
        }
        debug_assert!(object.end() == unused.begin);
        Some(XLargeRange {
            begin: object.begin,
            size: object.size + unused.size,
            vm_state: object.vm_state.merge(unused.vm_state),
        })
    }

    /// Takes any free range that still has physical backing.
    pub fn take_physical(&mut self) -> Option<XLargeRange> {
        let position = self
            .free
            .iter()
            .position(|range| range.vm_state.has_physical())?;
        Some(self.free.swap_remove(position))
    }

    /// Releases slack capacity after a scavenging pass.
    pub fn shrink_to_fit(&mut self) {
        self.free.shrink_to_fit();
        self.allocated.shrink_to_fit();
    }
}
