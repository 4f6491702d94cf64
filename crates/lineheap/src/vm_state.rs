//! Physical-backing state for address ranges.

/// Whether a range has physical pages committed, only virtual address space
/// reserved, or both kinds of sub-range after merging.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) struct VmState(u8);

impl VmState {
    const HAS_VIRTUAL: u8 = 1 << 0;
    const HAS_PHYSICAL: u8 = 1 << 1;

    /// Address space is reserved; no physical pages are committed.
    pub const VIRTUAL: Self = Self(Self::HAS_VIRTUAL);
    /// Physical pages back the entire range.
    pub const PHYSICAL: Self = Self(Self::HAS_PHYSICAL);
    /// The range was merged from virtual and physical parts.
    pub const MIXED: Self = Self(Self::HAS_VIRTUAL | Self::HAS_PHYSICAL);

    /// Returns `true` if any part of the range lacks physical backing.
    #[inline]
    pub const fn has_virtual(self) -> bool {
        self.0 & Self::HAS_VIRTUAL != 0
    }

    /// Returns `true` if any part of the range has physical backing.
    #[inline]
    pub const fn has_physical(self) -> bool {
        self.0 & Self::HAS_PHYSICAL != 0
    }

    /// State of a range formed by merging two neighbors.
    #[inline]
    #[must_use]
    pub const fn merge(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}
