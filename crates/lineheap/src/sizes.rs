//! Tier boundaries, size classes, and address arithmetic.
//!
//! Three disjoint size regimes govern layout. Requests up to [`SMALL_MAX`]
//! are rounded to one of [`SIZE_CLASS_COUNT`] size classes and packed into
//! 256-byte lines within a physical page. Requests up to [`LARGE_MAX`] are
//! carved from address-ordered free spans inside 2MiB chunks. Anything
//! bigger is mapped directly from the OS at [`X_LARGE_ALIGNMENT`].

use std::time::Duration;

/// Minimum alignment of every returned pointer.
pub const ALIGNMENT: usize = 8;

/// Size of a small line, the refcounting granule within a small page.
pub const SMALL_LINE_SIZE: usize = 256;

/// Largest size serviced by the small (bump) path.
pub const SMALL_MAX: usize = 1024;

/// Alignment and rounding unit of the large tier.
pub const LARGE_ALIGNMENT: usize = 64;

/// Smallest large allocation. Also the guaranteed head remnant when an
/// aligned request splits a misaligned span.
pub const LARGE_MIN: usize = SMALL_MAX;

/// Largest size serviced by the large tier.
pub const LARGE_MAX: usize = 256 * 1024;

/// Unit of OS-level reservation for the small and large tiers. Every
/// in-heap address finds its metadata by masking to its chunk base.
pub const CHUNK_SIZE: usize = 2 * 1024 * 1024;

/// Mask extracting the chunk base from an address.
pub const CHUNK_MASK: usize = !(CHUNK_SIZE - 1);

/// Alignment of every extra-large reservation. No small or large object is
/// ever aligned to this boundary, which makes the tier test a mask check.
pub const X_LARGE_ALIGNMENT: usize = 2 * 1024 * 1024;

/// Upper bound on extra-large alignment requests.
pub const X_LARGE_MAX: usize = usize::MAX - X_LARGE_ALIGNMENT;

/// Capacity of the per-thread deallocation log.
pub const OBJECT_LOG_CAPACITY: usize = 512;

/// Number of spare bump ranges fetched per global-lock acquisition.
pub const BUMP_RANGE_CACHE_CAPACITY: usize = 3;

/// Pacing interval of the scavenger thread.
pub const SCAVENGE_SLEEP: Duration = Duration::from_millis(512);

/// Number of small size classes.
pub const SIZE_CLASS_COUNT: usize = 28;

/// Object sizes of the small classes: every 8 bytes up to 128, then
/// progressively coarser steps up to [`SMALL_MAX`].
pub const SIZE_CLASSES: [usize; SIZE_CLASS_COUNT] = [
    8, 16, 24, 32, 40, 48, 56, 64, 72, 80, 88, 96, 104, 112, 120, 128, //
    160, 192, 224, 256, //
    320, 384, 448, 512, //
    640, 768, 896, 1024,
];

const QUANTUM_COUNT: usize = SMALL_MAX / ALIGNMENT + 1;

const CLASS_BY_QUANTUM: [u8; QUANTUM_COUNT] = build_class_table();

const fn build_class_table() -> [u8; QUANTUM_COUNT] {
    let mut table = [0u8; QUANTUM_COUNT];
    let mut quantum = 0;
    while quantum < QUANTUM_COUNT {
        let size = quantum * ALIGNMENT;
        let mut class = 0;
        while SIZE_CLASSES[class] < size {
            class += 1;
        }
        table[quantum] = class as u8;
        quantum += 1;
    }
    table
}

/// Maps a small request size to its size-class index in constant time.
///
/// `size` must not exceed [`SMALL_MAX`]. A zero-size request maps to the
/// smallest class.
#[inline]
#[must_use]
pub const fn size_class(size: usize) -> usize {
    debug_assert!(size <= SMALL_MAX);
    CLASS_BY_QUANTUM[(size + ALIGNMENT - 1) / ALIGNMENT] as usize
}

/// Returns the object size of a size class.
#[inline]
#[must_use]
pub const fn object_size(class: usize) -> usize {
    SIZE_CLASSES[class]
}

/// Rounds `x` up to a multiple of the power-of-two `divisor`.
#[inline]
#[must_use]
pub(crate) const fn round_up_to_multiple_of(divisor: usize, x: usize) -> usize {
    debug_assert!(divisor.is_power_of_two());
    (x + divisor - 1) & !(divisor - 1)
}

/// Rounds `x` down to a multiple of the power-of-two `divisor`.
#[inline]
#[must_use]
pub(crate) const fn round_down_to_multiple_of(divisor: usize, x: usize) -> usize {
    debug_assert!(divisor.is_power_of_two());
    x & !(divisor - 1)
}

/// Returns `true` if `x` is a multiple of the power-of-two `alignment`.
#[inline]
#[must_use]
pub(crate) const fn is_aligned(x: usize, alignment: usize) -> bool {
    debug_assert!(alignment.is_power_of_two());
    (x & (alignment - 1)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classes_are_sorted_and_aligned() {
        for window in SIZE_CLASSES.windows(2) {
            assert!(window[0] < window[1]);
        }
        for size in SIZE_CLASSES {
            assert_eq!(size % ALIGNMENT, 0);
        }
        assert_eq!(SIZE_CLASSES[SIZE_CLASS_COUNT - 1], SMALL_MAX);
    }

    #[test]
    fn every_size_fits_its_class() {
        for size in 0..=SMALL_MAX {
            let class = size_class(size);
            assert!(object_size(class) >= size, "size {size} class {class}");
            if class > 0 {
                // The class below must be too small, otherwise the lookup
                // wastes memory.
                assert!(object_size(class - 1) < round_up_to_multiple_of(ALIGNMENT, size.max(1)));
            }
        }
    }

    #[test]
    fn class_boundaries() {
        assert_eq!(object_size(size_class(0)), 8);
        assert_eq!(object_size(size_class(1)), 8);
        assert_eq!(object_size(size_class(8)), 8);
        assert_eq!(object_size(size_class(9)), 16);
        assert_eq!(object_size(size_class(129)), 160);
        assert_eq!(object_size(size_class(1024)), 1024);
    }

    #[test]
    fn rounding_helpers() {
        assert_eq!(round_up_to_multiple_of(64, 1), 64);
        assert_eq!(round_up_to_multiple_of(64, 64), 64);
        assert_eq!(round_up_to_multiple_of(64, 65), 128);
        assert_eq!(round_down_to_multiple_of(4096, 8191), 4096);
        assert!(is_aligned(0, 8));
        assert!(is_aligned(4096, 4096));
        assert!(!is_aligned(4097, 4096));
    }
}
