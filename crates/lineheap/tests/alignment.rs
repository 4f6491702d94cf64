//! `allocate_aligned(alignment, size)` returns pointers satisfying the
//! mask across every tier, and concurrently live allocations never
//! overlap.

const MB: usize = 1024 * 1024;

#[test]
fn aligned_pointers_satisfy_the_mask_across_tiers() {
    let alignments = [8usize, 16, 32, 64, 128, 256, 512, 4096, 64 * 1024, 2 * MB];
    let sizes = [1usize, 24, 100, 1000, 5000, 70_000, 300_000];

    for &alignment in &alignments {
        for &size in &sizes {
            let p = lineheap::allocate_aligned(alignment, size);
            assert_eq!(
                p.as_ptr() as usize % alignment,
                0,
                "alignment {alignment} size {size}"
            );
            unsafe {
                // The range must be usable end to end.
                *p.as_ptr() = 0x11;
                *p.as_ptr().add(size.max(1) - 1) = 0x22;
                lineheap::deallocate(p.as_ptr());
            }
        }
    }
}

#[test]
fn zero_size_aligned_requests_return_aligned_storage() {
    for alignment in [16usize, 64, 256] {
        let p = lineheap::allocate_aligned(alignment, 0);
        assert_eq!(p.as_ptr() as usize % alignment, 0);
        unsafe {
            assert!(lineheap::size_of(p.as_ptr()) >= alignment);
            lineheap::deallocate(p.as_ptr());
        }
    }
}

#[test]
fn live_aligned_allocations_do_not_overlap() {
    let mut live = Vec::new();
    for round in 0..8 {
        for &alignment in &[16usize, 128, 4096] {
            let size = 96 + round * 40;
            let p = lineheap::allocate_aligned(alignment, size);
            live.push((p.as_ptr() as usize, size));
        }
    }

    let mut sorted = live.clone();
    sorted.sort_unstable();
    for window in sorted.windows(2) {
        let (begin, size) = window[0];
        assert!(
            begin + size <= window[1].0,
            "allocations {begin:#x}+{size} and {:#x} overlap",
            window[1].0
        );
    }

    for (begin, _) in live {
        unsafe { lineheap::deallocate(begin as *mut u8) };
    }
}
