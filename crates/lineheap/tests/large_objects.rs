use lineheap::sizes::{LARGE_ALIGNMENT, LARGE_MAX, LARGE_MIN, SMALL_MAX};

#[test]
fn size_of_reports_the_rounded_span_size() {
    let p = lineheap::allocate(3000);
    unsafe {
        // Large sizes round up to the large alignment; a span may keep a
        // sub-minimum tail as slack.
        let size = lineheap::size_of(p.as_ptr());
        assert!(size >= 3008 && size < 3008 + LARGE_MIN, "size {size}");
        lineheap::deallocate(p.as_ptr());
    }

    let p = lineheap::allocate(SMALL_MAX + 1);
    unsafe {
        assert!(lineheap::size_of(p.as_ptr()) >= SMALL_MAX + 1);
        assert_eq!(lineheap::size_of(p.as_ptr()) % LARGE_ALIGNMENT, 0);
        lineheap::deallocate(p.as_ptr());
    }
}

#[test]
fn large_blocks_hold_their_contents() {
    let size = 96 * 1024;
    let p = lineheap::allocate(size);
    unsafe {
        for offset in (0..size).step_by(4096) {
            *p.as_ptr().add(offset) = (offset / 4096) as u8;
        }
        *p.as_ptr().add(size - 1) = 0xEE;
        for offset in (0..size).step_by(4096) {
            assert_eq!(*p.as_ptr().add(offset), (offset / 4096) as u8);
        }
        assert_eq!(*p.as_ptr().add(size - 1), 0xEE);
        lineheap::deallocate(p.as_ptr());
    }
}

#[test]
fn aligned_large_allocations_respect_the_mask() {
    for alignment in [128usize, 1024, 4096, 64 * 1024] {
        let p = lineheap::allocate_aligned(alignment, 8 * 1024);
        assert_eq!(
            p.as_ptr() as usize % alignment,
            0,
            "alignment {alignment}"
        );
        unsafe { lineheap::deallocate(p.as_ptr()) };
    }
}

#[test]
fn the_whole_large_tier_is_allocatable() {
    let p = lineheap::allocate(LARGE_MAX);
    unsafe {
        assert!(lineheap::size_of(p.as_ptr()) >= LARGE_MAX);
        // Touch both ends.
        *p.as_ptr() = 1;
        *p.as_ptr().add(LARGE_MAX - 1) = 2;
        lineheap::deallocate(p.as_ptr());
    }
}
