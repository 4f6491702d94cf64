//! Committed-footprint bound for the small path: n objects of size s touch
//! at most ceil(n * s / page) + 1 physical pages.

use std::thread;

#[test]
fn thousand_small_objects_commit_a_bounded_page_count() {
    thread::spawn(|| {
        let page = sys_vm::physical_page_size();
        let count = 1024;
        let size = 24;

        let before = lineheap::metrics().committed_bytes;
        let pointers: Vec<_> = (0..count).map(|_| lineheap::allocate(size)).collect();
        let after = lineheap::metrics().committed_bytes;

        for p in &pointers {
            assert_eq!(p.as_ptr() as usize % 8, 0);
        }

        // No two live objects share a byte.
        let mut addresses: Vec<usize> = pointers.iter().map(|p| p.as_ptr() as usize).collect();
        addresses.sort_unstable();
        addresses.dedup();
        assert_eq!(addresses.len(), count);
        for window in addresses.windows(2) {
            assert!(window[1] - window[0] >= size, "objects overlap");
        }

        let pages_bound = (count * size).div_ceil(page) + 1;
        assert!(
            after - before <= pages_bound * page,
            "committed {} bytes for {} live bytes",
            after - before,
            count * size
        );

        for p in pointers {
            unsafe { lineheap::deallocate(p.as_ptr()) };
        }
    })
    .join()
    .unwrap();
}
