//! Adjacent large frees coalesce: two 128KiB blocks from the same split
//! can be freed and re-allocated as one 256KiB block without any new
//! reservation from the OS.

#[test]
fn adjacent_frees_satisfy_a_doubled_allocation_without_new_vm() {
    let size = 128 * 1024;

    let a = lineheap::allocate(size);
    let b = lineheap::allocate(size);
    assert_eq!(
        b.as_ptr() as usize,
        a.as_ptr() as usize + size,
        "back-to-back carves from a fresh heap must be adjacent"
    );

    let reserved_before = lineheap::metrics().reserved_bytes;
    unsafe {
        lineheap::deallocate(a.as_ptr());
        lineheap::deallocate(b.as_ptr());
    }

    let merged = lineheap::allocate(2 * size);
    assert_eq!(merged.as_ptr(), a.as_ptr(), "merged span starts where the pair did");
    assert_eq!(
        lineheap::metrics().reserved_bytes,
        reserved_before,
        "coalescing must satisfy the request without reserving new address space"
    );
    unsafe { lineheap::deallocate(merged.as_ptr()) };
}
