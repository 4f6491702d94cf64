use lineheap::sizes::{object_size, size_class};

const MB: usize = 1024 * 1024;

#[test]
fn small_reallocation_within_the_class_keeps_the_address() {
    let p = lineheap::allocate(41);
    let class_size = object_size(size_class(41));
    unsafe {
        *p.as_ptr() = 7;
        let q = lineheap::reallocate(p.as_ptr(), class_size);
        assert_eq!(p.as_ptr(), q.as_ptr());
        assert_eq!(*q.as_ptr(), 7);
        lineheap::deallocate(q.as_ptr());
    }
}

#[test]
fn growth_preserves_contents() {
    let p = lineheap::allocate(100);
    unsafe {
        for i in 0..100 {
            *p.as_ptr().add(i) = i as u8;
        }
        let q = lineheap::reallocate(p.as_ptr(), 50 * 1024);
        for i in 0..100 {
            assert_eq!(*q.as_ptr().add(i), i as u8);
        }
        lineheap::deallocate(q.as_ptr());
    }
}

#[test]
fn large_shrink_happens_in_place() {
    let p = lineheap::allocate(200 * 1024);
    unsafe {
        *p.as_ptr() = 3;
        let before = lineheap::size_of(p.as_ptr());
        let q = lineheap::reallocate(p.as_ptr(), 100 * 1024);
        assert_eq!(p.as_ptr(), q.as_ptr());
        assert_eq!(*q.as_ptr(), 3);
        assert!(lineheap::size_of(q.as_ptr()) < before);
        assert!(lineheap::size_of(q.as_ptr()) >= 100 * 1024);
        lineheap::deallocate(q.as_ptr());
    }
}

#[test]
fn extra_large_shrink_happens_in_place() {
    let p = lineheap::allocate(5 * MB);
    unsafe {
        *p.as_ptr() = 9;
        let q = lineheap::reallocate(p.as_ptr(), 3 * MB);
        assert_eq!(p.as_ptr(), q.as_ptr());
        assert_eq!(*q.as_ptr(), 9);
        let size = lineheap::size_of(q.as_ptr());
        assert!((3 * MB..5 * MB).contains(&size));
        lineheap::deallocate(q.as_ptr());
    }
}

#[test]
fn null_reallocation_allocates() {
    let p = unsafe { lineheap::reallocate(std::ptr::null_mut(), 64) };
    unsafe {
        *p.as_ptr() = 1;
        lineheap::deallocate(p.as_ptr());
    }
}
