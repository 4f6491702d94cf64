use lineheap::sizes::{object_size, size_class, ALIGNMENT, SMALL_MAX};
use std::thread;

#[test]
fn zero_size_allocations_are_distinct_and_non_null() {
    let a = lineheap::allocate(0);
    let b = lineheap::allocate(0);
    assert_ne!(a.as_ptr(), b.as_ptr());
    unsafe {
        assert_eq!(lineheap::size_of(a.as_ptr()), object_size(size_class(0)));
        lineheap::deallocate(a.as_ptr());
        lineheap::deallocate(b.as_ptr());
    }
}

#[test]
fn size_of_reports_the_size_class_object_size() {
    for request in [1, 8, 24, 25, 100, 512, 1000, SMALL_MAX] {
        let p = lineheap::allocate(request);
        let expected = object_size(size_class(request));
        unsafe {
            assert_eq!(lineheap::size_of(p.as_ptr()), expected, "request {request}");
            lineheap::deallocate(p.as_ptr());
        }
    }
}

#[test]
fn small_objects_hold_their_contents() {
    let count = 200;
    let size = 40;
    let pointers: Vec<_> = (0..count).map(|_| lineheap::allocate(size)).collect();
    for (i, p) in pointers.iter().enumerate() {
        unsafe {
            std::ptr::write_bytes(p.as_ptr(), (i % 251) as u8, size);
        }
    }
    for (i, p) in pointers.iter().enumerate() {
        for offset in [0, size / 2, size - 1] {
            unsafe {
                assert_eq!(*p.as_ptr().add(offset), (i % 251) as u8, "object {i}");
            }
        }
    }
    for p in pointers {
        unsafe { lineheap::deallocate(p.as_ptr()) };
    }
}

#[test]
fn fresh_thread_bump_allocates_with_constant_stride() {
    thread::spawn(|| {
        let a = lineheap::allocate(32).as_ptr() as usize;
        let b = lineheap::allocate(32).as_ptr() as usize;
        let c = lineheap::allocate(32).as_ptr() as usize;
        assert_eq!(b - a, 32, "bump path must peel adjacent objects");
        assert_eq!(c - b, 32);
        unsafe {
            lineheap::deallocate(a as *mut u8);
            lineheap::deallocate(b as *mut u8);
            lineheap::deallocate(c as *mut u8);
        }
    })
    .join()
    .unwrap();
}

#[test]
fn every_small_pointer_is_word_aligned() {
    let mut pointers = Vec::new();
    for request in 1..=128 {
        let p = lineheap::allocate(request);
        assert_eq!(p.as_ptr() as usize % ALIGNMENT, 0, "request {request}");
        pointers.push(p);
    }
    for p in pointers {
        unsafe { lineheap::deallocate(p.as_ptr()) };
    }
}
