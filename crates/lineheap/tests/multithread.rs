//! Two threads churn through a million small allocations each without
//! tripping any heap invariant, and the footprint converges afterwards.

use std::thread;
use std::time::{Duration, Instant};

#[test]
fn concurrent_small_churn_stays_consistent() {
    let workers: Vec<_> = (0..2usize)
        .map(|worker| {
            thread::spawn(move || {
                let mut window: Vec<*mut u8> = Vec::with_capacity(64);
                for i in 0..1_000_000usize {
                    let p = lineheap::allocate(32).as_ptr();
                    assert_eq!(p as usize % 8, 0);
                    // Stamp the object so overlapping allocations across
                    // the window would be caught below.
                    unsafe { *p.cast::<usize>() = worker << 60 | i };
                    window.push(p);
                    if window.len() == 64 {
                        for (j, &q) in window.iter().enumerate() {
                            let stamped = unsafe { *q.cast::<usize>() };
                            assert_eq!(stamped, worker << 60 | (i + 1 + j - 64));
                        }
                        for q in window.drain(..) {
                            unsafe { lineheap::deallocate(q) };
                        }
                    }
                }
                for q in window.drain(..) {
                    unsafe { lineheap::deallocate(q) };
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().expect("worker must not panic");
    }

    // Quiescence: everything was freed, so the chunk footprint decays.
    lineheap::scavenge();
    let deadline = Instant::now() + Duration::from_secs(15);
    while lineheap::metrics().committed_bytes != 0 {
        assert!(
            Instant::now() < deadline,
            "footprint stuck at {} bytes",
            lineheap::metrics().committed_bytes
        );
        thread::sleep(Duration::from_millis(50));
    }
}
