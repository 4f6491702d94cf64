//! After a quiescent period with no live chunk-tier allocations, the
//! scavenger returns every committed page to the OS while keeping the
//! reservations for reuse.

use lineheap::sizes::SCAVENGE_SLEEP;
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn committed_footprint_decays_after_quiescence() {
    // All allocation happens on a worker so its cache retires with it,
    // releasing parked bump ranges and draining its log.
    thread::spawn(|| {
        let mut small: Vec<_> = (0..4096).map(|_| lineheap::allocate(48)).collect();
        let mut large: Vec<_> = (0..16).map(|_| lineheap::allocate(64 * 1024)).collect();
        for p in small.drain(..) {
            unsafe { lineheap::deallocate(p.as_ptr()) };
        }
        for p in large.drain(..) {
            unsafe { lineheap::deallocate(p.as_ptr()) };
        }
    })
    .join()
    .unwrap();

    let peak = lineheap::metrics().committed_bytes;
    assert!(peak > 0, "the worker must have committed pages");
    lineheap::scavenge();

    // The scavenger needs one quiet interval to trust the heap is idle,
    // then a pass to decommit. Poll well past that.
    let deadline = Instant::now() + 20 * SCAVENGE_SLEEP;
    loop {
        let metrics = lineheap::metrics();
        if metrics.committed_bytes == 0 && metrics.free_small_page_count == 0 {
            break;
        }
        assert!(
            Instant::now() < deadline,
            "footprint stuck at {} bytes ({} free small pages) from peak {}",
            metrics.committed_bytes,
            metrics.free_small_page_count,
            peak
        );
        thread::sleep(Duration::from_millis(50));
    }

    // The reservations stay: convergence releases pages, not address space.
    assert!(lineheap::metrics().reserved_bytes > 0);
}
