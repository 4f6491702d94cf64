//! The scavenger thread.
//!
//! A single background thread sleeps until an allocator or deallocator
//! signals it, then runs one scavenging pass over the heap. `run` is an
//! idempotent wakeup; requests arriving during a pass coalesce into one
//! further pass. `stop` joins the thread for orderly teardown.

use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};

use crate::heap::{self, Heap};

#[derive(Clone, Copy, PartialEq, Eq)]
enum RunState {
    Sleeping,
    RunRequested,
    Exiting,
}

struct Shared {
    state: Mutex<RunState>,
    condvar: Condvar,
}

pub(crate) struct Scavenger {
    shared: Arc<Shared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Scavenger {
    pub fn spawn() -> Self {
        let shared = Arc::new(Shared {
            state: Mutex::new(RunState::Sleeping),
            condvar: Condvar::new(),
        });
        let thread = std::thread::Builder::new()
            .name("lineheap-scavenger".into())
            .spawn({
                let shared = Arc::clone(&shared);
                move || scavenger_thread(&shared)
            })
            .expect("failed to spawn scavenger thread");
        Self {
            shared,
            thread: Mutex::new(Some(thread)),
        }
    }

    /// Requests a pass. Callers hold the heap lock; this only touches the
    /// scavenger's own state.
    pub fn run(&self) {
        let mut state = self.shared.state.lock();
        if *state == RunState::Exiting {
            return;
        }
        *state = RunState::RunRequested;
        self.shared.condvar.notify_one();
    }

    /// Stops the thread and joins it. Must be called without the heap
    /// lock held; the thread may be waiting for it.
    pub fn stop(&self) {
        {
            let mut state = self.shared.state.lock();
            *state = RunState::Exiting;
            self.shared.condvar.notify_one();
        }
        if let Some(handle) = self.thread.lock().take() {
            let _ = handle.join();
        }
    }
}

fn scavenger_thread(shared: &Shared) {
    loop {
        {
            let mut state = shared.state.lock();
            while *state == RunState::Sleeping {
                shared.condvar.wait(&mut state);
            }
            if *state == RunState::Exiting {
                return;
            }
            *state = RunState::Sleeping;
        }

        tracing::trace!("scavenger pass");
        let mut lock = heap::lock();
        Heap::scavenge(&mut lock);
    }
}
