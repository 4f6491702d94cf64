//! Process-environment probe deciding whether the allocator is active.
//!
//! The answer is computed once during heap construction and plumbed into
//! every per-thread cache. When the allocator is disabled, all operations
//! defer to the system allocator so that malloc debugging tools observe
//! every allocation.

pub(crate) struct Environment {
    is_enabled: bool,
}

impl Environment {
    pub fn compute() -> Self {
        let disabled = Self::is_disable_requested()
            || Self::is_malloc_debugging_active()
            || Self::is_guard_malloc_preloaded();
        if disabled {
            tracing::debug!("deferring to the system allocator");
        }
        Self {
            is_enabled: !disabled,
        }
    }

    /// `LINEHEAP_DISABLE` set to anything but `0` turns the allocator off.
    fn is_disable_requested() -> bool {
        std::env::var_os("LINEHEAP_DISABLE").is_some_and(|value| value != *"0")
    }

    /// Any `Malloc*` variable signals that a malloc debugging facility
    /// wants to see the process's allocations.
    fn is_malloc_debugging_active() -> bool {
        std::env::vars_os().any(|(key, _)| key.to_string_lossy().starts_with("Malloc"))
    }

    fn is_guard_malloc_preloaded() -> bool {
        std::env::var("DYLD_INSERT_LIBRARIES")
            .is_ok_and(|libraries| libraries.contains("libgmalloc"))
    }

    #[inline]
    pub const fn is_enabled(&self) -> bool {
        self.is_enabled
    }
}
