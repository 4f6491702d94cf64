//! The process-wide heap.
//!
//! One mutex guards every structure here: the chunk arena, the small-page
//! lists, both span maps, and the extra-large map. Helpers that may drop
//! the lock across a syscall take the guard itself as a witness; helpers
//! that never drop it take `&mut self`, which the guard derefs to. The
//! fast per-thread paths in [`crate::allocator`] and [`crate::deallocator`]
//! touch nothing in this module.
//!
//! # Memory worlds
//!
//! Chunk memory moves between two span maps: `large` holds committed spans
//! (free and allocated) and `vm_heap` holds reserved-but-decommitted spans.
//! Allocation pulls spans from `large`, falling back to `vm_heap` plus a
//! commit; the scavenger drains free spans the other way. Extra-large
//! ranges never enter either map and are tracked by `xlarge` alone.

use std::collections::VecDeque;
use std::sync::OnceLock;

use parking_lot::{Mutex, MutexGuard};

use crate::allocator::{BumpAllocator, BumpRange, BumpRangeCache};
use crate::chunk::{ChunkMap, ObjectType, PageId};
use crate::environment::Environment;
use crate::large::{LargeMap, LargeSpan};
use crate::line::LineMetadataTable;
use crate::metrics::HeapMetrics;
use crate::scavenger::Scavenger;
use crate::sizes::{
    is_aligned, object_size, round_down_to_multiple_of, round_up_to_multiple_of, CHUNK_SIZE,
    LARGE_ALIGNMENT, LARGE_MAX, LARGE_MIN, SCAVENGE_SLEEP, SIZE_CLASS_COUNT, SMALL_LINE_SIZE,
    SMALL_MAX, X_LARGE_ALIGNMENT, X_LARGE_MAX,
};
use crate::vm_heap::VmHeap;
use crate::vm_state::VmState;
use crate::xlarge::{XLargeMap, XLargeRange};

/// Witness that the caller holds the process-wide heap lock.
pub(crate) type HeapGuard = MutexGuard<'static, Heap>;

/// Which tier owns a pointer.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum ObjectKind {
    Small,
    Large,
    XLarge,
}

pub(crate) struct Heap {
    physical_page_size: usize,
    line_metadata: LineMetadataTable,
    chunks: ChunkMap,
    /// Pages with both live objects and free lines, per size class.
    small_pages_with_free_lines: [VecDeque<PageId>; SIZE_CLASS_COUNT],
    /// Fully free pages waiting for reuse or scavenging.
    small_pages: Vec<PageId>,
    /// Committed spans, free and allocated.
    large: LargeMap,
    /// Reserved-but-decommitted spans.
    vm_heap: VmHeap,
    xlarge: XLargeMap,
    environment: Environment,
    /// Latched by every page commit; the scavenger backs off until it
    /// observes a full quiet interval.
    is_allocating_pages: bool,
    metrics: HeapMetrics,
}

struct Global {
    heap: Mutex<Heap>,
    scavenger: Scavenger,
}

static GLOBAL: OnceLock<Global> = OnceLock::new();

fn global() -> &'static Global {
    GLOBAL.get_or_init(|| Global {
        heap: Mutex::new(Heap::new()),
        scavenger: Scavenger::spawn(),
    })
}

/// Acquires the process-wide heap lock.
pub(crate) fn lock() -> HeapGuard {
    global().heap.lock()
}

/// The scavenger that serves this heap.
pub(crate) fn scavenger() -> &'static Scavenger {
    &global().scavenger
}

impl Heap {
    fn new() -> Self {
        let physical_page_size = sys_vm::physical_page_size();
        assert!(physical_page_size >= SMALL_MAX);
        assert!(physical_page_size % SMALL_LINE_SIZE == 0);
        assert!(sys_vm::page_size() >= physical_page_size);
        assert!(X_LARGE_ALIGNMENT >= sys_vm::page_size());
        assert!(CHUNK_SIZE % physical_page_size == 0);

        Self {
            physical_page_size,
            line_metadata: LineMetadataTable::new(physical_page_size),
            chunks: ChunkMap::new(physical_page_size),
            small_pages_with_free_lines: std::array::from_fn(|_| VecDeque::new()),
            small_pages: Vec::new(),
            large: LargeMap::new(),
            vm_heap: VmHeap::new(),
            xlarge: XLargeMap::new(),
            environment: Environment::compute(),
            is_allocating_pages: false,
            metrics: HeapMetrics::default(),
        }
    }

    #[inline]
    pub(crate) const fn is_enabled(&self) -> bool {
        self.environment.is_enabled()
    }

    pub(crate) fn metrics_snapshot(&self) -> HeapMetrics {
        let mut metrics = self.metrics;
        metrics.free_small_page_count = self.small_pages.len();
        metrics.large_free_bytes = self.large.free_bytes();
        metrics.vm_free_bytes = self.vm_heap.free_bytes();
        metrics
    }

    pub(crate) fn note_object_log_drain(&mut self) {
        self.metrics.object_log_drains += 1;
    }

    /// Resolves a pointer to its tier and allocated size.
    pub(crate) fn classify(&self, ptr: usize) -> (ObjectKind, usize) {
        if is_aligned(ptr, X_LARGE_ALIGNMENT) {
            return (ObjectKind::XLarge, self.xlarge_size(ptr));
        }
        let page = self.chunks.page_id(ptr);
        match self.chunks.page(page).object_type {
            ObjectType::Small => {
                let class = self.chunks.page(page).size_class as usize;
                (ObjectKind::Small, object_size(class))
            }
            ObjectType::Large => {
                let span = self
                    .large
                    .get_allocated(ptr)
                    .expect("unknown large pointer");
                (ObjectKind::Large, span.size)
            }
        }
    }

    // ========================================================================
    // Small path
    // ========================================================================

    /// Refills `allocator` and `cache` with runs of free lines harvested
    /// from one small page. Guarantees `allocator.can_allocate()` on
    /// return.
    pub(crate) fn allocate_small_bump_ranges(
        lock: &mut HeapGuard,
        size_class: usize,
        allocator: &mut BumpAllocator,
        cache: &mut BumpRangeCache,
    ) {
        debug_assert!(cache.is_empty());
        let page = Self::allocate_small_page(lock, size_class);

        let heap = &mut **lock;
        debug_assert!(heap.chunks.page(page).has_free_lines);
        let page_begin = heap.chunks.page_begin(page);
        let lines_per_page = heap.line_metadata.lines_per_page();

        let mut line = 0;
        while line < lines_per_page {
            if heap.chunks.line_ref_at(page, line) != 0 {
                line += 1;
                continue;
            }
            let metadata = heap.line_metadata.get(size_class, line);
            if metadata.object_count == 0 {
                line += 1;
                continue;
            }

            // In a fragmented page, some free ranges might not fit in the
            // cache. Park the page; a later refill harvests the rest.
            if cache.is_full() {
                heap.small_pages_with_free_lines[size_class].push_back(page);
                debug_assert!(allocator.can_allocate());
                return;
            }

            let begin = page_begin + line * SMALL_LINE_SIZE + metadata.start_offset as usize;
            let mut object_count = metadata.object_count as usize;
            heap.chunks.ref_line_at(page, line, metadata.object_count as u8);
            heap.chunks.page_mut(page).ref_count += 1;

            // Merge with subsequent free lines. Lines holding only the
            // interior of an object begun earlier are absorbed silently.
            line += 1;
            while line < lines_per_page {
                if heap.chunks.line_ref_at(page, line) != 0 {
                    break;
                }
                let metadata = heap.line_metadata.get(size_class, line);
                if metadata.object_count == 0 {
                    line += 1;
                    continue;
                }
                object_count += metadata.object_count as usize;
                heap.chunks.ref_line_at(page, line, metadata.object_count as u8);
                heap.chunks.page_mut(page).ref_count += 1;
                line += 1;
            }

            let range = BumpRange {
                begin,
                object_count,
            };
            if allocator.can_allocate() {
                cache.push(range);
            } else {
                allocator.refill(range);
            }
        }

        debug_assert!(allocator.can_allocate());
        heap.chunks.page_mut(page).has_free_lines = false;
    }

    /// Picks the page to harvest: one that already has free lines, else a
    /// fully free page, else a fresh physical page carved from the large
    /// tier and demoted.
    fn allocate_small_page(lock: &mut HeapGuard, size_class: usize) -> PageId {
        if let Some(page) = lock.small_pages_with_free_lines[size_class].pop_front() {
            return page;
        }

        if let Some(page) = lock.small_pages.pop() {
            lock.chunks.page_mut(page).size_class = size_class as u8;
            return page;
        }

        let page_size = lock.physical_page_size;
        let unaligned_size = page_size + LARGE_MIN + page_size - LARGE_ALIGNMENT;
        let begin = Self::allocate_large_aligned(lock, page_size, page_size, unaligned_size);

        // The large path referenced the first line as its allocation
        // sentinel; small pages keep their own per-line refcounts.
        let heap = &mut **lock;
        let remaining = heap.chunks.deref_line(begin);
        debug_assert!(remaining == 0);

        let page = heap.chunks.page_id(begin);
        let record = heap.chunks.page_mut(page);
        debug_assert!(record.ref_count == 0);
        record.object_type = ObjectType::Small;
        record.size_class = size_class as u8;
        record.has_free_lines = true;
        page
    }

    /// Drops one reference from the line holding `ptr`, releasing the line
    /// when it was the last.
    pub(crate) fn deref_small_line(&mut self, ptr: usize) {
        if self.chunks.deref_line(ptr) != 0 {
            return;
        }
        self.deallocate_small_line(ptr);
    }

    /// Releases a line whose refcount reached zero. Pages that were
    /// demoted back to the large tier take the large path instead.
    fn deallocate_small_line(&mut self, ptr: usize) {
        debug_assert!(self.chunks.line_ref(ptr) == 0);
        let page = self.chunks.page_id(ptr);
        if self.chunks.page(page).object_type == ObjectType::Large {
            return self.deallocate_large(ptr);
        }

        let record = self.chunks.page_mut(page);
        record.ref_count -= 1;
        let size_class = record.size_class as usize;

        if !record.has_free_lines {
            record.has_free_lines = true;
            self.small_pages_with_free_lines[size_class].push_back(page);
            debug_assert!(self.chunks.page(page).ref_count > 0);
            return;
        }

        if self.chunks.page(page).ref_count > 0 {
            return;
        }

        let list = &mut self.small_pages_with_free_lines[size_class];
        let position = list
            .iter()
            .position(|candidate| *candidate == page)
            .expect("free page missing from its class list");
        list.remove(position);
        self.small_pages.push(page);
        scavenger().run();
    }

    /// Demotes every fully free small page back to the large tier.
    fn scavenge_small_pages(&mut self) {
        while let Some(page) = self.small_pages.pop() {
            debug_assert!(self.chunks.page(page).ref_count == 0);
            self.chunks.page_mut(page).object_type = ObjectType::Large;
            let begin = self.chunks.page_begin(page);
            let span = self.large.take_allocated(begin);
            self.deallocate_large_span(span);
        }
    }

    // ========================================================================
    // Large path
    // ========================================================================

    pub(crate) fn allocate_large(lock: &mut HeapGuard, size: usize) -> usize {
        debug_assert!(size >= LARGE_MIN && size <= LARGE_MAX);
        debug_assert!(size == round_up_to_multiple_of(LARGE_ALIGNMENT, size));

        // Recycling a free small page is cheaper than carving a fresh span.
        if size <= lock.physical_page_size {
            lock.scavenge_small_pages();
        }

        let span = match lock.large.take(size) {
            Some(span) => span,
            None => Self::allocate_vm_span(lock, size),
        };
        let span = Self::commit_span(lock, span);
        let span = lock.split_and_allocate_large(span, size);
        span.begin
    }

    pub(crate) fn allocate_large_aligned(
        lock: &mut HeapGuard,
        alignment: usize,
        size: usize,
        unaligned_size: usize,
    ) -> usize {
        debug_assert!(size >= LARGE_MIN && size <= LARGE_MAX);
        debug_assert!(size == round_up_to_multiple_of(LARGE_ALIGNMENT, size));
        debug_assert!(unaligned_size >= LARGE_MIN && unaligned_size <= LARGE_MAX);
        debug_assert!(unaligned_size == round_up_to_multiple_of(LARGE_ALIGNMENT, unaligned_size));
        debug_assert!(alignment.is_power_of_two());
        debug_assert!(alignment >= LARGE_ALIGNMENT);
        debug_assert!(alignment <= CHUNK_SIZE / 2);

        if size <= lock.physical_page_size {
            lock.scavenge_small_pages();
        }

        let span = match lock.large.take_aligned(alignment, size, unaligned_size) {
            Some(span) => span,
            None => Self::allocate_vm_span_aligned(lock, alignment, size, unaligned_size),
        };
        let span = Self::commit_span(lock, span);
        let span = lock.split_and_allocate_large_aligned(span, alignment, size);
        span.begin
    }

    fn split_and_allocate_large(&mut self, span: LargeSpan, size: usize) -> LargeSpan {
        let mut span = span;
        let mut tail = None;
        if span.size - size >= LARGE_MIN {
            let (first, rest) = span.split(size);
            span = first;
            tail = Some(rest);
        }

        self.large.insert_allocated(span);
        // One reference on the first line stands for the whole range.
        self.chunks.ref_line(span.begin, 1);
        debug_assert!(
            self.chunks.page(self.chunks.page_id(span.begin)).object_type == ObjectType::Large
        );

        if let Some(tail) = tail {
            // The tail abuts the span just allocated; it cannot merge.
            self.large.insert_free(tail);
        }
        span
    }

    fn split_and_allocate_large_aligned(
        &mut self,
        span: LargeSpan,
        alignment: usize,
        size: usize,
    ) -> LargeSpan {
        let mut span = span;
        let mut head = None;
        let mut tail = None;

        if !is_aligned(span.begin, alignment) {
            // The head remnant stays at least LARGE_MIN so it remains a
            // valid span.
            let prefix =
                round_up_to_multiple_of(alignment, span.begin + LARGE_MIN) - span.begin;
            let (first, rest) = span.split(prefix);
            head = Some(first);
            span = rest;
        }

        debug_assert!(span.size >= size);
        if span.size - size >= LARGE_MIN {
            let (first, rest) = span.split(size);
            span = first;
            tail = Some(rest);
        }

        self.large.insert_allocated(span);
        self.chunks.ref_line(span.begin, 1);
        debug_assert!(
            self.chunks.page(self.chunks.page_id(span.begin)).object_type == ObjectType::Large
        );

        if let Some(head) = head {
            self.large.insert_free_merged(head);
        }
        if let Some(tail) = tail {
            self.large.insert_free_merged(tail);
        }
        span
    }

    pub(crate) fn deallocate_large(&mut self, ptr: usize) {
        debug_assert!(
            self.chunks.page(self.chunks.page_id(ptr)).object_type == ObjectType::Large
        );
        let span = self.large.take_allocated(ptr);
        self.deallocate_large_span(span);
    }

    fn deallocate_large_span(&mut self, span: LargeSpan) {
        self.large.insert_free_merged(span);
        scavenger().run();
    }

    /// Splits an allocated span at `new_size` and frees the rest. The
    /// caller guarantees the tail is at least [`LARGE_MIN`].
    pub(crate) fn shrink_large(&mut self, ptr: usize, new_size: usize) {
        let span = self.large.take_allocated(ptr);
        debug_assert!(new_size >= LARGE_MIN && span.size - new_size >= LARGE_MIN);
        let (first, tail) = span.split(new_size);
        self.large.insert_allocated(first);
        self.deallocate_large_span(tail);
    }

    // ========================================================================
    // Chunk memory supply
    // ========================================================================

    fn allocate_vm_span(lock: &mut HeapGuard, size: usize) -> LargeSpan {
        loop {
            if let Some(span) = lock.vm_heap.take_span(size) {
                return span;
            }
            Self::grow(lock);
        }
    }

    fn allocate_vm_span_aligned(
        lock: &mut HeapGuard,
        alignment: usize,
        size: usize,
        unaligned_size: usize,
    ) -> LargeSpan {
        loop {
            if let Some(span) = lock.vm_heap.take_span_aligned(alignment, size, unaligned_size) {
                return span;
            }
            Self::grow(lock);
        }
    }

    /// Reserves a fresh chunk. The reservation syscall runs with the lock
    /// released; concurrent growers at worst reserve one chunk each.
    fn grow(lock: &mut HeapGuard) {
        let reservation =
            MutexGuard::unlocked(lock, || sys_vm::reserve_aligned(CHUNK_SIZE, CHUNK_SIZE))
                .unwrap_or_else(|error| panic!("chunk reservation failed: {error}"));
        let (ptr, len) = reservation.into_raw();
        let base = ptr as usize;

        let heap = &mut **lock;
        heap.chunks.insert(base);
        heap.metrics.reserved_bytes += len;
        heap.metrics.chunk_count += 1;
        tracing::debug!(base, size = len, "reserved chunk");

        // Page zero is never handed out: it keeps chunk-interior objects
        // off the extra-large alignment boundary.
        let page = heap.physical_page_size;
        heap.vm_heap.insert_fresh(LargeSpan {
            begin: base + page,
            size: len - page,
            vm_state: VmState::VIRTUAL,
        });
    }

    /// Commits physical pages across a span that has any virtual part.
    /// Committing before any split avoids commit/decommit churn when a
    /// span is repeatedly split and merged at fragment boundaries.
    fn commit_span(lock: &mut HeapGuard, span: LargeSpan) -> LargeSpan {
        let mut span = span;
        if !span.vm_state.has_virtual() {
            return span;
        }
        lock.is_allocating_pages = true;

        let page = lock.physical_page_size;
        let begin = round_down_to_multiple_of(page, span.begin);
        let end = round_up_to_multiple_of(page, span.end());
        let newly_committed = lock.chunks.mark_committed(begin, end);
        lock.metrics.committed_bytes += newly_committed;

        MutexGuard::unlocked(lock, || {
            // SAFETY: the span is off every free list; nothing reuses it
            // while the lock is dropped.
            unsafe { sys_vm::commit_sloppy(begin as *mut u8, end - begin) }
                .unwrap_or_else(|error| panic!("physical page commit failed: {error}"));
        });

        span.vm_state = VmState::PHYSICAL;
        span
    }

    /// Decommits a free span and returns it to the virtual pool. The
    /// syscall runs with the lock released; the span is off the free lists
    /// the whole time, so nothing can reuse it concurrently.
    fn deallocate_vm_span(lock: &mut HeapGuard, span: LargeSpan) {
        let mut span = span;
        let page = lock.physical_page_size;
        let begin = round_up_to_multiple_of(page, span.begin);
        let end = round_down_to_multiple_of(page, span.end());
        let released = lock.chunks.mark_decommitted(begin, end);
        lock.metrics.committed_bytes -= released;

        if begin < end {
            MutexGuard::unlocked(lock, || {
                // SAFETY: see above; no live data remains in a free span.
                unsafe { sys_vm::decommit_sloppy(begin as *mut u8, end - begin) }
                    .unwrap_or_else(|error| panic!("physical page decommit failed: {error}"));
            });
        }

        span.vm_state = VmState::VIRTUAL;
        lock.vm_heap.insert_virtual(span);
    }

    // ========================================================================
    // Extra-large path
    // ========================================================================

    pub(crate) fn allocate_xlarge(lock: &mut HeapGuard, alignment: usize, size: usize) -> usize {
        Self::try_allocate_xlarge(lock, alignment, size).expect("extra-large allocation failed")
    }

    pub(crate) fn try_allocate_xlarge(
        lock: &mut HeapGuard,
        alignment: usize,
        size: usize,
    ) -> Option<usize> {
        debug_assert!(alignment.is_power_of_two());
        assert!(alignment < X_LARGE_MAX);

        lock.is_allocating_pages = true;

        let size = size.max(lock.physical_page_size);
        let alignment = round_up_to_multiple_of(X_LARGE_ALIGNMENT, alignment);

        let range = if let Some(range) = lock.xlarge.take_free(alignment, size) {
            range
        } else {
            // Reserve in aligned multiples so the OS tends to hand back
            // contiguous ranges that can merge later.
            let aligned_size = round_up_to_multiple_of(X_LARGE_ALIGNMENT, size);
            let reservation =
                MutexGuard::unlocked(lock, || sys_vm::reserve_aligned(alignment, aligned_size))
                    .ok()?;
            let (ptr, len) = reservation.into_raw();
            lock.metrics.reserved_bytes += len;
            tracing::debug!(begin = ptr as usize, size = len, "reserved extra-large range");
            XLargeRange {
                begin: ptr as usize,
                size: len,
                vm_state: VmState::VIRTUAL,
            }
        };

        Some(Self::split_and_allocate_xlarge(lock, range, alignment, size).begin)
    }

    fn split_and_allocate_xlarge(
        lock: &mut HeapGuard,
        range: XLargeRange,
        alignment: usize,
        size: usize,
    ) -> XLargeRange {
        let mut range = range;
        let mut prev = XLargeRange::EMPTY;
        let mut next = XLargeRange::EMPTY;

        if !is_aligned(range.begin, alignment) {
            let prefix = round_up_to_multiple_of(alignment, range.begin) - range.begin;
            let (first, rest) = range.split(prefix);
            prev = first;
            range = rest;
        }

        if range.size - size >= X_LARGE_ALIGNMENT {
            let aligned_size = round_up_to_multiple_of(X_LARGE_ALIGNMENT, size);
            let (first, rest) = range.split(aligned_size);
            range = first;
            next = rest;
        }

        // The remaining tail fragment is aligned to less than the
        // reservation granule and can never be allocated on its own. Pair
        // it with the allocation; a short free side speeds up both the
        // allocation scan and merging.
        let body = round_up_to_multiple_of(lock.physical_page_size, size);
        let (mut allocated, unused) = if body < range.size {
            range.split(body)
        } else {
            (range, XLargeRange::EMPTY)
        };

        if allocated.vm_state.has_virtual() {
            let (begin, len) = (allocated.begin, allocated.size);
            MutexGuard::unlocked(lock, || {
                // SAFETY: the range is not registered on either side of the
                // map yet.
                unsafe { sys_vm::commit_sloppy(begin as *mut u8, len) }
                    .unwrap_or_else(|error| panic!("physical page commit failed: {error}"));
            });
            allocated.vm_state = VmState::PHYSICAL;
            lock.metrics.xlarge_committed_bytes += len;
        }

        lock.xlarge.add_allocated(prev, (allocated, unused), next);
        allocated
    }

    pub(crate) fn deallocate_xlarge(&mut self, ptr: usize) {
        let range = self
            .xlarge
            .take_allocated(ptr)
            .expect("unknown extra-large pointer");
        self.xlarge.add_free(range);
        scavenger().run();
    }

    pub(crate) fn xlarge_size(&self, ptr: usize) -> usize {
        self.xlarge
            .get_allocated(ptr)
            .expect("unknown extra-large pointer")
            .size
    }

    /// Re-splits an allocation at `new_size`. A shrink below one physical
    /// page of slack is a no-op.
    pub(crate) fn shrink_xlarge(lock: &mut HeapGuard, ptr: usize, new_size: usize) {
        let current = lock
            .xlarge
            .get_allocated(ptr)
            .expect("unknown extra-large pointer");
        debug_assert!(current.size > new_size);
        if current.size - new_size < lock.physical_page_size {
            return;
        }

        let range = lock
            .xlarge
            .take_allocated(ptr)
            .expect("unknown extra-large pointer");
        Self::split_and_allocate_xlarge(lock, range, X_LARGE_ALIGNMENT, new_size);
        scavenger().run();
    }

    // ========================================================================
    // Scavenging
    // ========================================================================

    /// One scavenger pass: wait out allocation bursts, demote free small
    /// pages, decommit free spans and physical extra-large ranges, then
    /// pace the cycle.
    pub(crate) fn scavenge(lock: &mut HeapGuard) {
        Self::wait_until_quiescent(lock);

        // Briefly drop the lock so pending allocators run first.
        MutexGuard::unlocked(lock, || {});
        lock.scavenge_small_pages();

        Self::scavenge_large_spans(lock);
        Self::scavenge_xlarge_ranges(lock);

        lock.metrics.scavenger_passes += 1;
        tracing::trace!(
            committed = lock.metrics.committed_bytes,
            xlarge_committed = lock.metrics.xlarge_committed_bytes,
            "scavenger pass complete"
        );

        MutexGuard::unlocked(lock, || std::thread::sleep(SCAVENGE_SLEEP));
    }

    /// The flag latches: it is cleared here and re-set by any allocator
    /// that commits pages, so the loop exits only after a full quiet
    /// interval.
    fn wait_until_quiescent(lock: &mut HeapGuard) {
        while lock.is_allocating_pages {
            lock.is_allocating_pages = false;
            MutexGuard::unlocked(lock, || std::thread::sleep(SCAVENGE_SLEEP));
        }
    }

    fn scavenge_large_spans(lock: &mut HeapGuard) {
        while let Some(span) = lock.large.take_greedy() {
            Self::deallocate_vm_span(lock, span);
            Self::wait_until_quiescent(lock);
        }
    }

    fn scavenge_xlarge_ranges(lock: &mut HeapGuard) {
        while let Some(mut range) = lock.xlarge.take_physical() {
            let (begin, len) = (range.begin, range.size);
            MutexGuard::unlocked(lock, || {
                // SAFETY: the range is off both sides of the map.
                unsafe { sys_vm::decommit_sloppy(begin as *mut u8, len) }
                    .unwrap_or_else(|error| panic!("physical page decommit failed: {error}"));
            });
            range.vm_state = VmState::VIRTUAL;
            lock.metrics.xlarge_committed_bytes =
                lock.metrics.xlarge_committed_bytes.saturating_sub(len);
            lock.xlarge.add_free(range);
            Self::wait_until_quiescent(lock);
        }
        lock.xlarge.shrink_to_fit();
    }
}
