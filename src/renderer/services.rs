//! Process-wide identity services.
//!
//! Canvas/context ids and clipper ids are handed out by explicit allocators
//! owned by a [`RenderServices`] object. Applications create one and share it
//! with every renderer; tests create as many independent ones as they like.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::renderer::resources::ResourceRegistry;

/// Small-integer allocator that reuses freed ids, smallest first.
#[derive(Debug, Default)]
pub struct IdAllocator {
    inner: Mutex<IdAllocatorInner>,
}

#[derive(Debug, Default)]
struct IdAllocatorInner {
    next: u32,
    free: BTreeSet<u32>,
}

impl IdAllocator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&self) -> u32 {
        let mut inner = self.inner.lock();
        if let Some(id) = inner.free.pop_first() {
            return id;
        }
        let id = inner.next;
        inner.next += 1;
        id
    }

    /// Returns `id` to the pool. Releasing an id that is not live is ignored.
    pub fn release(&self, id: u32) -> bool {
        let mut inner = self.inner.lock();
        if id >= inner.next {
            return false;
        }
        inner.free.insert(id)
    }

    pub fn live_count(&self) -> usize {
        let inner = self.inner.lock();
        inner.next as usize - inner.free.len()
    }
}

/// Monotonic id source; ids are never reused.
#[derive(Debug)]
pub struct MonotonicIds {
    next: AtomicU64,
}

impl Default for MonotonicIds {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicIds {
    #[must_use]
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    pub fn next_id(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

/// The shared context object: id allocators plus the native resource registry.
#[derive(Debug, Default)]
pub struct RenderServices {
    pub canvas_ids: IdAllocator,
    pub clipper_ids: MonotonicIds,
    pub resources: ResourceRegistry,
}

impl RenderServices {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}
