//! Allocator registry
//!
//! Applications usually pass the same allocation-callback struct to many
//! calls. The registry keeps one copy per struct address so destroy calls
//! synthesized later can name the allocator the object was created with.
//! Entries live for the whole session.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Address of the application's allocation-callback struct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AllocatorId(pub u64);

impl AllocatorId {
    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

/// Copy of an allocation-callback struct. Function pointers are kept as addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AllocatorCallbacks {
    pub user_data: u64,
    pub allocation: u64,
    pub reallocation: u64,
    pub free: u64,
    pub internal_allocation: u64,
    pub internal_free: u64,
}

#[derive(Debug, Default)]
pub struct AllocatorRegistry {
    allocators: DashMap<AllocatorId, AllocatorCallbacks>,
}

impl AllocatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `callbacks` under `id`, or return the copy already stored there.
    /// The null identity (no allocator) is never stored.
    pub fn register(&self, id: AllocatorId, callbacks: AllocatorCallbacks) -> Option<AllocatorCallbacks> {
        if id.is_null() {
            return None;
        }
        let stored = *self.allocators.entry(id).or_insert_with(|| {
            tracing::trace!(allocator = id.0, "registered allocator");
            callbacks
        });
        Some(stored)
    }

    pub fn lookup(&self, id: AllocatorId) -> Option<AllocatorCallbacks> {
        self.allocators.get(&id).map(|entry| *entry)
    }

    pub fn len(&self) -> usize {
        self.allocators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.allocators.is_empty()
    }

    pub(crate) fn clear(&self) {
        self.allocators.clear();
    }
}
