#![forbid(unsafe_code)]

//! Connector type tags and the per-root record of what the client knows.
//!
//! # Invariants
//!
//! 1. **Stable tags**: a type's tag is assigned once per session and never
//!    changes or gets reused.
//! 2. **Clear keeps tags**: [`ClientCache::clear`] forgets what the client
//!    knows; the [`TypeRegistry`] is untouched.

use ahash::{AHashMap, AHashSet};
use csync_core::ConnectorType;

/// Session-wide type → tag assignment.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    tags: AHashMap<&'static str, u32>,
    next: u32,
}

impl TypeRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Tag of `ty`, assigning the next free one on first use.
    pub fn tag_for(&mut self, ty: &'static ConnectorType) -> u32 {
        let next = &mut self.next;
        *self.tags.entry(ty.name()).or_insert_with(|| {
            let tag = *next;
            *next += 1;
            tag
        })
    }

    #[must_use]
    pub fn tag(&self, name: &str) -> Option<u32> {
        self.tags.get(name).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

/// Types whose tag mapping the client of one root has received.
#[derive(Debug, Clone, Default)]
pub struct ClientCache {
    known: AHashSet<&'static str>,
}

impl ClientCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `ty` as known. Returns true if the client did not know it yet.
    pub fn cache(&mut self, ty: &'static ConnectorType) -> bool {
        self.known.insert(ty.name())
    }

    #[must_use]
    pub fn contains(&self, ty: &ConnectorType) -> bool {
        self.known.contains(ty.name())
    }

    pub fn clear(&mut self) {
        self.known.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.known.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }
}
