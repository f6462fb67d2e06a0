//! Cache-coherent operation variants for external DRAM-side caches.
//!
//! These mirror `put`/`get`/`destroy` but additionally expose the **global
//! pointer of the node that owns the key's value slot**. A caller keeping a
//! DRAM cache of `key -> value` can key its cache on that stable handle and
//! detect staleness by comparing tags: the tagged-pointer contract *is* the
//! coherence protocol.
//!
//! Each variant has a by-handle twin (`put_at`/`get_at`/`destroy_at`) that
//! skips the descent for clients already holding the handle; they mutate or
//! read the value slot purely by tagged CAS on that node.
//!
//! # Handle validity
//!
//! Published nodes are never freed, so a handle stays dereferenceable for
//! the life of the region. A node whose stored key exactly matched a lookup
//! stays the owner of that key's value slot: later splits only insert
//! intermediates *above* existing nodes and never relocate an exact-match
//! leaf's value ownership.

use crate::mem::{Heap, MemoryManager};
use crate::tagptr::{Gptr, TagGptr};

use super::{check_key, RadixTree, TreeError};

/// A lookup result carrying the owning node's handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachedRead {
    /// Owning node, or null when the key is absent from the tree structure.
    pub node: Gptr,
    /// The tagged value at the lookup instant (may be invalid: deleted key).
    pub value: TagGptr,
}

/// A mutation result carrying the owning node's handle and both sides of
/// the value swing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachedWrite {
    /// Owning node, or null when a destroy found no matching node.
    pub node: Gptr,
    /// The tagged value observed before the swing.
    pub old: TagGptr,
    /// The tagged value installed by the swing.
    pub new: TagGptr,
}

impl<M: MemoryManager, H: Heap> RadixTree<M, H> {
    /// `put` that always updates and returns the owning node's handle with
    /// the old and new tagged values.
    ///
    /// # Errors
    ///
    /// [`TreeError::AllocationExhausted`] if a needed node cannot be
    /// allocated.
    pub fn put_cached(&self, key: &[u8], value: Gptr) -> Result<CachedWrite, TreeError> {
        check_key(key);
        if let Some(m) = self.metrics() {
            m.record_put();
        }

        self.put_inner(key, value, true).map(|o| CachedWrite {
            node: o.node,
            old: o.old,
            new: o.new,
        })
    }

    /// Update the value slot of a node handle directly, skipping descent.
    ///
    /// The caller asserts `node` was returned by a cached operation for the
    /// key it now associates with this handle.
    pub fn put_at(&self, node: Gptr, value: Gptr) -> CachedWrite {
        debug_assert!(node.is_valid());
        let n = self.node(node);
        self.refresh_value(n);

        let (old, new) = self.swing_value(n, value);
        CachedWrite { node, old, new }
    }

    /// `get` that also returns the owning node's handle.
    #[must_use]
    pub fn get_cached(&self, key: &[u8]) -> CachedRead {
        check_key(key);
        if let Some(m) = self.metrics() {
            m.record_get();
        }

        match self.locate(key) {
            Some((g, n, _)) => CachedRead {
                node: g,
                value: n.value().load(),
            },
            None => CachedRead {
                node: Gptr::NULL,
                value: TagGptr::INVALID,
            },
        }
    }

    /// Read the value slot of a node handle directly, skipping descent.
    #[must_use]
    pub fn get_at(&self, node: Gptr) -> TagGptr {
        debug_assert!(node.is_valid());
        let n = self.node(node);
        self.refresh_value(n);
        n.value().load()
    }

    /// `destroy` that also returns the owning node's handle and the
    /// installed tombstone.
    pub fn destroy_cached(&self, key: &[u8]) -> CachedWrite {
        check_key(key);
        if let Some(m) = self.metrics() {
            m.record_destroy();
        }

        match self.locate(key) {
            Some((g, n, _)) => {
                let (old, new) = self.swing_value(n, Gptr::NULL);
                CachedWrite { node: g, old, new }
            }
            None => CachedWrite {
                node: Gptr::NULL,
                old: TagGptr::INVALID,
                new: TagGptr::INVALID,
            },
        }
    }

    /// Tombstone the value slot of a node handle directly, skipping descent.
    pub fn destroy_at(&self, node: Gptr) -> CachedWrite {
        debug_assert!(node.is_valid());
        let n = self.node(node);
        self.refresh_value(n);

        let (old, new) = self.swing_value(n, Gptr::NULL);
        CachedWrite { node, old, new }
    }
}
