//! `RadixTree` - a lock-free, persistent 256-way radix tree.
//!
//! This module provides the main [`RadixTree`] type: construction over an
//! external memory backend, the point operations (`put`/`get`/`destroy`),
//! and shared descent helpers. The heavier protocols live in submodules:
//! `put` (CAS splitting), `scan` (resumable range scans), `cache`
//! (cache-coherent variants), and `report` (structural diagnostics).
//!
//! # Concurrency
//!
//! All operations take `&self` and are safe to call from any number of
//! threads, and from any number of processes sharing the region. Mutations
//! linearize at a single CAS; `get` linearizes at the 128-bit load of the
//! value slot. There are no internal locks and no suspension points.

use std::cmp::Ordering as CmpOrdering;
use std::fmt;
use std::sync::Arc;

use crate::key::MAX_KEY_LEN;
use crate::mem::{Heap, MemoryManager};
use crate::metrics::TreeMetrics;
use crate::node::{Node, NODE_SIZE};
use crate::tagptr::{Gptr, TagGptr};
use crate::tracing_helpers::tree_log;

mod cache;
mod put;
mod report;
mod scan;

pub use cache::{CachedRead, CachedWrite};
pub use report::ListStats;
pub use scan::Iter;

/// Bound on per-allocation retries before a mutation gives up under heap
/// pressure.
pub const ALLOC_RETRY_CNT: usize = 3;

// ============================================================================
//  TreeError
// ============================================================================

/// Errors surfaced by tree operations.
///
/// Concurrent conflicts are never surfaced; they are retried internally
/// until the operation makes progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum TreeError {
    /// The heap returned null for every bounded allocation retry.
    AllocationExhausted,
}

impl fmt::Display for TreeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllocationExhausted => write!(f, "shared-memory heap exhausted"),
        }
    }
}

impl std::error::Error for TreeError {}

// ============================================================================
//  RadixTree
// ============================================================================

/// A lock-free, persistent, concurrent 256-way radix tree mapping byte keys
/// to tagged 64-bit global pointers.
///
/// The tree stores only [`Gptr`] values; interpreting what they point at is
/// the caller's business. Key length must be in `1..=MAX_KEY_LEN`; that
/// contract is checked with debug assertions and undefined (though memory-
/// safe) in release builds.
///
/// # Type Parameters
///
/// * `M` - The memory manager translating global pointers and issuing
///   persistence barriers
/// * `H` - The heap allocating node-sized blocks in shared memory
pub struct RadixTree<M, H> {
    mmgr: M,
    heap: H,
    metrics: Option<Arc<TreeMetrics>>,
    root: Gptr,
}

impl<M, H> fmt::Debug for RadixTree<M, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RadixTree").field("root", &self.root).finish()
    }
}

impl<M: MemoryManager, H: Heap> RadixTree<M, H> {
    /// Open a tree over `mmgr`/`heap`.
    ///
    /// If `root` is null, allocates and fully persists a fresh empty root
    /// node; otherwise adopts the provided root, which must have been
    /// produced by a tree with the same node layout (see
    /// [`crate::node`]). Pass the adopted root across processes via
    /// [`RadixTree::root`].
    ///
    /// # Errors
    ///
    /// [`TreeError::AllocationExhausted`] if the root cannot be allocated.
    pub fn new(
        mmgr: M,
        heap: H,
        metrics: Option<Arc<TreeMetrics>>,
        root: Gptr,
    ) -> Result<Self, TreeError> {
        let mut tree = Self {
            mmgr,
            heap,
            metrics,
            root,
        };

        if tree.root.is_null() {
            let g = tree.alloc_node()?;
            // SAFETY: freshly allocated, unpublished; this is the only
            // reference.
            let root_node = unsafe { tree.scratch_mut(g) };
            root_node.init_root();
            tree.persist_node(root_node);
            tree.root = g;
        }

        Ok(tree)
    }

    /// The persistent root pointer, for re-attachment by other processes.
    #[inline]
    #[must_use]
    pub fn root(&self) -> Gptr {
        self.root
    }

    /// The metrics sink, if one was attached.
    #[inline]
    #[must_use]
    pub fn metrics(&self) -> Option<&TreeMetrics> {
        self.metrics.as_deref()
    }

    // ========================================================================
    //  Point lookups
    // ========================================================================

    /// Look up `key`, returning the tagged value observable at this instant.
    ///
    /// An invalid result means the key is absent or was deleted; a valid
    /// result carries the mapped pointer and the slot's current version tag.
    #[must_use]
    pub fn get(&self, key: &[u8]) -> TagGptr {
        check_key(key);
        if let Some(m) = self.metrics() {
            m.record_get();
        }

        match self.locate(key) {
            Some((_, n, depth)) => {
                if let Some(m) = self.metrics() {
                    m.record_traversal(depth);
                }
                n.value().load()
            }
            None => TagGptr::INVALID,
        }
    }

    /// Delete `key` by storing an invalid tagged pointer with a bumped tag.
    ///
    /// Returns the tagged value observed before the tombstone, which tells
    /// the caller whether the key had a value. No nodes are freed; the slot
    /// keeps its version history for later reuse of the same key.
    pub fn destroy(&self, key: &[u8]) -> TagGptr {
        check_key(key);
        if let Some(m) = self.metrics() {
            m.record_destroy();
        }

        match self.locate(key) {
            Some((_, n, _)) => self.swing_value(n, Gptr::NULL).0,
            None => TagGptr::INVALID,
        }
    }

    // ========================================================================
    //  Shared descent helpers
    // ========================================================================

    /// Descend to the node whose stored key equals `key` exactly.
    ///
    /// Returns the node's global pointer, its local view, and the number of
    /// child-pointer traversals taken. `None` if the descent diverges, dead-
    /// ends in a null slot, or the key terminates inside a longer prefix.
    fn locate(&self, key: &[u8]) -> Option<(Gptr, &Node, usize)> {
        let mut q = self.root;
        let mut traversals = 0usize;

        while q.is_valid() {
            let n = self.node(q);
            if n.cmp_shared_prefix(key) != CmpOrdering::Equal {
                return None;
            }
            self.refresh_shared(n);

            if n.prefix_size() == key.len() {
                return Some((q, n, traversals));
            }
            if n.prefix_size() > key.len() {
                // Key terminates inside this node's prefix; nothing stored
                // for it here or below.
                return None;
            }

            q = n.child(key[n.prefix_size()]).load();
            traversals += 1;
        }

        None
    }

    /// CAS-swing a node's value slot to `value` with a bumped tag, retrying
    /// on conflict until the swing takes. A null `value` stores a tombstone.
    ///
    /// Returns `(observed_prior, installed)`. Every retry means another
    /// writer succeeded, so the loop is lock-free.
    fn swing_value(&self, n: &Node, value: Gptr) -> (TagGptr, TagGptr) {
        let slot = n.value();
        let mut expected = slot.load();
        loop {
            let new = TagGptr::new(value, expected.tag() + 1);
            let seen = slot.compare_and_swap(expected, new);
            if seen == expected {
                return (expected, new);
            }
            expected = seen;
        }
    }

    // ========================================================================
    //  Backend plumbing
    // ========================================================================

    /// Shared view of a published node.
    fn node(&self, gptr: Gptr) -> &Node {
        debug_assert!(gptr.is_valid());
        // SAFETY: a valid Gptr reachable from the tree names a node-sized,
        // 16-aligned block that is never freed while the region lives; the
        // memory manager keeps the translation stable.
        unsafe { &*self.mmgr.global_to_local(gptr).cast::<Node>() }
    }

    /// Exclusive view of an *unpublished* scratch node.
    ///
    /// # Safety
    ///
    /// `gptr` must name a node this caller allocated and has not yet
    /// published; no other reference to it may exist for the returned
    /// borrow's lifetime.
    unsafe fn scratch_mut(&self, gptr: Gptr) -> &mut Node {
        debug_assert!(gptr.is_valid());
        // SAFETY: exclusivity per the caller contract above.
        unsafe { &mut *self.mmgr.global_to_local(gptr).cast::<Node>() }
    }

    /// Allocate a node-sized block, retrying up to [`ALLOC_RETRY_CNT`] times.
    fn alloc_node(&self) -> Result<Gptr, TreeError> {
        for _ in 0..ALLOC_RETRY_CNT {
            let g = self.heap.alloc(NODE_SIZE);
            if g.is_valid() {
                return Ok(g);
            }
        }
        tree_log!(warn, "node allocation exhausted after {ALLOC_RETRY_CNT} retries");
        Err(TreeError::AllocationExhausted)
    }

    /// Flush a fully initialized node to the persistence domain. Must happen
    /// before the CAS that publishes the node.
    fn persist_node(&self, n: &Node) {
        self.mmgr
            .persist(std::ptr::from_ref(n).cast::<u8>(), NODE_SIZE);
    }

    /// Persistent-memory mode: drop locally cached lines over the node's
    /// child and value slots so the next reads observe shared memory.
    #[inline]
    fn refresh_shared(&self, n: &Node) {
        #[cfg(feature = "pmem")]
        self.mmgr.invalidate(
            std::ptr::from_ref(n)
                .cast::<u8>()
                .wrapping_add(crate::node::SHARED_OFFSET),
            crate::node::SHARED_LEN,
        );
        #[cfg(not(feature = "pmem"))]
        let _ = n;
    }

    /// Persistent-memory mode: drop locally cached lines over the value slot
    /// only, for the by-handle cache operations.
    #[inline]
    fn refresh_value(&self, n: &Node) {
        #[cfg(feature = "pmem")]
        self.mmgr.invalidate(
            std::ptr::from_ref(n)
                .cast::<u8>()
                .wrapping_add(crate::node::VALUE_OFFSET),
            NODE_SIZE - crate::node::VALUE_OFFSET,
        );
        #[cfg(not(feature = "pmem"))]
        let _ = n;
    }

    /// Whole-node invalidate for the advisory reporters, which reread every
    /// field rather than just the shared slots.
    fn refresh_node(&self, n: &Node) {
        self.mmgr
            .invalidate(std::ptr::from_ref(n).cast::<u8>(), NODE_SIZE);
    }
}

/// Key-length contract: `1..=MAX_KEY_LEN` bytes.
#[inline]
fn check_key(key: &[u8]) {
    debug_assert!(
        !key.is_empty() && key.len() <= MAX_KEY_LEN,
        "key length {} outside 1..={}",
        key.len(),
        MAX_KEY_LEN
    );
}
