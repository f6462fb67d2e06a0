//! Lock-free insert/update: descent, leaf creation, and the CAS splitting
//! protocol.
//!
//! # Protocol
//!
//! ```text
//! 1. Descend from the root, matching the key against each node's prefix
//! 2. Key terminates at a node        -> CAS the value slot (tag + 1)
//! 3. Descent dead-ends in a null slot -> persist a fresh leaf, CAS it in
//! 4. Key diverges inside a prefix     -> build an intermediate node linking
//!    the old subtree and (if needed) a new leaf, persist it, CAS-swing the
//!    parent slot
//! 5. Any failed CAS: resume the descent at the contended slot with the
//!    observed pointer
//! ```
//!
//! Scratch nodes (the intermediate and the new leaf) are allocated at most
//! once per operation and reused across retries; whichever ends up unused is
//! returned to the heap. A node is always fully persisted before the CAS
//! that publishes it, so observers of the new pointer observe a complete
//! node.
//!
//! Forward progress is lock-freedom: every failed CAS means another writer
//! published a node or a value. The only bounded loop is allocation retry,
//! which exists to fail gracefully under heap pressure.

use crate::mem::{Heap, MemoryManager};
use crate::node::Node;
use crate::tagptr::{AtomicGptr, Gptr, TagGptr};
use crate::tracing_helpers::tree_log;

use super::{check_key, RadixTree, TreeError};

/// What a completed insert/update observed and produced.
///
/// `node` is the global pointer of the node that owns the key's value slot;
/// the cache-coherent entry points hand it to callers as the stable cache
/// key.
pub(super) struct PutOutcome {
    pub node: Gptr,
    pub old: TagGptr,
    pub new: TagGptr,
}

impl<M: MemoryManager, H: Heap> RadixTree<M, H> {
    /// Insert or update `key -> value`.
    ///
    /// Returns the tagged value observed *before* the operation: invalid if
    /// the key was absent. When `update` is false and the key already has a
    /// valid value, that value is returned and the tree is not modified.
    ///
    /// # Errors
    ///
    /// [`TreeError::AllocationExhausted`] if a needed node cannot be
    /// allocated; the tree is unchanged and any scratch is released.
    pub fn put(&self, key: &[u8], value: Gptr, update: bool) -> Result<TagGptr, TreeError> {
        check_key(key);
        if let Some(m) = self.metrics() {
            m.record_put();
        }
        self.put_inner(key, value, update).map(|outcome| outcome.old)
    }

    /// Shared body of `put` and `put_cached`.
    pub(super) fn put_inner(
        &self,
        key: &[u8],
        value: Gptr,
        update: bool,
    ) -> Result<PutOutcome, TreeError> {
        let mut new_leaf = Gptr::NULL;
        let mut intermediate = Gptr::NULL;

        let result = self.put_loop(key, value, update, &mut new_leaf, &mut intermediate);

        if result.is_err() {
            // Unpublished scratch must not outlive a failed operation.
            if new_leaf.is_valid() {
                self.heap.free(new_leaf);
            }
            if intermediate.is_valid() {
                self.heap.free(intermediate);
            }
        }
        result
    }

    #[allow(clippy::too_many_lines)]
    fn put_loop(
        &self,
        key: &[u8],
        value: Gptr,
        update: bool,
        new_leaf: &mut Gptr,
        intermediate: &mut Gptr,
    ) -> Result<PutOutcome, TreeError> {
        // Slot whose observed value is `q`; None only while `q` is the root.
        let mut slot: Option<&AtomicGptr> = None;
        let mut q = self.root;

        // Split state, meaningful when the descent breaks out on divergence.
        let mut split_at = 0usize;
        let mut existing = 0u8;

        loop {
            // Find the current correct insertion point.
            while q.is_valid() {
                let n = self.node(q);
                let i = n.common_prefix_len(key);
                self.refresh_shared(n);

                if i < n.prefix_size() {
                    // Key diverges inside this node's prefix: split here.
                    split_at = i;
                    existing = n.key_byte(i);
                    break;
                }

                // The key has matched this node's entire prefix.
                if key.len() == i {
                    // The key terminates at this node; retries are over, so
                    // scratch from earlier attempts goes back to the heap.
                    if intermediate.is_valid() {
                        self.heap.free(std::mem::replace(intermediate, Gptr::NULL));
                    }
                    if new_leaf.is_valid() {
                        self.heap.free(std::mem::replace(new_leaf, Gptr::NULL));
                    }
                    return Ok(self.put_value(q, n, value, update));
                }

                // The key is longer; descend by its next byte.
                let s = n.child(key[i]);
                q = s.load();
                slot = Some(s);
            }

            // Case 1: no split, a fresh leaf goes into a null slot.
            if q.is_null() {
                let leaf = self.ensure_leaf(new_leaf, key, value)?;
                let s = slot.expect("the root is never null");

                let seen = s.compare_and_swap(Gptr::NULL, leaf);
                if seen.is_null() {
                    tree_log!(trace, "installed leaf for {}-byte key", key.len());
                    *new_leaf = Gptr::NULL;
                    if intermediate.is_valid() {
                        self.heap.free(std::mem::replace(intermediate, Gptr::NULL));
                    }
                    return Ok(PutOutcome {
                        node: leaf,
                        old: TagGptr::INVALID,
                        new: TagGptr::new(value, 0),
                    });
                }
                // Someone published into the slot first; resume the descent
                // at their node. The prepared leaf stays for the retry.
                q = seen;
                continue;
            }

            // Case 2: split. Build the intermediate node holding the common
            // prefix, linking the displaced subtree under its divergence
            // byte.
            let inter_g = self.ensure_intermediate(intermediate, key)?;
            // SAFETY: the intermediate is unpublished scratch owned by this
            // call; nobody else can reach it until the CAS below.
            let inter = unsafe { self.scratch_mut(inter_g) };

            // The divergence point may have moved since a failed attempt;
            // relink from a clean child array every time.
            inter.clear_children();
            inter.set_prefix_size(split_at);
            inter.set_child(existing, q);

            let value_node = if split_at == key.len() {
                // The inserted key IS the common prefix: the intermediate
                // node holds the value directly, no extra leaf needed.
                inter.set_value(TagGptr::new(value, 0));
                inter_g
            } else {
                inter.set_value(TagGptr::INVALID);
                let leaf = self.ensure_leaf(new_leaf, key, value)?;
                inter.set_child(key[split_at], leaf);
                leaf
            };
            self.persist_node(inter);

            let s = slot.expect("the root's empty prefix never splits");
            let seen = s.compare_and_swap(q, inter_g);
            if seen == q {
                tree_log!(trace, "split at byte {split_at}");
                if let Some(m) = self.metrics() {
                    m.record_split();
                }
                *intermediate = Gptr::NULL;
                if value_node == inter_g {
                    // The no-extra-leaf branch: a leaf prepared by an earlier
                    // attempt went unused.
                    if new_leaf.is_valid() {
                        self.heap.free(std::mem::replace(new_leaf, Gptr::NULL));
                    }
                } else {
                    *new_leaf = Gptr::NULL;
                }
                return Ok(PutOutcome {
                    node: value_node,
                    old: TagGptr::INVALID,
                    new: TagGptr::new(value, 0),
                });
            }
            // The slot moved under us; descend from what we saw.
            q = seen;
        }
    }

    /// Terminal case: the key's node exists, operate on its value slot.
    fn put_value(&self, node_g: Gptr, n: &Node, value: Gptr, update: bool) -> PutOutcome {
        if update {
            let (old, new) = self.swing_value(n, value);
            return PutOutcome {
                node: node_g,
                old,
                new,
            };
        }

        // update == false: install only if no valid value is present. A
        // reloaded now-valid value is returned unchanged. Each CAS failure
        // means another writer succeeded, so this cannot livelock.
        let slot = n.value();
        let mut expected = slot.load();
        loop {
            if expected.is_valid() {
                return PutOutcome {
                    node: node_g,
                    old: expected,
                    new: expected,
                };
            }
            let new = TagGptr::new(value, expected.tag() + 1);
            let seen = slot.compare_and_swap(expected, new);
            if seen == expected {
                return PutOutcome {
                    node: node_g,
                    old: expected,
                    new,
                };
            }
            expected = seen;
        }
    }

    /// Idempotently prepare the new leaf: allocate once, fully initialize,
    /// persist. Reused as-is across retries because its key and value never
    /// change.
    fn ensure_leaf(&self, cache: &mut Gptr, key: &[u8], value: Gptr) -> Result<Gptr, TreeError> {
        if cache.is_null() {
            let g = self.alloc_node()?;
            // SAFETY: freshly allocated, unpublished; this is the only
            // reference.
            let leaf = unsafe { self.scratch_mut(g) };
            leaf.init_leaf(key, TagGptr::new(value, 0));
            self.persist_node(leaf);
            *cache = g;
        }
        Ok(*cache)
    }

    /// Idempotently prepare the intermediate node's immutable part. The full
    /// key is copied up front; `prefix_size` and the links are fixed up per
    /// attempt because the divergence point can move between retries.
    fn ensure_intermediate(&self, cache: &mut Gptr, key: &[u8]) -> Result<Gptr, TreeError> {
        if cache.is_null() {
            let g = self.alloc_node()?;
            // SAFETY: freshly allocated, unpublished; this is the only
            // reference.
            let inter = unsafe { self.scratch_mut(g) };
            inter.init_scratch(key);
            *cache = g;
        }
        Ok(*cache)
    }
}
