//! # famradix
//!
//! A lock-free, persistent, concurrent 256-way radix tree over
//! fabric-attached memory (FAM).
//!
//! The tree maps variable-length byte keys (up to [`MAX_KEY_LEN`] bytes) to
//! 64-bit global pointers. It lives in shared, byte-addressable non-volatile
//! memory and is read and mutated concurrently by multiple threads, and by
//! multiple processes observing the same region through their own mappings.
//!
//! ## Design
//!
//! - Every trie node is a fixed-size record ([`node::Node`]) indexed by the
//!   next key byte; prefixes are shared, keys are not compressed further.
//! - Value slots are 128-bit tagged pointers ([`TagGptr`]): a [`Gptr`] plus
//!   a monotonically increasing version tag that defeats ABA for readers and
//!   lets external DRAM caches detect staleness.
//! - Writers grow the trie with a compare-and-swap splitting protocol; a new
//!   node is fully persisted before the single CAS that publishes it.
//! - Readers descend without locks; a 128-bit atomic load of the value slot
//!   is the linearization point of `get`.
//! - Published nodes are never freed, so `Gptr` handles returned by the
//!   cache-coherent entry points stay dereferenceable for the life of the
//!   region.
//!
//! ## Memory backend
//!
//! The tree consumes a narrow external contract ([`Heap`] + [`MemoryManager`]):
//! allocate/free node blocks, translate global pointers to local addresses,
//! and persist/invalidate byte ranges. [`ProcessHeap`] implements both traits
//! over process-local memory for tests and fabric-less use.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use famradix::{Gptr, ProcessHeap, RadixTree};
//!
//! let heap = Arc::new(ProcessHeap::new());
//! let tree = RadixTree::new(Arc::clone(&heap), heap, None, Gptr::NULL)?;
//!
//! let prior = tree.put(b"alpha", Gptr::new(100), true)?;
//! assert!(!prior.is_valid());
//! assert_eq!(tree.get(b"alpha").gptr(), Gptr::new(100));
//! # Ok::<(), famradix::TreeError>(())
//! ```

#![warn(clippy::pedantic)]
#![warn(clippy::unwrap_used)]
#![allow(clippy::module_name_repetitions)]

mod tracing_helpers;

pub mod heap;
pub mod key;
pub mod mem;
pub mod metrics;
pub mod node;
pub mod ordering;
pub mod tagptr;
pub mod tree;

pub use heap::ProcessHeap;
pub use key::{KeyBuf, MAX_KEY_LEN, OPEN_BOUNDARY_KEY, OPEN_BOUNDARY_KEY_SIZE};
pub use mem::{Heap, MemoryManager};
pub use metrics::{MetricsSnapshot, TreeMetrics};
pub use tagptr::{Gptr, TagGptr};
pub use tree::{CachedRead, CachedWrite, Iter, ListStats, RadixTree, TreeError};
