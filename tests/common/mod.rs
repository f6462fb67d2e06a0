//! Common test utilities: tracing setup and tree fixtures.
//!
//! ```rust,ignore
//! mod common;
//!
//! #[test]
//! fn my_test() {
//!     common::init_tracing();
//!     let (tree, _heap) = common::new_tree();
//! }
//! ```
//!
//! Set `RUST_LOG` (e.g. `famradix=trace`) to control output; tracing inside
//! the library itself additionally needs the `tracing` feature.

#![allow(dead_code)]

use std::sync::{Arc, Once};

use famradix::{Gptr, ProcessHeap, RadixTree, TreeMetrics};

/// Ensures tracing is only initialized once across all tests.
static INIT: Once = Once::new();

/// Initialize a test tracing subscriber. Safe to call multiple times.
pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// The tree type every integration test drives: both backend roles served
/// by one shared in-process heap.
pub type TestTree = RadixTree<Arc<ProcessHeap>, Arc<ProcessHeap>>;

/// A fresh empty tree over a fresh heap.
///
/// The heap is returned alongside because dropping it invalidates every
/// node; tests keep it alive for the tree's lifetime (and can reuse it to
/// re-attach via the root pointer).
pub fn new_tree() -> (TestTree, Arc<ProcessHeap>) {
    let heap = Arc::new(ProcessHeap::new());
    let tree = RadixTree::new(Arc::clone(&heap), Arc::clone(&heap), None, Gptr::NULL)
        .expect("fresh heap cannot be exhausted");
    (tree, heap)
}

/// A fresh empty tree with a metrics sink attached.
pub fn new_tree_with_metrics() -> (TestTree, Arc<ProcessHeap>, Arc<TreeMetrics>) {
    let heap = Arc::new(ProcessHeap::new());
    let metrics = Arc::new(TreeMetrics::new());
    let tree = RadixTree::new(
        Arc::clone(&heap),
        Arc::clone(&heap),
        Some(Arc::clone(&metrics)),
        Gptr::NULL,
    )
    .expect("fresh heap cannot be exhausted");
    (tree, heap, metrics)
}

/// Shorthand for an opaque value pointer. The tree never dereferences
/// values, so tests use distinctive raw numbers.
pub fn val(raw: u64) -> Gptr {
    Gptr::new(raw)
}
