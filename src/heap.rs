//! Process-local implementation of the memory backend.
//!
//! [`ProcessHeap`] stands in for the external NVMM heap and memory manager
//! when no fabric is attached: tests, benches, and volatile single-process
//! use. Global pointers are the block's own address, translation is the
//! identity, `persist` is a store fence, and `invalidate` is a no-op because
//! process memory is cache-coherent.
//!
//! The allocation table is guarded by a mutex; only `alloc` and `free`
//! touch it, never the tree's lock-free paths.

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::collections::HashMap;
use std::sync::atomic::{fence, Ordering};

use parking_lot::Mutex;

use crate::mem::{Heap, MemoryManager};
use crate::tagptr::Gptr;

/// Minimum alignment of every block, per the heap contract.
const MIN_ALIGN: usize = 16;

/// A volatile, in-process heap + memory manager.
///
/// Blocks are zeroed on allocation. Outstanding blocks are released when the
/// heap drops; dropping the heap while a tree still references its nodes
/// invalidates every `Gptr` minted from it.
#[derive(Default)]
pub struct ProcessHeap {
    /// Live allocations, keyed by address. Values are the layouts needed to
    /// release them.
    allocations: Mutex<HashMap<u64, Layout>>,
}

impl ProcessHeap {
    /// Create an empty heap.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of outstanding allocations.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.allocations.lock().len()
    }
}

impl Heap for ProcessHeap {
    fn alloc(&self, size: usize) -> Gptr {
        let Ok(layout) = Layout::from_size_align(size.max(1), MIN_ALIGN) else {
            return Gptr::NULL;
        };

        // SAFETY: layout has non-zero size.
        let ptr = unsafe { alloc_zeroed(layout) };
        if ptr.is_null() {
            return Gptr::NULL;
        }

        self.allocations.lock().insert(ptr as usize as u64, layout);
        Gptr::new(ptr as usize as u64)
    }

    fn free(&self, gptr: Gptr) {
        let layout = self
            .allocations
            .lock()
            .remove(&gptr.raw())
            .expect("freeing a pointer ProcessHeap did not allocate");

        // SAFETY: the pointer came from alloc_zeroed with this layout and
        // was removed from the table exactly once.
        unsafe { dealloc(gptr.raw() as usize as *mut u8, layout) };
    }
}

impl MemoryManager for ProcessHeap {
    fn global_to_local(&self, gptr: Gptr) -> *mut u8 {
        debug_assert!(gptr.is_valid());
        gptr.raw() as usize as *mut u8
    }

    fn persist(&self, _addr: *const u8, _len: usize) {
        // Volatile backend: order the stores, durability is out of scope.
        fence(Ordering::SeqCst);
    }

    fn invalidate(&self, _addr: *const u8, _len: usize) {
        // Process memory is cache-coherent.
    }
}

impl Drop for ProcessHeap {
    fn drop(&mut self) {
        for (addr, layout) in self.allocations.get_mut().drain() {
            // SAFETY: every table entry is a live allocation made by us.
            unsafe { dealloc(addr as usize as *mut u8, layout) };
        }
    }
}

// ============================================================================
//  Tests
// ============================================================================
