//! Stress tests for concurrent tree operations.
//!
//! These drive the lock-free paths hard enough to surface CAS races:
//! disjoint and overlapping writer key sets, prefix-heavy keys that force
//! splits, mixed put/destroy interleavings, and install races on one key.

#![expect(clippy::unwrap_used, reason = "fail fast in tests")]

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use common::{new_tree, val, TestTree};
use famradix::{Iter, OPEN_BOUNDARY_KEY};

/// Verify every `(key, value)` pair reads back; panic with details if not.
fn verify_all<F>(tree: &TestTree, key_gen: F, count: usize, test_name: &str)
where
    F: Fn(usize) -> (Vec<u8>, u64),
{
    let mut missing = Vec::new();
    let mut wrong = Vec::new();

    for i in 0..count {
        let (key, value) = key_gen(i);
        let got = tree.get(&key);
        if !got.is_valid() {
            missing.push(i);
        } else if got.gptr().raw() != value {
            wrong.push(i);
        }
    }

    assert!(
        missing.is_empty() && wrong.is_empty(),
        "{test_name}: {} missing, {} wrong (first 20 missing: {:?})",
        missing.len(),
        wrong.len(),
        missing.iter().take(20).collect::<Vec<_>>()
    );
}

/// Drain a full scan and assert strictly ascending key order.
fn assert_scan_sorted(tree: &TestTree) -> usize {
    let mut iter = Iter::new();
    let mut count = 0usize;
    let mut prev: Option<Vec<u8>> = None;

    let mut next = tree.scan(&mut iter, OPEN_BOUNDARY_KEY, false, OPEN_BOUNDARY_KEY, false);
    while let Some((key, value)) = next {
        assert!(value.is_valid());
        let k = key.as_bytes().to_vec();
        if let Some(p) = &prev {
            assert!(*p < k, "scan order violated: {p:?} !< {k:?}");
        }
        prev = Some(k);
        count += 1;
        next = tree.get_next(&mut iter);
    }
    count
}

// =============================================================================
// Disjoint writers
// =============================================================================

#[test]
fn disjoint_writers_all_keys_survive() {
    common::init_tracing();

    const NUM_THREADS: usize = 8;
    const KEYS_PER_THREAD: usize = 400;

    let (tree, _heap) = new_tree();
    let tree = Arc::new(tree);

    let handles: Vec<_> = (0..NUM_THREADS)
        .map(|t| {
            let tree = Arc::clone(&tree);
            thread::spawn(move || {
                for i in 0..KEYS_PER_THREAD {
                    let key = format!("w{t:02}-{i:06}");
                    let value = (t * 1_000_000 + i) as u64 + 1;
                    tree.put(key.as_bytes(), val(value), true).unwrap();

                    // Immediate read-back through the shared structure.
                    assert_eq!(tree.get(key.as_bytes()).gptr().raw(), value);
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    verify_all(
        &tree,
        |i| {
            let (t, k) = (i / KEYS_PER_THREAD, i % KEYS_PER_THREAD);
            (
                format!("w{t:02}-{k:06}").into_bytes(),
                (t * 1_000_000 + k) as u64 + 1,
            )
        },
        NUM_THREADS * KEYS_PER_THREAD,
        "disjoint_writers",
    );
    assert_eq!(assert_scan_sorted(&tree), NUM_THREADS * KEYS_PER_THREAD);
}

// =============================================================================
// Split-heavy contention
// =============================================================================

#[test]
fn prefix_heavy_keys_force_concurrent_splits() {
    const NUM_THREADS: usize = 8;
    const DEPTH: usize = 48;

    // Every thread inserts every prefix of a short alphabet walk, so all
    // threads fight over the same split points.
    let (tree, _heap) = new_tree();
    let tree = Arc::new(tree);

    let handles: Vec<_> = (0..NUM_THREADS)
        .map(|t| {
            let tree = Arc::clone(&tree);
            thread::spawn(move || {
                let base: Vec<u8> = (0..DEPTH).map(|i| b'a' + (i % 3) as u8).collect();
                for len in 1..=DEPTH {
                    let key = &base[..len];
                    // update=false: first writer wins each prefix.
                    let _ = tree.put(key, val((t + 1) as u64), false).unwrap();
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    let base: Vec<u8> = (0..DEPTH).map(|i| b'a' + (i % 3) as u8).collect();
    for len in 1..=DEPTH {
        let got = tree.get(&base[..len]);
        assert!(got.is_valid(), "prefix of length {len} lost");
        let winner = got.gptr().raw();
        assert!((1..=NUM_THREADS as u64).contains(&winner));
    }
    assert_eq!(assert_scan_sorted(&tree), DEPTH);
}

#[test]
fn interleaved_sibling_inserts() {
    const NUM_THREADS: usize = 4;
    const FANOUT_KEYS: usize = 256;

    // All threads insert the same 256 single-divergence siblings; every slot
    // of one node gets CAS-raced.
    let (tree, _heap) = new_tree();
    let tree = Arc::new(tree);

    let handles: Vec<_> = (0..NUM_THREADS)
        .map(|t| {
            let tree = Arc::clone(&tree);
            thread::spawn(move || {
                for b in 0..FANOUT_KEYS {
                    let key = [b's', b'i', b'b', b'-', b as u8];
                    tree.put(&key, val((t * 1000 + b) as u64 + 1), true).unwrap();
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    for b in 0..FANOUT_KEYS {
        let key = [b's', b'i', b'b', b'-', b as u8];
        assert!(tree.get(&key).is_valid(), "sibling {b} lost");
    }
    assert_eq!(assert_scan_sorted(&tree), FANOUT_KEYS);
}

// =============================================================================
// Install races
// =============================================================================

#[test]
fn put_if_absent_has_exactly_one_winner() {
    const NUM_THREADS: usize = 16;
    const ROUNDS: usize = 50;

    let (tree, _heap) = new_tree();
    let tree = Arc::new(tree);

    for round in 0..ROUNDS {
        let key = format!("race-{round:04}").into_bytes();
        let winners = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..NUM_THREADS)
            .map(|t| {
                let tree = Arc::clone(&tree);
                let winners = Arc::clone(&winners);
                let key = key.clone();
                thread::spawn(move || {
                    let prior = tree.put(&key, val(t as u64 + 1), false).unwrap();
                    if !prior.is_valid() {
                        winners.fetch_add(1, Ordering::Relaxed);
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        // Exactly one thread observed the empty slot; everyone else got the
        // winner's value back by the update guard.
        assert_eq!(winners.load(Ordering::Relaxed), 1, "round {round}");
        let winner = tree.get(&key).gptr().raw();
        assert!((1..=NUM_THREADS as u64).contains(&winner));
    }
}

// =============================================================================
// Mixed put/destroy interleavings
// =============================================================================

#[test]
fn put_destroy_interleaving_keeps_tags_monotonic() {
    const NUM_THREADS: usize = 8;
    const OPS_PER_THREAD: usize = 300;
    const SHARED_KEYS: usize = 16;

    let (tree, _heap) = new_tree();
    let tree = Arc::new(tree);

    // Pre-create the shared keys so every op is a value-slot CAS.
    for k in 0..SHARED_KEYS {
        tree.put(format!("hot-{k:02}").as_bytes(), val(1), true).unwrap();
    }

    let handles: Vec<_> = (0..NUM_THREADS)
        .map(|t| {
            let tree = Arc::clone(&tree);
            thread::spawn(move || {
                let mut last_tag = vec![0u64; SHARED_KEYS];
                for i in 0..OPS_PER_THREAD {
                    let k = (t * 31 + i * 7) % SHARED_KEYS;
                    let key = format!("hot-{k:02}");

                    let observed = if i % 3 == 0 {
                        tree.destroy(key.as_bytes())
                    } else {
                        let value = ((t + 1) * 10_000 + i) as u64;
                        tree.put(key.as_bytes(), val(value), true).unwrap()
                    };

                    // The prior tagged value this op displaced can be stale
                    // relative to other threads, but never older than what
                    // this thread already displaced at the same slot.
                    assert!(
                        observed.tag() >= last_tag[k],
                        "tag regressed on {key}: {} -> {}",
                        last_tag[k],
                        observed.tag()
                    );
                    last_tag[k] = observed.tag();
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    // Every hot key's node still resolves; values are whatever the last
    // writer left, tags reflect the full operation history.
    for k in 0..SHARED_KEYS {
        let key = format!("hot-{k:02}");
        let handle = tree.get_cached(key.as_bytes());
        assert!(handle.node.is_valid());
        assert!(handle.value.tag() >= 1);
    }
    assert_scan_sorted(&tree);
}

// =============================================================================
// Readers racing writers
// =============================================================================

#[test]
fn readers_never_observe_torn_or_partial_nodes() {
    const WRITERS: usize = 4;
    const READERS: usize = 4;
    const KEYS: usize = 600;

    let (tree, _heap) = new_tree();
    let tree = Arc::new(tree);

    let writer_handles: Vec<_> = (0..WRITERS)
        .map(|t| {
            let tree = Arc::clone(&tree);
            thread::spawn(move || {
                for i in (t..KEYS).step_by(WRITERS) {
                    // Values encode their key index; readers use that to
                    // check pairing.
                    let key = format!("torn-{i:05}");
                    tree.put(key.as_bytes(), val(i as u64 + 1), true).unwrap();
                }
            })
        })
        .collect();

    let reader_handles: Vec<_> = (0..READERS)
        .map(|_| {
            let tree = Arc::clone(&tree);
            thread::spawn(move || {
                for _ in 0..3 {
                    for i in 0..KEYS {
                        let key = format!("torn-{i:05}");
                        let got = tree.get(key.as_bytes());
                        // Either absent (not yet inserted) or exactly the
                        // value written for this key; never a mixture.
                        if got.is_valid() {
                            assert_eq!(got.gptr().raw(), i as u64 + 1);
                            assert_eq!(got.tag(), 0, "single put never bumps past 0");
                        }
                    }
                }
            })
        })
        .collect();

    for h in writer_handles {
        h.join().unwrap();
    }
    for h in reader_handles {
        h.join().unwrap();
    }

    verify_all(
        &tree,
        |i| (format!("torn-{i:05}").into_bytes(), i as u64 + 1),
        KEYS,
        "readers_never_observe_torn",
    );
}

// =============================================================================
// Concurrent scans
// =============================================================================

#[test]
fn scans_stay_sorted_under_concurrent_inserts() {
    const KEYS: usize = 2000;

    let (tree, _heap) = new_tree();
    let tree = Arc::new(tree);

    // Seed half the key space.
    for i in (0..KEYS).step_by(2) {
        tree.put(format!("scan-{i:05}").as_bytes(), val(i as u64 + 1), true)
            .unwrap();
    }

    let writer = {
        let tree = Arc::clone(&tree);
        thread::spawn(move || {
            for i in (1..KEYS).step_by(2) {
                tree.put(format!("scan-{i:05}").as_bytes(), val(i as u64 + 1), true)
                    .unwrap();
            }
        })
    };

    // Scans racing the writer: order must hold even though membership is
    // a moving target.
    for _ in 0..4 {
        let yielded = assert_scan_sorted(&tree);
        assert!(yielded >= KEYS / 2);
    }

    writer.join().unwrap();
    assert_eq!(assert_scan_sorted(&tree), KEYS);
}
