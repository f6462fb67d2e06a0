//! Tagged global pointers and the atomic slot primitives over them.
//!
//! Three atomic operations form the hardware interface to shared memory:
//!
//! - CAS-64 on a [`Gptr`] slot ([`AtomicGptr::compare_and_swap`])
//! - CAS-128 on a [`TagGptr`] slot ([`AtomicTagGptr::compare_and_swap`])
//! - Load-128 of a [`TagGptr`] ([`AtomicTagGptr::load`])
//!
//! All three use sequential consistency: an observer of a published pointer
//! also observes every prior write to the node it names. Both CAS forms
//! return the value observed *before* the attempt; the attempt succeeded iff
//! the returned value equals the expected one. This mirrors the underlying
//! fabric-atomic compare-and-store, which has no separate success flag.
//!
//! A pair of 64-bit loads can tear between `gptr` and `tag`, which is
//! exactly the ABA window the tag exists to close; the 128-bit load is
//! mandatory for value slots.

use std::fmt;

use portable_atomic::AtomicU128;
use std::sync::atomic::AtomicU64;

use crate::ordering::{SLOT_CAS, SLOT_CAS_FAILURE, SLOT_READ};

// ============================================================================
//  Gptr
// ============================================================================

/// A 64-bit opaque global pointer into shared memory.
///
/// Value `0` is the null sentinel. Valid pointers are translatable by the
/// memory manager into a locally dereferenceable address. The tree never
/// performs arithmetic on a `Gptr`; it only stores, compares, and translates
/// them.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Gptr(u64);

impl Gptr {
    /// The null global pointer.
    pub const NULL: Self = Self(0);

    /// Wrap a raw 64-bit global pointer value.
    #[inline]
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw 64-bit value.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Check for the null sentinel.
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// A pointer is valid iff it is non-null.
    #[inline]
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Debug for Gptr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Gptr({:#x})", self.0)
    }
}

// ============================================================================
//  TagGptr
// ============================================================================

/// A 128-bit tagged global pointer: `(gptr, tag)`.
///
/// `tag` is a version counter incremented on every successful mutation of a
/// node's value slot. It defeats ABA in readers and lets external caches
/// detect staleness by tag comparison. A `TagGptr` is *valid* iff its `gptr`
/// half is non-null; two tagged pointers compare equal iff both halves match.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct TagGptr {
    gptr: Gptr,
    tag: u64,
}

impl TagGptr {
    /// The invalid tagged pointer `(null, 0)`: "no value at this key".
    pub const INVALID: Self = Self {
        gptr: Gptr::NULL,
        tag: 0,
    };

    /// Pair a global pointer with a tag.
    #[inline]
    #[must_use]
    pub const fn new(gptr: Gptr, tag: u64) -> Self {
        Self { gptr, tag }
    }

    /// A tombstone: null pointer carrying a live tag. Stored by `destroy` so
    /// the slot's version history survives the deletion.
    #[inline]
    #[must_use]
    pub const fn tombstone(tag: u64) -> Self {
        Self {
            gptr: Gptr::NULL,
            tag,
        }
    }

    /// The pointer half.
    #[inline]
    #[must_use]
    pub const fn gptr(self) -> Gptr {
        self.gptr
    }

    /// The version tag half.
    #[inline]
    #[must_use]
    pub const fn tag(self) -> u64 {
        self.tag
    }

    /// Valid iff the pointer half is non-null.
    #[inline]
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.gptr.is_valid()
    }

    /// Pack into the 128-bit word stored in shared memory.
    #[inline]
    #[must_use]
    const fn to_bits(self) -> u128 {
        ((self.tag as u128) << 64) | (self.gptr.0 as u128)
    }

    /// Unpack from the 128-bit word stored in shared memory.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    const fn from_bits(bits: u128) -> Self {
        Self {
            gptr: Gptr(bits as u64),
            tag: (bits >> 64) as u64,
        }
    }
}

impl fmt::Debug for TagGptr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TagGptr({:#x}, tag={})", self.gptr.0, self.tag)
    }
}

// ============================================================================
//  Atomic cells
// ============================================================================

/// A child-pointer slot: an atomically accessed [`Gptr`] in shared memory.
#[derive(Debug)]
#[repr(transparent)]
pub struct AtomicGptr(AtomicU64);

impl AtomicGptr {
    /// Create a slot holding `gptr`.
    #[must_use]
    pub const fn new(gptr: Gptr) -> Self {
        Self(AtomicU64::new(gptr.0))
    }

    /// Atomic 64-bit read of the slot.
    #[inline]
    pub fn load(&self) -> Gptr {
        Gptr(self.0.load(SLOT_READ))
    }

    /// CAS-64: attempt to swing the slot from `current` to `new`.
    ///
    /// Returns the value observed before the attempt; the swing took effect
    /// iff the returned value equals `current`.
    #[inline]
    pub fn compare_and_swap(&self, current: Gptr, new: Gptr) -> Gptr {
        match self
            .0
            .compare_exchange(current.0, new.0, SLOT_CAS, SLOT_CAS_FAILURE)
        {
            Ok(prev) | Err(prev) => Gptr(prev),
        }
    }
}

/// A value slot: an atomically accessed [`TagGptr`] in shared memory.
///
/// Requires 16-byte alignment for the double-width CAS; the node layout
/// guarantees it.
#[derive(Debug)]
#[repr(transparent)]
pub struct AtomicTagGptr(AtomicU128);

impl AtomicTagGptr {
    /// Create a slot holding `value`.
    #[must_use]
    pub const fn new(value: TagGptr) -> Self {
        Self(AtomicU128::new(value.to_bits()))
    }

    /// Load-128: atomic, tear-free read of the `(gptr, tag)` pair.
    #[inline]
    pub fn load(&self) -> TagGptr {
        TagGptr::from_bits(self.0.load(SLOT_READ))
    }

    /// CAS-128: attempt to swing the slot from `current` to `new`.
    ///
    /// Returns the pair observed before the attempt; the swing took effect
    /// iff the returned pair equals `current`.
    #[inline]
    pub fn compare_and_swap(&self, current: TagGptr, new: TagGptr) -> TagGptr {
        match self.0.compare_exchange(
            current.to_bits(),
            new.to_bits(),
            SLOT_CAS,
            SLOT_CAS_FAILURE,
        ) {
            Ok(prev) | Err(prev) => TagGptr::from_bits(prev),
        }
    }
}

// ============================================================================
//  Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_gptr_is_invalid() {
        assert!(Gptr::NULL.is_null());
        assert!(!Gptr::NULL.is_valid());
        assert!(Gptr::new(1).is_valid());
        assert_eq!(Gptr::default(), Gptr::NULL);
    }

    #[test]
    fn tag_gptr_validity_ignores_tag() {
        assert!(!TagGptr::INVALID.is_valid());
        assert!(!TagGptr::tombstone(17).is_valid());
        assert!(TagGptr::new(Gptr::new(8), 0).is_valid());
    }

    #[test]
    fn tag_gptr_equality_compares_both_halves() {
        let a = TagGptr::new(Gptr::new(8), 1);
        let b = TagGptr::new(Gptr::new(8), 2);
        let c = TagGptr::new(Gptr::new(9), 1);
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, TagGptr::new(Gptr::new(8), 1));
    }

    #[test]
    fn bits_round_trip() {
        let v = TagGptr::new(Gptr::new(0xdead_beef), u64::MAX - 3);
        assert_eq!(TagGptr::from_bits(v.to_bits()), v);
    }

    #[test]
    fn cas64_returns_observed_prior() {
        let slot = AtomicGptr::new(Gptr::new(5));

        // Successful swing observes the expected value.
        let seen = slot.compare_and_swap(Gptr::new(5), Gptr::new(6));
        assert_eq!(seen, Gptr::new(5));
        assert_eq!(slot.load(), Gptr::new(6));

        // Failed swing observes the conflicting value and leaves the slot.
        let seen = slot.compare_and_swap(Gptr::new(5), Gptr::new(7));
        assert_eq!(seen, Gptr::new(6));
        assert_eq!(slot.load(), Gptr::new(6));
    }

    #[test]
    fn cas128_swings_pointer_and_tag_together() {
        let slot = AtomicTagGptr::new(TagGptr::INVALID);

        let installed = TagGptr::new(Gptr::new(100), 1);
        let seen = slot.compare_and_swap(TagGptr::INVALID, installed);
        assert_eq!(seen, TagGptr::INVALID);
        assert_eq!(slot.load(), installed);

        // A stale expected pair (right pointer, wrong tag) must fail.
        let stale = TagGptr::new(Gptr::new(100), 0);
        let seen = slot.compare_and_swap(stale, TagGptr::tombstone(2));
        assert_eq!(seen, installed);
        assert_eq!(slot.load(), installed);
    }
}
