//! Key representation for [`RadixTree`](crate::tree::RadixTree) operations.
//!
//! Keys are raw byte strings, compared as unsigned bytes, at most
//! [`MAX_KEY_LEN`] bytes long. The tree borrows caller slices on the way in;
//! [`KeyBuf`] is the fixed-capacity owned form used where a key must outlive
//! the call, chiefly the scan iterator's last-yielded key.

/// Static upper bound on key length in bytes.
///
/// Every node reserves this many key bytes, so the bound is baked into the
/// persisted node layout and must agree across all processes sharing a
/// region.
pub const MAX_KEY_LEN: usize = 64;

/// Reserved sentinel key denoting an unbounded scan endpoint.
///
/// Passed as the begin key (with `begin_inclusive == false`) it means "-∞";
/// as the end key (with `end_inclusive == false`) it means "+∞". Callers
/// must not insert it as a real key.
pub const OPEN_BOUNDARY_KEY: &[u8] = &[0x00];

/// Length of [`OPEN_BOUNDARY_KEY`] in bytes.
pub const OPEN_BOUNDARY_KEY_SIZE: usize = 1;

/// A fixed-capacity owned key.
///
/// Holds up to [`MAX_KEY_LEN`] bytes inline; no heap allocation. Bytes past
/// `len` are unspecified and never compared, the same discipline the node
/// record applies to bytes past `prefix_size`.
#[derive(Clone, Copy)]
pub struct KeyBuf {
    bytes: [u8; MAX_KEY_LEN],
    len: usize,
}

impl KeyBuf {
    /// An empty key buffer.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            bytes: [0; MAX_KEY_LEN],
            len: 0,
        }
    }

    /// Copy `key` into an owned buffer.
    ///
    /// # Panics
    ///
    /// Panics if `key.len() > MAX_KEY_LEN`.
    #[must_use]
    pub fn new(key: &[u8]) -> Self {
        assert!(
            key.len() <= MAX_KEY_LEN,
            "key length {} exceeds maximum {}",
            key.len(),
            MAX_KEY_LEN
        );

        let mut bytes = [0u8; MAX_KEY_LEN];
        bytes[..key.len()].copy_from_slice(key);
        Self {
            bytes,
            len: key.len(),
        }
    }

    /// The key bytes.
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    /// Length in bytes.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Check for the empty key.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Replace the contents with `key`.
    ///
    /// # Panics
    ///
    /// Panics if `key.len() > MAX_KEY_LEN`.
    pub fn set(&mut self, key: &[u8]) {
        assert!(key.len() <= MAX_KEY_LEN);
        self.bytes[..key.len()].copy_from_slice(key);
        self.len = key.len();
    }

    /// Clear to the empty key.
    #[inline]
    pub fn clear(&mut self) {
        self.len = 0;
    }
}

impl Default for KeyBuf {
    fn default() -> Self {
        Self::empty()
    }
}

impl PartialEq for KeyBuf {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl Eq for KeyBuf {}

impl std::fmt::Debug for KeyBuf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "KeyBuf({:02x?})", self.as_bytes())
    }
}

impl AsRef<[u8]> for KeyBuf {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

// ============================================================================
//  Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_bytes() {
        let k = KeyBuf::new(b"hello");
        assert_eq!(k.as_bytes(), b"hello");
        assert_eq!(k.len(), 5);
        assert!(!k.is_empty());
    }

    #[test]
    fn equality_ignores_stale_capacity_bytes() {
        let mut a = KeyBuf::new(b"abcdef");
        a.set(b"ab");
        let b = KeyBuf::new(b"ab");
        assert_eq!(a, b);
    }

    #[test]
    fn max_len_key_accepted() {
        let long = [0xab_u8; MAX_KEY_LEN];
        let k = KeyBuf::new(&long);
        assert_eq!(k.as_bytes(), &long[..]);
    }

    #[test]
    #[should_panic(expected = "exceeds maximum")]
    fn over_long_key_rejected() {
        let long = [0_u8; MAX_KEY_LEN + 1];
        let _ = KeyBuf::new(&long);
    }

    #[test]
    fn open_boundary_sentinel_shape() {
        assert_eq!(OPEN_BOUNDARY_KEY.len(), OPEN_BOUNDARY_KEY_SIZE);
    }
}
