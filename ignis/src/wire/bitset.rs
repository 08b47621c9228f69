//! Growable bit vector for null-indicator maps.
//!
//! Protocol 13+ prefixes each row with a bitmap of `ceil(columns / 8)`
//! bytes, padded to a 4 byte boundary, one bit per column, set when the
//! column is null.
use super::pad4;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Bitset {
    bytes: Vec<u8>,
}

impl Bitset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self { bytes: bytes.to_vec() }
    }

    pub fn set(&mut self, index: usize, value: bool) {
        let byte = index / 8;
        if byte >= self.bytes.len() {
            if !value {
                return;
            }
            self.bytes.resize(byte + 1, 0);
        }
        let mask = 1 << (index % 8);
        if value {
            self.bytes[byte] |= mask;
        } else {
            self.bytes[byte] &= !mask;
        }
    }

    pub fn get(&self, index: usize) -> bool {
        self.bytes
            .get(index / 8)
            .is_some_and(|b| b & (1 << (index % 8)) != 0)
    }

    /// Minimal-length serialization.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = self.bytes.clone();
        while bytes.last() == Some(&0) {
            bytes.pop();
        }
        bytes
    }

    /// Exact row bitmap for `columns` columns: `ceil(columns / 8)` bytes.
    /// The wire adds [`pad4`] filler after it.
    pub fn row_bytes(&self, columns: usize) -> Vec<u8> {
        let len = columns.div_ceil(8);
        let mut bytes = self.bytes.clone();
        bytes.resize(len, 0);
        bytes
    }
}

/// Byte length of the row bitmap for `columns` columns.
pub fn row_bitmap_len(columns: usize) -> usize {
    columns.div_ceil(8)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::wire::pad4;

    #[test]
    fn set_get() {
        let mut b = Bitset::new();
        b.set(0, true);
        b.set(9, true);
        assert!(b.get(0));
        assert!(!b.get(1));
        assert!(b.get(9));
        assert!(!b.get(100));
        b.set(9, false);
        assert!(!b.get(9));
    }

    #[test]
    fn minimal_serialization() {
        let mut b = Bitset::new();
        b.set(17, true);
        b.set(17, false);
        assert_eq!(b.to_bytes(), Vec::<u8>::new());
        b.set(3, true);
        assert_eq!(b.to_bytes(), vec![0b1000]);
    }

    #[test]
    fn row_bitmap_boundaries() {
        for (count, len, pad) in [(1, 1, 3), (7, 1, 3), (8, 1, 3), (9, 2, 2), (32, 4, 0), (64, 8, 0)] {
            assert_eq!(row_bitmap_len(count), len);
            assert_eq!(pad4(row_bitmap_len(count)), pad);
            assert_eq!(Bitset::new().row_bytes(count).len(), len);
        }
    }
}
