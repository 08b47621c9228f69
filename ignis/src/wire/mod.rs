//! The two wire sub-formats.
//!
//! - [`xdr`]: big-endian, 4-byte-aligned record format used for message
//!   bodies.
//! - [`blr`]: compact tagged byte-code format used for parameter blocks and
//!   metadata description blocks.
//! - [`bitset`]: null-indicator bitmap prefixing rows on protocol 13+.
pub mod xdr;
pub mod blr;
pub mod bitset;

pub use bitset::Bitset;
pub use blr::{BlrReader, BlrWriter};
pub use xdr::{XdrReader, XdrWriter};

/// Bytes of filler required to reach the next 4 byte boundary.
pub const fn pad4(n: usize) -> usize {
    n.wrapping_neg() & 3
}

/// `n` rounded up to the next 4 byte boundary.
pub const fn align4(n: usize) -> usize {
    n + pad4(n)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn padding_for_any_length() {
        assert_eq!(pad4(0), 0);
        assert_eq!(pad4(1), 3);
        assert_eq!(pad4(4), 0);
        assert_eq!(pad4(5), 3);
        assert_eq!(pad4(70000), 0);
        assert_eq!(pad4(70001), 3);
        assert_eq!(align4(5), 8);
        assert_eq!(align4(8), 8);
    }
}
