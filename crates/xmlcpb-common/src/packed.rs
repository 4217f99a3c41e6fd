//! Variable-width integers used inside node records.
//!
//! Node records store child counts and child-block distances as *packed*
//! integers of one to three bytes. The top bits of the first byte select
//! the width:
//!
//! | first byte  | width | range              |
//! |-------------|-------|--------------------|
//! | `0xxx_xxxx` | 1     | `0..0x80`          |
//! | `10xx_xxxx` | 2     | `0..0x4000`        |
//! | `11xx_xxxx` | 3     | `0..=0x3F_FFFF`    |
//!
//! Multi-byte forms are big-endian after the tag bits so the reader can
//! decide the width from the first byte alone. Attribute-set ids use a
//! different scheme: plain little-endian integers whose width (1-3 bytes)
//! is recorded in the node header, see [`write_uint`].

use crate::{Error, Result};

/// Largest value a packed integer can hold.
pub const MAX_PACKED: u32 = 0x3F_FFFF;

/// Number of bytes [`write_packed`] emits for `value`.
#[inline]
pub fn packed_len(value: u32) -> Option<usize> {
    match value {
        0..=0x7F => Some(1),
        0x80..=0x3FFF => Some(2),
        0x4000..=MAX_PACKED => Some(3),
        _ => None,
    }
}

/// Append `value` as a packed integer.
pub fn write_packed(out: &mut Vec<u8>, value: u32) -> Result<()> {
    match packed_len(value) {
        Some(1) => out.push(value as u8),
        Some(2) => out.extend_from_slice(&[0x80 | (value >> 8) as u8, value as u8]),
        Some(_) => out.extend_from_slice(&[
            0xC0 | (value >> 16) as u8,
            (value >> 8) as u8,
            value as u8,
        ]),
        None => return Err(Error::PackedOverflow(value)),
    }
    Ok(())
}

/// Minimum number of bytes (1-3) needed to store `value` with [`write_uint`].
#[inline]
pub fn uint_len(value: u32) -> Option<usize> {
    match value {
        0..=0xFF => Some(1),
        0x100..=0xFFFF => Some(2),
        0x1_0000..=0xFF_FFFF => Some(3),
        _ => None,
    }
}

/// Append the low `width` bytes of `value`, little-endian.
#[inline]
pub fn write_uint(out: &mut Vec<u8>, value: u32, width: usize) {
    out.extend_from_slice(&value.to_le_bytes()[..width.min(4)]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BinaryReader;

    #[test]
    fn test_packed_widths() {
        assert_eq!(packed_len(0), Some(1));
        assert_eq!(packed_len(0x7F), Some(1));
        assert_eq!(packed_len(0x80), Some(2));
        assert_eq!(packed_len(0x3FFF), Some(2));
        assert_eq!(packed_len(0x4000), Some(3));
        assert_eq!(packed_len(MAX_PACKED), Some(3));
        assert_eq!(packed_len(MAX_PACKED + 1), None);
    }

    #[test]
    fn test_packed_boundaries_read_back() {
        let values = [0, 1, 0x7F, 0x80, 0x1234, 0x3FFF, 0x4000, 0x12_3456, MAX_PACKED];
        let mut out = Vec::new();
        for &v in &values {
            write_packed(&mut out, v).unwrap();
        }

        let mut reader = BinaryReader::new(&out);
        for &v in &values {
            assert_eq!(reader.read_packed().unwrap(), v);
        }
        assert!(reader.is_empty());
    }

    #[test]
    fn test_packed_overflow() {
        let mut out = Vec::new();
        assert!(matches!(
            write_packed(&mut out, MAX_PACKED + 1),
            Err(Error::PackedOverflow(_))
        ));
        assert!(out.is_empty());
    }

    #[test]
    fn test_uint_width() {
        assert_eq!(uint_len(0), Some(1));
        assert_eq!(uint_len(256), Some(2));
        assert_eq!(uint_len(0x1_0000), Some(3));
        assert_eq!(uint_len(0x100_0000), None);

        let mut out = Vec::new();
        write_uint(&mut out, 0x01_0203, 3);
        assert_eq!(out, [0x03, 0x02, 0x01]);
    }
}
