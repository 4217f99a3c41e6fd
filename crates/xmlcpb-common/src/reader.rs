//! Binary reader for zero-copy parsing of byte slices.
//!
//! [`BinaryReader`] is a cursor over a borrowed slice. Every read is bounds
//! checked and reports [`Error::UnexpectedEof`] instead of panicking, which is
//! what the XMLCPB loader relies on to reject truncated saves.

use zerocopy::FromBytes;

use crate::{Error, Result};

/// A binary reader that provides zero-copy reading from a byte slice.
///
/// # Example
///
/// ```
/// use xmlcpb_common::BinaryReader;
///
/// let data = [0x01, 0x02, 0x03, 0x04, 0x81, 0x00];
/// let mut reader = BinaryReader::new(&data);
///
/// assert_eq!(reader.read_u32().unwrap(), 0x04030201);
/// assert_eq!(reader.read_packed().unwrap(), 0x100);
/// assert!(reader.is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct BinaryReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> BinaryReader<'a> {
    /// Create a new reader from a byte slice.
    #[inline]
    pub const fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    /// Create a new reader starting at a specific position.
    #[inline]
    pub const fn new_at(data: &'a [u8], position: usize) -> Self {
        Self { data, position }
    }

    /// Get the current position in the buffer.
    #[inline]
    pub const fn position(&self) -> usize {
        self.position
    }

    /// Get the number of bytes remaining to read.
    #[inline]
    pub const fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.position)
    }

    /// Check if there are no more bytes to read.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.position >= self.data.len()
    }

    /// Skip `count` bytes, failing if fewer remain.
    #[inline]
    pub fn skip(&mut self, count: usize) -> Result<()> {
        self.read_bytes(count).map(|_| ())
    }

    /// Get the remaining bytes as a slice.
    #[inline]
    pub fn remaining_bytes(&self) -> &'a [u8] {
        &self.data[self.position.min(self.data.len())..]
    }

    /// Read bytes and advance the position.
    #[inline]
    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8]> {
        if self.remaining() < count {
            return Err(Error::UnexpectedEof {
                needed: count,
                available: self.remaining(),
            });
        }
        let bytes = &self.data[self.position..self.position + count];
        self.position += count;
        Ok(bytes)
    }

    #[inline]
    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    /// Read a single byte.
    #[inline]
    pub fn read_u8(&mut self) -> Result<u8> {
        self.read_bytes(1).map(|b| b[0])
    }

    /// Read a signed byte.
    #[inline]
    pub fn read_i8(&mut self) -> Result<i8> {
        self.read_u8().map(|b| b as i8)
    }

    /// Read a little-endian u16.
    #[inline]
    pub fn read_u16(&mut self) -> Result<u16> {
        self.read_array().map(u16::from_le_bytes)
    }

    /// Read a little-endian u32.
    #[inline]
    pub fn read_u32(&mut self) -> Result<u32> {
        self.read_array().map(u32::from_le_bytes)
    }

    /// Read a little-endian i32.
    #[inline]
    pub fn read_i32(&mut self) -> Result<i32> {
        self.read_array().map(i32::from_le_bytes)
    }

    /// Read a little-endian i64.
    #[inline]
    pub fn read_i64(&mut self) -> Result<i64> {
        self.read_array().map(i64::from_le_bytes)
    }

    /// Read a little-endian f32.
    #[inline]
    pub fn read_f32(&mut self) -> Result<f32> {
        self.read_array().map(f32::from_le_bytes)
    }

    /// Read a little-endian f64.
    #[inline]
    pub fn read_f64(&mut self) -> Result<f64> {
        self.read_array().map(f64::from_le_bytes)
    }

    /// Read a little-endian unsigned integer of `width` bytes (1-4).
    #[inline]
    pub fn read_uint(&mut self, width: usize) -> Result<u32> {
        let bytes = self.read_bytes(width.min(4))?;
        Ok(bytes
            .iter()
            .rev()
            .fold(0u32, |acc, &b| (acc << 8) | u32::from(b)))
    }

    /// Read a 1-3 byte packed integer (see [`crate::packed`]).
    pub fn read_packed(&mut self) -> Result<u32> {
        let first = self.read_u8()?;
        match first >> 6 {
            0 | 1 => Ok(u32::from(first)),
            2 => {
                let low = self.read_u8()?;
                Ok((u32::from(first & 0x3F) << 8) | u32::from(low))
            }
            _ => {
                let rest = self.read_bytes(2)?;
                Ok((u32::from(first & 0x3F) << 16) | (u32::from(rest[0]) << 8) | u32::from(rest[1]))
            }
        }
    }

    /// Read a struct using zerocopy.
    ///
    /// The struct must implement `FromBytes` from the zerocopy crate.
    #[inline]
    pub fn read_struct<T: FromBytes>(&mut self) -> Result<T> {
        let size = std::mem::size_of::<T>();
        let bytes = self.read_bytes(size)?;
        T::read_from_bytes(bytes).map_err(|_| Error::UnexpectedEof {
            needed: size,
            available: bytes.len(),
        })
    }
}
