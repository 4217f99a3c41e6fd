//! Deduplicating string tables for tags, attribute names and string values.
//!
//! # Serialized layout
//!
//! ```text
//! u32 offset[num_strings]     offset of each string within the string bytes
//! u8  strings[..]             NUL-terminated strings, in id order
//! ```

use hashbrown::HashTable;
use xmlcpb_common::{hash, BinaryReader};

use crate::buffer::{BufferAddr, SegmentedBuffer};
use crate::header::StringTableDesc;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy)]
struct Entry {
    addr: BufferAddr,
    /// Length without the terminator.
    len: u32,
    hash: u32,
}

/// Writer-side string table.
///
/// Ids are dense and assigned in insertion order. Lookups hash the candidate
/// and only compare bytes against entries with the same hash, so a miss never
/// copies the candidate into the table.
#[derive(Debug)]
pub struct StringTableWriter {
    max_strings: usize,
    buffer: SegmentedBuffer,
    entries: Vec<Entry>,
    index: HashTable<u32>,
}

impl StringTableWriter {
    /// Create an empty table holding at most `max_strings` strings.
    pub fn new(max_strings: usize, segment_size: usize) -> Self {
        Self {
            max_strings,
            buffer: SegmentedBuffer::new(segment_size),
            entries: Vec::new(),
            index: HashTable::new(),
        }
    }

    /// Number of strings in the table.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the table reached its capacity.
    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.max_strings
    }

    /// Look up a string without inserting it.
    pub fn find(&self, text: &str) -> Option<u32> {
        let bytes = text.as_bytes();
        let hash = hash::hash_bytes(bytes);
        self.index
            .find(u64::from(hash), |&id| {
                let entry = &self.entries[id as usize];
                entry.hash == hash
                    && entry.len as usize == bytes.len()
                    && self.buffer.matches(entry.addr, bytes)
            })
            .copied()
    }

    /// Return the id of `text`, adding it if it is not in the table yet.
    ///
    /// Returns `None` only when the string is new and the table is full.
    pub fn get_or_insert(&mut self, text: &str) -> Option<u32> {
        if let Some(id) = self.find(text) {
            return Some(id);
        }
        if self.is_full() {
            return None;
        }

        let bytes = text.as_bytes();
        let hash = hash::hash_bytes(bytes);
        let addr = self.buffer.append(bytes);
        self.buffer.append(&[0]);

        let id = self.entries.len() as u32;
        self.entries.push(Entry {
            addr,
            len: bytes.len() as u32,
            hash,
        });
        let entries = &self.entries;
        self.index
            .insert_unique(u64::from(hash), id, |&id| u64::from(entries[id as usize].hash));
        Some(id)
    }

    /// Copy of the string with id `id`.
    pub fn get(&self, id: u32) -> Option<String> {
        let entry = self.entries.get(id as usize)?;
        let bytes = self.buffer.read(entry.addr, entry.len as usize)?;
        String::from_utf8(bytes).ok()
    }

    /// Id of `text`, inserting it when `add_if_missing` is set.
    pub fn string_id(&mut self, text: &str, add_if_missing: bool) -> Option<u32> {
        if add_if_missing {
            self.get_or_insert(text)
        } else {
            self.find(text)
        }
    }

    /// Serialized size: offsets plus string bytes.
    pub fn size_bytes(&self) -> usize {
        self.entries.len() * 4 + self.buffer.len()
    }

    /// Header descriptor for this table.
    pub fn desc(&self) -> StringTableDesc {
        StringTableDesc {
            num_strings: self.entries.len() as u32,
            size_bytes: self.size_bytes() as u32,
        }
    }

    /// Append the serialized table to `out`.
    ///
    /// Segment-relative addresses are flattened here; the buffer starts at
    /// offset 0 so the flat address is the offset within the string bytes.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.reserve(self.size_bytes());
        for entry in &self.entries {
            out.extend_from_slice(&(self.buffer.flat(entry.addr) as u32).to_le_bytes());
        }
        self.buffer.copy_to(out);
    }
}

/// Reader-side string table, bulk-loaded once.
#[derive(Debug, Default)]
pub struct StringTableReader {
    offsets: Vec<u32>,
    bytes: Vec<u8>,
}

impl StringTableReader {
    /// A table with no strings.
    pub const fn empty() -> Self {
        Self {
            offsets: Vec::new(),
            bytes: Vec::new(),
        }
    }

    /// Parse a serialized table. `data` must hold exactly the table.
    pub fn parse(data: &[u8], desc: StringTableDesc) -> Result<Self> {
        let num_strings = desc.num_strings as usize;
        let mut reader = BinaryReader::new(data);

        let mut offsets = Vec::with_capacity(num_strings);
        for _ in 0..num_strings {
            offsets.push(reader.read_u32()?);
        }
        let bytes = reader.remaining_bytes().to_vec();

        if let Some(&bad) = offsets.iter().find(|&&offset| offset as usize >= bytes.len()) {
            return Err(Error::Truncated(format!(
                "string offset {bad} outside table of {} bytes",
                bytes.len()
            )));
        }

        Ok(Self { offsets, bytes })
    }

    /// Number of strings.
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Get a string by id. Borrows from the table, no allocation.
    pub fn get(&self, id: u32) -> Option<&str> {
        let start = *self.offsets.get(id as usize)? as usize;
        let tail = &self.bytes[start..];
        let end = memchr::memchr(0, tail).unwrap_or(tail.len());
        std::str::from_utf8(&tail[..end]).ok()
    }

    /// Id of `text`, by linear scan.
    pub fn find(&self, text: &str) -> Option<u32> {
        (0..self.offsets.len() as u32).find(|&id| self.get(id) == Some(text))
    }

    /// Iterate all strings in id order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        (0..self.offsets.len() as u32).filter_map(|id| self.get(id))
    }
}
