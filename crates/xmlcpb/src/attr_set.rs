//! Attribute-set table.
//!
//! Sibling nodes usually share the same attribute layout, so the ordered list
//! of attribute header words of a node is interned here and nodes only store
//! the set id.
//!
//! # Serialized layout
//!
//! ```text
//! u8  num_attrs[num_sets]
//! u16 offset[num_sets]        index of the set's first word
//! u16 words[..]               attribute header words
//! ```

use hashbrown::HashTable;
use xmlcpb_common::{hash, BinaryReader};

use crate::format::{MAX_ATTRS_PER_NODE, MAX_ATTR_SETS, MAX_ATTR_SET_WORDS};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy)]
struct SetEntry {
    start: u16,
    len: u8,
    hash: u32,
}

/// Writer-side attribute-set table.
#[derive(Debug, Default)]
pub struct AttrSetTableWriter {
    words: Vec<u16>,
    sets: Vec<SetEntry>,
    index: HashTable<u32>,
}

impl AttrSetTableWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct sets.
    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    fn words_of(&self, set: &SetEntry) -> &[u16] {
        let start = set.start as usize;
        &self.words[start..start + set.len as usize]
    }

    /// Look up a set without inserting it.
    pub fn find(&self, headers: &[u16]) -> Option<u32> {
        let hash = hash::hash_words(headers);
        self.index
            .find(u64::from(hash), |&id| {
                let set = &self.sets[id as usize];
                set.hash == hash && self.words_of(set) == headers
            })
            .copied()
    }

    /// Return the id of the set `headers`, adding it if needed.
    ///
    /// Returns `None` for an empty or oversized set, or when the table is full.
    pub fn get_set_id(&mut self, headers: &[u16]) -> Option<u32> {
        if headers.is_empty() || headers.len() > MAX_ATTRS_PER_NODE {
            return None;
        }
        if let Some(id) = self.find(headers) {
            return Some(id);
        }
        if self.sets.len() >= MAX_ATTR_SETS
            || self.words.len() + headers.len() > MAX_ATTR_SET_WORDS
        {
            return None;
        }

        let hash = hash::hash_words(headers);
        let id = self.sets.len() as u32;
        self.sets.push(SetEntry {
            start: self.words.len() as u16,
            len: headers.len() as u8,
            hash,
        });
        self.words.extend_from_slice(headers);

        let sets = &self.sets;
        self.index
            .insert_unique(u64::from(hash), id, |&id| u64::from(sets[id as usize].hash));
        Some(id)
    }

    /// Serialized size in bytes.
    pub fn size_bytes(&self) -> usize {
        self.sets.len() * 3 + self.words.len() * 2
    }

    /// Append the serialized table to `out`.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.reserve(self.size_bytes());
        out.extend(self.sets.iter().map(|set| set.len));
        for set in &self.sets {
            out.extend_from_slice(&set.start.to_le_bytes());
        }
        for word in &self.words {
            out.extend_from_slice(&word.to_le_bytes());
        }
    }
}

/// Reader-side attribute-set table.
#[derive(Debug, Default)]
pub struct AttrSetTableReader {
    num_attrs: Vec<u8>,
    offsets: Vec<u16>,
    words: Vec<u16>,
}

impl AttrSetTableReader {
    /// Parse a serialized table. `data` must hold exactly the table.
    pub fn parse(data: &[u8], num_sets: u32) -> Result<Self> {
        let num_sets = num_sets as usize;
        let mut reader = BinaryReader::new(data);

        let num_attrs = reader.read_bytes(num_sets)?.to_vec();
        let mut offsets = Vec::with_capacity(num_sets);
        for _ in 0..num_sets {
            offsets.push(reader.read_u16()?);
        }
        if reader.remaining() % 2 != 0 {
            return Err(Error::Truncated("odd attribute-set word area".into()));
        }
        let mut words = Vec::with_capacity(reader.remaining() / 2);
        while !reader.is_empty() {
            words.push(reader.read_u16()?);
        }

        for (set, (&count, &offset)) in num_attrs.iter().zip(&offsets).enumerate() {
            if offset as usize + count as usize > words.len() {
                return Err(Error::Truncated(format!(
                    "attribute set {set} exceeds the word area"
                )));
            }
        }

        Ok(Self {
            num_attrs,
            offsets,
            words,
        })
    }

    /// Number of sets.
    pub fn len(&self) -> usize {
        self.num_attrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.num_attrs.is_empty()
    }

    /// Number of attributes in a set.
    pub fn num_attrs(&self, set_id: u32) -> Option<usize> {
        self.num_attrs.get(set_id as usize).map(|&n| n as usize)
    }

    /// All header words of a set.
    pub fn headers(&self, set_id: u32) -> Option<&[u16]> {
        let count = self.num_attrs(set_id)?;
        let start = self.offsets[set_id as usize] as usize;
        Some(&self.words[start..start + count])
    }

    /// One header word of a set.
    pub fn header_attr(&self, set_id: u32, index: usize) -> Option<u16> {
        self.headers(set_id)?.get(index).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_sets_share_an_id() {
        let mut table = AttrSetTableWriter::new();
        let a = table.get_set_id(&[0x0401, 0x0802]).unwrap();
        let b = table.get_set_id(&[0x0401]).unwrap();
        let size = table.size_bytes();

        assert_eq!(table.get_set_id(&[0x0401, 0x0802]), Some(a));
        assert_ne!(a, b);
        assert_eq!(table.len(), 2);
        assert_eq!(table.size_bytes(), size);
    }

    #[test]
    fn test_order_matters() {
        let mut table = AttrSetTableWriter::new();
        let a = table.get_set_id(&[1, 2]).unwrap();
        let b = table.get_set_id(&[2, 1]).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_rejects_empty_and_oversized() {
        let mut table = AttrSetTableWriter::new();
        assert_eq!(table.get_set_id(&[]), None);
        let big = vec![7u16; MAX_ATTRS_PER_NODE + 1];
        assert_eq!(table.get_set_id(&big), None);
    }

    #[test]
    fn test_word_capacity() {
        let mut table = AttrSetTableWriter::new();
        let mut filled = 0usize;
        let mut next = 0u16;
        while filled + 255 <= MAX_ATTR_SET_WORDS {
            let set: Vec<u16> = (0..255).map(|i| next.wrapping_add(i)).collect();
            next = next.wrapping_add(1);
            assert!(table.get_set_id(&set).is_some());
            filled += 255;
        }
        let set: Vec<u16> = (0..255).map(|i| 0x8000 | i).collect();
        assert_eq!(table.get_set_id(&set), None);
    }

    #[test]
    fn test_write_then_parse() {
        let mut table = AttrSetTableWriter::new();
        table.get_set_id(&[0x0401, 0x0802, 0x0C03]);
        table.get_set_id(&[0x1404]);

        let mut out = Vec::new();
        table.write_to(&mut out);
        assert_eq!(out.len(), table.size_bytes());

        let parsed = AttrSetTableReader::parse(&out, 2).unwrap();
        assert_eq!(parsed.num_attrs(0), Some(3));
        assert_eq!(parsed.header_attr(0, 2), Some(0x0C03));
        assert_eq!(parsed.headers(1), Some(&[0x1404][..]));
        assert_eq!(parsed.num_attrs(2), None);
    }
}
