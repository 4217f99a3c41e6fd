//! Compacted node record layout.
//!
//! ```text
//! u16 header
//!     bits 0..=9    tag id
//!     bits 10..=12  child count, or CHILDREN_HEADER_CANTFIT
//!     bit  13       FLAG_CHILDREN_IMMEDIATELY_BEFORE
//!     bits 14..=15  width of the attribute-set id, 0 when the node has no attributes
//! [packed]   exact child count, only when the header says CANTFIT
//! [1-3 B]    attribute-set id
//! [packed]*  distance to the last child of each child block; the last one is
//!            omitted when FLAG_CHILDREN_IMMEDIATELY_BEFORE is set
//! ...        attribute payloads in attribute-set order
//! ```
//!
//! Distances count nodes backwards from the record's own global id. Children
//! of one block are compacted consecutively, so the last child's id and the
//! block length locate every child of the block.

use xmlcpb_common::packed::{self, MAX_PACKED};
use xmlcpb_common::BinaryReader;

use crate::attr_set::AttrSetTableReader;
use crate::format::{
    split_attr_header, CHILDREN_HEADER_CANTFIT, CHILDREN_HEADER_MAXNUM, CHILDREN_PER_BLOCK,
    FLAG_CHILDREN_IMMEDIATELY_BEFORE, NODE_ATTR_SET_BYTES_SHIFT, NODE_CHILDREN_MASK,
    NODE_CHILDREN_SHIFT, NODE_TAG_MASK,
};
use crate::value::payload_len;
use crate::{Error, Result};

/// Number of child blocks needed for `num_children` children.
#[inline]
pub fn num_child_blocks(num_children: u32) -> usize {
    (num_children as usize).div_ceil(CHILDREN_PER_BLOCK)
}

/// Number of children in block `block` of a node with `num_children` children.
#[inline]
pub fn child_block_len(num_children: u32, block: usize) -> usize {
    (num_children as usize - block * CHILDREN_PER_BLOCK).min(CHILDREN_PER_BLOCK)
}

/// Everything that goes into a record before the attribute payloads.
#[derive(Debug)]
pub(crate) struct RecordHeader<'a> {
    pub tag_id: u16,
    pub global_id: u32,
    pub num_children: u32,
    /// Global id of the last child of each block.
    pub child_blocks: &'a [u32],
    pub attr_set: Option<u32>,
}

impl RecordHeader<'_> {
    /// Append the header part of the record.
    ///
    /// Returns `false` if a value had to be clamped to fit the format; the
    /// record is still well-formed but its links are wrong.
    pub fn write_to(&self, out: &mut Vec<u8>) -> bool {
        let mut exact = true;

        let children_field = if self.num_children <= u32::from(CHILDREN_HEADER_MAXNUM) {
            self.num_children as u16
        } else {
            CHILDREN_HEADER_CANTFIT
        };
        let last_immediately_before = self
            .child_blocks
            .last()
            .is_some_and(|&last| self.global_id.wrapping_sub(last) == 1);
        let attr_set_width = match self.attr_set {
            Some(id) => packed::uint_len(id).unwrap_or_else(|| {
                exact = false;
                3
            }),
            None => 0,
        };

        let mut header = (self.tag_id & NODE_TAG_MASK)
            | (children_field << NODE_CHILDREN_SHIFT)
            | ((attr_set_width as u16) << NODE_ATTR_SET_BYTES_SHIFT);
        if last_immediately_before {
            header |= FLAG_CHILDREN_IMMEDIATELY_BEFORE;
        }
        out.extend_from_slice(&header.to_le_bytes());

        if children_field == CHILDREN_HEADER_CANTFIT {
            exact &= write_packed_clamped(out, self.num_children);
        }
        if let Some(id) = self.attr_set {
            packed::write_uint(out, id.min(0xFF_FFFF), attr_set_width);
        }

        let stored = if last_immediately_before {
            &self.child_blocks[..self.child_blocks.len() - 1]
        } else {
            self.child_blocks
        };
        for &last in stored {
            exact &= write_packed_clamped(out, self.global_id.saturating_sub(last));
        }
        exact
    }
}

fn write_packed_clamped(out: &mut Vec<u8>, value: u32) -> bool {
    let fits = value <= MAX_PACKED;
    // Cannot fail once clamped
    let _ = packed::write_packed(out, value.min(MAX_PACKED));
    fits
}

/// Decoded shape of one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RecordLayout {
    pub tag_id: u16,
    pub num_children: u32,
    pub attr_set: Option<u32>,
    /// Offset of the first attribute payload within the node buffer.
    pub attrs_start: usize,
    /// Offset one past the record.
    pub end: usize,
}

/// Decode the record of node `global_id` starting at `offset`.
///
/// The global ids of the last child of each block are pushed into
/// `child_blocks` (cleared first).
pub(crate) fn decode_record(
    nodes: &[u8],
    offset: usize,
    global_id: u32,
    attr_sets: &AttrSetTableReader,
    child_blocks: &mut Vec<u32>,
) -> Result<RecordLayout> {
    let corrupt = |what: &str| Error::CorruptNodes(format!("node {global_id}: {what}"));

    let mut reader = BinaryReader::new_at(nodes, offset);
    let header = reader.read_u16()?;

    let tag_id = header & NODE_TAG_MASK;
    let children_field = (header >> NODE_CHILDREN_SHIFT) & NODE_CHILDREN_MASK;
    let immediately_before = header & FLAG_CHILDREN_IMMEDIATELY_BEFORE != 0;
    let attr_set_width = (header >> NODE_ATTR_SET_BYTES_SHIFT) as usize;

    let num_children = if children_field == CHILDREN_HEADER_CANTFIT {
        reader.read_packed()?
    } else {
        u32::from(children_field)
    };
    let attr_set = match attr_set_width {
        0 => None,
        width => Some(reader.read_uint(width)?),
    };

    let num_blocks = num_child_blocks(num_children);
    if immediately_before && num_blocks == 0 {
        return Err(corrupt("child flag set without children"));
    }
    child_blocks.clear();
    for block in 0..num_blocks {
        let distance = if immediately_before && block + 1 == num_blocks {
            1
        } else {
            reader.read_packed()?
        };
        let len = child_block_len(num_children, block) as u32;
        if distance == 0 || distance > global_id || global_id - distance + 1 < len {
            return Err(corrupt("child block distance out of range"));
        }
        child_blocks.push(global_id - distance);
    }

    let attrs_start = reader.position();
    if let Some(set) = attr_set {
        let headers = attr_sets
            .headers(set)
            .ok_or_else(|| corrupt("unknown attribute set"))?;
        for &attr_header in headers {
            let ty = split_attr_header(attr_header)
                .0
                .ok_or_else(|| corrupt("invalid attribute type"))?;
            let len = payload_len(ty, reader.remaining_bytes())
                .ok_or_else(|| corrupt("truncated attribute payload"))?;
            reader.skip(len)?;
        }
    }

    Ok(RecordLayout {
        tag_id,
        num_children,
        attr_set,
        attrs_start,
        end: reader.position(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_sets() -> AttrSetTableReader {
        AttrSetTableReader::default()
    }

    #[test]
    fn test_block_math() {
        assert_eq!(num_child_blocks(0), 0);
        assert_eq!(num_child_blocks(64), 1);
        assert_eq!(num_child_blocks(70), 2);
        assert_eq!(child_block_len(70, 0), 64);
        assert_eq!(child_block_len(70, 1), 6);
    }

    #[test]
    fn test_leaf_record_is_two_bytes() {
        let mut out = Vec::new();
        let record = RecordHeader {
            tag_id: 3,
            global_id: 0,
            num_children: 0,
            child_blocks: &[],
            attr_set: None,
        };
        assert!(record.write_to(&mut out));
        assert_eq!(out, 3u16.to_le_bytes());

        let mut blocks = Vec::new();
        let layout = decode_record(&out, 0, 0, &no_sets(), &mut blocks).unwrap();
        assert_eq!(layout.tag_id, 3);
        assert_eq!(layout.num_children, 0);
        assert_eq!(layout.end, 2);
        assert!(blocks.is_empty());
    }

    #[test]
    fn test_children_immediately_before() {
        // Two children (ids 0, 1) directly before the parent (id 2)
        let mut out = Vec::new();
        let record = RecordHeader {
            tag_id: 1,
            global_id: 2,
            num_children: 2,
            child_blocks: &[1],
            attr_set: None,
        };
        record.write_to(&mut out);
        assert_eq!(out.len(), 2);

        let mut blocks = Vec::new();
        let layout = decode_record(&out, 0, 2, &no_sets(), &mut blocks).unwrap();
        assert_eq!(layout.num_children, 2);
        assert_eq!(blocks, [1]);
    }

    #[test]
    fn test_many_children_and_distant_blocks() {
        let mut out = Vec::new();
        let record = RecordHeader {
            tag_id: 0,
            global_id: 500,
            num_children: 70,
            child_blocks: &[100, 480],
            attr_set: None,
        };
        assert!(record.write_to(&mut out));

        let mut blocks = Vec::new();
        let layout = decode_record(&out, 0, 500, &no_sets(), &mut blocks).unwrap();
        assert_eq!(layout.num_children, 70);
        assert_eq!(blocks, [100, 480]);
        assert_eq!(layout.end, out.len());
    }

    #[test]
    fn test_rejects_distance_past_start() {
        let mut out = Vec::new();
        RecordHeader {
            tag_id: 0,
            global_id: 1,
            num_children: 3,
            child_blocks: &[0],
            attr_set: None,
        }
        .write_to(&mut out);

        // Three children cannot end at id 0
        let mut blocks = Vec::new();
        assert!(matches!(
            decode_record(&out, 0, 1, &no_sets(), &mut blocks),
            Err(Error::CorruptNodes(_))
        ));
    }
}
