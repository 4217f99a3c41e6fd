//! Wire-format constants shared by the writer and the reader.
//!
//! These values are the persisted format, not tuning knobs: changing any of
//! them makes existing saves unreadable.

/// Children are compacted in blocks of this many siblings.
pub const CHILDREN_PER_BLOCK: usize = 64;

/// Capacity of the tag table.
pub const MAX_TAGS: usize = 1024;
/// Capacity of the attribute-name table.
pub const MAX_ATTR_NAMES: usize = 1024;
/// Capacity of the string-data table (ids are stored as `u16`).
pub const MAX_STRINGS: usize = 65536;
/// Attribute counts are stored in one byte per attribute set.
pub const MAX_ATTRS_PER_NODE: usize = 255;
/// Attribute-set offsets are stored as `u16` word indices.
pub const MAX_ATTR_SET_WORDS: usize = 0xFFFF;
/// Attribute-set ids are stored in at most three bytes.
pub const MAX_ATTR_SETS: usize = 0xFF_FFFF;
/// Longer strings are stored as raw blobs instead of being interned.
pub const MAX_INTERNED_STRING_LEN: usize = 1024;

// Node header layout
pub(crate) const NODE_TAG_MASK: u16 = 0x03FF;
pub(crate) const NODE_CHILDREN_SHIFT: u16 = 10;
pub(crate) const NODE_CHILDREN_MASK: u16 = 0x7;
/// Header child-count value meaning "exact count follows as a packed integer".
pub(crate) const CHILDREN_HEADER_CANTFIT: u16 = 7;
/// Largest child count stored directly in the node header.
pub(crate) const CHILDREN_HEADER_MAXNUM: u16 = CHILDREN_HEADER_CANTFIT - 1;
/// The last child block ends right before this node; its distance is omitted.
pub(crate) const FLAG_CHILDREN_IMMEDIATELY_BEFORE: u16 = 1 << 13;
pub(crate) const NODE_ATTR_SET_BYTES_SHIFT: u16 = 14;

// Attribute header layout
pub(crate) const ATTR_NAME_MASK: u16 = 0x03FF;
pub(crate) const ATTR_TYPE_SHIFT: u16 = 10;

/// Default size of the segments of the node buffer.
pub const DEFAULT_SEGMENT_SIZE: usize = 64 * 1024;
/// Payload is compressed in independent blocks of at most this size.
pub const ZLIB_BLOCK_SIZE: usize = 64 * 1024;
/// Block header marker for a block stored without compression.
pub const NO_ZLIB_USED: u32 = u32::MAX;

/// Strings encoded in the attribute type alone.
///
/// A string attribute equal to one of these is stored with no payload; the
/// index in this table is part of the type code.
pub const STRING_CONSTANTS: [&str; 32] = [
    "", "0", "1", "-1", "true", "false", "yes", "no",
    "none", "None", "null", "default", "Default", "idle", "Idle", "on",
    "off", "active", "inactive", "enabled", "disabled", "normal", "Normal", "player",
    "Player", "name", "type", "id", "value", "weapon", "vehicle", "AI",
];

/// Integers encoded in the attribute type alone, by constant index.
pub(crate) const INT_CONSTANTS: [i32; 12] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 255];

const INT_CONST_BASE: u8 = 20;
const STR_CONST_BASE: u8 = 32;

/// The encoding of one attribute value.
///
/// Stored in the top six bits of the attribute header word. The plain
/// variants carry their value in the node's payload bytes; the constant
/// variants carry it in the type itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttrType {
    /// `u16` id into the string-data table.
    Str,
    /// Full `i32`.
    Int32,
    /// Full `f32`.
    F1,
    /// Three full `f32`s.
    F3,
    /// Four full `f32`s.
    Quat,
    /// Full `i64`.
    Int64,
    /// `u32` length followed by the bytes.
    Raw,
    /// `u16` magnitude of a positive integer.
    Pos16,
    /// `u16` magnitude of a negative integer.
    Neg16,
    /// `u8` magnitude of a positive integer.
    Pos8,
    /// `u8` magnitude of a negative integer.
    Neg8,
    /// `i8` number of tenths.
    F1OneDecimal,
    /// `0.0`.
    F1Zero,
    /// `(0, 0, 0)`.
    F3Zero,
    /// `(1, 0, 0)`.
    F3UnitX,
    /// `(0, 1, 0)`.
    F3UnitY,
    /// `(0, 0, 1)`.
    F3UnitZ,
    /// Mask byte plus the non-constant components of a 3-float vector.
    F3SemiConstant,
    /// Mask byte plus the non-constant components of a quaternion.
    QuatSemiConstant,
    /// Full `f64`.
    F64,
    /// Index into the integer constants (`0..=10`, `255`).
    IntConstant(u8),
    /// Index into [`STRING_CONSTANTS`].
    StrConstant(u8),
}

impl AttrType {
    /// The 6-bit type code stored in attribute headers.
    pub fn code(self) -> u8 {
        match self {
            AttrType::Str => 0,
            AttrType::Int32 => 1,
            AttrType::F1 => 2,
            AttrType::F3 => 3,
            AttrType::Quat => 4,
            AttrType::Int64 => 5,
            AttrType::Raw => 6,
            AttrType::Pos16 => 7,
            AttrType::Neg16 => 8,
            AttrType::Pos8 => 9,
            AttrType::Neg8 => 10,
            AttrType::F1OneDecimal => 11,
            AttrType::F1Zero => 12,
            AttrType::F3Zero => 13,
            AttrType::F3UnitX => 14,
            AttrType::F3UnitY => 15,
            AttrType::F3UnitZ => 16,
            AttrType::F3SemiConstant => 17,
            AttrType::QuatSemiConstant => 18,
            AttrType::F64 => 19,
            AttrType::IntConstant(index) => INT_CONST_BASE + index,
            AttrType::StrConstant(index) => STR_CONST_BASE + index,
        }
    }

    /// Decode a type code. Every 6-bit value is a valid type.
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => AttrType::Str,
            1 => AttrType::Int32,
            2 => AttrType::F1,
            3 => AttrType::F3,
            4 => AttrType::Quat,
            5 => AttrType::Int64,
            6 => AttrType::Raw,
            7 => AttrType::Pos16,
            8 => AttrType::Neg16,
            9 => AttrType::Pos8,
            10 => AttrType::Neg8,
            11 => AttrType::F1OneDecimal,
            12 => AttrType::F1Zero,
            13 => AttrType::F3Zero,
            14 => AttrType::F3UnitX,
            15 => AttrType::F3UnitY,
            16 => AttrType::F3UnitZ,
            17 => AttrType::F3SemiConstant,
            18 => AttrType::QuatSemiConstant,
            19 => AttrType::F64,
            20..=31 => AttrType::IntConstant(code - INT_CONST_BASE),
            32..=63 => AttrType::StrConstant(code - STR_CONST_BASE),
            _ => return None,
        })
    }

    /// Payload size for types whose size does not depend on the payload.
    pub(crate) fn fixed_payload_len(self) -> Option<usize> {
        match self {
            AttrType::Str | AttrType::Pos16 | AttrType::Neg16 => Some(2),
            AttrType::Int32 | AttrType::F1 => Some(4),
            AttrType::F3 => Some(12),
            AttrType::Quat => Some(16),
            AttrType::Int64 | AttrType::F64 => Some(8),
            AttrType::Pos8 | AttrType::Neg8 | AttrType::F1OneDecimal => Some(1),
            AttrType::F1Zero
            | AttrType::F3Zero
            | AttrType::F3UnitX
            | AttrType::F3UnitY
            | AttrType::F3UnitZ
            | AttrType::IntConstant(_)
            | AttrType::StrConstant(_) => Some(0),
            AttrType::Raw | AttrType::F3SemiConstant | AttrType::QuatSemiConstant => None,
        }
    }
}

/// Pack an attribute type and name id into a header word.
#[inline]
pub(crate) fn attr_header(ty: AttrType, name_id: u16) -> u16 {
    (u16::from(ty.code()) << ATTR_TYPE_SHIFT) | (name_id & ATTR_NAME_MASK)
}

/// Split an attribute header word into its type and name id.
#[inline]
pub(crate) fn split_attr_header(header: u16) -> (Option<AttrType>, u16) {
    (
        AttrType::from_code((header >> ATTR_TYPE_SHIFT) as u8),
        header & ATTR_NAME_MASK,
    )
}
