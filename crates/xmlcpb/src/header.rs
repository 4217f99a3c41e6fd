//! XMLCPB file header structure.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Size and entry count of one serialized string table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C, packed)]
pub struct StringTableDesc {
    /// Number of strings in the table.
    pub num_strings: u32,
    /// Size in bytes of the offsets plus the string bytes.
    pub size_bytes: u32,
}

/// XMLCPB file/blob header.
///
/// Always stored uncompressed at offset 0. In file mode it is written twice:
/// once zeroed as a placeholder, then again with the final sizes and the MD5
/// signature once the payload is complete.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C, packed)]
pub struct FileHeader {
    /// `b"PBX0"`.
    pub magic: [u8; 4],
    /// MD5 of every byte following the header; zero unless `has_md5` is set.
    pub md5: [u8; 16],
    /// Tag-name table.
    pub tags: StringTableDesc,
    /// Attribute-name table.
    pub attr_names: StringTableDesc,
    /// String-data table.
    pub strings_data: StringTableDesc,
    /// Number of attribute sets.
    pub num_attr_sets: u32,
    /// Size in bytes of the attribute-set section.
    pub size_attr_sets: u32,
    /// Size in bytes of the node buffer.
    pub size_nodes: u32,
    /// Number of compacted nodes.
    pub num_nodes: u32,
    /// Non-zero when a capacity limit was hit while writing.
    pub has_internal_error: u8,
    /// Non-zero when `md5` is valid.
    pub has_md5: u8,
    pub reserved: u16,
}

impl FileHeader {
    /// The magic bytes at the start of every XMLCPB blob.
    pub const MAGIC: &'static [u8; 4] = b"PBX0";

    /// Serialized size of the header.
    pub const SIZE: usize = std::mem::size_of::<FileHeader>();

    /// An empty header carrying only the magic.
    pub fn new() -> Self {
        Self {
            magic: *Self::MAGIC,
            md5: [0; 16],
            tags: StringTableDesc::default(),
            attr_names: StringTableDesc::default(),
            strings_data: StringTableDesc::default(),
            num_attr_sets: 0,
            size_attr_sets: 0,
            size_nodes: 0,
            num_nodes: 0,
            has_internal_error: 0,
            has_md5: 0,
            reserved: 0,
        }
    }

    /// Total payload size declared by the header.
    pub fn payload_size(&self) -> u64 {
        let tags = self.tags;
        let names = self.attr_names;
        let strings = self.strings_data;
        u64::from(self.size_nodes)
            + u64::from(tags.size_bytes)
            + u64::from(names.size_bytes)
            + u64::from(strings.size_bytes)
            + u64::from(self.size_attr_sets)
    }
}

impl Default for FileHeader {
    fn default() -> Self {
        Self::new()
    }
}
