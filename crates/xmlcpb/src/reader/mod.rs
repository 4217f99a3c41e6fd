//! Lazy XMLCPB reader.
//!
//! Loading parses the header and the four tables, then walks every node
//! record once to build an address index (a record's size is only known
//! after decoding it). Nodes are decoded into live views on first access,
//! through a small pool of reference-counted slots.

mod node;

pub use node::{Children, NodeRef};

use std::borrow::Cow;
use std::cell::RefCell;
use std::fs::File;
use std::path::Path;

use hashbrown::HashMap;
use md5::{Digest, Md5};
use memmap2::Mmap;
use tracing::{debug, warn};
use xmlcpb_common::BinaryReader;

use crate::attr_set::AttrSetTableReader;
use crate::compress::decompress_blocks;
use crate::config::ReaderConfig;
use crate::format::{split_attr_header, NODE_TAG_MASK};
use crate::header::FileHeader;
use crate::record::decode_record;
use crate::stats::ReadStats;
use crate::string_table::StringTableReader;
use crate::value::payload_len;
use crate::{Error, Result};

use node::ReaderNodePool;

/// A loaded XMLCPB document.
///
/// The reader owns the decoded payload; [`NodeRef`]s borrow from it. Not
/// meant to be shared between threads.
pub struct Reader {
    header: FileHeader,
    nodes: Vec<u8>,
    /// Start of every record, by global id.
    node_offsets: Vec<u32>,
    tags: StringTableReader,
    tag_index: HashMap<String, u16>,
    attr_names: StringTableReader,
    strings: StringTableReader,
    attr_sets: AttrSetTableReader,
    pool: RefCell<ReaderNodePool>,
}

impl std::fmt::Debug for Reader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reader")
            .field("num_nodes", &self.node_offsets.len())
            .field("num_tags", &self.tags.len())
            .field("has_internal_error", &self.has_internal_error())
            .finish_non_exhaustive()
    }
}

/// Validate the magic and read the header.
fn parse_header(data: &[u8]) -> Result<FileHeader> {
    let magic = &data[..data.len().min(FileHeader::MAGIC.len())];
    if magic != &FileHeader::MAGIC[..magic.len()] {
        return Err(Error::InvalidMagic {
            actual: magic.to_vec(),
        });
    }
    if data.len() < FileHeader::SIZE {
        return Err(Error::Truncated(format!(
            "{} bytes, header alone needs {}",
            data.len(),
            FileHeader::SIZE
        )));
    }
    Ok(BinaryReader::new(data).read_struct::<FileHeader>()?)
}

fn log_failure<T>(result: Result<T>, what: &str) -> Result<T> {
    result.map_err(|e| {
        warn!(error = %e, source = what, "failed to load XMLCPB data");
        e
    })
}

impl Reader {
    /// Load an uncompressed blob as produced by
    /// [`Writer::write_all_into_memory`](crate::Writer::write_all_into_memory).
    pub fn read_binary_memory(data: &[u8]) -> Result<Self> {
        Self::read_binary_memory_with_config(data, ReaderConfig::default())
    }

    pub fn read_binary_memory_with_config(data: &[u8], config: ReaderConfig) -> Result<Self> {
        log_failure(Self::load_memory(data, &config), "memory")
    }

    /// Load a compressed file as produced by
    /// [`Writer::finish_writing_file`](crate::Writer::finish_writing_file).
    pub fn read_binary_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::read_binary_file_with_config(path, ReaderConfig::default())
    }

    pub fn read_binary_file_with_config(
        path: impl AsRef<Path>,
        config: ReaderConfig,
    ) -> Result<Self> {
        let path = path.as_ref();
        log_failure(Self::load_file(path, &config), "file").map(|reader| {
            debug!(path = %path.display(), nodes = reader.num_nodes(), "loaded XMLCPB file");
            reader
        })
    }

    fn load_memory(data: &[u8], config: &ReaderConfig) -> Result<Self> {
        let header = parse_header(data)?;
        let payload = &data[FileHeader::SIZE..];
        let payload_size = header.payload_size();
        if (payload.len() as u64) < payload_size {
            return Err(Error::Truncated(format!(
                "payload is {} bytes, header declares {payload_size}",
                payload.len()
            )));
        }
        Self::from_payload(header, Cow::Borrowed(&payload[..payload_size as usize]), config)
    }

    fn load_file(path: &Path, config: &ReaderConfig) -> Result<Self> {
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };
        let header = parse_header(&mmap)?;
        let blocks = &mmap[FileHeader::SIZE..];

        if header.has_md5 != 0 && config.verify_md5 {
            let digest: [u8; 16] = Md5::digest(blocks).into();
            if digest != header.md5 {
                return Err(Error::SignatureMismatch);
            }
        }

        let payload_size = usize::try_from(header.payload_size())
            .map_err(|_| Error::Truncated("payload size overflows memory".into()))?;
        let payload = decompress_blocks(blocks, payload_size)?;
        Self::from_payload(header, Cow::Owned(payload), config)
    }

    fn from_payload(header: FileHeader, payload: Cow<'_, [u8]>, config: &ReaderConfig) -> Result<Self> {
        let mut sections = BinaryReader::new(&payload);
        let size_nodes = header.size_nodes as usize;
        sections.skip(size_nodes)?;

        let tags_desc = header.tags;
        let names_desc = header.attr_names;
        let strings_desc = header.strings_data;
        let tags = StringTableReader::parse(
            sections.read_bytes(tags_desc.size_bytes as usize)?,
            tags_desc,
        )?;
        let attr_names = StringTableReader::parse(
            sections.read_bytes(names_desc.size_bytes as usize)?,
            names_desc,
        )?;
        let strings = StringTableReader::parse(
            sections.read_bytes(strings_desc.size_bytes as usize)?,
            strings_desc,
        )?;
        let attr_sets = AttrSetTableReader::parse(
            sections.read_bytes(header.size_attr_sets as usize)?,
            header.num_attr_sets,
        )?;

        let nodes = match payload {
            Cow::Owned(mut payload) => {
                payload.truncate(size_nodes);
                payload.shrink_to_fit();
                payload
            }
            Cow::Borrowed(payload) => payload[..size_nodes].to_vec(),
        };

        let node_offsets = Self::index_nodes(&nodes, header.num_nodes, &attr_sets, tags.len())?;
        let tag_index = tags
            .iter()
            .enumerate()
            .map(|(id, tag)| (tag.to_string(), id as u16))
            .collect();

        if header.has_internal_error != 0 {
            warn!("XMLCPB data was written with an internal error and may be incomplete");
        }

        Ok(Self {
            header,
            nodes,
            node_offsets,
            tags,
            tag_index,
            attr_names,
            strings,
            attr_sets,
            pool: RefCell::new(ReaderNodePool::new(config.live_node_pool_size)),
        })
    }

    /// Walk every record once, in file order.
    fn index_nodes(
        nodes: &[u8],
        num_nodes: u32,
        attr_sets: &AttrSetTableReader,
        num_tags: usize,
    ) -> Result<Vec<u32>> {
        let mut offsets = Vec::with_capacity(num_nodes as usize);
        let mut child_blocks = Vec::new();
        let mut pos = 0;
        for global_id in 0..num_nodes {
            if pos >= nodes.len() {
                return Err(Error::CorruptNodes(format!(
                    "node buffer ends before node {global_id} of {num_nodes}"
                )));
            }
            offsets.push(pos as u32);
            let layout = decode_record(nodes, pos, global_id, attr_sets, &mut child_blocks)?;
            if layout.tag_id as usize >= num_tags {
                return Err(Error::CorruptNodes(format!(
                    "node {global_id}: tag id {} outside table",
                    layout.tag_id
                )));
            }
            pos = layout.end;
        }
        if pos != nodes.len() {
            return Err(Error::CorruptNodes(format!(
                "{} trailing bytes after the last node",
                nodes.len() - pos
            )));
        }
        Ok(offsets)
    }

    /// Number of compacted nodes.
    pub fn num_nodes(&self) -> u32 {
        self.node_offsets.len() as u32
    }

    /// Whether the writer hit a capacity limit.
    pub fn has_internal_error(&self) -> bool {
        self.header.has_internal_error != 0
    }

    /// The header as loaded.
    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    /// The root: always the last compacted node.
    pub fn root(&self) -> Option<NodeRef<'_>> {
        let last = self.num_nodes().checked_sub(1)?;
        self.activate_node(last)
    }

    /// View of the node with the given global id.
    ///
    /// A node that already has a live view shares its slot.
    pub fn activate_node(&self, global_id: u32) -> Option<NodeRef<'_>> {
        let offset = *self.node_offsets.get(global_id as usize)? as usize;
        let mut pool = self.pool.borrow_mut();
        if let Some(slot) = pool.retain_active(global_id) {
            return Some(NodeRef::new(self, slot));
        }

        let slot = pool.alloc(global_id);
        let node = pool.slot_mut(slot);
        let layout = match decode_record(
            &self.nodes,
            offset,
            global_id,
            &self.attr_sets,
            &mut node.child_blocks,
        ) {
            Ok(layout) => layout,
            Err(e) => {
                debug!(global_id, error = %e, "failed to activate node");
                pool.release(slot);
                return None;
            }
        };

        node.tag_id = layout.tag_id;
        node.num_children = layout.num_children;
        node.attr_set = layout.attr_set;
        node.attrs_end = layout.end as u32;
        node.attr_offsets.clear();
        let headers = layout
            .attr_set
            .and_then(|set| self.attr_sets.headers(set))
            .unwrap_or_default();
        let mut pos = layout.attrs_start;
        for &header in headers {
            node.attr_offsets.push(pos as u32);
            pos += split_attr_header(header)
                .0
                .and_then(|ty| payload_len(ty, &self.nodes[pos..]))
                .unwrap_or(0);
        }

        Some(NodeRef::new(self, slot))
    }

    /// Tag id of a node, read straight from its record header.
    fn node_tag_id(&self, global_id: u32) -> Option<u16> {
        let offset = *self.node_offsets.get(global_id as usize)? as usize;
        let bytes = self.nodes.get(offset..offset + 2)?;
        Some(u16::from_le_bytes([bytes[0], bytes[1]]) & NODE_TAG_MASK)
    }

    /// All tag names, in id order.
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.tags.iter()
    }

    /// All attribute names, in id order.
    pub fn attr_names(&self) -> impl Iterator<Item = &str> {
        self.attr_names.iter()
    }

    pub fn stats(&self) -> ReadStats {
        ReadStats {
            num_nodes: self.num_nodes(),
            num_tags: self.tags.len(),
            num_attr_names: self.attr_names.len(),
            num_strings: self.strings.len(),
            num_attr_sets: self.attr_sets.len(),
            size_nodes: self.nodes.len(),
            live_nodes: self.pool.borrow().active(),
            has_internal_error: self.has_internal_error(),
        }
    }
}
