//! Streaming XMLCPB writer.
//!
//! Nodes are built top-down through [`NodeHandle`]s and compacted bottom-up:
//! when a node is done and its parent's current block of 64 children fills
//! up (or the parent itself is done), the whole block is serialized into the
//! node buffer and the live slots are recycled. Global ids are assigned at
//! compaction time, so they follow post-order and the root always gets the
//! highest id.
//!
//! A node becomes done explicitly ([`Writer::done_node`]), implicitly when a
//! sibling is added after it, or when its parent becomes done.
//!
//! # Example
//!
//! ```
//! use xmlcpb::{Reader, Writer};
//!
//! let mut writer = Writer::new("Entity");
//! let root = writer.root();
//! let player = writer.add_child_node(root, "Player")?;
//! writer.add_attr(player, "name", "Bob")?;
//! writer.add_attr(player, "pos", [1.0f32, 2.0, 3.0])?;
//!
//! let data = writer.write_all_into_memory()?;
//! let reader = Reader::read_binary_memory(&data)?;
//! let player = reader.root().and_then(|root| root.child_by_tag("Player"));
//! assert_eq!(player.and_then(|p| p.read_attr::<String>("name")).as_deref(), Some("Bob"));
//! # Ok::<(), xmlcpb::Error>(())
//! ```

mod node;

pub use node::NodeHandle;

use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use zerocopy::IntoBytes;

use crate::attr::{encode_attr, encode_raw, encode_raw_str, AttrInput, EncodeError, EncodedAttr};
use crate::attr_set::AttrSetTableWriter;
use crate::buffer::SegmentedBuffer;
use crate::compress::BlockCompressor;
use crate::config::WriterConfig;
use crate::format::{
    attr_header, split_attr_header, MAX_ATTRS_PER_NODE, MAX_ATTR_NAMES, MAX_STRINGS, MAX_TAGS,
};
use crate::header::FileHeader;
use crate::record::RecordHeader;
use crate::stats::WriteStats;
use crate::string_table::StringTableWriter;
use crate::{Error, Result};

use node::{LiveAttr, LiveNodePool, NodeState};

enum Sink {
    Memory,
    File {
        compressor: BlockCompressor,
        path: PathBuf,
    },
}

/// One writer session producing one XMLCPB blob or file.
pub struct Writer {
    config: WriterConfig,
    tags: StringTableWriter,
    attr_names: StringTableWriter,
    strings: StringTableWriter,
    attr_sets: AttrSetTableWriter,
    nodes: SegmentedBuffer,
    pool: LiveNodePool,
    root: NodeHandle,
    num_nodes: u32,
    root_compacted: bool,
    has_internal_error: bool,
    sink: Sink,
    record: Vec<u8>,
    set_headers: Vec<u16>,
}

impl Writer {
    /// Start an in-memory session with the default configuration.
    pub fn new(root_tag: &str) -> Self {
        Self::with_config(root_tag, WriterConfig::default())
    }

    /// Start an in-memory session.
    pub fn with_config(root_tag: &str, config: WriterConfig) -> Self {
        Self::build(root_tag, config, Sink::Memory)
    }

    /// Start a file session with the default configuration.
    pub fn create_file(path: impl AsRef<Path>, root_tag: &str) -> Result<Self> {
        Self::init(root_tag, Some(path.as_ref()), WriterConfig::default())
    }

    /// Start a session. With a path the output is streamed through the
    /// compressor into that file; without one it is kept in memory.
    pub fn init(root_tag: &str, path: Option<&Path>, config: WriterConfig) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::with_config(root_tag, config));
        };

        let mut file = File::create(path)?;
        // Placeholder, rewritten once sizes and signature are known
        file.write_all(&[0u8; FileHeader::SIZE])?;
        let compressor = BlockCompressor::spawn(
            file,
            config.compression_level,
            config.max_blocks_in_flight,
            config.write_md5,
        )?;
        debug!(path = %path.display(), "started XMLCPB file session");

        Ok(Self::build(
            root_tag,
            config,
            Sink::File {
                compressor,
                path: path.to_path_buf(),
            },
        ))
    }

    fn build(root_tag: &str, config: WriterConfig, sink: Sink) -> Self {
        let segment_size = config.segment_size;
        let mut writer = Self {
            tags: StringTableWriter::new(MAX_TAGS, segment_size),
            attr_names: StringTableWriter::new(MAX_ATTR_NAMES, segment_size),
            strings: StringTableWriter::new(MAX_STRINGS, segment_size),
            attr_sets: AttrSetTableWriter::new(),
            nodes: SegmentedBuffer::new(segment_size),
            pool: LiveNodePool::new(config.live_node_pool_size),
            root: NodeHandle {
                slot: 0,
                generation: 0,
            },
            num_nodes: 0,
            root_compacted: false,
            has_internal_error: false,
            sink,
            record: Vec::with_capacity(256),
            set_headers: Vec::with_capacity(MAX_ATTRS_PER_NODE),
            config,
        };
        let tag_id = writer.intern_tag(root_tag);
        let slot = writer.pool.alloc(None, tag_id);
        writer.root = writer.pool.handle(slot);
        writer
    }

    /// Handle of the root node.
    pub fn root(&self) -> NodeHandle {
        self.root
    }

    /// Whether a capacity limit was hit. The output is still loadable but
    /// some data was dropped, clamped or stored less compactly.
    pub fn has_internal_error(&self) -> bool {
        self.has_internal_error
    }

    pub fn config(&self) -> &WriterConfig {
        &self.config
    }

    fn flag_internal_error(&mut self, what: &str) {
        if !self.has_internal_error {
            warn!(reason = what, "XMLCPB capacity limit hit, output will be incomplete");
        } else {
            debug!(reason = what, "XMLCPB capacity limit hit again");
        }
        self.has_internal_error = true;
    }

    fn intern_tag(&mut self, tag: &str) -> u16 {
        if memchr::memchr(0, tag.as_bytes()).is_some() {
            self.flag_internal_error("tag contains NUL");
            return 0;
        }
        match self.tags.get_or_insert(tag) {
            Some(id) => id as u16,
            None => {
                self.flag_internal_error("tag table full");
                0
            }
        }
    }

    fn tag_name(&self, slot: u32) -> String {
        self.tags
            .get(u32::from(self.pool.node(slot).tag_id))
            .unwrap_or_default()
    }

    /// Resolve a handle to a slot that still accepts changes.
    fn open_slot(&self, node: NodeHandle) -> Result<u32> {
        let slot = self.pool.resolve(node)?;
        match self.pool.node(slot).state {
            NodeState::Open => Ok(slot),
            _ => Err(Error::NodeAlreadyDone(self.tag_name(slot))),
        }
    }

    /// Tag of a live node.
    pub fn tag(&self, node: NodeHandle) -> Result<String> {
        let slot = self.pool.resolve(node)?;
        Ok(self.tag_name(slot))
    }

    /// Whether a live node is done.
    pub fn is_done(&self, node: NodeHandle) -> Result<bool> {
        let slot = self.pool.resolve(node)?;
        Ok(self.pool.node(slot).state == NodeState::Done)
    }

    /// Number of children added to a live node so far.
    pub fn num_children(&self, node: NodeHandle) -> Result<u32> {
        let slot = self.pool.resolve(node)?;
        Ok(self.pool.node(slot).num_children)
    }

    /// Add a child to `parent`. The previously added child of `parent`, if
    /// still open, becomes done.
    pub fn add_child_node(&mut self, parent: NodeHandle, tag: &str) -> Result<NodeHandle> {
        let parent_slot = self.open_slot(parent)?;

        if let Some(previous) = self.pool.node_mut(parent_slot).open_child.take() {
            self.finish_node(previous);
        }
        if self.pool.node(parent_slot).is_block_full() {
            self.compact_block(parent_slot);
        }

        let tag_id = self.intern_tag(tag);
        let slot = self.pool.alloc(Some(parent_slot), tag_id);

        let parent_node = self.pool.node_mut(parent_slot);
        parent_node.pending_children.push(slot);
        parent_node.open_child = Some(slot);
        parent_node.num_children += 1;
        if parent_node.num_children > xmlcpb_common::packed::MAX_PACKED {
            self.flag_internal_error("too many children on one node");
        }

        Ok(self.pool.handle(slot))
    }

    /// Add an attribute, choosing the most compact encoding for the value.
    ///
    /// A repeated name on the same node is logged and ignored; the first
    /// value is kept.
    pub fn add_attr<'v>(
        &mut self,
        node: NodeHandle,
        name: &str,
        value: impl Into<AttrInput<'v>>,
    ) -> Result<()> {
        let slot = self.open_slot(node)?;
        let Some(name_id) = self.attr_name_slot(slot, name) else {
            return Ok(());
        };

        let value = value.into();
        let encoded = match encode_attr(value, &mut self.strings) {
            Ok(encoded) => encoded,
            Err(EncodeError::StringTableFull) => {
                self.flag_internal_error("string table full");
                let AttrInput::Str(text) = value else {
                    return Ok(());
                };
                match encode_raw_str(text) {
                    Ok(encoded) => encoded,
                    Err(_) => return Ok(()),
                }
            }
            Err(EncodeError::ValueTooLarge) => {
                self.flag_internal_error("attribute value too large");
                return Ok(());
            }
        };
        self.push_attr(slot, name_id, encoded);
        Ok(())
    }

    /// Add a blob attribute, copying the bytes.
    pub fn add_attr_bytes(&mut self, node: NodeHandle, name: &str, data: &[u8]) -> Result<()> {
        self.add_attr(node, name, AttrInput::Bytes(data))
    }

    /// Add a blob attribute, taking ownership of the bytes.
    pub fn add_attr_bytes_owned(
        &mut self,
        node: NodeHandle,
        name: &str,
        data: Vec<u8>,
    ) -> Result<()> {
        let slot = self.open_slot(node)?;
        let Some(name_id) = self.attr_name_slot(slot, name) else {
            return Ok(());
        };
        match encode_raw(data) {
            Ok(encoded) => self.push_attr(slot, name_id, encoded),
            Err(_) => self.flag_internal_error("attribute value too large"),
        }
        Ok(())
    }

    /// Id for a new attribute on `slot`, or `None` if it must be skipped.
    fn attr_name_slot(&mut self, slot: u32, name: &str) -> Option<u16> {
        if memchr::memchr(0, name.as_bytes()).is_some() {
            self.flag_internal_error("attribute name contains NUL");
            return None;
        }

        let attrs = &self.pool.node(slot).attrs;
        if let Some(existing) = self.attr_names.find(name) {
            if attrs
                .iter()
                .any(|attr| u32::from(split_attr_header(attr.header).1) == existing)
            {
                warn!(
                    tag = %self.tag_name(slot),
                    attr = name,
                    "duplicate attribute ignored"
                );
                return None;
            }
        }
        if attrs.len() >= MAX_ATTRS_PER_NODE {
            self.flag_internal_error("too many attributes on one node");
            return None;
        }

        let Some(name_id) = self.attr_names.get_or_insert(name) else {
            self.flag_internal_error("attribute name table full");
            return None;
        };
        Some(name_id as u16)
    }

    fn push_attr(&mut self, slot: u32, name_id: u16, encoded: EncodedAttr) {
        self.pool.node_mut(slot).attrs.push(LiveAttr {
            header: attr_header(encoded.ty, name_id),
            payload: encoded.payload,
        });
    }

    /// Whether a live node already has an attribute called `name`.
    pub fn have_attr(&self, node: NodeHandle, name: &str) -> Result<bool> {
        let slot = self.pool.resolve(node)?;
        let Some(name_id) = self.attr_names.find(name) else {
            return Ok(false);
        };
        Ok(self
            .pool
            .node(slot)
            .attrs
            .iter()
            .any(|attr| u32::from(split_attr_header(attr.header).1) == name_id))
    }

    /// Mark a node done. Its open descendants become done too. Once the root
    /// is done the tree is complete and no handle accepts changes.
    pub fn done_node(&mut self, node: NodeHandle) -> Result<()> {
        let slot = self.pool.resolve(node)?;
        if self.pool.node(slot).state == NodeState::Open {
            self.finish_node(slot);
        }
        Ok(())
    }

    /// Mark the root done, completing the tree.
    pub fn done(&mut self) {
        if !self.root_compacted {
            self.finish_node(self.root.slot);
        }
    }

    /// Mark `slot` and its chain of open descendants done, deepest first.
    fn finish_node(&mut self, slot: u32) {
        let mut chain = vec![slot];
        let mut current = slot;
        while let Some(child) = self.pool.node_mut(current).open_child.take() {
            chain.push(child);
            current = child;
        }
        for &slot in chain.iter().rev() {
            self.finish_one(slot);
        }
    }

    fn finish_one(&mut self, slot: u32) {
        let node = self.pool.node_mut(slot);
        node.state = NodeState::Done;
        let has_pending = !node.pending_children.is_empty();
        let parent = node.parent;

        if has_pending {
            self.compact_block(slot);
        }
        match parent {
            Some(parent) => {
                let parent = self.pool.node_mut(parent);
                if parent.open_child == Some(slot) {
                    parent.open_child = None;
                }
            }
            None => {
                self.compact_node(slot);
                self.root_compacted = true;
            }
        }
    }

    /// Serialize the pending children of `parent` as one contiguous block.
    fn compact_block(&mut self, parent: u32) {
        let mut pending = std::mem::take(&mut self.pool.node_mut(parent).pending_children);
        if pending.is_empty() {
            return;
        }
        for &child in &pending {
            self.compact_node(child);
        }
        let last = self.num_nodes - 1;

        pending.clear();
        let node = self.pool.node_mut(parent);
        node.child_blocks.push(last);
        node.pending_children = pending;
    }

    fn compact_node(&mut self, slot: u32) {
        let global_id = self.num_nodes;
        self.num_nodes += 1;

        let node = self.pool.node(slot);
        self.set_headers.clear();
        self.set_headers
            .extend(node.attrs.iter().map(|attr| attr.header));
        let attr_set = if self.set_headers.is_empty() {
            None
        } else {
            self.attr_sets.get_set_id(&self.set_headers)
        };
        let dropped_attrs = attr_set.is_none() && !self.set_headers.is_empty();

        self.record.clear();
        let exact = RecordHeader {
            tag_id: node.tag_id,
            global_id,
            num_children: node.num_children,
            child_blocks: &node.child_blocks,
            attr_set,
        }
        .write_to(&mut self.record);
        if attr_set.is_some() {
            self.record
                .reserve(node.attrs.iter().map(|attr| attr.payload.wire_len()).sum());
            for attr in &node.attrs {
                attr.payload.write_to(&mut self.record);
            }
        }
        self.nodes.append(&self.record);
        self.pool.release(slot);

        if dropped_attrs {
            self.flag_internal_error("attribute set table full");
        }
        if !exact {
            self.flag_internal_error("node record value out of range");
        }
        self.stream_full_segments();
    }

    fn stream_full_segments(&mut self) {
        let Sink::File { compressor, .. } = &self.sink else {
            return;
        };
        for segment in self.nodes.take_full_segments() {
            if compressor.submit(segment).is_err() {
                // The thread's own error is reported when the session finishes
                debug!("compressor stopped, dropping node segment");
                return;
            }
        }
    }

    fn header(&self, md5: Option<[u8; 16]>) -> FileHeader {
        let mut header = FileHeader::new();
        header.tags = self.tags.desc();
        header.attr_names = self.attr_names.desc();
        header.strings_data = self.strings.desc();
        header.num_attr_sets = self.attr_sets.len() as u32;
        header.size_attr_sets = self.attr_sets.size_bytes() as u32;
        header.size_nodes = self.nodes.len() as u32;
        header.num_nodes = self.num_nodes;
        header.has_internal_error = u8::from(self.has_internal_error);
        if let Some(md5) = md5 {
            header.md5 = md5;
            header.has_md5 = 1;
        }
        header
    }

    fn write_tables(&self, out: &mut Vec<u8>) {
        self.tags.write_to(out);
        self.attr_names.write_to(out);
        self.strings.write_to(out);
        self.attr_sets.write_to(out);
    }

    fn tables_size(&self) -> usize {
        self.tags.size_bytes()
            + self.attr_names.size_bytes()
            + self.strings.size_bytes()
            + self.attr_sets.size_bytes()
    }

    /// Current counts and sizes.
    pub fn stats(&self) -> WriteStats {
        WriteStats {
            num_nodes: self.num_nodes,
            num_tags: self.tags.len(),
            num_attr_names: self.attr_names.len(),
            num_strings: self.strings.len(),
            num_attr_sets: self.attr_sets.len(),
            size_nodes: self.nodes.len(),
            payload_size: self.nodes.len() + self.tables_size(),
            file_size: 0,
            live_nodes: self.pool.active(),
            peak_live_nodes: self.pool.peak(),
            has_internal_error: self.has_internal_error,
        }
    }

    /// Complete the tree and return the uncompressed blob.
    pub fn write_all_into_memory(mut self) -> Result<Vec<u8>> {
        if matches!(self.sink, Sink::File { .. }) {
            return Err(Error::WrongMode("file"));
        }
        self.done();

        let header = self.header(None);
        let mut out =
            Vec::with_capacity(FileHeader::SIZE + self.nodes.len() + self.tables_size());
        out.extend_from_slice(header.as_bytes());
        self.nodes.copy_to(&mut out);
        self.write_tables(&mut out);

        debug!(
            nodes = self.num_nodes,
            bytes = out.len(),
            internal_error = self.has_internal_error,
            "wrote XMLCPB blob"
        );
        Ok(out)
    }

    /// Complete the tree, flush every block through the compressor and write
    /// the final header.
    pub fn finish_writing_file(mut self) -> Result<WriteStats> {
        self.done();

        let Sink::File { compressor, path } = std::mem::replace(&mut self.sink, Sink::Memory)
        else {
            return Err(Error::WrongMode("memory"));
        };

        let mut tables = Vec::with_capacity(self.tables_size());
        self.write_tables(&mut tables);
        let submitted = self
            .nodes
            .take_all_segments()
            .into_iter()
            .chain(std::iter::once(tables))
            .try_for_each(|block| compressor.submit(block));

        let output = compressor.finish()?;
        submitted?;

        let header = self.header(output.md5);
        let mut file = output.file;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(header.as_bytes())?;
        file.flush()?;

        let mut stats = self.stats();
        stats.file_size = FileHeader::SIZE as u64 + output.bytes_written;
        info!(
            path = %path.display(),
            nodes = stats.num_nodes,
            payload = stats.payload_size,
            file_size = stats.file_size,
            blocks = output.blocks,
            raw_blocks = output.raw_blocks,
            internal_error = stats.has_internal_error,
            "wrote XMLCPB file"
        );
        Ok(stats)
    }
}
