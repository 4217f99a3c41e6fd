//! XMLCPB: compact binary encoding of XML-like save-game trees.
//!
//! Trees are written through a streaming [`Writer`] that compacts nodes into
//! a dense, deduplicated binary layout as soon as they are complete, and read
//! back through a [`Reader`] that decodes nodes lazily on first access.
//!
//! Two output modes are supported:
//!
//! - in memory: header plus uncompressed payload in one allocation
//! - file: payload streamed through a background zlib compressor in blocks,
//!   with an MD5 signature in the header
//!
//! Capacity overflows (too many distinct tags, names, strings or attribute
//! sets) never abort a session. They set a sticky internal-error flag that
//! is stored in the header and logged.
//!
//! # Example
//!
//! ```no_run
//! use xmlcpb::{Reader, Writer};
//!
//! let mut writer = Writer::create_file("save.xmlcpb", "Save")?;
//! let root = writer.root();
//! let entity = writer.add_child_node(root, "Entity")?;
//! writer.add_attr(entity, "id", 5)?;
//! writer.finish_writing_file()?;
//!
//! let reader = Reader::read_binary_file("save.xmlcpb")?;
//! let root = reader.root().expect("non-empty file");
//! for child in root.children() {
//!     println!("{} id={:?}", child.tag(), child.read_attr::<i32>("id"));
//! }
//! # Ok::<(), xmlcpb::Error>(())
//! ```

mod attr;
mod compress;
mod config;
mod error;
mod reader;
mod record;
mod stats;
mod value;
mod writer;

#[cfg(feature = "xml-output")]
mod dump;

pub mod attr_set;
pub mod buffer;
pub mod format;
pub mod header;
pub mod string_table;

pub use attr::AttrInput;
pub use config::{ReaderConfig, WriterConfig};
pub use error::{Error, Result};
pub use header::{FileHeader, StringTableDesc};
pub use reader::{Children, NodeRef, Reader};
pub use stats::{ReadStats, WriteStats};
pub use value::{AttrValue, FromAttrValue};
pub use writer::{NodeHandle, Writer};

/// Check whether data starts with the XMLCPB magic.
pub fn is_xmlcpb(data: &[u8]) -> bool {
    data.starts_with(FileHeader::MAGIC)
}
