//! Session options for the writer and the reader.

use crate::format::DEFAULT_SEGMENT_SIZE;

/// Options for a [`Writer`](crate::Writer) session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriterConfig {
    /// Size of the node-buffer segments. In file mode each full segment is
    /// handed to the compressor and released.
    pub segment_size: usize,
    /// Initial number of live-node slots. The pool grows past this when a
    /// tree keeps more nodes open, with a logged warning.
    pub live_node_pool_size: usize,
    /// zlib level (0-9) for file mode.
    pub compression_level: u32,
    /// Blocks queued for the compressor before the writer blocks.
    pub max_blocks_in_flight: usize,
    /// Store an MD5 signature of the payload in file mode.
    pub write_md5: bool,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            segment_size: DEFAULT_SEGMENT_SIZE,
            live_node_pool_size: 256,
            compression_level: 6,
            max_blocks_in_flight: 4,
            write_md5: true,
        }
    }
}

/// Options for a [`Reader`](crate::Reader) session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderConfig {
    /// Initial number of live reader-node slots.
    pub live_node_pool_size: usize,
    /// Check the MD5 signature of files that carry one.
    pub verify_md5: bool,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            live_node_pool_size: 64,
            verify_md5: true,
        }
    }
}
