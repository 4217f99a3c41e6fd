//! Session statistics.

/// Sizes and counts of a writer session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteStats {
    pub num_nodes: u32,
    pub num_tags: usize,
    pub num_attr_names: usize,
    pub num_strings: usize,
    pub num_attr_sets: usize,
    /// Bytes of compacted node records.
    pub size_nodes: usize,
    /// Uncompressed payload size: nodes plus every table.
    pub payload_size: usize,
    /// Bytes on disk including the header; zero for in-memory sessions.
    pub file_size: u64,
    /// Live-node slots in use right now.
    pub live_nodes: usize,
    /// Highest number of live nodes held at once.
    pub peak_live_nodes: usize,
    pub has_internal_error: bool,
}

/// Sizes and counts of a loaded reader.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadStats {
    pub num_nodes: u32,
    pub num_tags: usize,
    pub num_attr_names: usize,
    pub num_strings: usize,
    pub num_attr_sets: usize,
    pub size_nodes: usize,
    /// Reader nodes currently referenced.
    pub live_nodes: usize,
    pub has_internal_error: bool,
}
