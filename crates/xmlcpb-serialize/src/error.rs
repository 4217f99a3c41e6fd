//! Error types for the serialization backends.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Codec error.
    #[error("{0}")]
    Codec(#[from] xmlcpb::Error),

    /// `end_group` without a matching `begin_group`, or a session finished
    /// with groups still open.
    #[error("unbalanced group nesting: {0}")]
    UnbalancedGroup(String),

    /// The loaded document has no nodes.
    #[error("document has no root node")]
    EmptyDocument,
}

/// Result type for serialization backends.
pub type Result<T> = std::result::Result<T, Error>;
