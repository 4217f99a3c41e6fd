//! Error types for XMLCPB reading and writing.

use thiserror::Error;

/// Errors that can occur when writing or loading XMLCPB data.
///
/// Capacity overflows are deliberately absent: they never abort a session.
/// They set the sticky internal-error flag instead, see
/// [`Writer::has_internal_error`](crate::Writer::has_internal_error).
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Common library error.
    #[error("{0}")]
    Common(#[from] xmlcpb_common::Error),

    /// Invalid magic bytes (not an XMLCPB blob).
    #[error("invalid XMLCPB magic: expected 'PBX0', got {actual:?}")]
    InvalidMagic { actual: Vec<u8> },

    /// The data ended before the sections declared by the header.
    #[error("truncated XMLCPB data: {0}")]
    Truncated(String),

    /// The header's MD5 signature does not match the payload.
    #[error("MD5 signature mismatch")]
    SignatureMismatch,

    /// A compressed block could not be inflated.
    #[error("decompression error: {0}")]
    Decompression(String),

    /// The node buffer does not decode into the declared node count.
    #[error("corrupt node buffer: {0}")]
    CorruptNodes(String),

    /// The background compressor thread stopped unexpectedly.
    #[error("compressor thread failed: {0}")]
    Compressor(String),

    /// A node handle refers to a slot that has since been recycled.
    #[error("stale node handle (slot {slot}, generation {generation})")]
    StaleNode { slot: u32, generation: u32 },

    /// A mutator was called on a node that is already done.
    #[error("node '{0}' is already done")]
    NodeAlreadyDone(String),

    /// The session was already finished.
    #[error("writer session already finished")]
    AlreadyFinished,

    /// The operation needs a file-mode (or memory-mode) session.
    #[error("operation not available in {0} mode")]
    WrongMode(&'static str),

    /// XML writing error.
    #[error("XML error: {0}")]
    Xml(String),
}

/// Result type for XMLCPB operations.
pub type Result<T> = std::result::Result<T, Error>;
