//! Error types for xmlcpb-common.

use thiserror::Error;

/// Common error type for byte-level XMLCPB operations.
#[derive(Debug, Error)]
pub enum Error {
    /// End of buffer reached while reading.
    #[error("unexpected end of buffer: needed {needed} bytes but only {available} available")]
    UnexpectedEof { needed: usize, available: usize },

    /// A packed integer does not fit in the 22 bits the format allows.
    #[error("packed integer {0} exceeds the maximum of {max}", max = crate::packed::MAX_PACKED)]
    PackedOverflow(u32),
}

/// Result type alias using the common Error type.
pub type Result<T> = std::result::Result<T, Error>;
