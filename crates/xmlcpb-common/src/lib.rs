//! Common utilities for XMLCPB.
//!
//! This crate provides the byte-level building blocks shared by the codec:
//!
//! - [`BinaryReader`] - Zero-copy cursor over byte slices, including the
//!   variable-width packed integers used by node records
//! - [`packed`] - Writers for packed integers and little-endian scalars
//! - [`hash`] - The multiplier-33 content hash used by the dedup tables

mod error;
mod reader;

pub mod hash;
pub mod packed;

pub use error::{Error, Result};
pub use reader::BinaryReader;

