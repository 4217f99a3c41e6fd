//! Save/load backends for game state, on top of the XMLCPB codec.
//!
//! Game objects persist themselves through [`SaveBackend`] and
//! [`LoadBackend`]: named values grouped into nested groups. The traits are
//! object safe so objects can take `&mut dyn SaveBackend` and stay unaware
//! of the storage format. [`XmlCpbSaver`] and [`XmlCpbLoader`] map groups to
//! nodes and values to attributes.
//!
//! # Example
//!
//! ```
//! use xmlcpb_serialize::{LoadBackend, SaveBackend, XmlCpbLoader, XmlCpbSaver};
//!
//! let mut saver = XmlCpbSaver::new("Save");
//! saver.begin_group("Player")?;
//! saver.save("health", 87)?;
//! saver.end_group()?;
//! let data = saver.finish_into_memory()?;
//!
//! let reader = xmlcpb::Reader::read_binary_memory(&data)?;
//! let mut loader = XmlCpbLoader::new(&reader)?;
//! assert!(loader.begin_group("Player")?);
//! assert_eq!(loader.load::<i32>("health"), Some(87));
//! loader.end_group()?;
//! # Ok::<(), xmlcpb_serialize::Error>(())
//! ```

mod backend;
mod error;
mod loader;
mod saver;

pub use backend::{LoadBackend, SaveBackend};
pub use error::{Error, Result};
pub use loader::XmlCpbLoader;
pub use saver::XmlCpbSaver;

pub use xmlcpb::{AttrInput, AttrValue, FromAttrValue};
