//! Backend traits shared by every storage format.

use xmlcpb::{AttrInput, AttrValue, FromAttrValue};

use crate::Result;

/// Write side: named values inside nested groups.
pub trait SaveBackend {
    /// Open a group nested in the current one.
    fn begin_group(&mut self, name: &str) -> Result<()>;

    /// Close the innermost open group.
    fn end_group(&mut self) -> Result<()>;

    /// Store a value in the current group.
    fn value(&mut self, name: &str, value: AttrInput<'_>) -> Result<()>;

    /// Store opaque bytes in the current group.
    fn value_bytes(&mut self, name: &str, data: &[u8]) -> Result<()> {
        self.value(name, AttrInput::Bytes(data))
    }

    /// Number of groups currently open.
    fn depth(&self) -> usize;

    /// Typed convenience over [`value`](Self::value).
    fn save<'v, T>(&mut self, name: &str, value: T) -> Result<()>
    where
        T: Into<AttrInput<'v>>,
        Self: Sized,
    {
        self.value(name, value.into())
    }
}

/// Read side: looks values up by name in the current group.
///
/// Missing groups and values are not errors, since data written by an
/// older version may simply lack them.
pub trait LoadBackend {
    /// Enter the child group `name`. Returns `false` if there is none, in
    /// which case the current group is unchanged.
    fn begin_group(&mut self, name: &str) -> Result<bool>;

    /// Leave the group entered by the last successful `begin_group`.
    fn end_group(&mut self) -> Result<()>;

    /// Value `name` in the current group.
    fn value(&self, name: &str) -> Option<AttrValue<'_>>;

    fn have_value(&self, name: &str) -> bool {
        self.value(name).is_some()
    }

    /// Bytes stored with [`SaveBackend::value_bytes`].
    fn value_bytes(&self, name: &str) -> Option<&[u8]> {
        match self.value(name)? {
            AttrValue::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Number of groups currently entered.
    fn depth(&self) -> usize;

    /// Typed convenience over [`value`](Self::value).
    fn load<'a, T>(&'a self, name: &str) -> Option<T>
    where
        T: FromAttrValue<'a>,
        Self: Sized,
    {
        T::from_attr_value(self.value(name)?)
    }
}
