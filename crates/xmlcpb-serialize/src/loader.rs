//! XMLCPB implementation of [`LoadBackend`].

use tracing::debug;
use xmlcpb::{AttrValue, NodeRef, Reader};

use crate::{Error, LoadBackend, Result};

/// Loads groups from child nodes and values from attributes of a
/// [`Reader`].
pub struct XmlCpbLoader<'r> {
    /// Entered groups, root first.
    stack: Vec<NodeRef<'r>>,
}

impl<'r> XmlCpbLoader<'r> {
    pub fn new(reader: &'r Reader) -> Result<Self> {
        let root = reader.root().ok_or(Error::EmptyDocument)?;
        Ok(Self { stack: vec![root] })
    }

    /// Node of the current group.
    pub fn current(&self) -> &NodeRef<'r> {
        // The root is never popped
        &self.stack[self.stack.len() - 1]
    }
}

impl LoadBackend for XmlCpbLoader<'_> {
    fn begin_group(&mut self, name: &str) -> Result<bool> {
        match self.current().child_by_tag(name) {
            Some(group) => {
                self.stack.push(group);
                Ok(true)
            }
            None => {
                debug!(group = name, parent = self.current().tag(), "group not found");
                Ok(false)
            }
        }
    }

    fn end_group(&mut self) -> Result<()> {
        if self.stack.len() == 1 {
            return Err(Error::UnbalancedGroup(
                "end_group without begin_group".into(),
            ));
        }
        self.stack.pop();
        Ok(())
    }

    fn value(&self, name: &str) -> Option<AttrValue<'_>> {
        self.current().attr(name)
    }

    fn depth(&self) -> usize {
        self.stack.len() - 1
    }
}
