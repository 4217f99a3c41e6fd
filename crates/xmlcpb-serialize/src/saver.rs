//! XMLCPB implementation of [`SaveBackend`].

use std::path::Path;

use tracing::debug;
use xmlcpb::{AttrInput, NodeHandle, WriteStats, Writer, WriterConfig};

use crate::{Error, Result, SaveBackend};

/// Saves groups as child nodes and values as attributes.
///
/// The root node stands for the outermost group and is always open; it is
/// not counted by [`depth`](SaveBackend::depth).
pub struct XmlCpbSaver {
    writer: Writer,
    /// Open groups, root first.
    stack: Vec<NodeHandle>,
}

impl XmlCpbSaver {
    /// Save into memory.
    pub fn new(root_tag: &str) -> Self {
        Self::from_writer(Writer::new(root_tag))
    }

    /// Save into a compressed file.
    pub fn create_file(path: impl AsRef<Path>, root_tag: &str) -> Result<Self> {
        let writer = Writer::create_file(path, root_tag)?;
        Ok(Self::from_writer(writer))
    }

    pub fn with_config(
        root_tag: &str,
        path: Option<&Path>,
        config: WriterConfig,
    ) -> Result<Self> {
        Ok(Self::from_writer(Writer::init(root_tag, path, config)?))
    }

    fn from_writer(writer: Writer) -> Self {
        let root = writer.root();
        Self {
            writer,
            stack: vec![root],
        }
    }

    /// The underlying writer, for direct node access.
    pub fn writer(&self) -> &Writer {
        &self.writer
    }

    fn current(&self) -> NodeHandle {
        // The root is never popped
        self.stack[self.stack.len() - 1]
    }

    fn check_closed(&self) -> Result<()> {
        match self.stack.len() {
            1 => Ok(()),
            n => Err(Error::UnbalancedGroup(format!(
                "{} group(s) still open at finish",
                n - 1
            ))),
        }
    }

    /// Finish an in-memory session. Every group must be closed.
    pub fn finish_into_memory(self) -> Result<Vec<u8>> {
        self.check_closed()?;
        Ok(self.writer.write_all_into_memory()?)
    }

    /// Finish a file session. Every group must be closed.
    pub fn finish_file(self) -> Result<WriteStats> {
        self.check_closed()?;
        Ok(self.writer.finish_writing_file()?)
    }
}

impl SaveBackend for XmlCpbSaver {
    fn begin_group(&mut self, name: &str) -> Result<()> {
        let parent = self.current();
        let group = self.writer.add_child_node(parent, name)?;
        self.stack.push(group);
        Ok(())
    }

    fn end_group(&mut self) -> Result<()> {
        if self.stack.len() == 1 {
            return Err(Error::UnbalancedGroup(
                "end_group without begin_group".into(),
            ));
        }
        if let Some(group) = self.stack.pop() {
            self.writer.done_node(group)?;
        }
        Ok(())
    }

    fn value(&mut self, name: &str, value: AttrInput<'_>) -> Result<()> {
        let node = self.current();
        self.writer.add_attr(node, name, value)?;
        Ok(())
    }

    fn value_bytes(&mut self, name: &str, data: &[u8]) -> Result<()> {
        debug!(name, len = data.len(), "saving raw value");
        let node = self.current();
        self.writer.add_attr_bytes(node, name, data)?;
        Ok(())
    }

    fn depth(&self) -> usize {
        self.stack.len() - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unbalanced_end() {
        let mut saver = XmlCpbSaver::new("Save");
        assert!(matches!(saver.end_group(), Err(Error::UnbalancedGroup(_))));
    }

    #[test]
    fn test_open_group_at_finish() {
        let mut saver = XmlCpbSaver::new("Save");
        saver.begin_group("Open").unwrap();
        assert_eq!(saver.depth(), 1);
        assert!(matches!(
            saver.finish_into_memory(),
            Err(Error::UnbalancedGroup(_))
        ));
    }

    #[test]
    fn test_closed_group_rejects_values() {
        let mut saver = XmlCpbSaver::new("Save");
        saver.begin_group("A").unwrap();
        let a = saver.current();
        saver.end_group().unwrap();
        assert!(saver.writer().is_done(a).unwrap());
        // Values now land on the root again
        saver.save("x", 1).unwrap();
        assert_eq!(saver.depth(), 0);
    }
}
