//! XML rendering of a loaded document, for inspection and diffing.
//!
//! Vectors are written as comma-separated components and blobs as hex; the
//! output is not meant to be converted back.

use std::io::Write;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};

use crate::reader::{NodeRef, Reader};
use crate::{Error, Result};

fn xml_err(e: impl std::fmt::Display) -> Error {
    Error::Xml(e.to_string())
}

impl Reader {
    /// Convert to XML string.
    pub fn to_xml_string(&self) -> Result<String> {
        let mut output = Vec::new();
        self.write_xml(&mut output)?;
        String::from_utf8(output).map_err(xml_err)
    }

    /// Write XML to a writer.
    pub fn write_xml<W: Write>(&self, writer: &mut W) -> Result<()> {
        let mut xml_writer = quick_xml::Writer::new_with_indent(writer, b' ', 2);

        xml_writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
            .map_err(xml_err)?;

        if let Some(root) = self.root() {
            write_element(&mut xml_writer, &root)?;
        }

        Ok(())
    }
}

fn write_element<W: Write>(writer: &mut quick_xml::Writer<W>, node: &NodeRef<'_>) -> Result<()> {
    let tag = node.tag();
    let mut elem = BytesStart::new(tag);
    for (name, value) in node.attrs() {
        elem.push_attribute((name, value.to_string().as_str()));
    }

    if node.num_children() == 0 {
        writer.write_event(Event::Empty(elem)).map_err(xml_err)?;
        return Ok(());
    }

    writer.write_event(Event::Start(elem)).map_err(xml_err)?;
    for child in node.children() {
        write_element(writer, &child)?;
    }
    writer
        .write_event(Event::End(BytesEnd::new(tag)))
        .map_err(xml_err)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::{Reader, Writer};

    #[test]
    fn test_dump_nested() {
        let mut writer = Writer::new("Save");
        let root = writer.root();
        writer.add_attr(root, "version", 3).unwrap();
        let entity = writer.add_child_node(root, "Entity").unwrap();
        writer.add_attr(entity, "name", "Bob & Alice").unwrap();
        writer.add_attr(entity, "pos", [1.0f32, 0.0, -1.0]).unwrap();
        writer.add_attr_bytes(entity, "blob", &[0xAB, 0x01]).unwrap();
        writer.add_child_node(root, "Empty").unwrap();

        let data = writer.write_all_into_memory().unwrap();
        let reader = Reader::read_binary_memory(&data).unwrap();
        let xml = reader.to_xml_string().unwrap();

        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"utf-8\"?>"));
        assert!(xml.contains("<Save version=\"3\">"));
        assert!(xml.contains("name=\"Bob &amp; Alice\""));
        assert!(xml.contains("pos=\"1,0,-1\""));
        assert!(xml.contains("blob=\"ab01\""));
        assert!(xml.contains("<Empty/>"));
        assert!(xml.trim_end().ends_with("</Save>"));
    }
}
