//! Compressed file sessions.

use std::fs;

use tempfile::TempDir;
use xmlcpb::{Error, FileHeader, Reader, ReaderConfig, Writer, WriterConfig};
use zerocopy::IntoBytes;

fn build_large(writer: &mut Writer) {
    let root = writer.root();
    writer.add_attr(root, "version", 2).unwrap();
    for i in 0..2_000 {
        let entity = writer.add_child_node(root, "Entity").unwrap();
        writer.add_attr(entity, "id", i).unwrap();
        writer.add_attr(entity, "class", "AIActor").unwrap();
        writer.add_attr(entity, "pos", [i as f32, 0.5, 0.0]).unwrap();
        let inventory = writer.add_child_node(entity, "Inventory").unwrap();
        for slot in 0..(i % 4) {
            let item = writer.add_child_node(inventory, "Item").unwrap();
            writer.add_attr(item, "slot", slot).unwrap();
        }
    }
}

#[test]
fn test_file_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("save.xmlcpb");

    // Small segments so node data streams out while the tree is built
    let config = WriterConfig {
        segment_size: 1024,
        max_blocks_in_flight: 2,
        ..WriterConfig::default()
    };
    let mut writer = Writer::init("Save", Some(&path), config).unwrap();
    build_large(&mut writer);
    let stats = writer.finish_writing_file().unwrap();

    assert!(!stats.has_internal_error);
    assert_eq!(stats.file_size, fs::metadata(&path).unwrap().len());
    assert!(stats.file_size < stats.payload_size as u64);

    let reader = Reader::read_binary_file(&path).unwrap();
    assert_eq!(reader.num_nodes(), stats.num_nodes);
    assert_eq!(reader.header().has_md5, 1);

    let root = reader.root().unwrap();
    assert_eq!(root.tag(), "Save");
    assert_eq!(root.read_attr::<i32>("version"), Some(2));
    assert_eq!(root.num_children(), 2_000);

    let entity = root.child(1_234).unwrap();
    assert_eq!(entity.read_attr::<i32>("id"), Some(1_234));
    assert_eq!(entity.read_attr::<&str>("class"), Some("AIActor"));
    assert_eq!(entity.read_attr::<[f32; 3]>("pos"), Some([1_234.0, 0.5, 0.0]));
    let inventory = entity.child_by_tag("Inventory").unwrap();
    assert_eq!(inventory.num_children(), 2);
    assert_eq!(inventory.child(1).unwrap().read_attr::<i32>("slot"), Some(1));
}

#[cfg(feature = "xml-output")]
#[test]
fn test_file_and_memory_agree() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("same.xmlcpb");

    let mut file_writer = Writer::create_file(&path, "Save").unwrap();
    build_large(&mut file_writer);
    file_writer.finish_writing_file().unwrap();

    let mut memory_writer = Writer::new("Save");
    build_large(&mut memory_writer);
    let blob = memory_writer.write_all_into_memory().unwrap();

    let from_file = Reader::read_binary_file(&path).unwrap();
    let from_memory = Reader::read_binary_memory(&blob).unwrap();
    assert_eq!(from_file.stats(), from_memory.stats());
    assert_eq!(
        from_file.to_xml_string().unwrap(),
        from_memory.to_xml_string().unwrap()
    );
}

#[test]
fn test_corrupted_file_fails_signature() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("corrupt.xmlcpb");

    let mut writer = Writer::create_file(&path, "Save").unwrap();
    build_large(&mut writer);
    writer.finish_writing_file().unwrap();

    // Inside the first compressed block
    let mut data = fs::read(&path).unwrap();
    data[FileHeader::SIZE + 20] ^= 0xFF;
    fs::write(&path, &data).unwrap();

    assert!(matches!(
        Reader::read_binary_file(&path),
        Err(Error::SignatureMismatch)
    ));

    // Without the check the damage surfaces while inflating or decoding
    let unchecked = ReaderConfig {
        verify_md5: false,
        ..ReaderConfig::default()
    };
    assert!(Reader::read_binary_file_with_config(&path, unchecked).is_err());
}

#[test]
fn test_file_without_signature() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("plain.xmlcpb");

    let config = WriterConfig {
        write_md5: false,
        compression_level: 0,
        ..WriterConfig::default()
    };
    let mut writer = Writer::init("Save", Some(&path), config).unwrap();
    writer.add_child_node(writer.root(), "Only").unwrap();
    writer.finish_writing_file().unwrap();

    let reader = Reader::read_binary_file(&path).unwrap();
    assert_eq!(reader.header().has_md5, 0);
    assert_eq!(reader.root().unwrap().child(0).unwrap().tag(), "Only");
}

#[test]
fn test_memory_blob_is_not_a_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("blob.xmlcpb");
    let writer = Writer::new("Save");
    let blob = writer.write_all_into_memory().unwrap();
    assert!(xmlcpb::is_xmlcpb(&blob));
    assert!(blob.len() > FileHeader::SIZE);

    // The raw payload does not parse as block framing
    fs::write(&path, &blob).unwrap();
    assert!(Reader::read_binary_file(&path).is_err());
}

#[test]
fn test_oversized_header_sizes_fail_cleanly() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("huge.xmlcpb");

    let mut header = FileHeader::new();
    header.size_nodes = u32::MAX;
    header.size_attr_sets = u32::MAX;
    header.tags.size_bytes = u32::MAX;
    header.attr_names.size_bytes = u32::MAX;
    header.strings_data.size_bytes = u32::MAX;
    header.num_nodes = u32::MAX;

    let mut data = header.as_bytes().to_vec();
    data.extend_from_slice(&u32::MAX.to_le_bytes());
    data.extend_from_slice(&1u32.to_le_bytes());
    data.push(0);
    fs::write(&path, &data).unwrap();

    assert!(matches!(
        Reader::read_binary_file(&path),
        Err(Error::Truncated(_))
    ));
}

#[test]
fn test_file_writer_rejects_memory_finish() {
    let dir = TempDir::new().unwrap();
    let writer = Writer::create_file(dir.path().join("x.xmlcpb"), "Save").unwrap();
    assert!(matches!(
        writer.write_all_into_memory(),
        Err(Error::WrongMode("file"))
    ));
}

#[test]
fn test_missing_file() {
    let dir = TempDir::new().unwrap();
    assert!(matches!(
        Reader::read_binary_file(dir.path().join("absent.xmlcpb")),
        Err(Error::Io(_))
    ));
}
