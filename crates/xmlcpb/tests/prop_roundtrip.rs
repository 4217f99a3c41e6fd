//! Random trees read back as written.

use proptest::prelude::*;
use xmlcpb::{AttrValue, NodeRef, Reader, Writer};

#[derive(Debug, Clone)]
enum Value {
    Int(i64),
    Float(f32),
    Vec3([f32; 3]),
    Text(String),
    Blob(Vec<u8>),
}

#[derive(Debug, Clone)]
struct Tree {
    tag: String,
    attrs: Vec<(String, Value)>,
    children: Vec<Tree>,
}

fn float() -> impl Strategy<Value = f32> {
    prop_oneof![
        Just(0.0f32),
        Just(1.0),
        Just(-1.0),
        (-128i8..=127).prop_map(|t| f32::from(t) / 10.0),
        (-1.0e6f32..1.0e6),
    ]
}

fn value() -> impl Strategy<Value = Value> {
    prop_oneof![
        prop_oneof![(-300i64..300), any::<i32>().prop_map(i64::from), any::<i64>()]
            .prop_map(Value::Int),
        float().prop_map(Value::Float),
        [float(), float(), float()].prop_map(Value::Vec3),
        "[a-z]{0,12}".prop_map(Value::Text),
        prop::collection::vec(any::<u8>(), 0..40).prop_map(Value::Blob),
    ]
}

fn attrs() -> impl Strategy<Value = Vec<(String, Value)>> {
    // Unique names per node
    prop::collection::btree_map("[a-e]{1,2}", value(), 0..6)
        .prop_map(|map| map.into_iter().collect())
}

fn tree() -> impl Strategy<Value = Tree> {
    let leaf = ("[A-D]", attrs()).prop_map(|(tag, attrs)| Tree {
        tag,
        attrs,
        children: Vec::new(),
    });
    leaf.prop_recursive(4, 200, 80, |inner| {
        ("[A-D]", attrs(), prop::collection::vec(inner, 0..80)).prop_map(
            |(tag, attrs, children)| Tree {
                tag,
                attrs,
                children,
            },
        )
    })
}

fn write(writer: &mut Writer, node: xmlcpb::NodeHandle, tree: &Tree) {
    for (name, value) in &tree.attrs {
        match value {
            Value::Int(v) => writer.add_attr(node, name, *v),
            Value::Float(v) => writer.add_attr(node, name, *v),
            Value::Vec3(v) => writer.add_attr(node, name, *v),
            Value::Text(v) => writer.add_attr(node, name, v.as_str()),
            Value::Blob(v) => writer.add_attr_bytes(node, name, v),
        }
        .unwrap();
    }
    for child in &tree.children {
        let handle = writer.add_child_node(node, &child.tag).unwrap();
        write(writer, handle, child);
    }
}

fn check(node: &NodeRef<'_>, tree: &Tree) {
    assert_eq!(node.tag(), tree.tag);
    assert_eq!(node.num_attrs(), tree.attrs.len());
    for (name, value) in &tree.attrs {
        let read = node.attr(name).unwrap();
        match value {
            Value::Int(v) => assert_eq!(node.read_attr::<i64>(name), Some(*v)),
            Value::Float(v) => assert_eq!(read, AttrValue::Float(*v)),
            Value::Vec3(v) => assert_eq!(read, AttrValue::Vec3(*v)),
            Value::Text(v) => assert_eq!(read, AttrValue::Str(v)),
            Value::Blob(v) => assert_eq!(read, AttrValue::Bytes(v)),
        }
    }
    assert_eq!(node.num_children(), tree.children.len());
    for (child, expected) in node.children().zip(&tree.children) {
        check(&child, expected);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_tree_round_trip(tree in tree()) {
        let mut writer = Writer::new(&tree.tag);
        let root = writer.root();
        write(&mut writer, root, &tree);
        prop_assert!(!writer.has_internal_error());
        let data = writer.write_all_into_memory().unwrap();

        let reader = Reader::read_binary_memory(&data).unwrap();
        let root = reader.root().unwrap();
        prop_assert_eq!(root.global_id(), reader.num_nodes() - 1);
        check(&root, &tree);
    }
}
