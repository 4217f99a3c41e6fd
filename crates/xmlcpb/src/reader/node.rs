//! Live reader nodes: lazily decoded views over compacted records.

use hashbrown::HashMap;
use tracing::warn;

use super::Reader;
use crate::format::{split_attr_header, CHILDREN_PER_BLOCK};
use crate::record::child_block_len;
use crate::value::{decode_attr, AttrValue, FromAttrValue};

#[derive(Debug, Default)]
pub(crate) struct ReaderNodeSlot {
    refs: u32,
    global_id: u32,
    pub tag_id: u16,
    pub num_children: u32,
    /// Global id of the last child of each block.
    pub child_blocks: Vec<u32>,
    pub attr_set: Option<u32>,
    /// Offset of every attribute payload in the node buffer.
    pub attr_offsets: Vec<u32>,
    pub attrs_end: u32,
    /// Where the next by-tag search starts.
    next_child: u32,
}

impl ReaderNodeSlot {
    fn child_global_id(&self, index: usize) -> Option<u32> {
        if index >= self.num_children as usize {
            return None;
        }
        let block = index / CHILDREN_PER_BLOCK;
        let last = *self.child_blocks.get(block)?;
        let len = child_block_len(self.num_children, block) as u32;
        Some(last + 1 - len + (index % CHILDREN_PER_BLOCK) as u32)
    }
}

/// Reference-counted slots; a slot returns to the free list when the last
/// [`NodeRef`] to it is dropped.
#[derive(Debug)]
pub(crate) struct ReaderNodePool {
    slots: Vec<ReaderNodeSlot>,
    free: Vec<u32>,
    active: HashMap<u32, u32>,
    initial_capacity: usize,
}

impl ReaderNodePool {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut pool = Self {
            slots: Vec::with_capacity(capacity),
            free: Vec::with_capacity(capacity),
            active: HashMap::with_capacity(capacity),
            initial_capacity: capacity,
        };
        pool.grow(capacity);
        pool
    }

    fn grow(&mut self, additional: usize) {
        let start = self.slots.len() as u32;
        self.slots
            .extend(std::iter::repeat_with(ReaderNodeSlot::default).take(additional));
        self.free.extend((start..start + additional as u32).rev());
    }

    /// Add a reference to the live slot of `global_id`, if there is one.
    pub fn retain_active(&mut self, global_id: u32) -> Option<u32> {
        let slot = *self.active.get(&global_id)?;
        self.slots[slot as usize].refs += 1;
        Some(slot)
    }

    /// Take a slot for `global_id` with one reference.
    pub fn alloc(&mut self, global_id: u32) -> u32 {
        if self.free.is_empty() {
            if self.slots.len() == self.initial_capacity {
                warn!(
                    capacity = self.initial_capacity,
                    "reader node pool exhausted, growing; release NodeRefs sooner or raise live_node_pool_size"
                );
            }
            self.grow(self.slots.len());
        }
        let Some(slot) = self.free.pop() else {
            unreachable!("pool was just grown");
        };

        let node = &mut self.slots[slot as usize];
        node.refs = 1;
        node.global_id = global_id;
        node.next_child = 0;
        self.active.insert(global_id, slot);
        slot
    }

    pub fn retain(&mut self, slot: u32) {
        self.slots[slot as usize].refs += 1;
    }

    /// Drop one reference.
    pub fn release(&mut self, slot: u32) {
        let node = &mut self.slots[slot as usize];
        node.refs -= 1;
        if node.refs == 0 {
            self.active.remove(&node.global_id);
            self.free.push(slot);
        }
    }

    #[inline]
    pub fn slot(&self, slot: u32) -> &ReaderNodeSlot {
        &self.slots[slot as usize]
    }

    #[inline]
    pub fn slot_mut(&mut self, slot: u32) -> &mut ReaderNodeSlot {
        &mut self.slots[slot as usize]
    }

    /// Slots with at least one reference.
    pub fn active(&self) -> usize {
        self.active.len()
    }
}

/// A view of one node of a [`Reader`].
///
/// Views are reference counted: cloning is cheap and every clone keeps the
/// decoded node alive. Lookups that find nothing return `None`.
pub struct NodeRef<'r> {
    reader: &'r Reader,
    slot: u32,
}

impl<'r> NodeRef<'r> {
    /// Wrap a slot that already carries the reference this view owns.
    pub(super) fn new(reader: &'r Reader, slot: u32) -> Self {
        Self { reader, slot }
    }

    fn with<T>(&self, f: impl FnOnce(&ReaderNodeSlot) -> T) -> T {
        f(self.reader.pool.borrow().slot(self.slot))
    }

    /// The node's permanent index in file order.
    pub fn global_id(&self) -> u32 {
        self.with(|node| node.global_id)
    }

    pub fn tag(&self) -> &'r str {
        let tag_id = self.with(|node| node.tag_id);
        self.reader.tags.get(u32::from(tag_id)).unwrap_or_default()
    }

    pub fn num_children(&self) -> usize {
        self.with(|node| node.num_children as usize)
    }

    /// Child by position, locating its block first.
    pub fn child(&self, index: usize) -> Option<NodeRef<'r>> {
        let global_id = self.with(|node| node.child_global_id(index))?;
        self.reader.activate_node(global_id)
    }

    /// First child with the given tag.
    ///
    /// The scan starts after the child found by the previous call and wraps
    /// around, so reading children in order costs one step per lookup.
    pub fn child_by_tag(&self, tag: &str) -> Option<NodeRef<'r>> {
        let tag_id = *self.reader.tag_index.get(tag)?;
        let (index, global_id) = {
            let pool = self.reader.pool.borrow();
            let node = pool.slot(self.slot);
            let len = node.num_children as usize;
            let start = (node.next_child as usize).min(len);
            (start..len).chain(0..start).find_map(|index| {
                let global_id = node.child_global_id(index)?;
                (self.reader.node_tag_id(global_id) == Some(tag_id)).then_some((index, global_id))
            })?
        };
        self.reader.pool.borrow_mut().slot_mut(self.slot).next_child = index as u32 + 1;
        self.reader.activate_node(global_id)
    }

    /// Iterate the children in order.
    pub fn children(&self) -> Children<'r> {
        Children {
            len: self.num_children(),
            parent: self.clone(),
            index: 0,
        }
    }

    pub fn num_attrs(&self) -> usize {
        self.with(|node| node.attr_offsets.len())
    }

    fn attr_header(&self, index: usize) -> Option<u16> {
        let set = self.with(|node| node.attr_set)?;
        self.reader.attr_sets.header_attr(set, index)
    }

    /// Position of the attribute called `name`: a linear scan of the
    /// node's headers, comparing names through the attribute-name table.
    fn attr_index(&self, name: &str) -> Option<usize> {
        let set = self.with(|node| node.attr_set)?;
        self.reader
            .attr_sets
            .headers(set)?
            .iter()
            .position(|&header| {
                self.reader
                    .attr_names
                    .get(u32::from(split_attr_header(header).1))
                    == Some(name)
            })
    }

    pub fn have_attr(&self, name: &str) -> bool {
        self.attr_index(name).is_some()
    }

    /// Decoded value of the attribute called `name`.
    pub fn attr(&self, name: &str) -> Option<AttrValue<'r>> {
        self.attr_value(self.attr_index(name)?)
    }

    /// Attribute converted to `T`; `None` if missing or not convertible.
    pub fn read_attr<T: FromAttrValue<'r>>(&self, name: &str) -> Option<T> {
        T::from_attr_value(self.attr(name)?)
    }

    fn attr_value(&self, index: usize) -> Option<AttrValue<'r>> {
        let ty = split_attr_header(self.attr_header(index)?).0?;
        let (start, end) = self.with(|node| {
            let start = *node.attr_offsets.get(index)?;
            let end = node
                .attr_offsets
                .get(index + 1)
                .copied()
                .unwrap_or(node.attrs_end);
            Some((start as usize, end as usize))
        })?;
        let reader: &'r Reader = self.reader;
        decode_attr(ty, reader.nodes.get(start..end)?, &reader.strings)
    }

    /// Name and value of the attribute at `index`, in write order.
    pub fn attr_at(&self, index: usize) -> Option<(&'r str, AttrValue<'r>)> {
        let name_id = split_attr_header(self.attr_header(index)?).1;
        let name = self.reader.attr_names.get(u32::from(name_id))?;
        Some((name, self.attr_value(index)?))
    }

    /// All attributes in write order.
    pub fn attrs(&self) -> impl Iterator<Item = (&'r str, AttrValue<'r>)> + '_ {
        (0..self.num_attrs()).filter_map(move |index| self.attr_at(index))
    }
}

impl Clone for NodeRef<'_> {
    fn clone(&self) -> Self {
        self.reader.pool.borrow_mut().retain(self.slot);
        Self {
            reader: self.reader,
            slot: self.slot,
        }
    }
}

impl Drop for NodeRef<'_> {
    fn drop(&mut self) {
        self.reader.pool.borrow_mut().release(self.slot);
    }
}

impl std::fmt::Debug for NodeRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeRef")
            .field("global_id", &self.global_id())
            .field("tag", &self.tag())
            .field("num_children", &self.num_children())
            .field("num_attrs", &self.num_attrs())
            .finish()
    }
}

/// Iterator over the children of a node, see [`NodeRef::children`].
pub struct Children<'r> {
    parent: NodeRef<'r>,
    index: usize,
    len: usize,
}

impl<'r> Iterator for Children<'r> {
    type Item = NodeRef<'r>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.index < self.len {
            let index = self.index;
            self.index += 1;
            if let Some(child) = self.parent.child(index) {
                return Some(child);
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.len - self.index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Writer;

    #[test]
    fn test_child_ids_across_blocks() {
        let node = ReaderNodeSlot {
            num_children: 70,
            child_blocks: vec![63, 200],
            ..Default::default()
        };
        assert_eq!(node.child_global_id(0), Some(0));
        assert_eq!(node.child_global_id(63), Some(63));
        // Second block holds 6 children ending at 200
        assert_eq!(node.child_global_id(64), Some(195));
        assert_eq!(node.child_global_id(69), Some(200));
        assert_eq!(node.child_global_id(70), None);
    }

    #[test]
    fn test_pool_recycles_released_slots() {
        let mut pool = ReaderNodePool::new(1);
        let a = pool.alloc(10);
        assert_eq!(pool.retain_active(10), Some(a));
        pool.release(a);
        assert_eq!(pool.active(), 1);
        pool.release(a);
        assert_eq!(pool.active(), 0);
        assert_eq!(pool.retain_active(10), None);
        assert_eq!(pool.alloc(11), a);
    }

    #[test]
    fn test_child_by_tag_wraps_around() {
        let mut writer = Writer::new("root");
        let root = writer.root();
        for tag in ["a", "b", "c"] {
            writer.add_child_node(root, tag).unwrap();
        }
        let data = writer.write_all_into_memory().unwrap();
        let reader = Reader::read_binary_memory(&data).unwrap();
        let root = reader.root().unwrap();

        assert_eq!(root.child_by_tag("c").unwrap().tag(), "c");
        assert_eq!(root.child_by_tag("a").unwrap().tag(), "a");
        assert_eq!(root.child_by_tag("b").unwrap().tag(), "b");
        assert!(root.child_by_tag("root").is_none());
        assert!(root.child_by_tag("missing").is_none());
    }

    #[test]
    fn test_clones_keep_node_alive() {
        let mut writer = Writer::new("root");
        writer.add_attr(writer.root(), "v", 3).unwrap();
        let data = writer.write_all_into_memory().unwrap();
        let reader = Reader::read_binary_memory(&data).unwrap();

        let root = reader.root().unwrap();
        let copy = root.clone();
        drop(root);
        assert_eq!(copy.read_attr::<i32>("v"), Some(3));
        assert_eq!(reader.stats().live_nodes, 1);
    }
}
