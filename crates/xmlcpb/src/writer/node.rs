//! Live writer nodes.
//!
//! A node is "live" from its creation until it is compacted into the node
//! buffer. Live nodes sit in a slot arena; callers hold [`NodeHandle`]s that
//! pair a slot index with the slot's generation, so a handle that outlives its
//! node is detected instead of silently addressing whatever reuses the slot.

use tracing::warn;

use crate::attr::Payload;
use crate::format::CHILDREN_PER_BLOCK;
use crate::{Error, Result};

/// Handle to a node of a [`Writer`](crate::Writer).
///
/// Handles are cheap to copy. Once the node has been compacted every call
/// through the handle fails with [`Error::StaleNode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeHandle {
    pub(crate) slot: u32,
    pub(crate) generation: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NodeState {
    Free,
    /// Accepts attributes and children.
    Open,
    /// Complete, waiting for its parent's block to be compacted.
    Done,
}

#[derive(Debug)]
pub(crate) struct LiveAttr {
    pub header: u16,
    pub payload: Payload,
}

#[derive(Debug)]
pub(crate) struct LiveNode {
    pub generation: u32,
    pub state: NodeState,
    pub parent: Option<u32>,
    pub tag_id: u16,
    pub attrs: Vec<LiveAttr>,
    /// Slots of children not compacted yet, at most one block.
    pub pending_children: Vec<u32>,
    /// The most recently added child, while it is still open.
    pub open_child: Option<u32>,
    /// Global id of the last child of every compacted block.
    pub child_blocks: Vec<u32>,
    pub num_children: u32,
}

impl LiveNode {
    fn vacant() -> Self {
        Self {
            generation: 0,
            state: NodeState::Free,
            parent: None,
            tag_id: 0,
            attrs: Vec::new(),
            pending_children: Vec::new(),
            open_child: None,
            child_blocks: Vec::new(),
            num_children: 0,
        }
    }

    pub fn is_block_full(&self) -> bool {
        self.pending_children.len() >= CHILDREN_PER_BLOCK
    }
}

/// Slot arena of live nodes with a free list.
#[derive(Debug)]
pub(crate) struct LiveNodePool {
    nodes: Vec<LiveNode>,
    free: Vec<u32>,
    initial_capacity: usize,
    active: usize,
    peak: usize,
}

impl LiveNodePool {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut pool = Self {
            nodes: Vec::with_capacity(capacity),
            free: Vec::with_capacity(capacity),
            initial_capacity: capacity,
            active: 0,
            peak: 0,
        };
        pool.grow(capacity);
        pool
    }

    fn grow(&mut self, additional: usize) {
        let start = self.nodes.len() as u32;
        self.nodes
            .extend(std::iter::repeat_with(LiveNode::vacant).take(additional));
        // Lowest slot is handed out first
        self.free.extend((start..start + additional as u32).rev());
    }

    /// Take a free slot for a new open node.
    pub fn alloc(&mut self, parent: Option<u32>, tag_id: u16) -> u32 {
        if self.free.is_empty() {
            let additional = self.nodes.len();
            if self.nodes.len() == self.initial_capacity {
                warn!(
                    capacity = self.initial_capacity,
                    "live node pool exhausted, growing; consider a larger live_node_pool_size"
                );
            }
            self.grow(additional);
        }
        let Some(slot) = self.free.pop() else {
            unreachable!("pool was just grown");
        };

        let node = &mut self.nodes[slot as usize];
        node.state = NodeState::Open;
        node.parent = parent;
        node.tag_id = tag_id;

        self.active += 1;
        self.peak = self.peak.max(self.active);
        slot
    }

    /// Return a compacted node's slot. Handles to it become stale.
    pub fn release(&mut self, slot: u32) {
        let node = &mut self.nodes[slot as usize];
        node.generation = node.generation.wrapping_add(1);
        node.state = NodeState::Free;
        node.parent = None;
        node.attrs.clear();
        node.pending_children.clear();
        node.open_child = None;
        node.child_blocks.clear();
        node.num_children = 0;
        self.free.push(slot);
        self.active -= 1;
    }

    pub fn handle(&self, slot: u32) -> NodeHandle {
        NodeHandle {
            slot,
            generation: self.nodes[slot as usize].generation,
        }
    }

    /// Resolve a handle, rejecting handles to recycled slots.
    pub fn resolve(&self, handle: NodeHandle) -> Result<u32> {
        match self.nodes.get(handle.slot as usize) {
            Some(node) if node.generation == handle.generation && node.state != NodeState::Free => {
                Ok(handle.slot)
            }
            _ => Err(Error::StaleNode {
                slot: handle.slot,
                generation: handle.generation,
            }),
        }
    }

    #[inline]
    pub fn node(&self, slot: u32) -> &LiveNode {
        &self.nodes[slot as usize]
    }

    #[inline]
    pub fn node_mut(&mut self, slot: u32) -> &mut LiveNode {
        &mut self.nodes[slot as usize]
    }

    pub fn active(&self) -> usize {
        self.active
    }

    pub fn peak(&self) -> usize {
        self.peak
    }
}
