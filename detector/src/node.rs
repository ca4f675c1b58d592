// node.rs — DFA states and the arena that owns them
//
// A node owns its phase multiset and an ordered map of outgoing edges keyed
// by the low endpoint of each edge's first interval. Nodes live in an arena
// indexed by NodeId; parents store child ids, the graph keeps the reference
// counts, and slot reuse goes through a free list. Edges of one node are
// pairwise disjoint in their gap ranges; an edge is split whenever its
// target or completion marks would differ across its range.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::gap::{GapKey, GapRanges};
use crate::set::PhaseSet;
use crate::tag::TagId;

/// Index of a node slot in the graph's arena.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct NodeId(pub u32);

/// One outgoing transition: the measured gap falls in `ranges`, the
/// automaton moves to `target`. Tags listed in `completes` finish a full
/// burst when this edge is taken.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub ranges: GapRanges,
    pub target: NodeId,
    pub completes: BTreeSet<TagId>,
}

/// A DFA state.
#[derive(Debug, Clone)]
pub struct Node {
    pub set: PhaseSet,
    pub edges: BTreeMap<GapKey, Edge>,
    /// Incoming edge count; the node is destroyed when it reaches zero.
    pub refs: u32,
    /// Traversal generation mark, see Graph::new_stamp.
    pub stamp: u32,
}

impl Node {
    pub fn new(set: PhaseSet) -> Self {
        Node {
            set,
            edges: BTreeMap::new(),
            refs: 0,
            stamp: 0,
        }
    }

    pub fn edge_keys(&self) -> Vec<GapKey> {
        self.edges.keys().copied().collect()
    }

    /// Insert an edge, folding it into an existing edge with the same
    /// target and completion marks. Returns true when a new edge entry was
    /// created (the caller then owes the target one reference).
    pub fn put_edge(
        &mut self,
        ranges: GapRanges,
        target: NodeId,
        completes: BTreeSet<TagId>,
    ) -> bool {
        debug_assert!(!ranges.is_empty());
        let merge_key = self
            .edges
            .iter()
            .find(|(_, e)| e.target == target && e.completes == completes)
            .map(|(&k, _)| k);
        if let Some(k) = merge_key {
            let e = self.edges.remove(&k).unwrap();
            let merged = e.ranges.union(&ranges);
            self.edges.insert(
                GapKey(merged.low()),
                Edge {
                    ranges: merged,
                    target,
                    completes,
                },
            );
            false
        } else {
            let prev = self.edges.insert(
                GapKey(ranges.low()),
                Edge {
                    ranges,
                    target,
                    completes,
                },
            );
            debug_assert!(prev.is_none());
            true
        }
    }

    pub fn remove_edge(&mut self, key: GapKey) -> Option<Edge> {
        self.edges.remove(&key)
    }
}

/// Node storage with slot reuse.
#[derive(Debug, Default)]
pub struct Arena {
    slots: Vec<Option<Node>>,
    free: Vec<u32>,
}

impl Arena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, node: Node) -> NodeId {
        match self.free.pop() {
            Some(i) => {
                self.slots[i as usize] = Some(node);
                NodeId(i)
            }
            None => {
                self.slots.push(Some(node));
                NodeId(self.slots.len() as u32 - 1)
            }
        }
    }

    pub fn free(&mut self, id: NodeId) {
        debug_assert!(self.slots[id.0 as usize].is_some());
        self.slots[id.0 as usize] = None;
        self.free.push(id.0);
    }

    pub fn get(&self, id: NodeId) -> &Node {
        self.slots[id.0 as usize]
            .as_ref()
            .unwrap_or_else(|| panic!("dangling node id {}", id.0))
    }

    pub fn get_mut(&mut self, id: NodeId) -> &mut Node {
        self.slots[id.0 as usize]
            .as_mut()
            .unwrap_or_else(|| panic!("dangling node id {}", id.0))
    }

    pub fn contains(&self, id: NodeId) -> bool {
        (id.0 as usize) < self.slots.len() && self.slots[id.0 as usize].is_some()
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|n| (NodeId(i as u32), n)))
    }

    pub fn ids(&self) -> Vec<NodeId> {
        self.iter().map(|(id, _)| id).collect()
    }
}
