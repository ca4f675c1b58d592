// graph.rs — The recognition DFA under incremental tag mutation
//
// Maintains the deterministic state graph for the nondeterministic
// full-burst recognition problem over a changing set of known tags. States
// are multisets of tag phases, deduplicated through a set-to-node index;
// edges carry disjoint gap-range unions. Tags are inserted and erased
// online by splitting and re-joining edges, with copy-on-write node
// augmentation and reference-counted destruction.
//
// Preconditions: tags passed in have been validated by `Tag::new`; params
//                pass `TagParams::validate`.
// Postconditions: after `add_tag` returns, the automaton accepts the tag's
//                 cyclic gap pattern; after `remove_tag`, it does not, and
//                 an add/remove pair with identical params restores the
//                 prior set census.
// Failure modes: duplicate add and domain errors are returned; consistency
//                failures surface as `InvariantViolation` and poison the
//                graph.
// Side effects: none outside the structure itself; `dump_viz` writes files.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::ambiguity::{Ambiguity, Leave};
use crate::error::GraphError;
use crate::gap::{GapKey, GapRanges};
use crate::node::{Arena, Edge, Node, NodeId};
use crate::phase::TagPhase;
use crate::set::PhaseSet;
use crate::tag::{Tag, TagId, TagParams};

// ── Public types ────────────────────────────────────────────────────────────

/// Result of a successful addition.
#[derive(Debug, Clone)]
pub struct AddOutcome {
    /// The tag as passed in.
    pub primary: Arc<Tag>,
    /// The proxy now standing in for it, when the pattern collided with a
    /// live tag.
    pub proxy: Option<Arc<Tag>>,
}

/// Result of a removal request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoveOutcome {
    /// The tag owned its pattern; the pattern was erased from the graph.
    Removed,
    /// The tag left its ambiguity group, which still has two or more
    /// members; the graph is untouched.
    StillAmbiguous { proxy: TagId },
    /// The ambiguity group shrank to one member; the proxy dissolved and
    /// the survivor now owns the pattern.
    ProxyDissolved { survivor: TagId },
    /// The tag was never added. No-op.
    NotPresent,
}

/// Where a tag's phases live, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FindLocation {
    pub node: NodeId,
    pub phase: u8,
    /// The identity actually present in node sets: the tag itself, or the
    /// proxy standing in for it.
    pub resolved: TagId,
}

/// A live pattern owner (real tag or proxy) and the params it was inserted
/// with.
#[derive(Debug, Clone)]
pub(crate) struct TagEntry {
    pub tag: Arc<Tag>,
    pub params: TagParams,
}

// ── Graph ───────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct Graph {
    label: String,
    arena: Arena,
    root: NodeId,
    set_to_node: HashMap<PhaseSet, NodeId>,
    stamp: u32,
    ambiguity: Ambiguity,
    /// Real tags currently added, keyed by motus id.
    tags: HashMap<TagId, Arc<Tag>>,
    /// Structural pattern owners: a real id, or a proxy id once ambiguity
    /// collapsed a group onto one pattern.
    occupants: HashMap<TagId, TagEntry>,
    num_viz: u32,
}

impl Graph {
    pub fn new(label: impl Into<String>) -> Self {
        let mut arena = Arena::new();
        let root_set = PhaseSet::singleton(TagPhase::virtual_start());
        let root = arena.alloc(Node::new(root_set.clone()));
        // the waiting self-loop: any gap at all keeps us ready for a first
        // pulse
        arena
            .get_mut(root)
            .put_edge(GapRanges::unbounded(), root, BTreeSet::new());
        arena.get_mut(root).refs = 1;
        let mut set_to_node = HashMap::new();
        set_to_node.insert(root_set, root);
        Graph {
            label: label.into(),
            arena,
            root,
            set_to_node,
            stamp: 0,
            ambiguity: Ambiguity::new(),
            tags: HashMap::new(),
            occupants: HashMap::new(),
            num_viz: 0,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn root_id(&self) -> NodeId {
        self.root
    }

    pub fn node_count(&self) -> usize {
        self.arena.len()
    }

    pub fn set_count(&self) -> usize {
        self.set_to_node.len()
    }

    pub fn edge_count(&self) -> usize {
        self.arena.iter().map(|(_, n)| n.edges.len()).sum()
    }

    /// Number of real tags currently added.
    pub fn tag_count(&self) -> usize {
        self.tags.len()
    }

    pub fn ambiguity(&self) -> &Ambiguity {
        &self.ambiguity
    }

    /// Multiset of node payload sets, the observational identity of the
    /// graph: two graphs recognizing the same patterns have equal censuses.
    pub fn set_census(&self) -> BTreeMap<PhaseSet, usize> {
        let mut census = BTreeMap::new();
        for (_, node) in self.arena.iter() {
            *census.entry(node.set.clone()).or_insert(0) += 1;
        }
        census
    }

    /// Read access to one node. Panics on a dangling id.
    pub fn node(&self, id: NodeId) -> &Node {
        self.arena.get(id)
    }

    /// Iterate live nodes in id order.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.arena.iter()
    }

    pub(crate) fn arena(&self) -> &Arena {
        &self.arena
    }

    pub(crate) fn set_index(&self) -> &HashMap<PhaseSet, NodeId> {
        &self.set_to_node
    }

    pub(crate) fn occupant_entries(&self) -> &HashMap<TagId, TagEntry> {
        &self.occupants
    }

    // ── Tag addition ────────────────────────────────────────────────────

    /// Register a tag so the automaton accepts any gap sequence matching
    /// its cyclic pattern within tolerance.
    pub fn add_tag(
        &mut self,
        tag: Arc<Tag>,
        params: &TagParams,
    ) -> Result<AddOutcome, GraphError> {
        params.validate()?;
        let id = tag.id();
        if self.tags.contains_key(&id) {
            return Err(GraphError::DuplicateTag(id));
        }

        if let Some(occupant) = self.pattern_match(&tag, params) {
            let entry = self
                .occupants
                .remove(&occupant)
                .ok_or_else(|| poisoned("occupant missing its entry"))?;
            let proxy = self.ambiguity.join(occupant, &entry.tag, id);
            self.rename_tag_internal(occupant, proxy.id())?;
            self.occupants.insert(
                proxy.id(),
                TagEntry {
                    tag: proxy.clone(),
                    params: entry.params,
                },
            );
            self.tags.insert(id, tag.clone());
            debug!(
                graph = %self.label,
                tag = %id,
                proxy = %proxy.id(),
                "tag folded into ambiguity group"
            );
            return Ok(AddOutcome {
                primary: tag,
                proxy: Some(proxy),
            });
        }

        let tp0 = TagPhase::new(id, 0);
        self.mutate_root_set(|s| {
            s.insert(tp0);
        });
        for phase in 0..tag.phase_count() {
            self.insert_phase(self.root, &tag, phase, params);
        }
        self.occupants.insert(
            id,
            TagEntry {
                tag: tag.clone(),
                params: *params,
            },
        );
        self.tags.insert(id, tag.clone());
        debug!(
            graph = %self.label,
            tag = %id,
            nodes = self.node_count(),
            edges = self.edge_count(),
            "tag inserted"
        );
        Ok(AddOutcome {
            primary: tag,
            proxy: None,
        })
    }

    // ── Tag removal ─────────────────────────────────────────────────────

    /// Withdraw a tag. Inverse of `add_tag` when called with the same
    /// params.
    pub fn remove_tag(
        &mut self,
        id: TagId,
        params: &TagParams,
    ) -> Result<RemoveOutcome, GraphError> {
        params.validate()?;
        if self.tags.remove(&id).is_none() {
            return Ok(RemoveOutcome::NotPresent);
        }
        let outcome = match self.ambiguity.leave(id) {
            Leave::Remaining { proxy } => RemoveOutcome::StillAmbiguous { proxy },
            Leave::Dissolved { proxy, survivor } => {
                let entry = self
                    .occupants
                    .remove(&proxy)
                    .ok_or_else(|| poisoned("dissolved proxy missing its entry"))?;
                self.rename_tag_internal(proxy, survivor)?;
                if !self.tags.contains_key(&survivor) {
                    return Err(poisoned("proxy survivor is not live"));
                }
                // the survivor inherits the pattern as originally inserted
                self.occupants.insert(
                    survivor,
                    TagEntry {
                        tag: Arc::new(Tag::relabeled(survivor, &entry.tag)),
                        params: entry.params,
                    },
                );
                RemoveOutcome::ProxyDissolved { survivor }
            }
            Leave::NotMember => {
                let entry = self
                    .occupants
                    .remove(&id)
                    .ok_or_else(|| poisoned("live tag is neither occupant nor proxied"))?;
                for phase in 0..entry.tag.phase_count() {
                    self.erase_phase(self.root, &entry.tag, phase, params);
                }
                self.mutate_root_set(|s| {
                    s.remove(TagPhase::new(id, 0));
                });
                RemoveOutcome::Removed
            }
        };
        debug!(
            graph = %self.label,
            tag = %id,
            outcome = ?outcome,
            nodes = self.node_count(),
            "tag removed"
        );
        Ok(outcome)
    }

    // ── Diagnostics ─────────────────────────────────────────────────────

    /// Locate a tag's phases in the graph, resolving through its proxy.
    pub fn find(&self, id: TagId) -> Option<FindLocation> {
        let resolved = self.ambiguity.proxy_for(id).unwrap_or(id);
        self.occupants.get(&resolved)?;
        let mut fallback = None;
        for (nid, node) in self.arena.iter() {
            if let Some(tp) = node.set.phases_of(resolved).next() {
                if nid == self.root {
                    fallback = Some(FindLocation {
                        node: nid,
                        phase: tp.phase,
                        resolved,
                    });
                    continue;
                }
                return Some(FindLocation {
                    node: nid,
                    phase: tp.phase,
                    resolved,
                });
            }
        }
        fallback
    }

    /// Write the automaton in Graphviz DOT form to `"{prefix}{NNN}.gv"`,
    /// numbering successive dumps.
    pub fn dump_viz(&mut self, prefix: &str) -> std::io::Result<PathBuf> {
        let path = PathBuf::from(format!("{prefix}{:03}.gv", self.num_viz));
        self.num_viz += 1;
        let body = crate::dot::emit_dot(self);
        std::fs::write(&path, body)?;
        Ok(path)
    }

    // ── Traversal stamps ────────────────────────────────────────────────

    /// Bump the traversal generation. On wrap every node is restamped to 0
    /// and the counter restarts at 1, so a stale stamp can never read as
    /// visited.
    fn new_stamp(&mut self) -> u32 {
        if self.stamp == u32::MAX {
            for id in self.arena.ids() {
                self.arena.get_mut(id).stamp = 0;
            }
            self.stamp = 1;
        } else {
            self.stamp += 1;
        }
        self.stamp
    }

    /// Breadth-first order over reachable nodes, marking visits with a
    /// fresh stamp.
    pub(crate) fn traversal_order(&mut self) -> Vec<NodeId> {
        let stamp = self.new_stamp();
        let mut order = Vec::with_capacity(self.arena.len());
        let mut queue = VecDeque::new();
        self.arena.get_mut(self.root).stamp = stamp;
        queue.push_back(self.root);
        while let Some(n) = queue.pop_front() {
            order.push(n);
            let targets: Vec<NodeId> =
                self.arena.get(n).edges.values().map(|e| e.target).collect();
            for t in targets {
                if self.arena.get(t).stamp != stamp {
                    self.arena.get_mut(t).stamp = stamp;
                    queue.push_back(t);
                }
            }
        }
        order
    }

    // ── Insertion internals ─────────────────────────────────────────────

    fn insert_phase(&mut self, n: NodeId, tag: &Tag, phase: u8, params: &TagParams) {
        if !self
            .arena
            .get(n)
            .set
            .contains(TagPhase::new(tag.id(), phase))
        {
            return;
        }
        self.build_phase_edges(n, tag, phase, params);
    }

    /// Make node `n` carry the transition `(tag, phase) -> (tag, phase+1)`
    /// over the phase's gap ranges, splitting existing edges where ranges
    /// overlap and recursing into every node whose set is new to the index.
    fn build_phase_edges(&mut self, n: NodeId, tag: &Tag, phase: u8, params: &TagParams) {
        let gr = tag.phase_ranges(phase, params);
        if gr.is_empty() {
            return;
        }
        let terminal = phase + 1 == tag.phase_count();
        let next_phase = if terminal { 0 } else { phase + 1 };
        let tp_to = TagPhase::new(tag.id(), next_phase);
        trace!(node = n.0, tag = %tag.id(), phase, terminal, "build edges");

        // Edge surgery re-keys and merges entries, so the map is re-scanned
        // after every step; `handled` accumulates the range mass already
        // processed and keeps the sweep from revisiting it.
        let mut handled = GapRanges::empty();
        while let Some((key, edge, ov)) = self.next_overlap(n, &gr, &handled) {
            handled = handled.union(&ov);
            let full = ov == edge.ranges;

            let mut ov_completes = edge.completes.clone();
            if terminal {
                ov_completes.insert(tag.id());
            }

            let (ov_target, fresh) = if terminal && edge.target == self.root {
                // wrap joins the start node this burst-gap edge already
                // aims at; only the completion mark changes
                (self.root, None)
            } else if edge.target == self.root {
                // an advancing phase crosses a completed-burst edge: the
                // overlap needs a node holding both the wrapped starts and
                // the advancing phase
                let mut set = PhaseSet::new();
                for &c in &edge.completes {
                    set.insert(TagPhase::new(c, 0));
                }
                set.insert(tp_to);
                let (m, is_new) = self.node_for_set(set.clone());
                let deltas =
                    is_new.then(|| set.iter().map(|(tp, _)| tp).collect::<Vec<_>>());
                (m, deltas)
            } else {
                let sole = full && self.arena.get(edge.target).refs == 1;
                let (m, is_new) = self.augmented(edge.target, tp_to, sole);
                (m, is_new.then(|| vec![tp_to]))
            };

            if !(ov_target == edge.target && ov_completes == edge.completes) {
                self.unlink_edge(n, key);
                if !full {
                    let rest = edge.ranges.difference(&ov);
                    self.link_edge(n, rest, edge.target, edge.completes.clone());
                }
                self.link_edge(n, ov, ov_target, ov_completes);
                self.destroy_if_dead(edge.target);
            }
            if let Some(tps) = fresh {
                self.build_for(ov_target, &tps, tag, params);
            }
        }

        let remaining = self.uncovered(n, &gr);
        if !remaining.is_empty() {
            if terminal {
                let mut marks = BTreeSet::new();
                marks.insert(tag.id());
                self.link_edge(n, remaining, self.root, marks);
            } else {
                let (m, is_new) = self.node_for_set(PhaseSet::singleton(tp_to));
                self.link_edge(n, remaining, m, BTreeSet::new());
                if is_new {
                    self.build_phase_edges(m, tag, next_phase, params);
                }
            }
        }
        if n == self.root {
            self.rebalance_self_loop();
        }
    }

    /// Build outgoing structure on `node` for each listed phase, looking
    /// patterns of other tags up in the occupant registry.
    fn build_for(&mut self, node: NodeId, tps: &[TagPhase], cur: &Tag, cur_params: &TagParams) {
        for &tp in tps {
            if tp.tag == cur.id() {
                self.build_phase_edges(node, cur, tp.phase, cur_params);
            } else if let Some(entry) = self.occupants.get(&tp.tag).cloned() {
                self.build_phase_edges(node, &entry.tag, tp.phase, &entry.params);
            }
        }
    }

    /// The node standing for `m`'s set plus one occurrence of `tp`.
    /// Mutates in place only when `sole` guarantees the calling edge is
    /// `m`'s single parent; otherwise copy-on-write. Returns the node and
    /// whether its set is new to the index (callers then owe it edge
    /// structure for the added phase).
    fn augmented(&mut self, m: NodeId, tp: TagPhase, sole: bool) -> (NodeId, bool) {
        debug_assert_ne!(m, self.root);
        let new_set = self.arena.get(m).set.with(tp);
        if let Some(&existing) = self.set_to_node.get(&new_set) {
            return (existing, false);
        }
        if sole {
            let old = self.arena.get(m).set.clone();
            self.set_to_node.remove(&old);
            self.arena.get_mut(m).set = new_set.clone();
            self.set_to_node.insert(new_set, m);
            (m, true)
        } else {
            (self.clone_with_set(m, new_set), true)
        }
    }

    // ── Erasure internals ───────────────────────────────────────────────

    fn erase_phase(&mut self, n: NodeId, tag: &Tag, phase: u8, params: &TagParams) {
        if !self
            .arena
            .get(n)
            .set
            .contains(TagPhase::new(tag.id(), phase))
        {
            return;
        }
        self.strip_phase_edges(n, tag, phase, params);
    }

    /// Mirror of `build_phase_edges`: remove the transition
    /// `(tag, phase) -> (tag, phase+1)` from `n`'s edges, reducing targets
    /// and recursing into every node whose reduced set is new to the index.
    fn strip_phase_edges(&mut self, n: NodeId, tag: &Tag, phase: u8, params: &TagParams) {
        let gr = tag.phase_ranges(phase, params);
        if gr.is_empty() {
            return;
        }
        let terminal = phase + 1 == tag.phase_count();
        let next_phase = if terminal { 0 } else { phase + 1 };
        let tp_to = TagPhase::new(tag.id(), next_phase);
        trace!(node = n.0, tag = %tag.id(), phase, terminal, "strip edges");

        let mut handled = GapRanges::empty();
        while let Some((key, edge, ov)) = self.next_overlap(n, &gr, &handled) {
            handled = handled.union(&ov);
            let carries = if terminal {
                edge.completes.contains(&tag.id())
            } else {
                edge.target != self.root && self.arena.get(edge.target).set.contains(tp_to)
            };
            if !carries {
                continue;
            }
            let full = ov == edge.ranges;

            let mut ov_completes = edge.completes.clone();
            if terminal {
                ov_completes.remove(&tag.id());
            }

            let outcome = if edge.target == self.root {
                // burst-gap edge: drop the overlap once no mark remains
                if ov_completes.is_empty() {
                    None
                } else {
                    Some((self.root, false))
                }
            } else {
                let sole = full && self.arena.get(edge.target).refs == 1;
                self.reduced(edge.target, tp_to, sole, &ov_completes)
            };

            match outcome {
                None => {
                    self.unlink_edge(n, key);
                    if !full {
                        let rest = edge.ranges.difference(&ov);
                        self.link_edge(n, rest, edge.target, edge.completes.clone());
                    }
                    self.destroy_if_dead(edge.target);
                }
                Some((new_target, fresh)) => {
                    if !(new_target == edge.target && ov_completes == edge.completes) {
                        self.unlink_edge(n, key);
                        if !full {
                            let rest = edge.ranges.difference(&ov);
                            self.link_edge(n, rest, edge.target, edge.completes.clone());
                        }
                        self.link_edge(n, ov, new_target, ov_completes);
                        self.destroy_if_dead(edge.target);
                    }
                    if fresh {
                        self.strip_phase_edges(new_target, tag, next_phase, params);
                    }
                }
            }
        }
        if n == self.root {
            self.rebalance_self_loop();
        }
    }

    /// The node standing for `m`'s set minus one occurrence of `tp`, or
    /// `None` when the set empties and the edge part should be dropped.
    /// A reduced set holding exactly the wrapped start phases of
    /// `marks_after` folds back into the root.
    fn reduced(
        &mut self,
        m: NodeId,
        tp: TagPhase,
        sole: bool,
        marks_after: &BTreeSet<TagId>,
    ) -> Option<(NodeId, bool)> {
        debug_assert_ne!(m, self.root);
        if !self.arena.get(m).set.contains(tp) {
            return Some((m, false));
        }
        let new_set = self.arena.get(m).set.without(tp);
        if new_set.is_empty() {
            return None;
        }
        if !marks_after.is_empty() && is_wrap_set(&new_set, marks_after) {
            return Some((self.root, false));
        }
        if let Some(&existing) = self.set_to_node.get(&new_set) {
            return Some((existing, false));
        }
        if sole {
            let old = self.arena.get(m).set.clone();
            self.set_to_node.remove(&old);
            self.arena.get_mut(m).set = new_set.clone();
            self.set_to_node.insert(new_set, m);
            Some((m, true))
        } else {
            Some((self.clone_with_set(m, new_set), true))
        }
    }

    // ── Canonicalization and plumbing ───────────────────────────────────

    /// The next edge of `n` carrying overlap mass in `gr` that is not yet
    /// in `handled`. Returns an edge snapshot together with that overlap.
    /// The root's waiting self-loop is never offered.
    fn next_overlap(
        &self,
        n: NodeId,
        gr: &GapRanges,
        handled: &GapRanges,
    ) -> Option<(GapKey, Edge, GapRanges)> {
        for (&key, e) in self.arena.get(n).edges.iter() {
            if n == self.root && e.target == self.root && e.completes.is_empty() {
                continue;
            }
            let ov = e.ranges.intersect(gr).difference(handled);
            if !ov.is_empty() {
                return Some((key, e.clone(), ov));
            }
        }
        None
    }

    /// The part of `gr` covered by none of `n`'s tag edges.
    fn uncovered(&self, n: NodeId, gr: &GapRanges) -> GapRanges {
        let mut remaining = gr.clone();
        for e in self.arena.get(n).edges.values() {
            if n == self.root && e.target == self.root && e.completes.is_empty() {
                continue;
            }
            remaining = remaining.difference(&e.ranges);
            if remaining.is_empty() {
                break;
            }
        }
        remaining
    }

    fn node_for_set(&mut self, set: PhaseSet) -> (NodeId, bool) {
        if let Some(&n) = self.set_to_node.get(&set) {
            return (n, false);
        }
        let id = self.arena.alloc(Node::new(set.clone()));
        self.set_to_node.insert(set, id);
        (id, true)
    }

    /// Copy-on-write: a new node with `set`, sharing `m`'s outgoing edges.
    fn clone_with_set(&mut self, m: NodeId, set: PhaseSet) -> NodeId {
        let (edges, stamp) = {
            let src = self.arena.get(m);
            (src.edges.clone(), src.stamp)
        };
        let targets: Vec<NodeId> = edges.values().map(|e| e.target).collect();
        let mut node = Node::new(set.clone());
        node.edges = edges;
        node.stamp = stamp;
        let id = self.arena.alloc(node);
        for t in targets {
            self.arena.get_mut(t).refs += 1;
        }
        self.set_to_node.insert(set, id);
        id
    }

    fn link_edge(
        &mut self,
        n: NodeId,
        ranges: GapRanges,
        target: NodeId,
        completes: BTreeSet<TagId>,
    ) {
        if ranges.is_empty() {
            return;
        }
        if self.arena.get_mut(n).put_edge(ranges, target, completes) {
            self.arena.get_mut(target).refs += 1;
        }
    }

    fn unlink_edge(&mut self, n: NodeId, key: GapKey) -> Option<Edge> {
        let e = self.arena.get_mut(n).remove_edge(key)?;
        let refs = &mut self.arena.get_mut(e.target).refs;
        debug_assert!(*refs > 0);
        *refs -= 1;
        Some(e)
    }

    /// Free a node once nothing points at it, cascading through its own
    /// edges. The root is never destroyed.
    fn destroy_if_dead(&mut self, start: NodeId) {
        let mut work = vec![start];
        while let Some(id) = work.pop() {
            if id == self.root || !self.arena.contains(id) || self.arena.get(id).refs > 0 {
                continue;
            }
            let set = self.arena.get(id).set.clone();
            let removed = self.set_to_node.remove(&set);
            debug_assert_eq!(removed, Some(id));
            let targets: Vec<NodeId> = self
                .arena
                .get(id)
                .edges
                .values()
                .map(|e| e.target)
                .collect();
            self.arena.free(id);
            for t in targets {
                let refs = &mut self.arena.get_mut(t).refs;
                debug_assert!(*refs > 0);
                *refs -= 1;
                if *refs == 0 {
                    work.push(t);
                }
            }
        }
    }

    /// Keep the root's waiting self-loop equal to the complement of its
    /// tag edges, so the root's edges always partition the positive axis.
    fn rebalance_self_loop(&mut self) {
        let root = self.root;
        let mut cover = GapRanges::empty();
        let mut loop_key = None;
        for (&k, e) in self.arena.get(root).edges.iter() {
            if e.target == root && e.completes.is_empty() {
                loop_key = Some(k);
            } else {
                cover = cover.union(&e.ranges);
            }
        }
        let desired = GapRanges::unbounded().difference(&cover);
        if let Some(k) = loop_key {
            let unchanged = self
                .arena
                .get(root)
                .edges
                .get(&k)
                .map(|e| e.ranges == desired)
                .unwrap_or(false);
            if unchanged {
                return;
            }
            self.unlink_edge(root, k);
        }
        // tag edges are bounded by max_time, so the complement keeps an
        // unbounded tail and is never empty
        self.link_edge(root, desired, root, BTreeSet::new());
    }

    fn mutate_root_set(&mut self, f: impl FnOnce(&mut PhaseSet)) {
        let old = self.arena.get(self.root).set.clone();
        self.set_to_node.remove(&old);
        f(&mut self.arena.get_mut(self.root).set);
        let new = self.arena.get(self.root).set.clone();
        let prev = self.set_to_node.insert(new, self.root);
        debug_assert!(prev.is_none());
    }

    /// Replace every phase of `from` with `to` across all node sets and
    /// completion marks, re-indexing touched nodes.
    fn rename_tag_internal(&mut self, from: TagId, to: TagId) -> Result<(), GraphError> {
        for nid in self.arena.ids() {
            let node = self.arena.get(nid);
            let touches_set = node.set.has_tag(from);
            let touches_marks = node.edges.values().any(|e| e.completes.contains(&from));
            if !touches_set && !touches_marks {
                continue;
            }
            if touches_set {
                let old = node.set.clone();
                let mut new = old.clone();
                new.rename_tag(from, to);
                self.set_to_node.remove(&old);
                if self.set_to_node.contains_key(&new) {
                    return Err(poisoned("rename produced a set collision"));
                }
                self.set_to_node.insert(new.clone(), nid);
                self.arena.get_mut(nid).set = new;
            }
            if touches_marks {
                for key in self.arena.get(nid).edge_keys() {
                    if let Some(e) = self.arena.get_mut(nid).edges.get_mut(&key) {
                        if e.completes.remove(&from) {
                            e.completes.insert(to);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Probe live pattern owners for one this tag cannot be told apart
    /// from: same nominal frequency, same cycle length, every gap window
    /// overlapping.
    fn pattern_match(&self, tag: &Tag, params: &TagParams) -> Option<TagId> {
        self.occupants
            .iter()
            .filter(|(_, entry)| {
                let o = &entry.tag;
                o.same_freq(tag)
                    && o.phase_count() == tag.phase_count()
                    && (0..tag.phase_count() as usize).all(|i| {
                        GapRanges::single(o.gaps()[i], params.tol, params.time_fuzz).overlaps(
                            &GapRanges::single(tag.gaps()[i], params.tol, params.time_fuzz),
                        )
                    })
            })
            .map(|(&id, _)| id)
            .min()
    }
}

/// Whether `set` is exactly one wrapped start phase per completion mark.
fn is_wrap_set(set: &PhaseSet, marks: &BTreeSet<TagId>) -> bool {
    set.len() == marks.len()
        && set
            .iter()
            .all(|(tp, c)| tp.phase == 0 && c == 1 && marks.contains(&tp.tag))
}

fn poisoned(msg: &'static str) -> GraphError {
    GraphError::InvariantViolation { failed: vec![msg] }
}

// ── Tests ───────────────────────────────────────────────────────────────────
