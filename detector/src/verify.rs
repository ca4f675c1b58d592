// verify.rs — Machine-checkable graph invariants
//
// One obligation per universal invariant; `verify_graph` evaluates them all
// and returns a cert. Callers either assert `all_pass` in tests or convert
// a failing cert into a poisoning error through `Graph::check`.

use std::collections::BTreeMap;

use crate::error::GraphError;
use crate::graph::Graph;
use crate::node::NodeId;
use crate::phase::TagPhase;
use crate::set::PhaseSet;

/// Evidence that a stage's postconditions hold.
pub trait Cert {
    fn all_pass(&self) -> bool;
    fn obligations(&self) -> Vec<(&'static str, bool)>;
}

/// Machine-checkable evidence for the graph invariants (G1-G7).
#[derive(Debug, Clone)]
pub struct GraphCert {
    /// G1: the set index and the live arena are a bijection.
    pub g1_set_node_bijection: bool,
    /// G2: outgoing edges of every node have pairwise disjoint ranges.
    pub g2_edge_disjointness: bool,
    /// G3: every phase in every set has its full gap window covered by
    /// edges advancing that phase.
    pub g3_coverage: bool,
    /// G4: reference counts equal incoming-edge counts and every node is
    /// reachable from the root.
    pub g4_reachability: bool,
    /// G5: ignoring edges into the root, the graph is a DAG no deeper than
    /// the longest registered cycle.
    pub g5_acyclic_depth: bool,
    /// G6: the root holds the virtual start, owns the only self-loop, and
    /// the self-loop is the exact complement of its tag edges.
    pub g6_root_integrity: bool,
    /// G7: every edge's target set is the one-step image of its source set
    /// over the edge's ranges (containment for edges into the root).
    pub g7_successor_sets: bool,
}

impl Cert for GraphCert {
    fn all_pass(&self) -> bool {
        self.g1_set_node_bijection
            && self.g2_edge_disjointness
            && self.g3_coverage
            && self.g4_reachability
            && self.g5_acyclic_depth
            && self.g6_root_integrity
            && self.g7_successor_sets
    }

    fn obligations(&self) -> Vec<(&'static str, bool)> {
        vec![
            ("G1_set_node_bijection", self.g1_set_node_bijection),
            ("G2_edge_disjointness", self.g2_edge_disjointness),
            ("G3_coverage", self.g3_coverage),
            ("G4_reachability", self.g4_reachability),
            ("G5_acyclic_depth", self.g5_acyclic_depth),
            ("G6_root_integrity", self.g6_root_integrity),
            ("G7_successor_sets", self.g7_successor_sets),
        ]
    }
}

/// Evaluate every invariant. Mutable access is needed only for the stamped
/// reachability sweep.
pub fn verify_graph(g: &mut Graph) -> GraphCert {
    GraphCert {
        g1_set_node_bijection: verify_g1_bijection(g),
        g2_edge_disjointness: verify_g2_disjointness(g),
        g3_coverage: verify_g3_coverage(g),
        g4_reachability: verify_g4_reachability(g),
        g5_acyclic_depth: verify_g5_acyclic_depth(g),
        g6_root_integrity: verify_g6_root_integrity(g),
        g7_successor_sets: verify_g7_successor_sets(g),
    }
}

impl Graph {
    pub fn verify(&mut self) -> GraphCert {
        verify_graph(self)
    }

    /// Convert a failing cert into a poisoning error.
    pub fn check(&mut self) -> Result<(), GraphError> {
        let cert = self.verify();
        if cert.all_pass() {
            Ok(())
        } else {
            Err(GraphError::InvariantViolation {
                failed: cert
                    .obligations()
                    .into_iter()
                    .filter(|(_, ok)| !ok)
                    .map(|(name, _)| name)
                    .collect(),
            })
        }
    }
}

// ── Individual obligations ──────────────────────────────────────────────────

fn verify_g1_bijection(g: &Graph) -> bool {
    let index = g.set_index();
    if index.len() != g.arena().len() {
        return false;
    }
    for (set, &id) in index {
        if !g.arena().contains(id) || g.arena().get(id).set != *set {
            return false;
        }
    }
    for (id, node) in g.arena().iter() {
        if index.get(&node.set) != Some(&id) {
            return false;
        }
    }
    true
}

fn verify_g2_disjointness(g: &Graph) -> bool {
    for (_, node) in g.arena().iter() {
        let edges: Vec<_> = node.edges.values().collect();
        for i in 0..edges.len() {
            for j in i + 1..edges.len() {
                if edges[i].ranges.overlaps(&edges[j].ranges) {
                    return false;
                }
            }
        }
    }
    true
}

fn verify_g3_coverage(g: &Graph) -> bool {
    for (_, node) in g.arena().iter() {
        for (tp, _) in node.set.iter() {
            if tp.is_virtual_start() {
                continue;
            }
            let Some(entry) = g.occupant_entries().get(&tp.tag) else {
                return false;
            };
            let gr = entry.tag.phase_ranges(tp.phase, &entry.params);
            if gr.is_empty() {
                continue;
            }
            let terminal = tp.phase + 1 == entry.tag.phase_count();
            let next = TagPhase::new(tp.tag, if terminal { 0 } else { tp.phase + 1 });
            let mut covered = crate::gap::GapRanges::empty();
            for e in node.edges.values() {
                let advances = if terminal {
                    e.completes.contains(&tp.tag)
                } else {
                    g.arena().get(e.target).set.contains(next)
                };
                if advances {
                    covered = covered.union(&e.ranges.intersect(&gr));
                }
            }
            if covered != gr {
                return false;
            }
        }
    }
    true
}

fn verify_g4_reachability(g: &mut Graph) -> bool {
    let mut incoming: BTreeMap<NodeId, u32> = BTreeMap::new();
    for (_, node) in g.arena().iter() {
        for e in node.edges.values() {
            *incoming.entry(e.target).or_insert(0) += 1;
        }
    }
    for (id, node) in g.arena().iter() {
        if node.refs != incoming.get(&id).copied().unwrap_or(0) {
            return false;
        }
        if id != g.root_id() && node.refs == 0 {
            return false;
        }
    }
    g.traversal_order().len() == g.arena().len()
}

fn verify_g5_acyclic_depth(g: &Graph) -> bool {
    let max_depth = g
        .occupant_entries()
        .values()
        .map(|e| e.tag.phase_count() as usize)
        .max()
        .unwrap_or(0);
    let root = g.root_id();

    // Kahn's algorithm over the graph with edges into the root removed
    // (those are the intentional wrap cycles), then a longest-path pass
    let mut indegree: BTreeMap<NodeId, usize> = g.arena().iter().map(|(id, _)| (id, 0)).collect();
    for (_, node) in g.arena().iter() {
        for e in node.edges.values() {
            if e.target != root {
                *indegree.entry(e.target).or_insert(0) += 1;
            }
        }
    }
    let mut depth: BTreeMap<NodeId, usize> = BTreeMap::new();
    let mut queue: Vec<NodeId> = indegree
        .iter()
        .filter(|(_, &d)| d == 0)
        .map(|(&id, _)| id)
        .collect();
    for &id in &queue {
        depth.insert(id, 0);
    }
    let mut seen = 0usize;
    while let Some(n) = queue.pop() {
        seen += 1;
        let d = depth[&n];
        if d > max_depth {
            return false;
        }
        for e in g.arena().get(n).edges.values() {
            if e.target == root {
                continue;
            }
            let nd = depth.entry(e.target).or_insert(0);
            *nd = (*nd).max(d + 1);
            let ind = indegree.entry(e.target).or_insert(0);
            *ind -= 1;
            if *ind == 0 {
                queue.push(e.target);
            }
        }
    }
    // a leftover node means a cycle not passing through the root
    seen == g.arena().len()
}

fn verify_g6_root_integrity(g: &Graph) -> bool {
    let root = g.root_id();
    let vstart = TagPhase::virtual_start();
    if !g.arena().get(root).set.contains(vstart) {
        return false;
    }
    for (id, node) in g.arena().iter() {
        if id != root && node.set.contains(vstart) {
            return false;
        }
        // self-loops exist only on the root
        if id != root && node.edges.values().any(|e| e.target == id) {
            return false;
        }
    }
    let mut cover = crate::gap::GapRanges::empty();
    let mut self_loop = None;
    for e in g.arena().get(root).edges.values() {
        if e.target == root && e.completes.is_empty() {
            if self_loop.is_some() {
                return false;
            }
            self_loop = Some(e.ranges.clone());
        } else {
            cover = cover.union(&e.ranges);
        }
    }
    match self_loop {
        None => false,
        Some(ranges) => ranges == crate::gap::GapRanges::unbounded().difference(&cover),
    }
}

fn verify_g7_successor_sets(g: &Graph) -> bool {
    let root = g.root_id();
    for (id, node) in g.arena().iter() {
        for e in node.edges.values() {
            if id == root && e.target == root && e.completes.is_empty() {
                continue;
            }
            let mut expected = PhaseSet::new();
            let mut terminal_tags = std::collections::BTreeSet::new();
            for (tp, c) in node.set.iter() {
                if tp.is_virtual_start() {
                    continue;
                }
                let Some(entry) = g.occupant_entries().get(&tp.tag) else {
                    return false;
                };
                let gr = entry.tag.phase_ranges(tp.phase, &entry.params);
                let ov = e.ranges.intersect(&gr);
                if ov.is_empty() {
                    continue;
                }
                // edge splitting must leave each edge either fully inside
                // or fully outside every phase window
                if ov != e.ranges {
                    return false;
                }
                let terminal = tp.phase + 1 == entry.tag.phase_count();
                let next = TagPhase::new(tp.tag, if terminal { 0 } else { tp.phase + 1 });
                for _ in 0..c {
                    expected.insert(next);
                }
                if terminal {
                    terminal_tags.insert(tp.tag);
                }
            }
            if e.completes != terminal_tags {
                return false;
            }
            if e.target == root {
                // wrap edges: the root carries the start phases, among
                // everything else it holds
                let ok = expected
                    .iter()
                    .all(|(tp, _)| tp.phase == 0 && g.arena().get(root).set.contains(tp));
                if !ok {
                    return false;
                }
            } else if g.arena().get(e.target).set != expected {
                return false;
            }
        }
    }
    true
}

// ── Tests ───────────────────────────────────────────────────────────────────
