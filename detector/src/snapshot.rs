// snapshot.rs — Serializable dump of the automaton
//
// With arena indices instead of pointers, serializing the cyclic graph is
// a flat dump: node slots, edge targets by id, the root id, and the live
// tag table. Traversal stamps are transient and excluded.

use serde::Serialize;

use crate::gap::GapRange;
use crate::graph::Graph;
use crate::phase::TagPhase;
use crate::tag::{TagId, TagParams};

#[derive(Debug, Clone, Serialize)]
pub struct EdgeDump {
    pub ranges: Vec<GapRange>,
    pub target: u32,
    pub completes: Vec<TagId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeDump {
    pub id: u32,
    pub set: Vec<(TagPhase, u32)>,
    pub refs: u32,
    pub edges: Vec<EdgeDump>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OccupantDump {
    pub id: TagId,
    pub freq_mhz: f64,
    pub gaps: Vec<f64>,
    pub params: TagParams,
}

/// Flat image of a graph, ready for `serde_json`.
#[derive(Debug, Clone, Serialize)]
pub struct GraphSnapshot {
    pub label: String,
    pub root: u32,
    pub nodes: Vec<NodeDump>,
    pub occupants: Vec<OccupantDump>,
}

impl GraphSnapshot {
    pub fn of(graph: &Graph) -> Self {
        let mut nodes: Vec<NodeDump> = graph
            .arena()
            .iter()
            .map(|(id, node)| NodeDump {
                id: id.0,
                set: node.set.iter().collect(),
                refs: node.refs,
                edges: node
                    .edges
                    .values()
                    .map(|e| EdgeDump {
                        ranges: e.ranges.iter().copied().collect(),
                        target: e.target.0,
                        completes: e.completes.iter().copied().collect(),
                    })
                    .collect(),
            })
            .collect();
        nodes.sort_by_key(|n| n.id);
        let mut occupants: Vec<OccupantDump> = graph
            .occupant_entries()
            .iter()
            .map(|(&id, entry)| OccupantDump {
                id,
                freq_mhz: entry.tag.freq_mhz(),
                gaps: entry.tag.gaps().to_vec(),
                params: entry.params,
            })
            .collect();
        occupants.sort_by_key(|o| o.id);
        GraphSnapshot {
            label: graph.label().to_string(),
            root: graph.root_id().0,
            nodes,
            occupants,
        }
    }
}
