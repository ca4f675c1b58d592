// dot.rs — Graphviz DOT output for the recognition automaton
//
// Transforms the graph into DOT format suitable for rendering with `dot`,
// `neato`, or other Graphviz layout engines.
//
// Preconditions: any graph, in any consistent state.
// Postconditions: returns a valid DOT string; node order follows a stamped
//                 breadth-first sweep so output is deterministic.
// Failure modes: none (pure string formatting).
// Side effects: bumps the graph's traversal stamp.

use std::fmt::Write;

use crate::graph::Graph;
use crate::node::{Edge, Node, NodeId};

/// Emit the automaton as a Graphviz DOT string.
pub fn emit_dot(graph: &mut Graph) -> String {
    let order = graph.traversal_order();
    let root = graph.root_id();

    let mut buf = String::new();
    writeln!(buf, "digraph {} {{", sanitize(graph.label())).unwrap();
    writeln!(buf, "    rankdir=LR;").unwrap();
    writeln!(buf, "    node [fontname=\"Helvetica\", fontsize=10];").unwrap();
    writeln!(buf, "    edge [fontname=\"Helvetica\", fontsize=9];").unwrap();
    writeln!(buf).unwrap();

    for &id in &order {
        let node = graph.arena().get(id);
        writeln!(
            buf,
            "    n{} [label=\"{}\", {}];",
            id.0,
            node_label(id, node),
            node_attrs(id, root),
        )
        .unwrap();
    }

    writeln!(buf).unwrap();
    for &id in &order {
        let node = graph.arena().get(id);
        for e in node.edges.values() {
            writeln!(
                buf,
                "    n{} -> n{} [label=\"{}\"{}];",
                id.0,
                e.target.0,
                edge_label(e),
                edge_attrs(e),
            )
            .unwrap();
        }
    }

    writeln!(buf, "}}").unwrap();
    buf
}

// ── Helpers ─────────────────────────────────────────────────────────────────

/// Sanitize a name to valid DOT identifier characters.
fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.chars().next().map_or(true, |c| c.is_ascii_digit()) {
        format!("g_{cleaned}")
    } else {
        cleaned
    }
}

/// Node label: id plus the phase multiset.
fn node_label(id: NodeId, node: &Node) -> String {
    format!("{}: {}", id.0, node.set)
}

/// Return DOT attributes for a node.
fn node_attrs(id: NodeId, root: NodeId) -> &'static str {
    if id == root {
        "shape=doublecircle, style=filled, fillcolor=lightblue"
    } else {
        "shape=box, style=rounded"
    }
}

/// Edge label: the gap ranges, plus any burst-completion marks.
fn edge_label(e: &Edge) -> String {
    let mut label = format!("{}", e.ranges);
    if !e.completes.is_empty() {
        let marks: Vec<String> = e.completes.iter().map(|t| t.to_string()).collect();
        write!(label, " !{}", marks.join(",")).unwrap();
    }
    label
}

fn edge_attrs(e: &Edge) -> &'static str {
    if e.completes.is_empty() {
        ""
    } else {
        ", style=bold, color=red"
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
